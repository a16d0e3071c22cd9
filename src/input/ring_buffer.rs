//! 预录环形缓冲 (Pre-roll ring buffer)
//!
//! 容量在创建时按 秒 × fps 计算一次, 之后不随实际帧率调整.
//! 满了之后丢弃最旧的帧.

use std::collections::VecDeque;

use super::{Frame, TimedFrame};
use crate::events::Timestamp;

pub struct RingBuffer {
    capacity: usize,
    buf: VecDeque<TimedFrame>,
}

impl RingBuffer {
    pub fn new(seconds: f64, fps: u32) -> Self {
        let capacity = ((seconds * fps as f64) as usize).max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, ts: Timestamp, frame: Frame) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(TimedFrame::new(ts, frame));
    }

    /// 独立快照: 之后的 push 不影响返回值
    pub fn dump(&self) -> Vec<TimedFrame> {
        self.buf.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
