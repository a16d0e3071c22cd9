//! 预览出口 (Preview surfaces)
//!
//! - PreviewQueue: 有界队列, 满时丢弃最旧帧, 生产者永不阻塞; 关闭后读者返回 None
//! - LastFrame:    最近一帧, 整体原子替换

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::input::Frame;

/// 阻塞读者检查关闭标志的间隔
const CLOSE_POLL: Duration = Duration::from_millis(100);

pub struct PreviewQueue {
    tx: Sender<Frame>,
    // 生产者持有一份接收端, 用于满时弹出最旧帧
    rx: Receiver<Frame>,
    closed: AtomicBool,
}

impl PreviewQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            closed: AtomicBool::new(false),
        }
    }

    /// 关闭队列: 已排队的帧仍可读出, 之后读者立即返回 None
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 发布一帧. 队列满时丢弃最旧帧后重试.
    pub fn publish(&self, frame: Frame) {
        let mut frame = frame;
        for _ in 0..=self.tx.capacity().unwrap_or(1) {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(f)) => {
                    let _ = self.rx.try_recv();
                    frame = f;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 阻塞直到有新帧; 队列关闭且已读空时返回 None
    pub fn next(&self) -> Option<Frame> {
        loop {
            match self.rx.recv_timeout(CLOSE_POLL) {
                Ok(f) => return Some(f),
                Err(RecvTimeoutError::Timeout) if !self.is_closed() => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Frame> {
        if self.is_closed() {
            return self.rx.try_recv().ok();
        }
        match self.rx.recv_timeout(timeout) {
            Ok(f) => Some(f),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[derive(Default)]
pub struct LastFrame {
    inner: ArcSwapOption<image::RgbImage>,
}

impl LastFrame {
    pub fn store(&self, frame: Frame) {
        self.inner.store(Some(frame));
    }

    pub fn load(&self) -> Option<Frame> {
        self.inner.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    fn frame(v: u8) -> Frame {
        Arc::new(RgbImage::from_pixel(2, 2, Rgb([v, v, v])))
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let q = PreviewQueue::new(3);
        for v in 0..5 {
            q.publish(frame(v));
        }
        assert_eq!(q.len(), 3);
        let got: Vec<u8> = (0..3)
            .map(|_| q.next().unwrap().get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(got, vec![2, 3, 4]);
    }

    #[test]
    fn test_next_timeout_on_empty() {
        let q = PreviewQueue::new(2);
        assert!(q.next_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_close_releases_blocked_reader() {
        let q = Arc::new(PreviewQueue::new(2));
        q.publish(frame(9));

        let reader = {
            let q = q.clone();
            std::thread::spawn(move || {
                let first = q.next().map(|f| f.get_pixel(0, 0).0[0]);
                // 第二次读取阻塞, 直到关闭
                let second = q.next();
                (first, second.is_none())
            })
        };
        std::thread::sleep(Duration::from_millis(150));
        q.close();

        let (first, released) = reader.join().unwrap();
        assert_eq!(first, Some(9));
        assert!(released);
        assert!(q.is_closed());
        assert!(q.next_timeout(Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_last_frame_swap() {
        let last = LastFrame::default();
        assert!(last.load().is_none());
        last.store(frame(1));
        last.store(frame(7));
        assert_eq!(last.load().unwrap().get_pixel(1, 1).0[0], 7);
    }
}
