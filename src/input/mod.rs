/// 视频输入系统 (Video Input System)
///
/// - FrameSource: 采集接口 (按需读取一帧)
/// - FfmpegSource: ffmpeg 子进程解码 (摄像头 / RTSP / 文件循环)
/// - RingBuffer: 预录环形缓冲
pub mod ffmpeg_source;
pub mod ring_buffer;

use std::sync::Arc;

use image::RgbImage;

use crate::error::Result;
use crate::events::Timestamp;

pub use ffmpeg_source::FfmpegSource;
pub use ring_buffer::RingBuffer;

/// 共享只读帧. 环形缓冲/预览/片段之间只复制指针.
pub type Frame = Arc<RgbImage>;

/// 带时间戳的帧
#[derive(Clone, Debug)]
pub struct TimedFrame {
    pub ts: Timestamp,
    pub frame: Frame,
}

impl TimedFrame {
    pub fn new(ts: Timestamp, frame: Frame) -> Self {
        Self { ts, frame }
    }
}

/// 采集源
pub trait FrameSource: Send {
    /// 采集资源是否可用
    fn is_opened(&self) -> bool;

    /// 读取下一帧. 失败为暂时性错误, 调用方退避后重试.
    fn read(&mut self) -> Result<Frame>;

    /// 释放采集资源, 之后 `is_opened` 返回 false
    fn release(&mut self);

    /// 输出分辨率 (宽, 高)
    fn resolution(&self) -> (u32, u32);
}
