/// 事件片段 (Event clips)
///
/// - ClipWriter: 同步写入 (编排器默认使用, 事件上报时片段已就绪)
/// - ClipQueue:  后台编码队列, 完成后回调
pub mod clip_writer;
pub mod queue;

pub use clip_writer::{sanitize, ClipWriter, FfmpegEncoder, VideoEncoder};
pub use queue::{ClipQueue, OnDone, QUEUE_CAPACITY};
