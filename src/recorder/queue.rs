//! 片段编码队列 (Queued clip writer)
//!
//! 有界任务队列 + 后台编码线程. `enqueue` 立即返回文件名,
//! 编码结果通过回调通知; 队列满时拒绝任务, 不阻塞调用方.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{error, info, warn};

use super::clip_writer::ClipWriter;
use crate::error::{Error, Result};
use crate::input::TimedFrame;

/// 队列容量
pub const QUEUE_CAPACITY: usize = 256;

/// 编码完成回调: Ok(文件名) 或错误
pub type OnDone = Box<dyn FnOnce(Result<String>) + Send>;

pub struct ClipJob {
    pub camera_id: String,
    pub event_type: String,
    pub pre: Vec<TimedFrame>,
    pub post: Vec<TimedFrame>,
    pub name: String,
    pub on_done: Option<OnDone>,
}

pub struct ClipQueue {
    writer: Arc<ClipWriter>,
    tx: Option<Sender<ClipJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl ClipQueue {
    pub fn start(writer: Arc<ClipWriter>, workers: usize) -> Self {
        Self::with_capacity(writer, workers, QUEUE_CAPACITY)
    }

    pub fn with_capacity(writer: Arc<ClipWriter>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = bounded::<ClipJob>(capacity.max(1));
        let handles = (0..workers.max(1))
            .map(|i| {
                let rx = rx.clone();
                let writer = writer.clone();
                std::thread::Builder::new()
                    .name(format!("clip-encoder-{}", i))
                    .spawn(move || encode_loop(i, writer, rx))
            })
            .filter_map(|r| match r {
                Ok(h) => Some(h),
                Err(e) => {
                    error!(error = %e, "❌ 编码线程启动失败");
                    None
                }
            })
            .collect();

        Self {
            writer,
            tx: Some(tx),
            workers: handles,
        }
    }

    /// 排队编码, 返回最终文件名
    pub fn enqueue(
        &self,
        camera_id: &str,
        event_type: &str,
        pre: Vec<TimedFrame>,
        post: Vec<TimedFrame>,
        on_done: Option<OnDone>,
    ) -> Result<String> {
        let name = self.writer.make_name(camera_id, event_type);
        let job = ClipJob {
            camera_id: camera_id.to_string(),
            event_type: event_type.to_string(),
            pre,
            post,
            name: name.clone(),
            on_done,
        };

        let tx = self.tx.as_ref().ok_or(Error::QueueFull(0))?;
        match tx.try_send(job) {
            Ok(()) => Ok(name),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull(tx.len())),
            Err(TrySendError::Disconnected(_)) => Err(Error::QueueFull(0)),
        }
    }

    /// 排队中的任务数
    pub fn pending(&self) -> usize {
        self.tx.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }

    /// 关闭队列, 等待已排队任务完成
    pub fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("clip encoder thread panicked");
            }
        }
    }
}

impl Drop for ClipQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn encode_loop(index: usize, writer: Arc<ClipWriter>, rx: Receiver<ClipJob>) {
    info!(worker = index, "🎬 clip encoder started");
    for job in rx.iter() {
        let result = writer.write_sync(
            &job.camera_id,
            &job.event_type,
            &job.pre,
            &job.post,
            Some(&job.name),
        );
        if let Err(e) = &result {
            warn!(camera = %job.camera_id, name = %job.name, error = %e, "⚠️ clip encode failed");
        }
        if let Some(on_done) = job.on_done {
            on_done(result);
        }
    }
    info!(worker = index, "clip encoder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClipConfig;
    use crate::features::test_util::at;
    use crate::recorder::clip_writer::VideoEncoder;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::time::Duration;

    struct SlowEncoder {
        delay: Duration,
    }

    impl VideoEncoder for SlowEncoder {
        fn encode(&self, _pattern: &Path, _fps: u32, output: &Path) -> Result<()> {
            std::thread::sleep(self.delay);
            std::fs::write(output, vec![1u8; 2048])?;
            Ok(())
        }
    }

    fn writer(dir: &Path, delay_ms: u64) -> Arc<ClipWriter> {
        let cfg = ClipConfig {
            dir: dir.to_path_buf(),
            ..ClipConfig::default()
        };
        let enc = Arc::new(SlowEncoder {
            delay: Duration::from_millis(delay_ms),
        });
        Arc::new(ClipWriter::with_encoder(&cfg, 15, 16, 16, enc).unwrap())
    }

    fn frames() -> Vec<TimedFrame> {
        vec![TimedFrame::new(
            at(0.0),
            Arc::new(RgbImage::from_pixel(16, 16, Rgb([9, 9, 9]))),
        )]
    }

    #[test]
    fn test_callback_reports_name() {
        let out = tempfile::tempdir().unwrap();
        let queue = ClipQueue::start(writer(out.path(), 0), 1);
        let (tx, rx) = crossbeam_channel::unbounded();
        let name = queue
            .enqueue(
                "cam",
                "intrusion",
                frames(),
                Vec::new(),
                Some(Box::new(move |r| {
                    let _ = tx.send(r);
                })),
            )
            .unwrap();
        let done = rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(done, name);
        assert!(out.path().join(&name).is_file());
    }

    #[test]
    fn test_full_queue_rejects() {
        let out = tempfile::tempdir().unwrap();
        let queue = ClipQueue::with_capacity(writer(out.path(), 300), 1, 1);
        let mut rejected = 0;
        for _ in 0..5 {
            if let Err(Error::QueueFull(_)) = queue.enqueue("cam", "fall", frames(), Vec::new(), None) {
                rejected += 1;
            }
        }
        assert!(rejected >= 3);
    }

    #[test]
    fn test_shutdown_drains_pending() {
        let out = tempfile::tempdir().unwrap();
        let mut queue = ClipQueue::start(writer(out.path(), 20), 2);
        let mut names = Vec::new();
        for _ in 0..4 {
            names.push(queue.enqueue("cam", "fall", frames(), Vec::new(), None).unwrap());
            std::thread::sleep(Duration::from_millis(2));
        }
        queue.shutdown();
        assert_eq!(queue.pending(), 0);
        for name in names {
            assert!(out.path().join(name).is_file());
        }
    }
}
