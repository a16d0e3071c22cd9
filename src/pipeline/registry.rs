//! 摄像头注册表 (Camera registry)
//!
//! 启动即登记, 停止即移除. 查询只读取共享状态, 不会阻塞工作线程的 tick.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use image::RgbImage;
use tracing::{error, info, warn};

use super::worker::{CameraShared, CameraWorker, Collaborators};
use super::WorkerState;
use crate::config::{AppConfig, CameraConfig};
use crate::detection::build_detector;
use crate::error::{Error, Result};
use crate::events::{EventSink, HttpEventSink};
use crate::heatmap::RenderOptions;
use crate::input::{FfmpegSource, Frame};
use crate::recorder::FfmpegEncoder;
use crate::zones::Zones;

struct Entry {
    shared: Arc<CameraShared>,
    handle: Option<JoinHandle<()>>,
    // 工作线程退出时发送端被丢弃
    done: Receiver<()>,
}

pub struct CameraRegistry {
    config: AppConfig,
    zones: Arc<Zones>,
    sink: Arc<dyn EventSink>,
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl CameraRegistry {
    /// 事件上报到 `config.api`
    pub fn new(config: AppConfig) -> Self {
        let sink = Arc::new(HttpEventSink::new(&config.api));
        info!(url = sink.url(), "📮 event sink");
        Self::with_sink(config, sink)
    }

    pub fn with_sink(config: AppConfig, sink: Arc<dyn EventSink>) -> Self {
        let zones = Arc::new(Zones::from_config(&config.zones));
        Self {
            config,
            zones,
            sink,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn shared(&self, camera_id: &str) -> Result<Arc<CameraShared>> {
        self.lock()
            .get(camera_id)
            .map(|e| e.shared.clone())
            .ok_or_else(|| Error::UnknownCamera(camera_id.to_string()))
    }

    // ========== 生命周期 ==========

    /// 启动配置中的全部摄像头. 空列表直接拒绝.
    pub fn start_all(&self) -> Result<()> {
        if self.config.cameras.is_empty() {
            return Err(Error::Config(
                "No cameras defined. Add a 'cameras:' list to the config".into(),
            ));
        }
        let cameras = self.config.cameras.clone();
        for camera in &cameras {
            self.start(camera)?;
        }
        Ok(())
    }

    /// 使用默认协作者启动: ffmpeg 采集, HTTP 检测, HTTP 上报, ffmpeg 编码
    pub fn start(&self, camera: &CameraConfig) -> Result<()> {
        let ffmpeg = &self.config.clips.ffmpeg;
        let source = match FfmpegSource::open(camera, ffmpeg) {
            Ok(s) => s,
            Err(e) => {
                // 首次读取时重连
                warn!(camera = %camera.id, error = %e, "⚠️ 采集源暂不可用, 将在运行中重试");
                FfmpegSource::new(camera, ffmpeg)
            }
        };
        let parts = Collaborators {
            source: Box::new(source),
            detector: build_detector(&self.config.detector),
            sink: self.sink.clone(),
            encoder: Arc::new(FfmpegEncoder::new(ffmpeg.as_str())),
        };
        self.start_with(camera, parts)
    }

    pub fn start_with(&self, camera: &CameraConfig, parts: Collaborators) -> Result<()> {
        let mut entries = self.lock();
        if entries.contains_key(&camera.id) {
            return Err(Error::AlreadyRunning(camera.id.clone()));
        }

        let worker = CameraWorker::new(camera, &self.config, self.zones.clone(), parts)?;
        let shared = worker.shared();
        let (done_tx, done_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name(format!("camera-{}", camera.id))
            .spawn(move || {
                let _done = done_tx;
                worker.run();
            })?;

        info!(
            camera = %camera.id,
            source = %camera.source,
            fps_cap = camera.fps_cap,
            "✅ camera started"
        );
        entries.insert(
            camera.id.clone(),
            Entry {
                shared,
                handle: Some(handle),
                done: done_rx,
            },
        );
        Ok(())
    }

    /// 停止并移除. 超时未退出的线程被放弃 (不强杀), 返回 false.
    pub fn stop(&self, camera_id: &str, timeout: Duration) -> Result<bool> {
        let mut entry = self
            .lock()
            .remove(camera_id)
            .ok_or_else(|| Error::UnknownCamera(camera_id.to_string()))?;
        entry.shared.request_stop();
        Ok(wait_for(camera_id, &mut entry, timeout))
    }

    /// 先向所有摄像头发出停止请求, 再逐个等待
    pub fn stop_all(&self, timeout: Duration) {
        let entries: Vec<(String, Entry)> = std::mem::take(&mut *self.lock()).into_iter().collect();
        for (_, entry) in &entries {
            entry.shared.request_stop();
        }
        for (id, mut entry) in entries {
            wait_for(&id, &mut entry, timeout);
        }
    }

    // ========== 查询 ==========

    pub fn camera_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn state(&self, camera_id: &str) -> Result<WorkerState> {
        Ok(self.shared(camera_id)?.state())
    }

    pub fn occupancy(&self, camera_id: &str) -> Result<usize> {
        Ok(self.shared(camera_id)?.occupancy())
    }

    pub fn occupancy_all(&self) -> BTreeMap<String, usize> {
        self.lock()
            .iter()
            .map(|(id, e)| (id.clone(), e.shared.occupancy()))
            .collect()
    }

    /// 阻塞直到该摄像头有新的预览帧; 摄像头停止后返回 None
    pub fn next_preview(&self, camera_id: &str) -> Result<Option<Frame>> {
        let shared = self.shared(camera_id)?;
        Ok(shared.preview.next())
    }

    pub fn next_preview_timeout(&self, camera_id: &str, timeout: Duration) -> Result<Option<Frame>> {
        let shared = self.shared(camera_id)?;
        Ok(shared.preview.next_timeout(timeout))
    }

    /// 当前热力图; overlay 模式叠加在最近一帧上
    pub fn heatmap(&self, camera_id: &str, opts: &RenderOptions) -> Result<RgbImage> {
        let shared = self.shared(camera_id)?;
        let snapshot = shared.heatmap_snapshot();
        let base = shared.last_frame.load();
        Ok(snapshot.render(base.as_deref(), opts))
    }

    pub fn last_frame(&self, camera_id: &str) -> Result<Option<Frame>> {
        Ok(self.shared(camera_id)?.last_frame.load())
    }
}

impl Drop for CameraRegistry {
    fn drop(&mut self) {
        let running = self.lock().len();
        if running > 0 {
            self.stop_all(Duration::from_secs(2));
        }
    }
}

fn wait_for(camera_id: &str, entry: &mut Entry, timeout: Duration) -> bool {
    match entry.done.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if let Some(handle) = entry.handle.take() {
                if handle.join().is_err() {
                    error!(camera = camera_id, "❌ camera worker panicked");
                }
            }
            info!(camera = camera_id, "camera stopped");
            true
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                camera = camera_id,
                timeout_ms = timeout.as_millis() as u64,
                "⚠️ camera worker did not exit in time, abandoning"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection};
    use crate::error::Result as CrateResult;
    use crate::events::Event;
    use crate::heatmap::RenderMode;
    use crate::input::FrameSource;
    use crate::pipeline::worker::tests::{
        noise_frame, test_config, FakeEncoder, ScriptedDetector, ScriptedSource,
    };

    fn parts(sink: Arc<dyn EventSink>) -> Collaborators {
        Collaborators {
            source: Box::new(ScriptedSource::repeating(noise_frame())),
            detector: Box::new(ScriptedDetector {
                detections: vec![Detection::new(BBox::new(20.0, 10.0, 30.0, 40.0), "person", 0.9)],
                fail: false,
            }),
            sink,
            encoder: Arc::new(FakeEncoder { fail: false }),
        }
    }

    fn registry(dir: &std::path::Path) -> (CameraRegistry, crossbeam_channel::Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (CameraRegistry::with_sink(test_config(dir, false), Arc::new(tx)), rx)
    }

    #[test]
    fn test_start_query_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (reg, _rx) = registry(dir.path());
        let camera = reg.config().cameras[0].clone();
        reg.start_with(&camera, parts(reg.sink.clone())).unwrap();

        assert_eq!(reg.camera_ids(), vec!["cam-a".to_string()]);
        let preview = reg
            .next_preview_timeout("cam-a", Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(preview.dimensions(), (64, 48));
        assert_eq!(reg.occupancy("cam-a").unwrap(), 1);
        assert_eq!(reg.occupancy_all().get("cam-a"), Some(&1));
        assert!(reg.last_frame("cam-a").unwrap().is_some());

        let opts = RenderOptions {
            mode: RenderMode::Raw,
            ..RenderOptions::default()
        };
        assert_eq!(reg.heatmap("cam-a", &opts).unwrap().dimensions(), (64, 48));

        assert!(reg.stop("cam-a", Duration::from_secs(5)).unwrap());
        assert!(reg.camera_ids().is_empty());
        assert!(matches!(reg.occupancy("cam-a"), Err(Error::UnknownCamera(_))));
    }

    #[test]
    fn test_stop_releases_preview_reader() {
        let dir = tempfile::tempdir().unwrap();
        let (reg, _rx) = registry(dir.path());
        let camera = reg.config().cameras[0].clone();
        let mut p = parts(reg.sink.clone());
        p.source = Box::new(ScriptedSource::finite(vec![noise_frame()]));
        reg.start_with(&camera, p).unwrap();

        // 读空唯一一帧, 之后的读取会阻塞
        assert!(reg
            .next_preview_timeout("cam-a", Duration::from_secs(5))
            .unwrap()
            .is_some());

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::scope(|s| {
            s.spawn(|| {
                let frame = reg.next_preview("cam-a").unwrap();
                tx.send(frame.is_none()).unwrap();
            });
            std::thread::sleep(Duration::from_millis(200));
            assert!(reg.stop("cam-a", Duration::from_secs(2)).unwrap());
            assert_eq!(rx.recv_timeout(Duration::from_secs(3)), Ok(true));
        });
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (reg, _rx) = registry(dir.path());
        let camera = reg.config().cameras[0].clone();
        reg.start_with(&camera, parts(reg.sink.clone())).unwrap();
        let err = reg.start_with(&camera, parts(reg.sink.clone())).unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning(_)));
        reg.stop_all(Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_camera() {
        let dir = tempfile::tempdir().unwrap();
        let (reg, _rx) = registry(dir.path());
        assert!(matches!(reg.stop("nope", Duration::ZERO), Err(Error::UnknownCamera(_))));
        assert!(matches!(reg.last_frame("nope"), Err(Error::UnknownCamera(_))));
    }

    #[test]
    fn test_empty_camera_set_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), false);
        config.cameras.clear();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let reg = CameraRegistry::with_sink(config, Arc::new(tx));
        assert!(matches!(reg.start_all(), Err(Error::Config(_))));
    }

    /// 读取永久阻塞的采集源
    struct HungSource;

    impl FrameSource for HungSource {
        fn is_opened(&self) -> bool {
            true
        }

        fn read(&mut self) -> CrateResult<Frame> {
            std::thread::sleep(Duration::from_secs(3600));
            Err(Error::Capture("hung".into()))
        }

        fn release(&mut self) {}

        fn resolution(&self) -> (u32, u32) {
            (64, 48)
        }
    }

    #[test]
    fn test_hung_worker_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let (reg, _rx) = registry(dir.path());
        let camera = reg.config().cameras[0].clone();
        let mut p = parts(reg.sink.clone());
        p.source = Box::new(HungSource);
        reg.start_with(&camera, p).unwrap();

        let start = std::time::Instant::now();
        assert!(!reg.stop("cam-a", Duration::from_millis(100)).unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(reg.camera_ids().is_empty());
    }
}
