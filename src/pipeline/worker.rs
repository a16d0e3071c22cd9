//! 摄像头工作线程 (Camera worker)
//!
//! 每路摄像头一个线程, 顺序执行 tick:
//! 采集 → 限速 → 预录缓冲 → 防遮挡 → 检测 → 跟踪 → 在场人数 → 热力图
//! → 行为检测 → 预览 → (有事件时) 后录 + 片段 + 上报

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::preview::{LastFrame, PreviewQueue};
use super::WorkerState;
use crate::config::{AppConfig, CameraConfig};
use crate::detection::{BBox, CentroidTracker, Detector, Track, Tracker};
use crate::error::Result;
use crate::events::sink::EventSink;
use crate::events::Event;
use crate::features::{FeatureBank, TamperDetector};
use crate::heatmap::HeatmapAccumulator;
use crate::input::{Frame, FrameSource, RingBuffer, TimedFrame};
use crate::recorder::{ClipQueue, ClipWriter, OnDone, VideoEncoder};
use crate::renderer::OverlayRenderer;
use crate::zones::Zones;

/// 采集失败后的退避
const CAPTURE_BACKOFF: Duration = Duration::from_millis(50);

/// 人员框在热力图上的累加强度
const HEAT_STRENGTH: f32 = 1.0;

// ========== 跨线程共享状态 ==========

/// 其他线程可读的单路摄像头状态: 预览, 最近一帧, 在场人数, 热力图
pub struct CameraShared {
    camera_id: String,
    pub preview: PreviewQueue,
    pub last_frame: LastFrame,
    occupancy: AtomicUsize,
    heatmap: Mutex<HeatmapAccumulator>,
    state: AtomicU8,
    stop: AtomicBool,
}

impl CameraShared {
    pub fn new(camera_id: &str, heatmap: HeatmapAccumulator, preview_capacity: usize) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            preview: PreviewQueue::new(preview_capacity),
            last_frame: LastFrame::default(),
            occupancy: AtomicUsize::new(0),
            heatmap: Mutex::new(heatmap),
            state: AtomicU8::new(WorkerState::Running as u8),
            stop: AtomicBool::new(false),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// 请求停止: 当前 tick 结束后退出; 预览立即关闭, 阻塞的读者随之返回
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.preview.close();
        if self.state() == WorkerState::Running {
            self.set_state(WorkerState::Stopping);
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// 锁内复制热力图, 渲染在锁外进行
    pub fn heatmap_snapshot(&self) -> HeatmapAccumulator {
        self.lock_heatmap().clone()
    }

    fn lock_heatmap(&self) -> MutexGuard<'_, HeatmapAccumulator> {
        self.heatmap.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ========== 协作者 ==========

/// 外部协作者: 采集源, 检测器, 事件接收端, 视频编码器
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
    pub sink: Arc<dyn EventSink>,
    pub encoder: Arc<dyn VideoEncoder>,
}

/// 片段输出方式
pub enum ClipOutput {
    /// 同步编码, 上报时片段已就绪
    Sync(ClipWriter),
    /// 后台编码, 完成后再上报
    Queued(ClipQueue),
}

/// 单次 tick 结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tracks: usize,
    pub occupancy: usize,
    pub events: usize,
    pub detector_failed: bool,
}

// ========== 工作线程 ==========

pub struct CameraWorker {
    camera_id: String,
    period: Duration,
    post_seconds: f64,
    media_base_url: String,

    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    tracker: CentroidTracker,
    tamper: TamperDetector,
    features: FeatureBank,
    ring: RingBuffer,
    renderer: OverlayRenderer,
    clips: ClipOutput,
    sink: Arc<dyn EventSink>,
    shared: Arc<CameraShared>,

    last_tick: Option<Instant>,
    ticks: u64,
}

impl CameraWorker {
    pub fn new(
        camera: &CameraConfig,
        config: &AppConfig,
        zones: Arc<Zones>,
        parts: Collaborators,
    ) -> Result<Self> {
        let (mut width, mut height) = parts.source.resolution();
        if width == 0 || height == 0 {
            (width, height) = (camera.width, camera.height);
        }
        let fps = camera.fps_cap.max(1);

        let writer = ClipWriter::with_encoder(&config.clips, fps, width, height, parts.encoder)?;
        let clips = if config.clips.async_encode {
            ClipOutput::Queued(ClipQueue::start(Arc::new(writer), config.clips.encode_workers))
        } else {
            ClipOutput::Sync(writer)
        };

        let heatmap = HeatmapAccumulator::new(
            width,
            height,
            config.heatmap.decay_per_sec,
            config.heatmap.blur_ksize,
        );
        let shared = Arc::new(CameraShared::new(
            &camera.id,
            heatmap,
            config.overlay.preview_queue,
        ));

        Ok(Self {
            camera_id: camera.id.clone(),
            period: Duration::from_secs_f64(1.0 / fps as f64),
            post_seconds: config.clips.post_seconds,
            media_base_url: config.clips.media_base_url.trim_end_matches('/').to_string(),
            source: parts.source,
            detector: parts.detector,
            tracker: CentroidTracker::new(config.tracker.max_lost, config.tracker.dist_threshold),
            tamper: TamperDetector::new(config.tamper.clone()),
            features: FeatureBank::standard(zones.clone(), &config.features),
            ring: RingBuffer::new(config.clips.pre_seconds, fps),
            renderer: OverlayRenderer::new(zones, &config.overlay),
            clips,
            sink: parts.sink,
            shared,
            last_tick: None,
            ticks: 0,
        })
    }

    pub fn shared(&self) -> Arc<CameraShared> {
        self.shared.clone()
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// 主循环, 收到停止请求后在当前 tick 结束时退出
    pub fn run(mut self) {
        info!(
            camera = %self.camera_id,
            features = ?self.features.names(),
            "🎥 camera worker started"
        );
        while !self.shared.stop_requested() {
            self.tick();
        }

        self.shared.set_state(WorkerState::Stopping);
        self.shared.preview.close();
        self.source.release();
        if let ClipOutput::Queued(queue) = &mut self.clips {
            queue.shutdown();
        }
        self.shared.set_state(WorkerState::Stopped);
        info!(camera = %self.camera_id, ticks = self.ticks, "camera worker stopped");
    }

    /// 单次迭代. 采集失败返回 None.
    pub fn tick(&mut self) -> Option<TickReport> {
        let frame = match self.source.read() {
            Ok(f) => f,
            Err(e) => {
                debug!(camera = %self.camera_id, error = %e, "capture failed, backing off");
                std::thread::sleep(CAPTURE_BACKOFF);
                return None;
            }
        };
        self.pace();
        let ts = Utc::now();
        self.ticks += 1;

        self.ring.push(ts, frame.clone());
        let mut events = self.tamper.step_frame(&frame, ts, &self.camera_id);
        let mut report = TickReport::default();

        // 热力图按采集帧衰减, 与检测成败无关
        self.shared.lock_heatmap().step_decay();

        match self.detector.infer(&frame) {
            Ok(detections) => {
                let tracks = self.tracker.update(&detections);
                let persons: Vec<BBox> = tracks
                    .iter()
                    .filter(|t| t.is_person())
                    .map(|t| t.bbox)
                    .collect();
                self.shared.occupancy.store(persons.len(), Ordering::Relaxed);

                if !persons.is_empty() {
                    self.shared.lock_heatmap().add_boxes(&persons, HEAT_STRENGTH);
                }

                events.extend(self.features.step(&tracks, ts, &self.camera_id));
                self.publish_preview(&frame, &tracks);

                report.tracks = tracks.len();
                report.occupancy = persons.len();
            }
            Err(e) => {
                // 单帧失败不影响后续 tick; 已产生的防遮挡事件照常上报
                warn!(camera = %self.camera_id, error = %e, "⚠️ detector failed, skipping frame");
                report.detector_failed = true;
            }
        }

        report.events = events.len();
        if !events.is_empty() {
            self.emit(events);
        }

        if self.ticks % 300 == 0 {
            debug!(
                camera = %self.camera_id,
                ticks = self.ticks,
                occupancy = self.shared.occupancy(),
                tracks = self.tracker.track_count(),
                preview_backlog = self.shared.preview.len(),
                "worker stats"
            );
        }
        Some(report)
    }

    /// 帧率上限: 距上次 tick 不足一个周期则补足睡眠
    fn pace(&mut self) {
        if let Some(last) = self.last_tick {
            let dt = last.elapsed();
            if dt < self.period {
                std::thread::sleep(self.period - dt);
            }
        }
        self.last_tick = Some(Instant::now());
    }

    fn publish_preview(&self, frame: &Frame, tracks: &[Track]) {
        let annotated = Arc::new(self.renderer.render(frame, tracks));
        self.shared.preview.publish(annotated.clone());
        self.shared.last_frame.store(annotated);
    }

    /// 后录: 阻塞当前摄像头继续采集, 期间预览照常更新
    fn capture_post_roll(&mut self) -> Vec<TimedFrame> {
        let mut post = Vec::new();
        if self.post_seconds <= 0.0 {
            return post;
        }
        let deadline = Instant::now() + Duration::from_secs_f64(self.post_seconds);
        while Instant::now() < deadline && !self.shared.stop_requested() {
            match self.source.read() {
                Ok(frame) => {
                    self.shared.preview.publish(frame.clone());
                    post.push(TimedFrame::new(Utc::now(), frame));
                }
                Err(e) => {
                    debug!(camera = %self.camera_id, error = %e, "post-roll capture ended");
                    break;
                }
            }
        }
        post
    }

    fn emit(&mut self, events: Vec<Event>) {
        let pre = self.ring.dump();
        let post = self.capture_post_roll();

        for event in events {
            let event_type = event.event_type.as_str();
            match &self.clips {
                ClipOutput::Sync(writer) => {
                    let clip = match writer.write_sync(&self.camera_id, event_type, &pre, &post, None) {
                        Ok(name) => Some(clip_url(&self.media_base_url, &name)),
                        Err(e) => {
                            warn!(
                                camera = %self.camera_id,
                                event_type = event_type,
                                error = %e,
                                "⚠️ clip failed, event forwarded without clip"
                            );
                            None
                        }
                    };
                    publish(self.sink.as_ref(), event.with_clip(clip));
                }
                ClipOutput::Queued(queue) => {
                    let sink = self.sink.clone();
                    let base = self.media_base_url.clone();
                    let pending = event.clone();
                    let on_done: OnDone = Box::new(move |result| {
                        let clip = result.ok().map(|name| clip_url(&base, &name));
                        publish(sink.as_ref(), pending.with_clip(clip));
                    });
                    if let Err(e) = queue.enqueue(
                        &self.camera_id,
                        event_type,
                        pre.clone(),
                        post.clone(),
                        Some(on_done),
                    ) {
                        warn!(
                            camera = %self.camera_id,
                            event_type = event_type,
                            error = %e,
                            "⚠️ clip not queued, event forwarded without clip"
                        );
                        publish(self.sink.as_ref(), event.with_clip(None));
                    }
                }
            }
        }
    }
}

fn clip_url(base: &str, name: &str) -> String {
    format!("{}/{}", base, name)
}

fn publish(sink: &dyn EventSink, event: Event) {
    let event = event.normalized();
    info!(
        camera = %event.camera_id,
        event_type = %event.event_type,
        severity = ?event.severity,
        clip = event.artifacts.clip_mp4.as_deref().unwrap_or("-"),
        "📮 {}",
        event.explanation
    );
    sink.publish(&event);
}
