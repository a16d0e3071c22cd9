//! 检测器 (Detector)
//! 职责: 单帧 → 检测框列表. 模型本身在外部推理服务中运行.

use std::io::Cursor;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

use super::types::Detection;
use crate::config::DetectorConfig;
use crate::error::{Error, Result};

/// 检测器统一接口
pub trait Detector: Send {
    /// 对单帧推理, 返回像素坐标系下的检测框
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// 无模型检测器: 始终返回空结果 (仅运行防遮挡与热力图)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn infer(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// HTTP 推理服务检测器
///
/// POST JPEG 到推理端点, 响应为 `[{"xyxy":[x1,y1,x2,y2],"conf":0.9,"class_name":"person"}]`.
pub struct HttpDetector {
    agent: ureq::Agent,
    url: String,
    conf_threshold: f32,
    /// 小写类别白名单, None 表示全部保留
    classes: Option<Vec<String>>,
    jpeg_quality: u8,

    // 统计
    count: u64,
    last: Instant,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, config: &DetectorConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            agent,
            url: url.into(),
            conf_threshold: config.conf,
            classes: config
                .classes
                .as_ref()
                .map(|c| c.iter().map(|s| s.to_lowercase()).collect()),
            jpeg_quality: 80,
            count: 0,
            last: Instant::now(),
        }
    }

    fn keep(&self, det: &Detection) -> bool {
        if det.confidence < self.conf_threshold {
            return false;
        }
        match &self.classes {
            Some(classes) => classes.iter().any(|c| c == &det.class_name.to_lowercase()),
            None => true,
        }
    }
}

impl Detector for HttpDetector {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let start = Instant::now();

        let mut body = Vec::new();
        JpegEncoder::new_with_quality(Cursor::new(&mut body), self.jpeg_quality)
            .encode_image(frame)?;

        let text = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(&body)?
            .into_string()?;

        let raw: Vec<Detection> = serde_json::from_str(&text)
            .map_err(|e| Error::Detector(format!("bad detector response: {}", e)))?;
        let detections: Vec<Detection> = raw.into_iter().filter(|d| self.keep(d)).collect();

        self.count += 1;
        if self.last.elapsed() >= Duration::from_secs(10) {
            debug!(
                url = %self.url,
                frames = self.count,
                last_ms = start.elapsed().as_millis() as u64,
                detections = detections.len(),
                "detector stats"
            );
            self.count = 0;
            self.last = Instant::now();
        }

        Ok(detections)
    }
}

/// 根据配置构建检测器
pub fn build_detector(config: &DetectorConfig) -> Box<dyn Detector> {
    match &config.url {
        Some(url) => Box::new(HttpDetector::new(url.clone(), config)),
        None => {
            tracing::warn!("⚠️ 未配置检测服务 (detector.url), 仅运行防遮挡检测");
            Box::new(NullDetector)
        }
    }
}
