//! 配置 (Configuration)
//!
//! YAML 配置文件 + 命令行参数. 每个字段都有默认值, 缺省即使用下面的常量.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::zones::ZoneConfig;

/// 数字卫兵参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "数字卫兵 - 多路摄像头安防分析", long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// 片段输出目录 (覆盖配置文件)
    #[arg(long)]
    pub clips_dir: Option<PathBuf>,

    /// 事件接收端 API 地址 (覆盖配置文件)
    #[arg(long)]
    pub api_url: Option<String>,

    /// 片段访问 URL 前缀 (覆盖配置文件)
    #[arg(long)]
    pub media_base_url: Option<String>,

    /// 状态日志间隔(秒)
    #[arg(long, default_value_t = 10)]
    pub status_interval: u64,

    /// 退出时等待每路摄像头的最长时间(秒)
    #[arg(long, default_value_t = 2.0)]
    pub shutdown_timeout: f64,
}

// ========== 配置结构 ==========

/// 完整配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub tamper: TamperConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
    #[serde(default)]
    pub clips: ClipConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// 视频源: 设备索引 或 URL/文件路径
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Device(u32),
    Url(String),
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Device(i) => write!(f, "device:{}", i),
            SourceSpec::Url(u) => f.write_str(u),
        }
    }
}

/// 单路摄像头
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub source: SourceSpec,
    #[serde(default = "default_fps_cap")]
    pub fps_cap: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

/// 检测服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// 推理服务地址, None 时不做目标检测
    pub url: Option<String>,
    pub conf: f32,
    pub classes: Option<Vec<String>>,
    pub timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            conf: 0.35,
            classes: None,
            timeout_ms: 2000,
        }
    }
}

/// 跟踪器参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_lost: u32,
    pub dist_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_lost: 15,
            dist_threshold: 80.0,
        }
    }
}

/// 行为检测参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub intrusion_persist_frames: u32,
    pub abandoned_seconds: f64,
    pub owner_distance: f32,
    pub fall_ratio: f32,
    pub fall_persist_frames: u32,
    pub violence_distance: f32,
    pub violence_speed: f32,
    pub violence_persist_frames: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            intrusion_persist_frames: 8,
            abandoned_seconds: 8.0,
            owner_distance: 180.0,
            fall_ratio: 0.55,
            fall_persist_frames: 10,
            violence_distance: 140.0,
            violence_speed: 40.0,
            violence_persist_frames: 6,
        }
    }
}

/// 防遮挡/篡改检测参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TamperConfig {
    pub warmup_frames: u32,
    pub persist_frames: u32,
    pub cooldown_seconds: f64,
    pub blur_drop_ratio: f64,
    pub abs_blur_floor: f64,
    pub freeze_seconds: f64,
    pub hist_flat_thr: f64,
    pub ema_alpha: f64,
}

impl Default for TamperConfig {
    fn default() -> Self {
        Self {
            warmup_frames: 60,
            persist_frames: 15,
            cooldown_seconds: 10.0,
            blur_drop_ratio: 0.15,
            abs_blur_floor: 8.0,
            freeze_seconds: 60.0,
            hist_flat_thr: 0.990,
            ema_alpha: 0.05,
        }
    }
}

/// 热力图参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub decay_per_sec: f32,
    pub blur_ksize: u32,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            decay_per_sec: 0.15,
            blur_ksize: 35,
        }
    }
}

/// 事件片段参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    pub dir: PathBuf,
    pub pre_seconds: f64,
    pub post_seconds: f64,
    /// ffmpeg 可执行文件
    pub ffmpeg: String,
    pub min_bytes: u64,
    pub media_base_url: String,
    /// true: 编码交给后台队列, 事件在片段完成后再上报
    pub async_encode: bool,
    pub encode_workers: usize,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            dir: default_clips_dir(),
            pre_seconds: 7.0,
            post_seconds: 0.0,
            ffmpeg: "ffmpeg".into(),
            min_bytes: 1024,
            media_base_url: "http://localhost:8080/media".into(),
            async_encode: false,
            encode_workers: 1,
        }
    }
}

/// 预览叠加层
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub show_zones: bool,
    pub show_tracks: bool,
    /// TTF/OTF 字体, 未配置时不绘制文字标签
    pub font_path: Option<PathBuf>,
    pub preview_queue: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            show_zones: true,
            show_tracks: true,
            font_path: None,
            preview_queue: 5,
        }
    }
}

/// 事件接收端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/api".into(),
            timeout_ms: 2500,
        }
    }
}

fn default_fps_cap() -> u32 {
    15
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_clips_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sentinel").join("clips"))
        .unwrap_or_else(|| PathBuf::from("clips"))
}

// ========== 加载与校验 ==========

impl AppConfig {
    /// 读取并校验 YAML 配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(dir) = &args.clips_dir {
            self.clips.dir = dir.clone();
        }
        if let Some(url) = &args.api_url {
            self.api.url = url.clone();
        }
        if let Some(url) = &args.media_base_url {
            self.clips.media_base_url = url.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(Error::Config(
                "No cameras defined. Add a 'cameras:' list to the config".into(),
            ));
        }

        let mut seen = HashSet::new();
        for cam in &self.cameras {
            if cam.id.trim().is_empty() {
                return Err(Error::Config("camera id must not be empty".into()));
            }
            if !seen.insert(cam.id.as_str()) {
                return Err(Error::Config(format!("duplicate camera id '{}'", cam.id)));
            }
            if cam.fps_cap == 0 {
                return Err(Error::Config(format!("camera '{}': fps_cap must be >= 1", cam.id)));
            }
            if cam.width == 0 || cam.height == 0 {
                return Err(Error::Config(format!("camera '{}': empty resolution", cam.id)));
            }
        }

        for zone in &self.zones {
            if zone.polygon.len() < 3 {
                return Err(Error::Config(format!(
                    "zone '{}' needs at least 3 vertices",
                    zone.name
                )));
            }
        }
        Ok(())
    }
}
