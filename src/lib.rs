#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 配置文件与命令行参数
pub mod detection; // 检测框, 质心跟踪, 检测服务
pub mod error; // 错误类型
pub mod events; // 安防事件与上报
pub mod features; // 行为检测与防遮挡
pub mod heatmap; // 人员热力图
pub mod input; // 采集源与预录缓冲
pub mod pipeline; // 每路摄像头工作线程与注册表
pub mod recorder; // 事件片段编码
pub mod renderer; // 预览叠加层
pub mod utils; // 几何与缩放工具
pub mod zones; // 区域定义

pub use crate::config::{AppConfig, Args};
pub use crate::error::{Error, Result};
pub use crate::events::{Event, EventSink, EventType, Severity};
pub use crate::pipeline::{CameraRegistry, WorkerState};
