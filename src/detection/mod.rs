/// 检测系统 (Detection System)
///
/// - Detector: 目标检测 (外部推理服务)
/// - Tracker:  目标追踪 (质心贪心匹配)
pub mod detector;
pub mod tracker;
pub mod types;

pub use detector::{build_detector, Detector, HttpDetector, NullDetector};
pub use tracker::{id_to_color, CentroidTracker, Tracker};
pub use types::{BBox, Detection, Track, PERSON_CLASS};
