/// 行为检测 (Feature detectors)
///
/// 每帧以完整轨迹列表调用一次 `step`, 各检测器自持状态, 互不共享.
/// 篡改检测直接处理画面, 不依赖轨迹.
pub mod abandoned;
pub mod fall;
pub mod intrusion;
pub mod latch;
pub mod loitering;
pub mod tamper;
pub mod violence;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::FeatureConfig;
use crate::detection::Track;
use crate::events::{Event, Timestamp};
use crate::zones::Zones;

pub use abandoned::AbandonedDetector;
pub use fall::FallDetector;
pub use intrusion::IntrusionDetector;
pub use latch::Latch;
pub use loitering::LoiteringDetector;
pub use tamper::TamperDetector;
pub use violence::ViolenceProxy;

/// 被视为"包"的类别
pub static BAG_CLASSES: phf::Set<&'static str> = phf::phf_set! {
    "backpack",
    "handbag",
    "suitcase",
};

pub fn is_bag(class_name: &str) -> bool {
    BAG_CLASSES.contains(class_name)
}

/// 行为检测器统一接口
pub trait FeatureDetector: Send {
    fn name(&self) -> &'static str;

    fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event>;
}

/// 当前帧出现的轨迹 id (用于回收已删除轨迹的状态)
pub(crate) fn live_ids(tracks: &[Track]) -> HashSet<u32> {
    tracks.iter().map(|t| t.id).collect()
}

/// 一路摄像头的全部行为检测器
pub struct FeatureBank {
    detectors: Vec<Box<dyn FeatureDetector>>,
}

impl FeatureBank {
    pub fn new(detectors: Vec<Box<dyn FeatureDetector>>) -> Self {
        Self { detectors }
    }

    /// 标准组合: 入侵 / 徘徊 / 遗留物 / 跌倒 / 冲突
    pub fn standard(zones: Arc<Zones>, cfg: &FeatureConfig) -> Self {
        Self::new(vec![
            Box::new(IntrusionDetector::new(zones.clone(), cfg.intrusion_persist_frames)),
            Box::new(LoiteringDetector::new(zones)),
            Box::new(AbandonedDetector::new(cfg.abandoned_seconds, cfg.owner_distance)),
            Box::new(FallDetector::new(cfg.fall_ratio, cfg.fall_persist_frames)),
            Box::new(ViolenceProxy::new(
                cfg.violence_distance,
                cfg.violence_speed,
                cfg.violence_persist_frames,
            )),
        ])
    }

    pub fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let mut events = Vec::new();
        for detector in self.detectors.iter_mut() {
            events.extend(detector.step(tracks, ts, camera_id));
        }
        events
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_bag_classes() {
        assert!(is_bag("backpack"));
        assert!(is_bag("suitcase"));
        assert!(!is_bag("person"));
    }

    #[test]
    fn test_standard_bank() {
        let bank = FeatureBank::standard(Arc::new(Zones::default()), &FeatureConfig::default());
        assert_eq!(
            bank.names(),
            vec!["intrusion", "loitering", "abandoned_object", "fall", "violence_proxy"]
        );
    }

    #[test]
    fn test_bank_collects_from_all() {
        let mut bank = FeatureBank::standard(Arc::new(Zones::default()), &FeatureConfig::default());
        // 躺倒的人 (宽 > 高)
        let lying = track(1, "person", 100.0, 100.0, 120.0, 40.0);
        let mut fired = 0;
        for i in 0..12 {
            fired += bank.step(&[lying.clone()], at(i as f64 * 0.1), "cam").len();
        }
        assert_eq!(fired, 1);
    }
}
