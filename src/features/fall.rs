//! 跌倒检测 (Fall)
//!
//! 人员框高宽比 h / max(1, w) 连续 N 帧低于阈值时触发一次; 比值回升立即清零.

use std::collections::HashMap;

use super::{live_ids, FeatureDetector};
use crate::detection::Track;
use crate::events::{round_to, Event, EventType, Metrics, Severity, Timestamp, TrackRef};

pub struct FallDetector {
    ratio_threshold: f32,
    persist_frames: u32,
    state: HashMap<u32, u32>,
}

impl FallDetector {
    pub fn new(ratio_threshold: f32, persist_frames: u32) -> Self {
        Self {
            ratio_threshold,
            persist_frames,
            state: HashMap::new(),
        }
    }
}

impl FeatureDetector for FallDetector {
    fn name(&self) -> &'static str {
        "fall"
    }

    fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let mut events = Vec::new();

        for t in tracks.iter().filter(|t| t.is_person()) {
            let ar = t.bbox.aspect_ratio();
            if ar >= self.ratio_threshold {
                self.state.remove(&t.id);
                continue;
            }

            let count = self.state.entry(t.id).or_insert(0);
            *count += 1;
            if *count == self.persist_frames {
                events.push(
                    Event::new(
                        ts,
                        camera_id,
                        EventType::Fall,
                        Severity::High,
                        Metrics::Fall {
                            aspect_ratio: round_to(ar as f64, 2),
                            frames: *count,
                        },
                        format!("Person #{} prone-like posture {} frames", t.id, count),
                    )
                    .with_tracks(vec![TrackRef::person(t.id)]),
                );
            }
        }

        let live = live_ids(tracks);
        self.state.retain(|id, _| live.contains(id));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_util::*;

    fn lying(id: u32) -> Track {
        track(id, "person", 200.0, 200.0, 120.0, 40.0)
    }

    fn standing(id: u32) -> Track {
        track(id, "person", 200.0, 200.0, 40.0, 120.0)
    }

    #[test]
    fn test_fires_on_tenth_frame_only() {
        let mut det = FallDetector::new(0.55, 10);
        let mut fired_at = Vec::new();
        for i in 0..25 {
            if !det.step(&[lying(2)], at(i as f64), "cam").is_empty() {
                fired_at.push(i);
            }
        }
        assert_eq!(fired_at, vec![9]);
    }

    #[test]
    fn test_recovery_resets_counter() {
        let mut det = FallDetector::new(0.55, 10);
        let mut total = 0;
        for i in 0..9 {
            total += det.step(&[lying(2)], at(i as f64), "cam").len();
        }
        total += det.step(&[standing(2)], at(9.0), "cam").len();
        for i in 10..19 {
            total += det.step(&[lying(2)], at(i as f64), "cam").len();
        }
        assert_eq!(total, 0);
        let events = det.step(&[lying(2)], at(19.0), "cam");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].metrics,
            Metrics::Fall {
                aspect_ratio: 0.33,
                frames: 10
            }
        );
    }

    #[test]
    fn test_narrow_box_uses_unit_width() {
        // 宽度 < 1 时按 1 计算
        let t = track(4, "person", 50.0, 50.0, 0.5, 0.4);
        assert!((t.bbox.aspect_ratio() - 0.4).abs() < 1e-5);
    }
}
