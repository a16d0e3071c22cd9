//! 徘徊检测 (Loitering)
//!
//! 人员在普通区域内停留时间越过阈值时触发一次.
//! 触发窗口为 [阈值, 阈值 + 1) 秒, 每次停留另有已触发标记, 帧率高于 1fps 时也只触发一次.
//! 离开区域即清除记录, 再次进入重新计时.

use std::collections::HashMap;
use std::sync::Arc;

use super::{live_ids, FeatureDetector};
use crate::detection::Track;
use crate::events::{round_to, seconds_between, Event, EventType, Metrics, Severity, Timestamp, TrackRef};
use crate::zones::Zones;

/// 触发窗口宽度(秒)
const FIRE_WINDOW_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Visit {
    first_seen: Timestamp,
    fired: bool,
}

pub struct LoiteringDetector {
    zones: Arc<Zones>,
    dwell: HashMap<(String, u32), Visit>,
}

impl LoiteringDetector {
    pub fn new(zones: Arc<Zones>) -> Self {
        Self {
            zones,
            dwell: HashMap::new(),
        }
    }
}

impl FeatureDetector for LoiteringDetector {
    fn name(&self) -> &'static str {
        "loitering"
    }

    fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let mut events = Vec::new();

        for t in tracks.iter().filter(|t| t.is_person()) {
            let center = t.center();
            for (zone, threshold) in self.zones.general() {
                let key = (zone.name.clone(), t.id);
                if !zone.contains(center) {
                    self.dwell.remove(&key);
                    continue;
                }

                let visit = self.dwell.entry(key).or_insert(Visit {
                    first_seen: ts,
                    fired: false,
                });
                let dwell_s = seconds_between(visit.first_seen, ts);
                if !visit.fired && dwell_s >= threshold && dwell_s - threshold < FIRE_WINDOW_SECS {
                    visit.fired = true;
                    events.push(
                        Event::new(
                            ts,
                            camera_id,
                            EventType::Loitering,
                            Severity::Med,
                            Metrics::Loitering {
                                dwell_sec: round_to(dwell_s, 2),
                            },
                            format!(
                                "Person #{} loitering {}s in {}",
                                t.id,
                                dwell_s.round(),
                                zone.name
                            ),
                        )
                        .in_zone(&zone.name)
                        .with_tracks(vec![TrackRef::person(t.id)]),
                    );
                }
            }
        }

        let live = live_ids(tracks);
        self.dwell.retain(|(_, id), _| live.contains(id));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_util::*;
    use crate::utils::Point;
    use crate::zones::{Zone, ZoneKind};

    fn lobby(loiter_seconds: f64) -> Arc<Zones> {
        Arc::new(Zones::new(vec![Zone {
            name: "lobby".into(),
            kind: ZoneKind::General { loiter_seconds },
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(300.0, 0.0),
                Point::new(300.0, 300.0),
                Point::new(0.0, 300.0),
            ],
        }]))
    }

    #[test]
    fn test_single_event_at_threshold() {
        let mut det = LoiteringDetector::new(lobby(5.0));
        let mut events = Vec::new();
        // 10 fps, 8 秒
        for i in 0..80 {
            events.extend(det.step(&[person(3, 150.0, 150.0)], at(i as f64 * 0.1), "cam"));
        }
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.event_type, EventType::Loitering);
        assert_eq!(ev.zone.as_deref(), Some("lobby"));
        match ev.metrics {
            Metrics::Loitering { dwell_sec } => assert!((5.0..6.0).contains(&dwell_sec)),
            ref m => panic!("unexpected metrics {:?}", m),
        }
    }

    #[test]
    fn test_reentry_restarts_clock() {
        let mut det = LoiteringDetector::new(lobby(5.0));
        let mut total = 0;
        // 两次各 4 秒的停留, 合计超过阈值也不触发
        for i in 0..40 {
            total += det.step(&[person(3, 150.0, 150.0)], at(i as f64 * 0.1), "cam").len();
        }
        total += det.step(&[person(3, 900.0, 150.0)], at(4.0), "cam").len();
        for i in 41..81 {
            total += det.step(&[person(3, 150.0, 150.0)], at(i as f64 * 0.1), "cam").len();
        }
        assert_eq!(total, 0);
    }

    #[test]
    fn test_sparse_frames_skip_window() {
        let mut det = LoiteringDetector::new(lobby(5.0));
        assert!(det.step(&[person(3, 150.0, 150.0)], at(0.0), "cam").is_empty());
        assert!(det.step(&[person(3, 150.0, 150.0)], at(4.5), "cam").is_empty());
        // 跳过了 [5, 6) 窗口
        assert!(det.step(&[person(3, 150.0, 150.0)], at(6.5), "cam").is_empty());
    }

    #[test]
    fn test_state_dropped_with_track() {
        let mut det = LoiteringDetector::new(lobby(5.0));
        det.step(&[person(3, 150.0, 150.0)], at(0.0), "cam");
        det.step(&[], at(1.0), "cam");
        assert!(det.dwell.is_empty());
    }
}
