//! 入侵检测 (Intrusion)
//!
//! 人员质心在禁区内连续 N 帧, 恰好在第 N 帧触发一次; 离开禁区立即清零.

use std::collections::HashMap;
use std::sync::Arc;

use super::{live_ids, FeatureDetector};
use crate::detection::Track;
use crate::events::{Event, EventType, Metrics, Severity, Timestamp, TrackRef};
use crate::zones::{Zone, Zones};

pub struct IntrusionDetector {
    zones: Arc<Zones>,
    persist_frames: u32,
    /// (区域名, 轨迹id) -> 区域内帧数
    state: HashMap<(String, u32), u32>,
}

impl IntrusionDetector {
    pub fn new(zones: Arc<Zones>, persist_frames: u32) -> Self {
        Self {
            zones,
            persist_frames,
            state: HashMap::new(),
        }
    }
}

impl FeatureDetector for IntrusionDetector {
    fn name(&self) -> &'static str {
        "intrusion"
    }

    fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let mut events = Vec::new();

        for t in tracks.iter().filter(|t| t.is_person()) {
            let inside: Vec<&Zone> = self
                .zones
                .containing(t.center())
                .into_iter()
                .filter(|z| z.is_restricted())
                .collect();
            // 离开的禁区立即清零
            self.state
                .retain(|(zone, id), _| *id != t.id || inside.iter().any(|z| &z.name == zone));

            for zone in inside {
                let count = self.state.entry((zone.name.clone(), t.id)).or_insert(0);
                *count += 1;
                if *count == self.persist_frames {
                    events.push(
                        Event::new(
                            ts,
                            camera_id,
                            EventType::Intrusion,
                            Severity::High,
                            Metrics::Intrusion {
                                frames_persisted: *count,
                            },
                            format!(
                                "Person #{} persisted {} frames in restricted zone {}",
                                t.id, count, zone.name
                            ),
                        )
                        .in_zone(&zone.name)
                        .with_tracks(vec![TrackRef::person(t.id)]),
                    );
                }
            }
        }

        let live = live_ids(tracks);
        self.state.retain(|(_, id), _| live.contains(id));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_util::*;
    use crate::utils::Point;
    use crate::zones::ZoneKind;

    fn vault() -> Arc<Zones> {
        Arc::new(Zones::new(vec![Zone {
            name: "vault".into(),
            kind: ZoneKind::Restricted,
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(200.0, 0.0),
                Point::new(200.0, 200.0),
                Point::new(0.0, 200.0),
            ],
        }]))
    }

    #[test]
    fn test_fires_exactly_once_at_threshold() {
        let mut det = IntrusionDetector::new(vault(), 8);
        let mut fired = Vec::new();
        for i in 0..20 {
            let events = det.step(&[person(1, 100.0, 100.0)], at(i as f64 * 0.1), "cam");
            if !events.is_empty() {
                fired.push((i, events));
            }
        }
        assert_eq!(fired.len(), 1);
        let (frame, events) = &fired[0];
        assert_eq!(*frame, 7);
        assert_eq!(events[0].zone.as_deref(), Some("vault"));
        assert_eq!(events[0].severity, Severity::High);
        assert_eq!(events[0].metrics, Metrics::Intrusion { frames_persisted: 8 });
    }

    #[test]
    fn test_exit_clears_counter() {
        let mut det = IntrusionDetector::new(vault(), 8);
        let mut total = 0;
        for i in 0..7 {
            total += det.step(&[person(1, 100.0, 100.0)], at(i as f64), "cam").len();
        }
        total += det.step(&[person(1, 500.0, 100.0)], at(7.0), "cam").len();
        for i in 8..15 {
            total += det.step(&[person(1, 100.0, 100.0)], at(i as f64), "cam").len();
        }
        assert_eq!(total, 0);
    }

    #[test]
    fn test_ignores_non_person() {
        let mut det = IntrusionDetector::new(vault(), 2);
        let bag = track(5, "backpack", 100.0, 100.0, 20.0, 20.0);
        for i in 0..5 {
            assert!(det.step(&[bag.clone()], at(i as f64), "cam").is_empty());
        }
    }

    #[test]
    fn test_overlapping_zones_counted_separately() {
        let square = |x: f32| {
            vec![
                Point::new(x, 0.0),
                Point::new(x + 100.0, 0.0),
                Point::new(x + 100.0, 100.0),
                Point::new(x, 100.0),
            ]
        };
        let zones = Arc::new(Zones::new(vec![
            Zone {
                name: "vault".into(),
                kind: ZoneKind::Restricted,
                polygon: square(0.0),
            },
            Zone {
                name: "lobby".into(),
                kind: ZoneKind::General { loiter_seconds: 5.0 },
                polygon: square(0.0),
            },
            Zone {
                name: "server-room".into(),
                kind: ZoneKind::Restricted,
                polygon: square(50.0),
            },
        ]));
        let mut det = IntrusionDetector::new(zones, 3);

        // 质心 (75, 50) 同时位于两个禁区
        let mut events = Vec::new();
        for i in 0..3 {
            events.extend(det.step(&[person(1, 75.0, 50.0)], at(i as f64), "cam"));
        }
        let mut names: Vec<_> = events.iter().filter_map(|e| e.zone.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["server-room".to_string(), "vault".to_string()]);

        // 移到只属于 server-room 的位置: vault 计数清零
        det.step(&[person(1, 125.0, 50.0)], at(3.0), "cam");
        let mut again = Vec::new();
        for i in 4..7 {
            again.extend(det.step(&[person(1, 75.0, 50.0)], at(i as f64), "cam"));
        }
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].zone.as_deref(), Some("vault"));
    }
}
