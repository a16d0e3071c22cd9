//! 遗留物检测 (Abandoned object)
//!
//! 包类目标附近 (质心距离) 没有人员超过 T 秒时触发一次, 随后进入抑制期,
//! 直到物主回来或抑制期结束. 包轨迹消失时回收其状态.

use std::collections::{HashMap, HashSet};

use super::latch::{suppress_window, Latch};
use super::{is_bag, FeatureDetector};
use crate::detection::{Track, PERSON_CLASS};
use crate::events::{round_to, Event, EventType, Metrics, Role, Severity, Timestamp, TrackRef};

#[derive(Debug, Clone, Default)]
struct BagState {
    /// 最近一次靠近的人员
    owner: Option<u32>,
    alone: Latch,
}

pub struct AbandonedDetector {
    threshold_secs: f64,
    owner_distance: f32,
    state: HashMap<u32, BagState>,
}

impl AbandonedDetector {
    pub fn new(threshold_secs: f64, owner_distance: f32) -> Self {
        Self {
            threshold_secs,
            owner_distance,
            state: HashMap::new(),
        }
    }
}

impl FeatureDetector for AbandonedDetector {
    fn name(&self) -> &'static str {
        "abandoned_object"
    }

    fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let mut events = Vec::new();
        let persons: Vec<&Track> = tracks.iter().filter(|t| t.is_person()).collect();

        for bag in tracks.iter().filter(|t| is_bag(&t.class_name)) {
            let bc = bag.center();
            // 最近的人员 (先出现者优先)
            let nearest = persons.iter().fold(None::<(&Track, f32)>, |best, p| {
                let d = p.center().distance(&bc);
                match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((*p, d)),
                }
            });

            let st = self.state.entry(bag.id).or_default();
            match nearest {
                Some((p, d)) if d < self.owner_distance => {
                    st.owner = Some(p.id);
                    st.alone.restart(ts);
                }
                _ => {
                    let Some(alone_secs) = st.alone.arm(ts) else {
                        continue;
                    };
                    if alone_secs >= self.threshold_secs {
                        let mut refs = vec![TrackRef::of(bag, Some(Role::Bag))];
                        if let Some(owner) = st.owner {
                            refs.push(TrackRef {
                                track_id: owner,
                                klass: PERSON_CLASS.to_string(),
                                role: Some(Role::Owner),
                            });
                        }
                        events.push(
                            Event::new(
                                ts,
                                camera_id,
                                EventType::AbandonedObject,
                                Severity::High,
                                Metrics::Abandoned {
                                    persistence_sec: round_to(alone_secs, 2),
                                    owner_distance_px: nearest.map(|(_, d)| d as f64),
                                },
                                format!("Bag #{} alone for {}s", bag.id, alone_secs.round()),
                            )
                            .with_tracks(refs),
                        );
                        st.alone.suppress(ts, suppress_window());
                    }
                }
            }
        }

        let bags: HashSet<u32> = tracks
            .iter()
            .filter(|t| is_bag(&t.class_name))
            .map(|t| t.id)
            .collect();
        self.state.retain(|id, _| bags.contains(id));
        events
    }
}
