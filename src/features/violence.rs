//! 冲突代理指标 (Violence proxy)
//!
//! 两人距离近且两人单帧位移之和大, 连续 N 帧后触发一次; 任一条件不满足即清零.
//! 上一帧质心缓存每帧整体替换.

use std::collections::HashMap;

use super::FeatureDetector;
use crate::detection::Track;
use crate::events::{round_to, Event, EventType, Metrics, Severity, Timestamp, TrackRef};
use crate::utils::Point;

pub struct ViolenceProxy {
    distance_threshold: f32,
    speed_threshold: f32,
    persist_frames: u32,
    prev_centers: HashMap<u32, Point>,
    /// (小id, 大id) -> 连续帧数
    state: HashMap<(u32, u32), u32>,
}

impl ViolenceProxy {
    pub fn new(distance_threshold: f32, speed_threshold: f32, persist_frames: u32) -> Self {
        Self {
            distance_threshold,
            speed_threshold,
            persist_frames,
            prev_centers: HashMap::new(),
            state: HashMap::new(),
        }
    }
}

impl FeatureDetector for ViolenceProxy {
    fn name(&self) -> &'static str {
        "violence_proxy"
    }

    fn step(&mut self, tracks: &[Track], ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let mut events = Vec::new();
        let persons: Vec<(u32, Point)> = tracks
            .iter()
            .filter(|t| t.is_person())
            .map(|t| (t.id, t.center()))
            .collect();

        let centers: HashMap<u32, Point> = persons.iter().copied().collect();
        let speeds: HashMap<u32, f32> = centers
            .iter()
            .map(|(id, c)| {
                let prev = self.prev_centers.get(id).unwrap_or(c);
                (*id, c.distance(prev))
            })
            .collect();

        for (i, &(a, ca)) in persons.iter().enumerate() {
            for &(b, cb) in &persons[i + 1..] {
                let d = ca.distance(&cb);
                let speed_sum = speeds.get(&a).copied().unwrap_or(0.0)
                    + speeds.get(&b).copied().unwrap_or(0.0);
                let key = (a.min(b), a.max(b));

                if d < self.distance_threshold && speed_sum > self.speed_threshold {
                    let count = self.state.entry(key).or_insert(0);
                    *count += 1;
                    if *count == self.persist_frames {
                        events.push(
                            Event::new(
                                ts,
                                camera_id,
                                EventType::ViolenceProxy,
                                Severity::Med,
                                Metrics::Violence {
                                    pair_distance_px: round_to(d as f64, 1),
                                    speed_sum: round_to(speed_sum as f64, 1),
                                    frames: *count,
                                },
                                format!("Close & high-motion interaction between #{} and #{}", a, b),
                            )
                            .with_tracks(vec![TrackRef::person(a), TrackRef::person(b)]),
                        );
                    }
                } else {
                    self.state.remove(&key);
                }
            }
        }

        self.state
            .retain(|(a, b), _| centers.contains_key(a) && centers.contains_key(b));
        self.prev_centers = centers;
        events
    }
}
