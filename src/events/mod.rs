/// 安防事件 (Security events)
///
/// 检测器构造事件后不可变; 编排器附加片段链接后交给事件接收端.
pub mod sink;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::detection::Track;

pub use sink::{EventSink, HttpEventSink};

/// 时间戳 (UTC)
pub type Timestamp = DateTime<Utc>;

/// 事件类型 (固定枚举)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Intrusion,
    Loitering,
    AbandonedObject,
    Fall,
    ViolenceProxy,
    CameraTamper,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Intrusion => "intrusion",
            EventType::Loitering => "loitering",
            EventType::AbandonedObject => "abandoned_object",
            EventType::Fall => "fall",
            EventType::ViolenceProxy => "violence_proxy",
            EventType::CameraTamper => "camera_tamper",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Med,
    High,
}

/// 参与者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bag,
    Owner,
}

/// 事件涉及的轨迹
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRef {
    pub track_id: u32,
    pub klass: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl TrackRef {
    pub fn person(track_id: u32) -> Self {
        Self {
            track_id,
            klass: crate::detection::PERSON_CLASS.to_string(),
            role: None,
        }
    }

    pub fn of(track: &Track, role: Option<Role>) -> Self {
        Self {
            track_id: track.id,
            klass: track.class_name.clone(),
            role,
        }
    }
}

/// 各事件类型的诊断指标
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metrics {
    Intrusion {
        frames_persisted: u32,
    },
    Loitering {
        dwell_sec: f64,
    },
    Abandoned {
        persistence_sec: f64,
        owner_distance_px: Option<f64>,
    },
    Fall {
        aspect_ratio: f64,
        frames: u32,
    },
    Violence {
        pair_distance_px: f64,
        speed_sum: f64,
        frames: u32,
    },
    Blur {
        laplacian_var: f64,
        lap_baseline: f64,
        below_frames: u32,
        drop_ratio: f64,
    },
    Freeze {
        frozen_sec: f64,
    },
    Covered {
        hist_max_bin: f64,
    },
}

/// 证据链接
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Artifacts {
    pub clip_mp4: Option<String>,
}

/// 安防事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(serialize_with = "serialize_ts")]
    pub ts_utc: Timestamp,
    pub camera_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub zone: Option<String>,
    pub tracks: Vec<TrackRef>,
    pub metrics: Metrics,
    pub explanation: String,
    pub artifacts: Artifacts,
}

impl Event {
    pub fn new(
        ts_utc: Timestamp,
        camera_id: &str,
        event_type: EventType,
        severity: Severity,
        metrics: Metrics,
        explanation: String,
    ) -> Self {
        Self {
            ts_utc,
            camera_id: camera_id.to_string(),
            event_type,
            severity,
            zone: None,
            tracks: Vec::new(),
            metrics,
            explanation,
            artifacts: Artifacts::default(),
        }
    }

    pub fn in_zone(mut self, zone: &str) -> Self {
        self.zone = Some(zone.to_string());
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<TrackRef>) -> Self {
        self.tracks = tracks;
        self
    }

    /// 附加片段链接 (编排器在编码完成后调用)
    pub fn with_clip(mut self, url: Option<String>) -> Self {
        self.artifacts.clip_mp4 = url;
        self
    }

    /// 时间戳截断到毫秒
    pub fn normalized(mut self) -> Self {
        self.ts_utc = truncate_ms(self.ts_utc);
        self
    }
}

/// ISO-8601, 毫秒精度, `Z` 后缀
pub fn iso_utc(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_ts<S: Serializer>(ts: &Timestamp, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&iso_utc(ts))
}

fn truncate_ms(ts: Timestamp) -> Timestamp {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// 两个时间戳之间的秒数 (可为负)
pub fn seconds_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from)
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| (to - from).num_milliseconds() as f64 / 1e3)
}

/// 四舍五入到 n 位小数
pub fn round_to(v: f64, digits: i32) -> f64 {
    let p = 10f64.powi(digits);
    (v * p).round() / p
}
