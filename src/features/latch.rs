//! 触发-抑制状态机 (Fire-then-suppress latch)
//!
//! Idle ──arm──▶ Active(since) ──suppress──▶ Suppressed(until)
//!                   ▲                              │
//!                   └──────── arm (now ≥ until) ───┘

use chrono::Duration;

use crate::events::{seconds_between, Timestamp};

/// 触发后的抑制窗口
pub const SUPPRESS_WINDOW_SECS: i64 = 9999;

pub fn suppress_window() -> Duration {
    Duration::seconds(SUPPRESS_WINDOW_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latch {
    #[default]
    Idle,
    /// 条件自 `since` 起持续成立
    Active { since: Timestamp },
    /// 已触发, `until` 之前不再计时
    Suppressed { until: Timestamp },
}

impl Latch {
    /// 条件成立: 进入或保持计时, 返回已持续秒数.
    ///
    /// 抑制期内返回 None; 抑制期结束后从 `until` 重新计时.
    pub fn arm(&mut self, now: Timestamp) -> Option<f64> {
        match *self {
            Latch::Idle => *self = Latch::Active { since: now },
            Latch::Suppressed { until } if now >= until => *self = Latch::Active { since: until },
            Latch::Suppressed { .. } | Latch::Active { .. } => {}
        }
        self.elapsed(now)
    }

    /// 从 `now` 重新计时 (例如物主回到包旁)
    pub fn restart(&mut self, now: Timestamp) {
        *self = Latch::Active { since: now };
    }

    /// 触发后进入抑制期
    pub fn suppress(&mut self, now: Timestamp, window: Duration) {
        *self = Latch::Suppressed { until: now + window };
    }

    /// 条件消失
    pub fn reset(&mut self) {
        *self = Latch::Idle;
    }

    pub fn elapsed(&self, now: Timestamp) -> Option<f64> {
        match self {
            Latch::Active { since } => Some(seconds_between(*since, now)),
            _ => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Latch::Suppressed { .. })
    }
}
