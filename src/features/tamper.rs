//! 摄像头篡改检测 (Camera tamper)
//!
//! 三路独立信号, 共享同一个冷却时间:
//! - 失焦: 拉普拉斯方差相对 EMA 基线骤降或低于绝对下限, 连续 N 帧
//! - 冻结: 灰度均值(取整)保持不变超过阈值秒数
//! - 遮挡: 16 档直方图被单一档位占据

use image::{GrayImage, RgbImage};
use imageproc::filter::laplacian_filter;
use imageproc::stats::histogram;
use tracing::debug;

use super::latch::{suppress_window, Latch};
use crate::config::TamperConfig;
use crate::events::{round_to, seconds_between, Event, EventType, Metrics, Severity, Timestamp};

/// 直方图档数
const HIST_BINS: usize = 16;

/// 基线下限, 防止除零
const BASELINE_FLOOR: f64 = 1e-3;

pub struct TamperDetector {
    cfg: TamperConfig,
    frame_count: u64,
    lap_baseline: Option<f64>,
    below_count: u32,
    last_alert: Option<Timestamp>,
    last_mean: Option<u8>,
    frozen: Latch,
}

impl TamperDetector {
    pub fn new(cfg: TamperConfig) -> Self {
        Self {
            cfg,
            frame_count: 0,
            lap_baseline: None,
            below_count: 0,
            last_alert: None,
            last_mean: None,
            frozen: Latch::Idle,
        }
    }

    fn cooldown_ok(&self, ts: Timestamp) -> bool {
        match self.last_alert {
            Some(last) => seconds_between(last, ts) >= self.cfg.cooldown_seconds,
            None => true,
        }
    }

    pub fn step_frame(&mut self, frame: &RgbImage, ts: Timestamp, camera_id: &str) -> Vec<Event> {
        let gray = image::imageops::grayscale(frame);
        let mut events = Vec::new();

        // ========== 失焦 ==========
        let lap_var = laplacian_variance(&gray);
        self.frame_count += 1;
        let baseline = match self.lap_baseline {
            None => lap_var,
            Some(b) => self.cfg.ema_alpha * lap_var + (1.0 - self.cfg.ema_alpha) * b,
        };
        self.lap_baseline = Some(baseline);

        if self.frame_count > self.cfg.warmup_frames as u64 {
            let base = baseline.max(BASELINE_FLOOR);
            let drop_cond = lap_var < self.cfg.blur_drop_ratio * base;
            let abs_cond = lap_var < self.cfg.abs_blur_floor;
            if drop_cond || abs_cond {
                self.below_count += 1;
            } else {
                self.below_count = 0;
            }

            if self.below_count >= self.cfg.persist_frames && self.cooldown_ok(ts) {
                let ratio = lap_var / base;
                events.push(tamper_event(
                    ts,
                    camera_id,
                    Metrics::Blur {
                        laplacian_var: round_to(lap_var, 2),
                        lap_baseline: round_to(baseline, 2),
                        below_frames: self.below_count,
                        drop_ratio: round_to(ratio, 3),
                    },
                    format!(
                        "Sharpness drop: var={:.1} (baseline {:.1}, ratio {:.2}); persist {} frames",
                        lap_var, baseline, ratio, self.below_count
                    ),
                ));
                self.below_count = 0;
                self.last_alert = Some(ts);
            }
        }

        // ========== 冻结 ==========
        let mean = mean_bucket(&gray);
        if self.last_mean == Some(mean) {
            if let Some(frozen_secs) = self.frozen.arm(ts) {
                if frozen_secs >= self.cfg.freeze_seconds {
                    if self.cooldown_ok(ts) {
                        events.push(tamper_event(
                            ts,
                            camera_id,
                            Metrics::Freeze {
                                frozen_sec: round_to(frozen_secs, 2),
                            },
                            format!("Frozen frame for {:.1}s", frozen_secs),
                        ));
                        self.last_alert = Some(ts);
                    }
                    // 冷却期内同样进入抑制, 避免解冻前反复检查
                    self.frozen.suppress(ts, suppress_window());
                }
            }
        } else {
            self.frozen.reset();
        }
        self.last_mean = Some(mean);

        // ========== 遮挡 ==========
        let max_bin = histogram_max_share(&gray);
        if max_bin >= self.cfg.hist_flat_thr && self.cooldown_ok(ts) {
            events.push(tamper_event(
                ts,
                camera_id,
                Metrics::Covered {
                    hist_max_bin: max_bin,
                },
                format!("Histogram dominance (covered/near-dark); max bin={:.3}", max_bin),
            ));
            self.last_alert = Some(ts);
        }

        if self.frame_count % 60 == 0 {
            debug!(
                camera = camera_id,
                lap_var = lap_var,
                baseline = baseline,
                mean = mean,
                max_bin = max_bin,
                "tamper signals"
            );
        }
        events
    }
}

fn tamper_event(ts: Timestamp, camera_id: &str, metrics: Metrics, explanation: String) -> Event {
    Event::new(
        ts,
        camera_id,
        EventType::CameraTamper,
        Severity::High,
        metrics,
        explanation,
    )
}

/// 清晰度: 拉普拉斯响应的方差
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let lap = laplacian_filter(gray);
    let n = (lap.width() as f64) * (lap.height() as f64);
    if n == 0.0 {
        return 0.0;
    }
    let (sum, sum_sq) = lap.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = p.0[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// 灰度均值, 向下取整
pub fn mean_bucket(gray: &GrayImage) -> u8 {
    let n = gray.as_raw().len();
    if n == 0 {
        return 0;
    }
    let sum: u64 = gray.as_raw().iter().map(|&v| v as u64).sum();
    (sum / n as u64) as u8
}

/// 16 档归一化直方图中最大档的占比
pub fn histogram_max_share(gray: &GrayImage) -> f64 {
    let hist = histogram(gray);
    let mut bins = [0u64; HIST_BINS];
    for (value, &count) in hist.channels[0].iter().enumerate() {
        bins[value * HIST_BINS / 256] += count as u64;
    }
    let total: u64 = bins.iter().sum();
    let max = bins.iter().copied().max().unwrap_or(0);
    max as f64 / (total as f64 + 1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_util::at;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const W: u32 = 64;
    const H: u32 = 64;

    /// 随机噪声: 高清晰度, 直方图平坦
    fn sharp(rng: &mut StdRng) -> RgbImage {
        RgbImage::from_fn(W, H, |_, _| {
            let v: u8 = rng.gen();
            Rgb([v, v, v])
        })
    }

    /// 水平渐变: 拉普拉斯近似为零, 直方图仍然分散
    fn blurred() -> RgbImage {
        RgbImage::from_fn(W, H, |x, _| {
            let v = (x * 4) as u8;
            Rgb([v, v, v])
        })
    }

    /// 同样的渐变整体提亮, 平均亮度不同
    fn brighter() -> RgbImage {
        RgbImage::from_fn(W, H, |x, _| {
            let v = (x * 4 + 2) as u8;
            Rgb([v, v, v])
        })
    }

    fn flat(v: u8) -> RgbImage {
        RgbImage::from_pixel(W, H, Rgb([v, v, v]))
    }

    fn blur_metrics(events: &[Event]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e.metrics, Metrics::Blur { .. }))
            .count()
    }

    #[test]
    fn test_signal_helpers() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = image::imageops::grayscale(&sharp(&mut rng));
        let ramp = image::imageops::grayscale(&blurred());
        assert!(laplacian_variance(&noise) > 1000.0);
        assert!(laplacian_variance(&ramp) < 8.0);
        assert!(histogram_max_share(&ramp) < 0.1);
        assert!(histogram_max_share(&image::imageops::grayscale(&flat(0))) > 0.99);
        assert_eq!(mean_bucket(&image::imageops::grayscale(&flat(42))), 42);
    }

    #[test]
    fn test_blur_episode_fires_once_then_cooldown() {
        let cfg = TamperConfig::default();
        let mut det = TamperDetector::new(cfg.clone());
        let mut rng = StdRng::seed_from_u64(1);
        let mut frame_no = 0u32;
        let mut next_ts = || {
            frame_no += 1;
            at(frame_no as f64 * 0.1)
        };

        let mut events = Vec::new();
        for _ in 0..=cfg.warmup_frames {
            events.extend(det.step_frame(&sharp(&mut rng), next_ts(), "cam"));
        }
        assert!(events.is_empty());

        for _ in 0..cfg.persist_frames {
            events.extend(det.step_frame(&blurred(), next_ts(), "cam"));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::CameraTamper);
        assert_eq!(blur_metrics(&events), 1);

        // 冷却期内第二次失焦
        let mut second = Vec::new();
        for _ in 0..5 {
            second.extend(det.step_frame(&sharp(&mut rng), next_ts(), "cam"));
        }
        for _ in 0..cfg.persist_frames {
            second.extend(det.step_frame(&blurred(), next_ts(), "cam"));
        }
        assert!(second.is_empty());
    }

    #[test]
    fn test_no_blur_alert_during_warmup() {
        let cfg = TamperConfig::default();
        let mut det = TamperDetector::new(cfg.clone());
        let mut total = 0;
        for i in 0..cfg.warmup_frames {
            total += det.step_frame(&blurred(), at(i as f64 * 0.1), "cam").len();
        }
        assert_eq!(total, 0);
    }

    #[test]
    fn test_covered_lens_and_shared_cooldown() {
        let cfg = TamperConfig {
            cooldown_seconds: 10.0,
            ..TamperConfig::default()
        };
        let mut det = TamperDetector::new(cfg);
        let first = det.step_frame(&flat(0), at(0.0), "cam");
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0].metrics, Metrics::Covered { .. }));

        // 冷却期内任何信号都不触发
        for i in 1..50 {
            assert!(det.step_frame(&flat(0), at(i as f64 * 0.1), "cam").is_empty());
        }
        // 冷却结束后再次触发
        assert_eq!(det.step_frame(&flat(0), at(10.0), "cam").len(), 1);
    }

    #[test]
    fn test_freeze_fires_once_per_episode() {
        let cfg = TamperConfig {
            freeze_seconds: 5.0,
            cooldown_seconds: 1.0,
            ..TamperConfig::default()
        };
        let mut det = TamperDetector::new(cfg);
        let frozen = blurred();
        let mut freeze_events = 0;
        for i in 0..200 {
            let events = det.step_frame(&frozen, at(i as f64 * 0.1), "cam");
            freeze_events += events
                .iter()
                .filter(|e| matches!(e.metrics, Metrics::Freeze { .. }))
                .count();
        }
        assert_eq!(freeze_events, 1);
    }

    #[test]
    fn test_intensity_change_resets_freeze() {
        let cfg = TamperConfig {
            freeze_seconds: 5.0,
            cooldown_seconds: 1.0,
            // 只看冻结信号
            blur_drop_ratio: 0.0,
            abs_blur_floor: 0.0,
            ..TamperConfig::default()
        };
        let mut det = TamperDetector::new(cfg);
        let freezes = |events: Vec<Event>| {
            events
                .iter()
                .filter(|e| matches!(e.metrics, Metrics::Freeze { .. }))
                .count()
        };

        // 静止 4s, 亮度变化, 再静止 4s: 两段都不足 5s
        let mut count = 0;
        for i in 0..40 {
            count += freezes(det.step_frame(&blurred(), at(i as f64 * 0.1), "cam"));
        }
        for i in 40..80 {
            count += freezes(det.step_frame(&brighter(), at(i as f64 * 0.1), "cam"));
        }
        assert_eq!(count, 0);

        // 第二段持续到 5s 以上才触发
        for i in 80..100 {
            count += freezes(det.step_frame(&brighter(), at(i as f64 * 0.1), "cam"));
        }
        assert_eq!(count, 1);
    }
}
