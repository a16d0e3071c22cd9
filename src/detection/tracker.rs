//! 多目标跟踪 (Multi-object tracking)
//! Greedy nearest-centroid association

use super::types::{Detection, Track};

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的检测框
    ///
    /// # 返回
    /// 当前所有存活的跟踪对象快照 (按创建顺序)
    fn update(&mut self, detections: &[Detection]) -> Vec<Track>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 质心跟踪器 ==========

/// 质心跟踪器
///
/// 按创建顺序遍历现有轨迹, 每条轨迹贪心认领距离最近且未被占用的检测,
/// 距离不超过 `dist_threshold` 才算匹配. 非最优分配, 顺序决定结果.
pub struct CentroidTracker {
    /// 当前轨迹 (Vec 保持创建顺序)
    tracks: Vec<Track>,

    /// 下一个分配的ID
    next_id: u32,

    /// 最大允许丢失帧数
    max_lost: u32,

    /// 匹配距离阈值 (像素)
    dist_threshold: f32,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(15, 80.0)
    }
}

impl CentroidTracker {
    pub fn new(max_lost: u32, dist_threshold: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost,
            dist_threshold,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        let det_centers: Vec<_> = detections.iter().map(|d| d.bbox.center()).collect();
        let mut det_used = vec![false; detections.len()];
        let mut track_matched = vec![false; self.tracks.len()];

        // 1. 贪心匹配
        for (ti, track) in self.tracks.iter_mut().enumerate() {
            let tc = track.center();
            let mut best: Option<(usize, f32)> = None;
            for (j, dc) in det_centers.iter().enumerate() {
                if det_used[j] {
                    continue;
                }
                let d = tc.distance(dc);
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((j, d));
                }
            }

            if let Some((j, d)) = best {
                if d <= self.dist_threshold {
                    det_used[j] = true;
                    track_matched[ti] = true;
                    let det = &detections[j];
                    track.bbox = det.bbox;
                    track.class_name.clone_from(&det.class_name);
                    track.confidence = det.confidence;
                    track.lost = 0;
                }
            }
        }

        // 2. 未匹配轨迹: 丢失计数 +1, 超过阈值删除
        let max_lost = self.max_lost;
        let mut idx = 0;
        self.tracks.retain_mut(|track| {
            let matched = track_matched[idx];
            idx += 1;
            if !matched {
                track.lost += 1;
            }
            track.lost <= max_lost
        });

        // 3. 未匹配检测: 新建轨迹
        for (j, det) in detections.iter().enumerate() {
            if det_used[j] {
                continue;
            }
            self.tracks.push(Track {
                id: self.next_id,
                bbox: det.bbox,
                class_name: det.class_name.clone(),
                confidence: det.confidence,
                lost: 0,
            });
            self.next_id += 1;
        }

        self.tracks.clone()
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

// ========== 工具函数 ==========

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
