/// 占用热力图 (Occupancy heatmap)
///
/// 与画面同尺寸的浮点网格. 人员框覆盖的区域累加, 随真实时间衰减.
/// 渲染: 高斯模糊 → 百分位归一化 → gamma → 调色板 → (可选) 叠加到灰度底图.
pub mod palette;

use std::time::{Duration, Instant};

use image::{imageops, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use ndarray::{s, Array2};

use crate::detection::BBox;
use crate::utils::resize_rgb;

pub use palette::Palette;

/// 低于该值的残留清零
const RESIDUE: f32 = 1e-7;

/// 叠加遮罩: 强度阈值 (0..255)
const MASK_THRESHOLD: u8 = 8;
/// 叠加遮罩: 羽化核大小
const MASK_BLUR_KSIZE: u32 = 21;
/// 底图亮度
const BASE_DIM: f32 = 0.8;
const GRID_COLOR: Rgb<u8> = Rgb([50, 50, 50]);

/// 渲染模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// 叠加到最近一帧
    #[default]
    Overlay,
    /// 只输出彩色热力图
    Raw,
}

impl RenderMode {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("raw") {
            RenderMode::Raw
        } else {
            RenderMode::Overlay
        }
    }
}

/// 渲染参数
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub palette: Palette,
    /// 叠加不透明度
    pub alpha: f32,
    pub mode: RenderMode,
    /// 归一化百分位 (0..100)
    pub clip_percentile: f32,
    pub gamma: f32,
    pub draw_grid: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            palette: Palette::Turbo,
            alpha: 0.6,
            mode: RenderMode::Overlay,
            clip_percentile: 90.0,
            gamma: 0.5,
            draw_grid: false,
        }
    }
}

/// 热力图累加器
#[derive(Debug, Clone)]
pub struct HeatmapAccumulator {
    width: u32,
    height: u32,
    decay_per_sec: f32,
    blur_ksize: u32,
    /// (行, 列) = (y, x)
    grid: Array2<f32>,
    last_decay: Instant,
}

impl HeatmapAccumulator {
    pub fn new(width: u32, height: u32, decay_per_sec: f32, blur_ksize: u32) -> Self {
        // 高斯核必须为奇数
        let blur_ksize = if blur_ksize % 2 == 1 { blur_ksize } else { blur_ksize + 1 };
        Self {
            width,
            height,
            decay_per_sec,
            blur_ksize,
            grid: Array2::zeros((height as usize, width as usize)),
            last_decay: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn grid(&self) -> &Array2<f32> {
        &self.grid
    }

    pub fn last_decay(&self) -> Instant {
        self.last_decay
    }

    /// 按距上次调用的真实时间衰减
    pub fn step_decay(&mut self) {
        self.step_decay_at(Instant::now());
    }

    pub fn step_decay_at(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_decay);
        self.last_decay = now;
        self.decay_by(dt);
    }

    fn decay_by(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        if dt <= 0.0 {
            return;
        }
        let factor = (1.0 - self.decay_per_sec * dt).max(0.0);
        self.grid.mapv_inplace(|v| {
            let v = v * factor;
            if v < RESIDUE {
                0.0
            } else {
                v
            }
        });
    }

    /// 框内每个格子加 `strength`; 坐标截断到画面内, 重叠框叠加
    pub fn add_boxes(&mut self, boxes: &[BBox], strength: f32) {
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        for b in boxes {
            let x1 = (b.x1 as i64).clamp(0, max_x.max(0)) as usize;
            let y1 = (b.y1 as i64).clamp(0, max_y.max(0)) as usize;
            let x2 = (b.x2 as i64).clamp(0, max_x.max(0)) as usize;
            let y2 = (b.y2 as i64).clamp(0, max_y.max(0)) as usize;
            if x2 <= x1 || y2 <= y1 {
                continue;
            }
            let mut region = self.grid.slice_mut(s![y1..y2, x1..x2]);
            region += strength;
        }
    }

    /// 模糊后的网格 (按最大值缩放到 0..1, 百分位归一化与尺度无关)
    fn smoothed(&self) -> Vec<f32> {
        let max = self.grid.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return vec![0.0; self.grid.len()];
        }
        let scaled: Vec<f32> = self.grid.iter().map(|v| v / max).collect();
        if self.blur_ksize <= 1 {
            return scaled;
        }
        match ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(self.width, self.height, scaled) {
            Some(img) => imageops::blur(&img, ksize_to_sigma(self.blur_ksize)).into_raw(),
            None => vec![0.0; self.grid.len()],
        }
    }

    /// 0..255 强度图
    pub fn intensity(&self, clip_percentile: f32, gamma: f32) -> GrayImage {
        let g = self.smoothed();
        let positives: Vec<f32> = g.iter().copied().filter(|v| *v > 0.0).collect();
        let vmax = percentile(positives, clip_percentile).unwrap_or(1.0).max(1e-6);

        let data: Vec<u8> = g
            .iter()
            .map(|v| ((v / vmax).clamp(0.0, 1.0).powf(gamma) * 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// 彩色渲染. `Overlay` 模式且提供底图时叠加到灰度底图上.
    pub fn render(&self, base: Option<&RgbImage>, opts: &RenderOptions) -> RgbImage {
        let g8 = self.intensity(opts.clip_percentile, opts.gamma);
        let lut = opts.palette.lut();
        let heat = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb(lut[g8.get_pixel(x, y)[0] as usize])
        });

        let base = match (opts.mode, base) {
            (RenderMode::Overlay, Some(b)) => b,
            _ => return heat,
        };
        let base = match resize_rgb(base, self.width, self.height) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "heatmap base frame resize failed, rendering raw");
                return heat;
            }
        };

        // 有信号的区域才叠加, 边缘羽化
        let mask = ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(self.width, self.height, |x, y| {
            Luma([if g8.get_pixel(x, y)[0] > MASK_THRESHOLD { 1.0 } else { 0.0 }])
        });
        let mask = imageops::blur(&mask, ksize_to_sigma(MASK_BLUR_KSIZE));
        let gray = imageops::grayscale(&base);

        let mut out = RgbImage::from_fn(self.width, self.height, |x, y| {
            let m = mask.get_pixel(x, y)[0].clamp(0.0, 1.0) * opts.alpha;
            let b = (gray.get_pixel(x, y)[0] as f32 * BASE_DIM).floor();
            let h = heat.get_pixel(x, y);
            Rgb([0usize, 1, 2].map(|c| (b * (1.0 - m) + h[c] as f32 * m) as u8))
        });

        if opts.draw_grid {
            draw_grid(&mut out);
        }
        out
    }
}

/// 网格线, 间距 max(40, 短边/12)
fn draw_grid(img: &mut RgbImage) {
    let (w, h) = img.dimensions();
    let step = (w.min(h) / 12).max(40) as usize;
    for x in (0..w).step_by(step) {
        draw_line_segment_mut(img, (x as f32, 0.0), (x as f32, h as f32), GRID_COLOR);
    }
    for y in (0..h).step_by(step) {
        draw_line_segment_mut(img, (0.0, y as f32), (w as f32, y as f32), GRID_COLOR);
    }
}

/// 高斯核大小 → sigma (与 OpenCV sigma=0 时的取值一致)
pub fn ksize_to_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// 线性插值百分位; 空输入返回 None
fn percentile(mut values: Vec<f32>, pct: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(values[lo] + (values[hi] - values[lo]) * (rank - lo as f32))
}
