//! 预览叠加层 (Preview overlay)
//!
//! 在画面上绘制区域轮廓和轨迹框; 配置了字体时附带区域名和 `{类别}#{id}` 标签.

use std::path::Path;
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::config::OverlayConfig;
use crate::detection::{id_to_color, Track};
use crate::zones::{Zone, Zones};

const RESTRICTED_COLOR: Rgb<u8> = Rgb([255, 60, 60]);
const GENERAL_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_SCALE: f32 = 18.0;

pub struct OverlayRenderer {
    zones: Arc<Zones>,
    show_zones: bool,
    show_tracks: bool,
    font: Option<FontVec>,
}

impl OverlayRenderer {
    pub fn new(zones: Arc<Zones>, cfg: &OverlayConfig) -> Self {
        let font = cfg.font_path.as_deref().and_then(load_font);
        Self {
            zones,
            show_zones: cfg.show_zones,
            show_tracks: cfg.show_tracks,
            font,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 返回带标注的新帧, 原帧不变
    pub fn render(&self, frame: &RgbImage, tracks: &[Track]) -> RgbImage {
        let mut out = frame.clone();
        if self.show_zones {
            for zone in self.zones.iter() {
                self.draw_zone(&mut out, zone);
            }
        }
        if self.show_tracks {
            for t in tracks {
                self.draw_track(&mut out, t);
            }
        }
        out
    }

    fn draw_zone(&self, img: &mut RgbImage, zone: &Zone) {
        let color = if zone.is_restricted() {
            RESTRICTED_COLOR
        } else {
            GENERAL_COLOR
        };
        let n = zone.polygon.len();
        for i in 0..n {
            let a = zone.polygon[i];
            let b = zone.polygon[(i + 1) % n];
            draw_line_segment_mut(img, (a.x, a.y), (b.x, b.y), color);
        }
        if let (Some(font), Some(first)) = (&self.font, zone.polygon.first()) {
            draw_text_mut(
                img,
                color,
                first.x as i32 + 4,
                first.y as i32 + 4,
                PxScale::from(LABEL_SCALE),
                font,
                &zone.name,
            );
        }
    }

    fn draw_track(&self, img: &mut RgbImage, t: &Track) {
        let (r, g, b) = id_to_color(t.id);
        let color = Rgb([r, g, b]);
        let x1 = t.bbox.x1.max(0.0) as i32;
        let y1 = t.bbox.y1.max(0.0) as i32;
        let w = t.bbox.width().max(1.0) as u32;
        let h = t.bbox.height().max(1.0) as u32;

        // 2px 边框
        draw_hollow_rect_mut(img, Rect::at(x1, y1).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(img, Rect::at(x1 + 1, y1 + 1).of_size(w - 2, h - 2), color);
        }

        if let Some(font) = &self.font {
            let label = format!("{}#{}", t.class_name, t.id);
            let y = (y1 - LABEL_SCALE as i32 - 2).max(0);
            draw_text_mut(img, LABEL_COLOR, x1, y, PxScale::from(LABEL_SCALE), font, &label);
        }
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "⚠️ 字体文件读取失败, 不绘制标签");
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => {
            info!(path = %path.display(), "✅ 标签字体已加载");
            Some(font)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "⚠️ 无效字体文件, 不绘制标签");
            None
        }
    }
}
