/// 检测/跟踪数据结构定义
/// Data structures for detection and tracking
use serde::{Deserialize, Serialize};

use crate::utils::{bbox_center, Point};

// ========== 公共常量 ==========

/// COCO 行人类别名
pub const PERSON_CLASS: &str = "person";

// ========== 数据结构 ==========

/// 检测框 (axis-aligned, pixel space, x2>x1, y2>y1)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 获取中心点
    pub fn center(&self) -> Point {
        bbox_center(self.x1, self.y1, self.x2, self.y2)
    }

    /// 高宽比 h / max(1, w)
    pub fn aspect_ratio(&self) -> f32 {
        self.height() / self.width().max(1.0)
    }
}

impl From<[f32; 4]> for BBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// 单帧检测结果 (detector → tracker), not retained past one update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "xyxy")]
    pub bbox: BBox,
    pub class_name: String,
    #[serde(rename = "conf")]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// 跟踪对象 (persistent identity owned by the tracker)
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// 唯一跟踪ID (monotonic, never reused)
    pub id: u32,

    /// 最近一次匹配的边界框
    pub bbox: BBox,

    pub class_name: String,

    pub confidence: f32,

    /// 连续丢失帧数
    pub lost: u32,
}

impl Track {
    pub fn center(&self) -> Point {
        self.bbox.center()
    }

    pub fn is_person(&self) -> bool {
        self.class_name == PERSON_CLASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let b = BBox::new(10.0, 10.0, 50.0, 30.0);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 20.0);
        assert_eq!(b.center(), Point::new(30.0, 20.0));
        assert!((b.aspect_ratio() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_ratio_narrow_box() {
        // 宽度不足1像素时按1计算
        let b = BBox::new(0.0, 0.0, 0.5, 10.0);
        assert_eq!(b.aspect_ratio(), 10.0);
    }

    #[test]
    fn test_detection_json_shape() {
        let raw = r#"{"xyxy":[1.0,2.0,3.0,4.0],"conf":0.9,"class_name":"person","class_id":0}"#;
        let d: Detection = serde_json::from_str(raw).unwrap();
        assert_eq!(d.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(d.class_name, "person");
    }
}
