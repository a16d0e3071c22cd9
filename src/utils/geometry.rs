//! 几何工具 (Geometry helpers)

use serde::{Deserialize, Serialize};

/// 二维点 (pixel space)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// 射线法判断点是否在多边形内 (even-odd rule)
///
/// Horizontal edges never toggle; the `1e-9` guard keeps the division finite.
pub fn point_in_polygon(x: f32, y: f32, polygon: &[Point]) -> bool {
    let n = polygon.len();
    let (px, py) = (x as f64, y as f64);
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let (x1, y1, x2, y2) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
        if (y1 > py) != (y2 > py) && px < (x2 - x1) * (py - y1) / (y2 - y1 + 1e-9) + x1 {
            inside = !inside;
        }
    }
    inside
}

/// 边界框中心点
pub fn bbox_center(x1: f32, y1: f32, x2: f32, y2: f32) -> Point {
    Point::new((x1 + x2) * 0.5, (y1 + y2) * 0.5)
}
