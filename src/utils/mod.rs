/// 工具模块
/// Utility modules
pub mod geometry;
pub mod resize;

pub use geometry::{bbox_center, point_in_polygon, Point};
pub use resize::resize_rgb;
