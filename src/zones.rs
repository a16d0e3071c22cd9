//! 区域定义 (Zones)
//!
//! 命名多边形 + 类型标签. 加载后只读, 由各行为检测器共享.

use serde::Deserialize;

use crate::utils::{point_in_polygon, Point};

/// 默认徘徊阈值(秒)
pub const DEFAULT_LOITER_SECONDS: f64 = 30.0;

/// 配置文件中的区域
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ZoneKindTag,
    pub polygon: Vec<Point>,
    #[serde(default)]
    pub loiter_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKindTag {
    Restricted,
    #[default]
    General,
}

/// 区域类型及其专属参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneKind {
    /// 禁区: 入侵检测
    Restricted,
    /// 普通区域: 徘徊检测
    General { loiter_seconds: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub name: String,
    pub kind: ZoneKind,
    pub polygon: Vec<Point>,
}

impl Zone {
    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon(p.x, p.y, &self.polygon)
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self.kind, ZoneKind::Restricted)
    }
}

impl From<&ZoneConfig> for Zone {
    fn from(cfg: &ZoneConfig) -> Self {
        let kind = match cfg.kind {
            ZoneKindTag::Restricted => ZoneKind::Restricted,
            ZoneKindTag::General => ZoneKind::General {
                loiter_seconds: cfg.loiter_seconds.unwrap_or(DEFAULT_LOITER_SECONDS),
            },
        };
        Zone {
            name: cfg.name.clone(),
            kind,
            polygon: cfg.polygon.clone(),
        }
    }
}

/// 区域集合
#[derive(Debug, Clone, Default)]
pub struct Zones {
    zones: Vec<Zone>,
}

impl Zones {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn from_config(configs: &[ZoneConfig]) -> Self {
        Self::new(configs.iter().map(Zone::from).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn restricted(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(|z| z.is_restricted())
    }

    /// 普通区域及其徘徊阈值
    pub fn general(&self) -> impl Iterator<Item = (&Zone, f64)> {
        self.zones.iter().filter_map(|z| match z.kind {
            ZoneKind::General { loiter_seconds } => Some((z, loiter_seconds)),
            ZoneKind::Restricted => None,
        })
    }

    /// 包含该点的全部区域
    pub fn containing(&self, p: Point) -> Vec<&Zone> {
        self.zones.iter().filter(|z| z.contains(p)).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
