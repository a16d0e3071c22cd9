//! 热力图调色板 (Heatmap palettes)
//!
//! 每个调色板由等距色标定义, 中间值线性插值. 颜色为 RGB.

use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Palette {
    #[default]
    Turbo,
    Magma,
    Inferno,
    Plasma,
    Jet,
}

static PALETTES: phf::Map<&'static str, Palette> = phf_map! {
    "turbo" => Palette::Turbo,
    "magma" => Palette::Magma,
    "inferno" => Palette::Inferno,
    "plasma" => Palette::Plasma,
    "jet" => Palette::Jet,
};

static TURBO: [[u8; 3]; 15] = [
    [48, 18, 59],
    [65, 69, 171],
    [70, 117, 237],
    [57, 162, 252],
    [27, 207, 212],
    [36, 236, 166],
    [97, 252, 108],
    [164, 252, 59],
    [209, 232, 52],
    [243, 198, 58],
    [254, 155, 45],
    [243, 99, 21],
    [217, 56, 6],
    [177, 26, 1],
    [122, 4, 3],
];

static MAGMA: [[u8; 3]; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

static INFERNO: [[u8; 3]; 9] = [
    [0, 0, 4],
    [31, 12, 72],
    [85, 15, 109],
    [136, 34, 106],
    [186, 54, 85],
    [227, 89, 51],
    [249, 140, 10],
    [249, 201, 50],
    [252, 255, 164],
];

static PLASMA: [[u8; 3]; 9] = [
    [13, 8, 135],
    [75, 3, 161],
    [125, 3, 168],
    [168, 34, 150],
    [203, 70, 121],
    [229, 107, 93],
    [248, 148, 65],
    [253, 195, 40],
    [240, 249, 33],
];

static JET: [[u8; 3]; 9] = [
    [0, 0, 128],
    [0, 0, 255],
    [0, 128, 255],
    [0, 255, 255],
    [128, 255, 128],
    [255, 255, 0],
    [255, 128, 0],
    [255, 0, 0],
    [128, 0, 0],
];

impl Palette {
    /// 按名称查找, 不区分大小写; 未知名称使用 turbo
    pub fn from_name(name: &str) -> Self {
        PALETTES
            .get(name.to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or_default()
    }

    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            Palette::Turbo => &TURBO,
            Palette::Magma => &MAGMA,
            Palette::Inferno => &INFERNO,
            Palette::Plasma => &PLASMA,
            Palette::Jet => &JET,
        }
    }

    /// 0..=255 强度对应的颜色
    pub fn color(&self, value: u8) -> [u8; 3] {
        let stops = self.stops();
        let pos = value as f32 / 255.0 * (stops.len() - 1) as f32;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let t = pos - i as f32;
        let (a, b) = (stops[i], stops[i + 1]);
        [0usize, 1, 2].map(|c| (a[c] as f32 + (b[c] as f32 - a[c] as f32) * t).round() as u8)
    }

    /// 256 级查找表
    pub fn lut(&self) -> [[u8; 3]; 256] {
        let mut table = [[0u8; 3]; 256];
        for (v, entry) in table.iter_mut().enumerate() {
            *entry = self.color(v as u8);
        }
        table
    }
}
