//! ヒートマップ用のカラーマップ。

/// カラーマップ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// 黒→紫→橙→薄黄
    #[default]
    Magma,
    /// 黒→紫→赤→黄
    Inferno,
    /// 紫→緑→黄
    Viridis,
    /// 青紫→桃→黄
    Plasma,
    Grayscale,
}

// matplotlibの同名のカラーマップを等間隔で9点取ったもの
const MAGMA: [[u8; 3]; 9] = [
    [0x00, 0x00, 0x04],
    [0x1c, 0x10, 0x44],
    [0x4f, 0x12, 0x7b],
    [0x81, 0x25, 0x81],
    [0xb5, 0x36, 0x7a],
    [0xe5, 0x50, 0x64],
    [0xfb, 0x87, 0x61],
    [0xfe, 0xc2, 0x87],
    [0xfc, 0xfd, 0xbf],
];
const INFERNO: [[u8; 3]; 9] = [
    [0x00, 0x00, 0x04],
    [0x1f, 0x0c, 0x48],
    [0x55, 0x0f, 0x6d],
    [0x88, 0x22, 0x6a],
    [0xba, 0x36, 0x55],
    [0xe3, 0x59, 0x33],
    [0xf9, 0x8e, 0x09],
    [0xf6, 0xd7, 0x46],
    [0xfc, 0xff, 0xa4],
];
const VIRIDIS: [[u8; 3]; 9] = [
    [0x44, 0x01, 0x54],
    [0x47, 0x2d, 0x7b],
    [0x3b, 0x52, 0x8b],
    [0x2c, 0x72, 0x8e],
    [0x21, 0x91, 0x8c],
    [0x28, 0xae, 0x80],
    [0x5e, 0xc9, 0x62],
    [0xad, 0xdc, 0x30],
    [0xfd, 0xe7, 0x25],
];
const PLASMA: [[u8; 3]; 9] = [
    [0x0d, 0x08, 0x87],
    [0x4c, 0x02, 0xa1],
    [0x7e, 0x03, 0xa8],
    [0xa9, 0x23, 0x95],
    [0xcc, 0x47, 0x78],
    [0xe5, 0x6b, 0x5d],
    [0xf8, 0x94, 0x41],
    [0xfd, 0xc3, 0x28],
    [0xf0, 0xf9, 0x21],
];
const GRAYSCALE: [[u8; 3]; 2] = [[0x00, 0x00, 0x00], [0xff, 0xff, 0xff]];

impl ColorMap {
    /// `t`（0.0〜1.0）の位置の色を返します。範囲外の値は端に丸められます。
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let anchors: &[[u8; 3]] = match self {
            ColorMap::Magma => &MAGMA,
            ColorMap::Inferno => &INFERNO,
            ColorMap::Viridis => &VIRIDIS,
            ColorMap::Plasma => &PLASMA,
            ColorMap::Grayscale => &GRAYSCALE,
        };
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let position = t * (anchors.len() - 1) as f32;
        let index = (position.floor() as usize).min(anchors.len() - 2);
        let frac = position - index as f32;
        let (from, to) = (anchors[index], anchors[index + 1]);
        std::array::from_fn(|channel| {
            let value = from[channel] as f32 + (to[channel] as f32 - from[channel] as f32) * frac;
            value.round() as u8
        })
    }
}

/// [`ColorMap`]のパースエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown color map: {0}")]
pub struct ColorMapParseError(String);

impl std::str::FromStr for ColorMap {
    type Err = ColorMapParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "magma" => Ok(ColorMap::Magma),
            "inferno" => Ok(ColorMap::Inferno),
            "viridis" => Ok(ColorMap::Viridis),
            "plasma" => Ok(ColorMap::Plasma),
            "grayscale" | "greyscale" | "gray" | "grey" => Ok(ColorMap::Grayscale),
            _ => Err(ColorMapParseError(s.to_string())),
        }
    }
}
