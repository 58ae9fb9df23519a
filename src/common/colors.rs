//! カラーマップと色変換関数

use serde::{Deserialize, Serialize};

use crate::error::{FractalError, Result};

/// 8bit RGB
pub type Rgb = [u8; 3];

/// 発散しなかった点（反復上限に達した点）の色
pub const ESCAPED_COLOR: Rgb = [0, 0, 0];

/// 既定のカラーマップ
pub const DEFAULT_COLORS: [[f32; 3]; 10] = [
    [0.0, 0.0, 0.2], // 深い青
    [0.1, 0.2, 0.5], // 青
    [0.2, 0.5, 0.8], // 水色
    [0.5, 0.8, 0.9], // 薄い水色
    [1.0, 1.0, 0.8], // クリーム
    [1.0, 0.8, 0.3], // 黄色
    [1.0, 0.5, 0.1], // オレンジ
    [0.8, 0.2, 0.1], // 赤
    [0.5, 0.0, 0.2], // 暗い赤
    [0.0, 0.0, 0.0], // 黒
];

/// 0xRRGGBB 形式に詰める
#[inline]
pub fn pack_rgb([r, g, b]: Rgb) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// 0xRRGGBB 形式から取り出す
#[inline]
pub fn unpack_rgb(pixel: u32) -> Rgb {
    [
        ((pixel >> 16) & 0xFF) as u8,
        ((pixel >> 8) & 0xFF) as u8,
        (pixel & 0xFF) as u8,
    ]
}

/// 編集可能なパレット（各チャンネル 0.0〜1.0）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PaletteRepr", into = "PaletteRepr")]
pub struct Palette {
    colors: Vec<[f32; 3]>,
}

impl Palette {
    pub fn new(colors: Vec<[f32; 3]>) -> Result<Self> {
        if colors.len() < 2 {
            return Err(FractalError::PaletteTooSmall(colors.len()));
        }
        Ok(Self { colors })
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// 8bit に量子化したスナップショットを作る（255倍して切り捨て）
    pub fn quantize(&self) -> ColorRamp {
        let stops = self
            .colors
            .iter()
            .map(|color| color.map(|channel| (channel.clamp(0.0, 1.0) * 255.0) as u8))
            .collect();
        ColorRamp { stops }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_COLORS.to_vec(),
        }
    }
}

/// 設定ファイル上の表現（`colors = [[r, g, b], ...]`）
#[derive(Serialize, Deserialize)]
struct PaletteRepr {
    colors: Vec<[f32; 3]>,
}

impl TryFrom<PaletteRepr> for Palette {
    type Error = FractalError;

    fn try_from(repr: PaletteRepr) -> Result<Self> {
        Palette::new(repr.colors)
    }
}

impl From<Palette> for PaletteRepr {
    fn from(palette: Palette) -> Self {
        PaletteRepr {
            colors: palette.colors,
        }
    }
}

/// タイルにコピーされる量子化済みパレット（2色以上が保証される）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorRamp {
    stops: Vec<Rgb>,
}

impl ColorRamp {
    pub fn stops(&self) -> &[Rgb] {
        &self.stops
    }

    /// 反復回数から色を計算
    ///
    /// `[0, max_iter)` を `N-1` 個の区間に等分し、区間の両端の色を線形補間する。
    pub fn color_for_iteration(&self, iter: u32, max_iter: u32) -> Rgb {
        if iter >= max_iter {
            return ESCAPED_COLOR;
        }

        let segments = (self.stops.len() - 1) as u64;
        let k = iter as u64 * segments;
        let index = (k / max_iter as u64) as usize;
        let frac = (k % max_iter as u64) as f32 / max_iter as f32;

        let a = self.stops[index];
        let b = self.stops[index + 1];
        std::array::from_fn(|channel| {
            let from = a[channel] as f32;
            let to = b[channel] as f32;
            (from + (to - from) * frac) as u8
        })
    }

    /// 反復回数から色を計算（u32形式: 0xRRGGBB）
    #[inline]
    pub fn iter_to_color_u32(&self, iter: u32, max_iter: u32) -> u32 {
        pack_rgb(self.color_for_iteration(iter, max_iter))
    }
}
