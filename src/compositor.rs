//! フレーム合成
//!
//! 完了したタイルを画面サイズのバッファに貼り合わせる。バッファには内容の世代を
//! 記録しておき、異なる世代のタイルが混ざらないようにする。

use std::path::Path;
use std::sync::Arc;

use image::{ImageBuffer, Rgb};
use log::{debug, info};

use crate::common::colors::unpack_rgb;
use crate::error::Result;
use crate::tile::{Tile, TileRect};

/// まだタイルが届いていない領域の色
pub const BACKGROUND: u32 = 0x202020;

/// 画面サイズのピクセルバッファ（0xRRGGBB、行0が下端 = min.y）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
    generation: u64,
}

impl Frame {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![BACKGROUND; width * height],
            generation: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// 貼られているタイルの世代（0 は未描画）
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// (x, y) のピクセル。y は下端から数える。
    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    fn clear(&mut self, generation: u64) {
        self.pixels.fill(BACKGROUND);
        self.generation = generation;
    }

    /// 上の行から順に `out` に書き出す（ウィンドウ表示用）
    pub fn write_top_down(&self, out: &mut Vec<u32>) {
        out.clear();
        out.reserve(self.pixels.len());
        if self.width == 0 {
            return;
        }
        for row in self.pixels.chunks_exact(self.width).rev() {
            out.extend_from_slice(row);
        }
    }

    /// PNG として保存する（上が max.y）
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
                let row = self.height - 1 - y as usize;
                Rgb(unpack_rgb(self.pixels[row * self.width + x as usize]))
            });
        img.save(path)?;
        info!("画像を保存しました: {}", path.display());
        Ok(())
    }

    fn blit(&mut self, rect: TileRect, pixels: &[u32]) {
        for row in 0..rect.height {
            let src = &pixels[row * rect.width..(row + 1) * rect.width];
            let start = (rect.y + row) * self.width + rect.x;
            self.pixels[start..start + rect.width].copy_from_slice(src);
        }
    }
}

#[derive(Debug)]
pub struct Compositor {
    frame: Frame,
}

impl Compositor {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            frame: Frame::new(width, height),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// 出力サイズを変える。サイズが同じなら何もしない。
    pub fn resize_output(&mut self, width: usize, height: usize) {
        if self.frame.width == width && self.frame.height == height {
            return;
        }
        debug!(
            "出力サイズ変更: {}x{} → {}x{}",
            self.frame.width, self.frame.height, width, height
        );
        self.frame = Frame::new(width, height);
    }

    /// 完了タイルを貼る。貼った枚数を返す。
    ///
    /// 未完了・別の画面サイズ向け・フレームより古い世代のタイルは無視する。
    /// 新しい世代のタイルが来たらフレームを消してから貼る。
    pub fn composite(&mut self, tiles: &[Arc<Tile>]) -> usize {
        let mut drawn = 0;
        for tile in tiles {
            let Some(pixels) = tile.pixels() else {
                continue;
            };
            let spec = tile.spec();
            if spec.frame_size != (self.frame.width, self.frame.height) {
                continue;
            }
            if spec.generation < self.frame.generation {
                continue;
            }
            let rect = spec.rect;
            let fits = rect.x + rect.width <= self.frame.width
                && rect.y + rect.height <= self.frame.height
                && pixels.len() == rect.area();
            if !fits {
                debug_assert!(false, "タイルがフレームに収まりません: {rect:?}");
                log::error!("タイル {:?} がフレームに収まりません", rect);
                continue;
            }
            if spec.generation > self.frame.generation {
                self.frame.clear(spec.generation);
            }
            self.frame.blit(rect, pixels);
            drawn += 1;
        }
        drawn
    }
}
