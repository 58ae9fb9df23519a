//! 一括描画（rayon）
//!
//! ワーカープールを使わず、スケジューラと同じタイルを rayon で並列に計算して
//! 1枚のフレームにする。結果はプール経由の描画とピクセル単位で一致する。

use std::sync::atomic::AtomicBool;
use std::time::Instant;

use log::info;
use rayon::prelude::*;

use crate::compositor::{Compositor, Frame};
use crate::config::DispatchOrder;
use crate::error::Result;
use crate::scheduler::plan_tiles;
use crate::tile::TileGrid;
use crate::viewport::Viewport;

/// 現在のビューポートを描画し、終わるまで待つ
pub fn render_blocking(viewport: &Viewport, grid: TileGrid) -> Result<Frame> {
    let start = Instant::now();
    let tiles = plan_tiles(viewport, grid, DispatchOrder::Raster, 1)?;

    let stop = AtomicBool::new(false);
    tiles.par_iter().for_each(|tile| {
        if tile.try_start().is_ok() {
            tile.execute(&stop);
        }
    });

    let mut compositor = Compositor::new(viewport.width(), viewport.height());
    compositor.composite(&tiles);
    info!(
        "一括描画完了: {:.2?} [{}] {}x{}, {} タイル",
        start.elapsed(),
        viewport.precision(),
        viewport.width(),
        viewport.height(),
        tiles.len()
    );
    Ok(compositor.frame().clone())
}
