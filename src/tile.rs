//! タイル（ワーカーに渡す計算単位）
//!
//! タイルは生成時に表示範囲・パレット・精度のスナップショットを持つので、
//! 計算中にビューポートがどう変わっても影響を受けない。ワーカーと描画側で
//! 共有するのは状態（アトミック）とピクセルバッファ（一度だけ書かれる）のみ。

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::trace;
use rug::Float;

use crate::common::colors::ColorRamp;
use crate::common::mandelbrot::escape_time;
use crate::common::real::{digits_to_bits, BigReal, Precision, Real};
use crate::error::{FractalError, Result};
use crate::viewport::WorldPoint;

/// 画面上の矩形（行0が下端）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TileRect {
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// 矩形の中心から画面中心までの距離の2乗（ピクセルの2倍単位）
    pub fn center_distance_sq(&self, screen_width: usize, screen_height: usize) -> u64 {
        let dx = (2 * self.x + self.width) as i64 - screen_width as i64;
        let dy = (2 * self.y + self.height) as i64 - screen_height as i64;
        (dx * dx + dy * dy) as u64
    }
}

/// タイル分割数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    rows: usize,
    columns: usize,
}

impl TileGrid {
    pub fn new(rows: usize, columns: usize) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(FractalError::InvalidGrid { rows, columns });
        }
        Ok(Self { rows, columns })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.rows * self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 画面をタイル矩形に分割する（行順）
    pub fn split(&self, width: usize, height: usize) -> Vec<TileRect> {
        let columns = partition(width, self.columns);
        let mut rects = Vec::with_capacity(self.len());
        for (y, tile_height) in partition(height, self.rows) {
            for &(x, tile_width) in &columns {
                rects.push(TileRect {
                    x,
                    y,
                    width: tile_width,
                    height: tile_height,
                });
            }
        }
        rects
    }
}

/// `part_index` 番目の区間の長さ
///
/// 余り `full_size % parts_count` は先頭の区間から1ピクセルずつ割り当てる。
pub fn part_size(full_size: usize, parts_count: usize, part_index: usize) -> usize {
    let min_part = full_size / parts_count;
    if part_index < full_size % parts_count {
        min_part + 1
    } else {
        min_part
    }
}

/// `full_size` を `parts_count` 個に分けた (開始位置, 長さ) の列。長さ0の区間は含めない。
pub fn partition(full_size: usize, parts_count: usize) -> Vec<(usize, usize)> {
    let mut parts = Vec::with_capacity(parts_count);
    let mut offset = 0;
    for index in 0..parts_count {
        let size = part_size(full_size, parts_count, index);
        if size == 0 {
            break;
        }
        parts.push((offset, size));
        offset += size;
    }
    parts
}

/// タイルの状態
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TileState {
    Queued = 0,
    Running = 1,
    Completed = 2,
    Cancelled = 3,
}

impl TileState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TileState::Queued,
            1 => TileState::Running,
            2 => TileState::Completed,
            _ => TileState::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TileState::Completed | TileState::Cancelled)
    }
}

/// 生成時に固定されるタイルの内容
#[derive(Clone, Debug)]
pub struct TileSpec {
    pub generation: u64,
    pub rect: TileRect,
    /// このタイルを計画したときの画面サイズ
    pub frame_size: (usize, usize),
    /// 矩形の左下ピクセルの複素座標
    pub start: WorldPoint,
    pub step: WorldPoint,
    pub max_iterations: u32,
    pub precision: Precision,
    pub ramp: ColorRamp,
}

pub struct Tile {
    spec: TileSpec,
    state: AtomicU8,
    cancel_requested: AtomicBool,
    rows_completed: AtomicUsize,
    pixels: OnceLock<Vec<u32>>,
    duration: OnceLock<Duration>,
}

impl Tile {
    pub fn new(spec: TileSpec) -> Self {
        Self {
            spec,
            state: AtomicU8::new(TileState::Queued as u8),
            cancel_requested: AtomicBool::new(false),
            rows_completed: AtomicUsize::new(0),
            pixels: OnceLock::new(),
            duration: OnceLock::new(),
        }
    }

    pub fn spec(&self) -> &TileSpec {
        &self.spec
    }

    pub fn rect(&self) -> TileRect {
        self.spec.rect
    }

    pub fn generation(&self) -> u64 {
        self.spec.generation
    }

    pub fn state(&self) -> TileState {
        TileState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn rows_completed(&self) -> usize {
        self.rows_completed.load(Ordering::Relaxed)
    }

    /// 計算にかかった時間（終了したタイルのみ）
    pub fn duration(&self) -> Option<Duration> {
        self.duration.get().copied()
    }

    /// 完了したタイルのピクセル（0xRRGGBB、行0が下端）
    pub fn pixels(&self) -> Option<&[u32]> {
        if self.state() == TileState::Completed {
            self.pixels.get().map(Vec::as_slice)
        } else {
            None
        }
    }

    /// キャンセルを要求する
    ///
    /// まだワーカーに取られていなければその場で `Cancelled` になり `true` を返す。
    /// 計算中なら次の行の境目で打ち切られる。
    pub fn request_cancel(&self) -> bool {
        self.cancel_requested.store(true, Ordering::Release);
        self.state
            .compare_exchange(
                TileState::Queued as u8,
                TileState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// ワーカーがタイルを確保する（`Queued` → `Running`）。失敗時は現在の状態を返す。
    pub fn try_start(&self) -> std::result::Result<(), TileState> {
        self.state
            .compare_exchange(
                TileState::Queued as u8,
                TileState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(TileState::from_u8)
    }

    /// タイルを計算する。`try_start` に成功したワーカーだけが呼ぶ。
    ///
    /// 行ごとにキャンセル要求と `stop` を確認し、立っていれば `Cancelled` で終える。
    pub fn execute(&self, stop: &AtomicBool) {
        debug_assert_eq!(self.state(), TileState::Running);

        let started = Instant::now();
        let pixels = match self.spec.precision {
            Precision::Double => {
                let (start_x, start_y) = self.spec.start.to_f64();
                let (step_x, step_y) = self.spec.step.to_f64();
                self.compute_rows(start_x, start_y, step_x, step_y, stop)
            }
            Precision::Extended { digits } => {
                let bits = digits_to_bits(digits);
                let convert = |value: &Float| BigReal::from_float(Float::with_val(bits, value));
                self.compute_rows(
                    convert(&self.spec.start.x),
                    convert(&self.spec.start.y),
                    convert(&self.spec.step.x),
                    convert(&self.spec.step.y),
                    stop,
                )
            }
        };
        let elapsed = started.elapsed();
        let _ = self.duration.set(elapsed);

        let state = match pixels {
            Some(pixels) => {
                if self.pixels.set(pixels).is_err() {
                    debug_assert!(false, "タイルのピクセルが二重に書き込まれました");
                }
                TileState::Completed
            }
            None => TileState::Cancelled,
        };
        trace!(
            "タイル {:?} (世代 {}) → {:?} ({:.2?})",
            self.spec.rect,
            self.spec.generation,
            state,
            elapsed
        );
        self.state.store(state as u8, Ordering::Release);
    }

    fn compute_rows<R: Real>(
        &self,
        start_x: R,
        start_y: R,
        step_x: R,
        step_y: R,
        stop: &AtomicBool,
    ) -> Option<Vec<u32>> {
        let TileRect { width, height, .. } = self.spec.rect;
        let max_iter = self.spec.max_iterations;
        let mut pixels = Vec::with_capacity(width * height);

        for row in 0..height {
            if self.is_cancel_requested() || stop.load(Ordering::Acquire) {
                return None;
            }
            self.rows_completed.store(row, Ordering::Relaxed);

            let py = start_y.clone() + step_y.clone() * start_y.constant(row as f64);
            for column in 0..width {
                let px = start_x.clone() + step_x.clone() * start_x.constant(column as f64);
                let iteration = escape_time(&px, &py, max_iter);
                pixels.push(self.spec.ramp.iter_to_color_u32(iteration, max_iter));
            }
        }

        self.rows_completed.store(height, Ordering::Relaxed);
        Some(pixels)
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("generation", &self.spec.generation)
            .field("rect", &self.spec.rect)
            .field("precision", &self.spec.precision)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::colors::Palette;
    use proptest::prelude::*;

    fn spec(width: usize, height: usize, precision: Precision) -> TileSpec {
        TileSpec {
            generation: 1,
            rect: TileRect {
                x: 0,
                y: 0,
                width,
                height,
            },
            frame_size: (width, height),
            start: WorldPoint::from_f64(-2.0, -1.5, 128),
            step: WorldPoint::from_f64(3.0 / width as f64, 3.0 / height as f64, 128),
            max_iterations: 24,
            precision,
            ramp: Palette::default().quantize(),
        }
    }

    #[test]
    fn uneven_partition_spreads_remainder() {
        assert_eq!(part_size(801, 8, 0), 101);
        assert_eq!(part_size(801, 8, 1), 100);
        assert_eq!(partition(10, 4), vec![(0, 3), (3, 3), (6, 2), (8, 2)]);
        assert_eq!(partition(3, 5), vec![(0, 1), (1, 1), (2, 1)]);
        assert!(partition(0, 3).is_empty());
    }

    #[test]
    fn grid_split_covers_screen() {
        let grid = TileGrid::new(3, 3).unwrap();
        let rects = grid.split(100, 50);
        assert_eq!(rects.len(), 9);
        assert_eq!(rects.iter().map(TileRect::area).sum::<usize>(), 5000);
        let first = TileRect {
            x: 0,
            y: 0,
            width: 34,
            height: 17,
        };
        let last = TileRect {
            x: 67,
            y: 34,
            width: 33,
            height: 16,
        };
        assert_eq!(rects[0], first);
        assert_eq!(rects[8], last);
        assert!(TileGrid::new(0, 3).is_err());
    }

    proptest! {
        #[test]
        fn partition_has_no_gaps_or_overlaps(
            full_size in 0usize..5000,
            parts_count in 1usize..128,
        ) {
            let parts = partition(full_size, parts_count);
            let mut expected_offset = 0;
            for &(offset, size) in &parts {
                prop_assert_eq!(offset, expected_offset);
                prop_assert!(size > 0);
                expected_offset += size;
            }
            prop_assert_eq!(expected_offset, full_size);

            let ideal = full_size / parts_count;
            for index in 0..parts_count {
                let size = part_size(full_size, parts_count, index);
                prop_assert!(size == ideal || size == ideal + 1);
            }
            let total: usize = (0..parts_count).map(|i| part_size(full_size, parts_count, i)).sum();
            prop_assert_eq!(total, full_size);
        }
    }

    #[test]
    fn completes_and_publishes_pixels() {
        let tile = Tile::new(spec(8, 6, Precision::Double));
        assert!(tile.pixels().is_none());
        tile.try_start().unwrap();
        tile.execute(&AtomicBool::new(false));

        assert_eq!(tile.state(), TileState::Completed);
        assert_eq!(tile.pixels().unwrap().len(), 48);
        assert_eq!(tile.rows_completed(), 6);
        assert!(tile.duration().is_some());
    }

    #[test]
    fn queued_cancel_is_immediate() {
        let tile = Tile::new(spec(4, 4, Precision::Double));
        assert!(tile.request_cancel());
        assert_eq!(tile.state(), TileState::Cancelled);
        assert_eq!(tile.try_start(), Err(TileState::Cancelled));
    }

    #[test]
    fn running_cancel_stops_at_row_boundary() {
        let tile = Tile::new(spec(4, 4, Precision::Double));
        tile.try_start().unwrap();
        assert!(!tile.request_cancel());
        tile.execute(&AtomicBool::new(false));
        assert_eq!(tile.state(), TileState::Cancelled);
        assert!(tile.pixels().is_none());
    }

    #[test]
    fn stop_flag_aborts() {
        let tile = Tile::new(spec(4, 4, Precision::Double));
        tile.try_start().unwrap();
        tile.execute(&AtomicBool::new(true));
        assert_eq!(tile.state(), TileState::Cancelled);
    }

    #[test]
    fn double_and_extended_tiles_match() {
        let fast = Tile::new(spec(16, 8, Precision::Double));
        let precise = Tile::new(spec(16, 8, Precision::Extended { digits: 40 }));
        for tile in [&fast, &precise] {
            tile.try_start().unwrap();
            tile.execute(&AtomicBool::new(false));
        }
        assert_eq!(fast.pixels(), precise.pixels());
    }

    #[test]
    fn center_distance_orders_tiles() {
        let center = TileRect {
            x: 40,
            y: 40,
            width: 20,
            height: 20,
        };
        let corner = TileRect {
            x: 0,
            y: 0,
            width: 20,
            height: 20,
        };
        assert_eq!(center.center_distance_sq(100, 100), 0);
        assert!(corner.center_distance_sq(100, 100) > 0);
    }
}
