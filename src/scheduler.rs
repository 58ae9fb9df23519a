//! タイルスケジューラ
//!
//! 毎フレーム `schedule` を呼ぶ。ビューポートが変わっていたら、前の世代のタイルを
//! すべてキャンセルし、全部が止まってから次の世代を配布する。同時に走る世代は
//! 常に1つだけ。

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::compositor::Compositor;
use crate::config::{DispatchOrder, EngineConfig};
use crate::error::{FractalError, Result};
use crate::tile::{Tile, TileGrid, TileSpec, TileState};
use crate::viewport::Viewport;
use crate::worker::WorkerPool;

/// `schedule` の結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// 設定は反映済みで、まだ回収していないタイルがある
    InProgress,
    /// 設定は反映済みで、すべて回収済み
    Idle,
    /// 設定が変わったので前の世代を止めている
    Cancelling,
    /// 画面サイズが0なので待っている
    Waiting,
    /// 新しい世代を配布した
    Started,
}

/// 世代の進み具合（終わったタイル数 / 全タイル数）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub finished: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.finished == self.total
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.finished as f64 / self.total as f64
        }
    }
}

/// 終わった世代の集計
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationReport {
    pub generation: u64,
    pub tiles: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// 各タイルの計算時間の合計
    pub cpu_time: Duration,
    /// 配布から最後のタイルの回収まで
    pub wall_time: Duration,
}

#[derive(Debug)]
struct GenerationStats {
    generation: u64,
    tiles: usize,
    completed: usize,
    cancelled: usize,
    cpu_time: Duration,
    started: Instant,
}

/// 1世代ぶんのタイルを作る
///
/// 各タイルには表示範囲・パレット・精度のスナップショットを持たせる。
/// `CenterOut` では画面中心に近いタイルが先に来る（距離が同じなら行順）。
pub fn plan_tiles(
    viewport: &Viewport,
    grid: TileGrid,
    order: DispatchOrder,
    generation: u64,
) -> Result<Vec<Arc<Tile>>> {
    let (width, height) = (viewport.width(), viewport.height());
    if viewport.is_degenerate() {
        return Err(FractalError::DegenerateViewport { width, height });
    }

    let mut rects = grid.split(width, height);
    if order == DispatchOrder::CenterOut {
        rects.sort_by_key(|rect| rect.center_distance_sq(width, height));
    }

    let ramp = viewport.palette().quantize();
    let tiles = rects
        .into_iter()
        .map(|rect| {
            Arc::new(Tile::new(TileSpec {
                generation,
                rect,
                frame_size: (width, height),
                start: viewport.coord_at_pixel(rect.x, rect.y),
                step: viewport.step_per_pixel().clone(),
                max_iterations: viewport.max_iterations(),
                precision: viewport.precision(),
                ramp: ramp.clone(),
            }))
        })
        .collect();
    Ok(tiles)
}

pub struct TileScheduler {
    grid: TileGrid,
    order: DispatchOrder,
    tiles: Vec<Arc<Tile>>,
    generation: u64,
    total: usize,
    current: Option<GenerationStats>,
    previous: Option<GenerationReport>,
    cancelling: bool,
    // 最後に drop してワーカーを join させる
    pool: WorkerPool,
}

impl TileScheduler {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let grid = TileGrid::new(config.grid_rows, config.grid_columns)?;
        let pool = WorkerPool::new(config.worker_count(), config.queue_capacity())?;
        Ok(Self {
            grid,
            order: config.order,
            tiles: Vec::new(),
            generation: 0,
            total: 0,
            current: None,
            previous: None,
            cancelling: false,
            pool,
        })
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// 最後に配布した世代（まだ無ければ 0）
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// すべてのタイルを回収済み
    pub fn is_settled(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn has_tiles_in_progress(&self) -> bool {
        self.tiles.iter().any(|tile| !tile.is_terminal())
    }

    pub fn progress(&self) -> Progress {
        let pending = self.tiles.iter().filter(|tile| !tile.is_terminal()).count();
        Progress {
            finished: self.total - pending,
            total: self.total,
        }
    }

    /// 直前に終わった世代の集計を取り出す（1回だけ返す）
    pub fn take_previous_generation(&mut self) -> Option<GenerationReport> {
        self.previous.take()
    }

    /// 1フレームぶんの処理
    pub fn schedule(
        &mut self,
        viewport: &mut Viewport,
        compositor: &mut Compositor,
    ) -> Result<TickOutcome> {
        if viewport.settings_applied() {
            return Ok(if !self.tiles.is_empty() {
                TickOutcome::InProgress
            } else {
                TickOutcome::Idle
            });
        }

        if self.has_tiles_in_progress() {
            if !self.cancelling {
                debug!("設定変更: 世代 {} をキャンセルします", self.generation);
                self.cancelling = true;
            }
            self.cancel_all();
            return Ok(TickOutcome::Cancelling);
        }
        self.cancelling = false;

        if viewport.is_degenerate() {
            return Ok(TickOutcome::Waiting);
        }

        // 回収されずに残った前の世代のタイルを捨てる
        self.retire_all();
        self.finish_generation();

        compositor.resize_output(viewport.width(), viewport.height());

        let generation = self.generation + 1;
        let tiles = plan_tiles(viewport, self.grid, self.order, generation)?;
        self.generation = generation;
        self.total = tiles.len();
        self.current = Some(GenerationStats {
            generation,
            tiles: tiles.len(),
            completed: 0,
            cancelled: 0,
            cpu_time: Duration::ZERO,
            started: Instant::now(),
        });
        debug!(
            "世代 {} 開始: {} タイル, {}, ズーム {}",
            generation,
            tiles.len(),
            viewport.precision(),
            viewport.zoom()
        );

        for tile in &tiles {
            self.pool.submit(Arc::clone(tile))?;
        }
        self.tiles = tiles;
        viewport.mark_applied();
        Ok(TickOutcome::Started)
    }

    /// 終わったタイルを手放し、完了したものを返す（キャンセルされたものは捨てる）
    pub fn collect_finished(&mut self) -> Vec<Arc<Tile>> {
        let mut finished = Vec::new();
        let mut index = 0;
        while index < self.tiles.len() {
            if self.tiles[index].is_terminal() {
                let tile = self.tiles.swap_remove(index);
                self.record(&tile);
                if tile.state() == TileState::Completed {
                    finished.push(tile);
                }
            } else {
                index += 1;
            }
        }
        if self.tiles.is_empty() {
            self.finish_generation();
        }
        finished
    }

    /// 持っているタイルすべてにキャンセルを要求する
    pub fn cancel_all(&self) {
        let mut immediate = 0;
        for tile in &self.tiles {
            if tile.request_cancel() {
                immediate += 1;
            }
        }
        if immediate > 0 {
            debug!("キューにあった {immediate} タイルをキャンセルしました");
        }
    }

    fn retire_all(&mut self) {
        let stale = std::mem::take(&mut self.tiles);
        for tile in &stale {
            self.record(tile);
        }
    }

    fn record(&mut self, tile: &Tile) {
        let Some(stats) = self.current.as_mut() else {
            return;
        };
        if tile.generation() != stats.generation {
            return;
        }
        if let Some(duration) = tile.duration() {
            stats.cpu_time += duration;
        }
        match tile.state() {
            TileState::Completed => stats.completed += 1,
            _ => stats.cancelled += 1,
        }
    }

    fn finish_generation(&mut self) {
        let Some(stats) = self.current.take() else {
            return;
        };
        let report = GenerationReport {
            generation: stats.generation,
            tiles: stats.tiles,
            completed: stats.completed,
            cancelled: stats.cancelled,
            cpu_time: stats.cpu_time,
            wall_time: stats.started.elapsed(),
        };
        info!(
            "世代 {} 終了: 完了 {}/{} タイル, キャンセル {}, 計算時間 {:.2?}, 経過 {:.2?}",
            report.generation,
            report.completed,
            report.tiles,
            report.cancelled,
            report.cpu_time,
            report.wall_time
        );
        self.previous = Some(report);
    }
}
