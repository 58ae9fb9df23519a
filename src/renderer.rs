//! 毎フレームの描画処理（回収 → 合成 → 配布）

use log::trace;

use crate::compositor::{Compositor, Frame};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::scheduler::{GenerationReport, Progress, TickOutcome, TileScheduler};
use crate::viewport::Viewport;

/// スケジューラとコンポジタをまとめたもの
///
/// drop すると計算中のタイルをすべてキャンセルしてからワーカーを止める。
pub struct Renderer {
    scheduler: TileScheduler,
    compositor: Compositor,
}

impl Renderer {
    pub fn new(config: &EngineConfig, viewport: &Viewport) -> Result<Self> {
        Ok(Self {
            scheduler: TileScheduler::new(config)?,
            compositor: Compositor::new(viewport.width(), viewport.height()),
        })
    }

    /// 1フレームぶん進める
    pub fn tick(&mut self, viewport: &mut Viewport) -> Result<TickOutcome> {
        let finished = self.scheduler.collect_finished();
        if !finished.is_empty() {
            let drawn = self.compositor.composite(&finished);
            trace!("{} / {} タイルを合成", drawn, finished.len());
        }
        self.scheduler.schedule(viewport, &mut self.compositor)
    }

    pub fn frame(&self) -> &Frame {
        self.compositor.frame()
    }

    /// 設定が反映済みで、すべてのタイルを合成し終えた
    pub fn is_idle(&self, viewport: &Viewport) -> bool {
        viewport.settings_applied() && self.scheduler.is_settled()
    }

    pub fn generation(&self) -> u64 {
        self.scheduler.generation()
    }

    pub fn progress(&self) -> Progress {
        self.scheduler.progress()
    }

    pub fn worker_count(&self) -> usize {
        self.scheduler.worker_count()
    }

    pub fn take_previous_generation(&mut self) -> Option<GenerationReport> {
        self.scheduler.take_previous_generation()
    }

    pub fn cancel_all(&self) {
        self.scheduler.cancel_all();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
    }
}
