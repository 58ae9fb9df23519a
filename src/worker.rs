//! ワーカープール
//!
//! 固定数のスレッドが1本の有界キュー（`sync_channel`）からタイルを受け取って計算する。
//! キューが空のあいだワーカーは `recv` でブロックする。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, trace, warn};

use crate::error::{FractalError, Result};
use crate::tile::{Tile, TileState};

type TileReceiver = Arc<Mutex<Receiver<Arc<Tile>>>>;

pub struct WorkerPool {
    sender: Option<SyncSender<Arc<Tile>>>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    capacity: usize,
}

impl WorkerPool {
    /// `workers` 本のスレッドと容量 `capacity` のキューを作る（どちらも最低1）
    pub fn new(workers: usize, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = sync_channel::<Arc<Tile>>(capacity);
        let receiver: TileReceiver = Arc::new(Mutex::new(receiver));
        let stop = Arc::new(AtomicBool::new(false));

        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(workers.max(1)),
            stop,
            capacity,
        };
        for index in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let stop = Arc::clone(&pool.stop);
            let handle = thread::Builder::new()
                .name(format!("tile-worker-{index}"))
                .spawn(move || worker_loop(index, receiver, stop))
                .map_err(FractalError::Spawn)?;
            pool.workers.push(handle);
        }
        debug!(
            "ワーカープール起動: {} スレッド, キュー容量 {}",
            pool.workers.len(),
            capacity
        );
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// タイルをキューに積む
    ///
    /// キューが満杯なら空きが出るまで待つ（タイルは捨てない）。
    pub fn submit(&self, tile: Arc<Tile>) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(FractalError::PoolStopped)?;
        match sender.try_send(tile) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(tile)) => {
                warn!("タイルキューが満杯です（容量 {}）。空きを待ちます", self.capacity);
                sender.send(tile).map_err(|_| FractalError::PoolStopped)
            }
            Err(TrySendError::Disconnected(_)) => Err(FractalError::PoolStopped),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("ワーカースレッドが panic で終了しました");
            }
        }
        debug!("ワーカープール停止");
    }
}

fn worker_loop(index: usize, receiver: TileReceiver, stop: Arc<AtomicBool>) {
    trace!("ワーカー {index} 開始");
    loop {
        // ロックは受信の間だけ持つ
        let received = match receiver.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => {
                error!("ワーカー {index}: キューのロックが壊れています");
                break;
            }
        };
        let Ok(tile) = received else {
            break;
        };

        if stop.load(Ordering::Acquire) {
            tile.request_cancel();
            continue;
        }

        match tile.try_start() {
            Ok(()) => tile.execute(&stop),
            Err(TileState::Cancelled) => {}
            Err(state) => {
                debug_assert!(false, "キューから取り出したタイルの状態が不正: {state:?}");
                error!(
                    "ワーカー {index}: 状態 {:?} のタイル {:?} を受け取りました",
                    state,
                    tile.rect()
                );
            }
        }
    }
    trace!("ワーカー {index} 終了");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::colors::Palette;
    use crate::common::real::Precision;
    use crate::tile::{TileRect, TileSpec};
    use crate::viewport::WorldPoint;
    use std::time::{Duration, Instant};

    fn tile(size: usize, max_iterations: u32) -> Arc<Tile> {
        Arc::new(Tile::new(TileSpec {
            generation: 1,
            rect: TileRect {
                x: 0,
                y: 0,
                width: size,
                height: size,
            },
            frame_size: (size, size),
            start: WorldPoint::from_f64(-0.5, -0.5, 64),
            step: WorldPoint::from_f64(1.0 / size as f64, 1.0 / size as f64, 64),
            max_iterations,
            precision: Precision::Double,
            ramp: Palette::default().quantize(),
        }))
    }

    fn wait_terminal(tiles: &[Arc<Tile>]) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !tiles.iter().all(|tile| tile.is_terminal()) {
            assert!(Instant::now() < deadline, "tiles did not finish");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test_log::test]
    fn computes_submitted_tiles() {
        let pool = WorkerPool::new(3, 4).unwrap();
        assert_eq!(pool.worker_count(), 3);
        let tiles: Vec<_> = (0..10).map(|_| tile(16, 100)).collect();
        for tile in &tiles {
            pool.submit(Arc::clone(tile)).unwrap();
        }
        wait_terminal(&tiles);
        for tile in &tiles {
            assert_eq!(tile.state(), TileState::Completed);
        }
        assert_eq!(tiles[0].pixels(), tiles[9].pixels());
    }

    #[test_log::test]
    fn cancelled_tiles_are_skipped() {
        let pool = WorkerPool::new(1, 8).unwrap();
        let tiles: Vec<_> = (0..4).map(|_| tile(8, 50)).collect();
        for tile in &tiles {
            tile.request_cancel();
            pool.submit(Arc::clone(tile)).unwrap();
        }
        drop(pool);
        for tile in &tiles {
            assert_eq!(tile.state(), TileState::Cancelled);
            assert!(tile.pixels().is_none());
        }
    }

    #[test_log::test]
    fn shutdown_with_pending_work_is_prompt() {
        let pool = WorkerPool::new(2, 64).unwrap();
        // (0,0) 中心の重いタイル
        let tiles: Vec<_> = (0..32).map(|_| tile(64, 200_000)).collect();
        for tile in &tiles {
            pool.submit(Arc::clone(tile)).unwrap();
        }
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        drop(pool);
        assert!(started.elapsed() < Duration::from_secs(10));
        for tile in &tiles {
            assert!(tile.is_terminal(), "{tile:?}");
        }
    }
}
