//! マンデルブロ集合のタイル分割レンダラ
//!
//! 画面をタイルに分け、ワーカープールで並列に計算して1枚のフレームに合成する。
//! 表示範囲が変わると計算中のタイルをキャンセルし、新しい世代として計算し直す。
//! 浅いズームは f64、深いズームは rug の任意精度で計算する。

pub mod common;
pub mod compositor;
pub mod config;
pub mod error;
pub mod oneshot;
pub mod renderer;
pub mod scheduler;
pub mod tile;
pub mod viewport;
pub mod worker;

pub use compositor::{Compositor, Frame};
pub use config::Config;
pub use error::{FractalError, Result};
pub use renderer::Renderer;
pub use scheduler::{TickOutcome, TileScheduler};
pub use viewport::{Pan, Viewport, WorldPoint};
