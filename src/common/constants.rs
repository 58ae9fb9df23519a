//! 共通定数

/// 初期ウィンドウの幅
pub const DEFAULT_WIDTH: usize = 800;
/// 初期ウィンドウの高さ
pub const DEFAULT_HEIGHT: usize = 800;

/// 最大反復回数
pub const MAX_ITER: u32 = 1000;

/// タイル分割数（縦 × 横）
pub const GRID_ROWS: usize = 10;
pub const GRID_COLUMNS: usize = 10;

/// ワーカースレッド数
pub const WORKER_COUNT: usize = 8;

/// ズーム1段あたりの倍率（1未満で拡大）
pub const SCALE_FACTOR: f64 = 0.95;

/// ズーム0のときの短辺方向の座標範囲
pub const BASE_RANGE: f64 = 4.0;

/// 1秒あたりのパン量（表示範囲に対する割合）
pub const PAN_SPEED: f64 = 0.1;

/// 座標を保持する精度（10進桁）
pub const COORDINATE_DIGITS: u32 = 100;

/// 高精度モードの既定の桁数
pub const EXTENDED_DIGITS: u32 = 100;

/// 高精度計算モードへの切り替え閾値（ズーム倍率）
pub const PRECISION_THRESHOLD: f64 = 1e13;

/// 自動切替で使う精度の上限（ビット）
pub const MAX_PRECISION: u32 = 4096;
