//! エラー型

use thiserror::Error;

/// レンダラ全体で使うエラー
#[derive(Error, Debug)]
pub enum FractalError {
    #[error("パレットには少なくとも2色が必要です (指定: {0}色)")]
    PaletteTooSmall(usize),
    #[error("ビューポートのサイズが不正です: {width}x{height}")]
    DegenerateViewport { width: usize, height: usize },
    #[error("タイル分割数が不正です: {rows}x{columns}")]
    InvalidGrid { rows: usize, columns: usize },
    #[error("精度の桁数が不正です: {0}")]
    InvalidPrecision(u32),
    #[error("ズーム係数が不正です: {0}")]
    InvalidScaleFactor(f64),
    #[error("数値を解析できません: {text:?} ({reason})")]
    InvalidNumber { text: String, reason: String },
    #[error("ワーカープールは停止しています")]
    PoolStopped,
    #[error("ワーカースレッドを起動できません: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("ファイルを読み込めません: {0}")]
    Io(#[from] std::io::Error),
    #[error("設定ファイルを解析できません: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("画像を保存できません: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, FractalError>;
