//! 設定
//!
//! TOML ファイルから読み込む。省略した項目は既定値になる。

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::common::colors::Palette;
use crate::common::constants::*;
use crate::common::real::{parse_float, Precision};
use crate::error::{FractalError, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub view: ViewConfig,
    pub render: RenderConfig,
    pub engine: EngineConfig,
    pub palette: Palette,
}

/// 表示範囲
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub width: usize,
    pub height: usize,
    /// 中心座標（10進文字列、座標精度で解釈する）
    pub center_x: String,
    pub center_y: String,
    pub zoom: u32,
    pub scale_factor: f64,
    pub pan_speed: f64,
    /// 座標を保持する10進桁数
    pub coordinate_digits: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            center_x: "0.0".to_string(),
            center_y: "0.0".to_string(),
            zoom: 0,
            scale_factor: SCALE_FACTOR,
            pan_speed: PAN_SPEED,
            coordinate_digits: COORDINATE_DIGITS,
        }
    }
}

/// 計算
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub max_iterations: u32,
    pub precision: Precision,
    /// 高精度モードに切り替えるときの桁数
    pub extended_digits: u32,
    /// ズーム倍率に応じて計算モードを自動で切り替える
    pub auto_precision: bool,
    pub auto_precision_threshold: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITER,
            precision: Precision::Double,
            extended_digits: EXTENDED_DIGITS,
            auto_precision: false,
            auto_precision_threshold: PRECISION_THRESHOLD,
        }
    }
}

/// タイルの配布順
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrder {
    /// 画面中心に近いタイルから
    #[default]
    CenterOut,
    /// 左下から行順
    Raster,
}

/// ワーカープールとタイル分割
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 0 なら論理CPU数
    pub workers: usize,
    pub grid_rows: usize,
    pub grid_columns: usize,
    /// 0 ならタイル数の2倍
    pub queue_capacity: usize,
    pub order: DispatchOrder,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: WORKER_COUNT,
            grid_rows: GRID_ROWS,
            grid_columns: GRID_COLUMNS,
            queue_capacity: 0,
            order: DispatchOrder::CenterOut,
        }
    }
}

impl EngineConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn queue_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            (self.grid_rows * self.grid_columns * 2).max(1)
        } else {
            self.queue_capacity
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_rows == 0 || self.grid_columns == 0 {
            return Err(FractalError::InvalidGrid {
                rows: self.grid_rows,
                columns: self.grid_columns,
            });
        }
        Ok(())
    }
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let view = &self.view;
        if view.width == 0 || view.height == 0 {
            return Err(FractalError::DegenerateViewport {
                width: view.width,
                height: view.height,
            });
        }
        if !view.scale_factor.is_finite() || view.scale_factor <= 0.0 {
            return Err(FractalError::InvalidScaleFactor(view.scale_factor));
        }
        if view.coordinate_digits == 0 {
            return Err(FractalError::InvalidPrecision(0));
        }
        if self.render.extended_digits == 0 {
            return Err(FractalError::InvalidPrecision(0));
        }
        parse_float(&view.center_x, 64)?;
        parse_float(&view.center_y, 64)?;

        self.render.precision.validate()?;
        self.engine.validate()?;
        if self.palette.len() < 2 {
            return Err(FractalError::PaletteTooSmall(self.palette.len()));
        }
        Ok(())
    }

    pub fn log(&self) {
        let auto = if self.render.auto_precision { "有効" } else { "無効" };
        info!(
            "[CONFIG] {}x{}, 最大反復 {}, {}, 自動精度 {}, ワーカー {}, タイル {}x{}, 配布順 {:?}, パレット {}色",
            self.view.width,
            self.view.height,
            self.render.max_iterations,
            self.render.precision,
            auto,
            self.engine.worker_count(),
            self.engine.grid_rows,
            self.engine.grid_columns,
            self.engine.order,
            self.palette.len(),
        );
    }
}
