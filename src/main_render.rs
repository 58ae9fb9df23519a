//! マンデルブロ集合を1枚描画して PNG に保存する
//!
//! ウィンドウは開かない。既定ではビューアと同じワーカープールで計算し、
//! `--direct` を付けると rayon で一括計算する。

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use mandelbrot_tiles::common::real::Precision;
use mandelbrot_tiles::oneshot::render_blocking;
use mandelbrot_tiles::tile::TileGrid;
use mandelbrot_tiles::{Config, Renderer, TickOutcome, Viewport};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 出力ファイル
    #[arg(short, long, default_value = "mandelbrot.png")]
    output: PathBuf,

    /// 設定ファイル (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<usize>,

    #[arg(long)]
    height: Option<usize>,

    /// 中心の実部（10進）
    #[arg(long, allow_hyphen_values = true)]
    center_x: Option<String>,

    /// 中心の虚部（10進）
    #[arg(long, allow_hyphen_values = true)]
    center_y: Option<String>,

    #[arg(short, long)]
    zoom: Option<u32>,

    #[arg(long)]
    max_iterations: Option<u32>,

    /// 任意精度で計算する桁数
    #[arg(long)]
    digits: Option<u32>,

    /// ワーカープールを使わず rayon で計算する
    #[arg(long)]
    direct: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(width) = self.width {
            config.view.width = width;
        }
        if let Some(height) = self.height {
            config.view.height = height;
        }
        if let Some(x) = &self.center_x {
            config.view.center_x = x.clone();
        }
        if let Some(y) = &self.center_y {
            config.view.center_y = y.clone();
        }
        if let Some(zoom) = self.zoom {
            config.view.zoom = zoom;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.render.max_iterations = max_iterations;
        }
        if let Some(digits) = self.digits {
            config.render.precision = Precision::extended(digits)?;
            config.render.auto_precision = false;
        }
        config.validate()?;
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config).context("引数が不正です")?;
    config.log();

    let mut viewport = Viewport::from_config(&config)?;
    info!("描画開始 [{}]", viewport);
    let start = Instant::now();

    let frame = if args.direct {
        let grid = TileGrid::new(config.engine.grid_rows, config.engine.grid_columns)?;
        render_blocking(&viewport, grid)?
    } else {
        let mut renderer = Renderer::new(&config.engine, &viewport)?;
        loop {
            if renderer.tick(&mut viewport)? == TickOutcome::Idle {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        renderer.frame().clone()
    };

    info!("描画完了: {:.2?}", start.elapsed());
    frame
        .save_png(&args.output)
        .with_context(|| format!("画像を保存できません: {}", args.output.display()))?;
    Ok(())
}
