//! マンデルブロ集合インタラクティブビューア (タイル並列版)
//!
//! 画面をタイルに分けてワーカースレッドで計算し、できたタイルから順に表示する。
//! 操作すると計算中のタイルはキャンセルされ、新しい表示範囲で計算し直す。
//!
//! 操作方法:
//!   - W / A / S / D キー: 移動（パン）
//!   - E / Q キー、マウスホイール: 拡大/縮小
//!   - 左クリック: クリック位置を中心にする
//!   - P キー: 高速 (f64) / 高精度 (任意精度) の切り替え（自動切替は解除）
//!   - R キー: 初期表示にリセット
//!   - F12 キー: 現在の表示を画像として保存
//!   - Escape キー: 終了

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use mandelbrot_tiles::common::real::Precision;
use mandelbrot_tiles::{Config, Pan, Renderer, Viewport};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 設定ファイル (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ワーカースレッド数（0 で論理CPU数）
    #[arg(long)]
    workers: Option<usize>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }
    Ok(config)
}

fn keyboard_pan(window: &Window, dt: f32) -> Pan {
    let axis = |negative: Key, positive: Key| {
        window.is_key_down(positive) as i32 - window.is_key_down(negative) as i32
    };
    Pan {
        dt,
        dir_x: axis(Key::A, Key::D),
        dir_y: axis(Key::S, Key::W),
    }
}

fn toggle_precision(viewport: &mut Viewport) -> Result<()> {
    viewport.set_auto_precision(false);
    let next = if viewport.precision().is_extended() {
        Precision::Double
    } else {
        Precision::extended(viewport.extended_digits())?
    };
    viewport.set_precision(next)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    config.log();

    let mut viewport = Viewport::from_config(&config)?;
    let mut renderer = Renderer::new(&config.engine, &viewport)?;
    info!("ワーカー {} スレッドで開始 [{}]", renderer.worker_count(), viewport);

    let mut window = Window::new(
        "マンデルブロ集合 (タイル並列版)",
        viewport.width(),
        viewport.height(),
        WindowOptions {
            resize: true,
            ..WindowOptions::default()
        },
    )
    .context("ウィンドウの作成に失敗しました")?;
    window.set_target_fps(60);

    let mut display: Vec<u32> = Vec::new();
    let mut prev_scroll: Option<(f32, f32)> = None;
    let mut prev_left_down = false;
    let mut last_frame = Instant::now();
    let mut save_counter = 0u32;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let dt = last_frame.elapsed().as_secs_f32();
        last_frame = Instant::now();

        // ===== 入力 =====
        let (window_width, window_height) = window.get_size();
        viewport.set_screen_size(window_width, window_height);

        viewport.pan(keyboard_pan(&window, dt));
        if window.is_key_pressed(Key::E, KeyRepeat::Yes) {
            viewport.zoom_in();
        }
        if window.is_key_pressed(Key::Q, KeyRepeat::Yes) {
            viewport.zoom_out();
        }
        if window.is_key_pressed(Key::R, KeyRepeat::No) {
            viewport.reset();
            info!("リセット");
        }
        if window.is_key_pressed(Key::P, KeyRepeat::No) {
            toggle_precision(&mut viewport)?;
        }

        if let Some(scroll) = window.get_scroll_wheel() {
            if prev_scroll != Some(scroll) {
                if scroll.1 > 0.0 {
                    viewport.zoom_in();
                } else if scroll.1 < 0.0 {
                    viewport.zoom_out();
                }
                prev_scroll = Some(scroll);
            }
        } else {
            prev_scroll = None;
        }

        // 押した瞬間のみ
        let left_down = window.get_mouse_down(MouseButton::Left);
        if left_down && !prev_left_down {
            if let Some((mx, my)) = window.get_mouse_pos(MouseMode::Discard) {
                viewport.move_camera_to_pixel(mx as usize, my as usize, true);
            }
        }
        prev_left_down = left_down;

        // ===== 計算と表示 =====
        renderer.tick(&mut viewport)?;

        if let Some(report) = renderer.take_previous_generation() {
            let title = format!(
                "マンデルブロ集合 [{}] x{:.2e} | {:.2?}",
                viewport.precision(),
                viewport.magnification(),
                report.wall_time
            );
            window.set_title(&title);
        }

        if window.is_key_pressed(Key::F12, KeyRepeat::No) {
            save_counter += 1;
            let filename = format!("mandelbrot_{:03}.png", save_counter);
            if let Err(err) = renderer.frame().save_png(&filename) {
                warn!("画像の保存に失敗しました: {err}");
            }
        }

        let frame = renderer.frame();
        if frame.is_empty() {
            // 最小化中
            window.update();
            continue;
        }
        frame.write_top_down(&mut display);
        window
            .update_with_buffer(&display, frame.width(), frame.height())
            .context("ウィンドウの更新に失敗しました")?;
    }

    info!("終了 [{}]", viewport);
    Ok(())
}
