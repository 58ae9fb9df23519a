use std::thread;
use std::time::{Duration, Instant};

use mandelbrot_tiles::common::real::Precision;
use mandelbrot_tiles::compositor::BACKGROUND;
use mandelbrot_tiles::config::{Config, DispatchOrder, EngineConfig};
use mandelbrot_tiles::oneshot::render_blocking;
use mandelbrot_tiles::tile::TileGrid;
use mandelbrot_tiles::{Frame, Pan, Renderer, TickOutcome, Viewport};

fn config(width: usize, height: usize, max_iterations: u32) -> Config {
    let mut config = Config::default();
    config.view.width = width;
    config.view.height = height;
    config.render.max_iterations = max_iterations;
    config.engine = EngineConfig {
        workers: 4,
        grid_rows: 4,
        grid_columns: 5,
        queue_capacity: 0,
        order: DispatchOrder::CenterOut,
    };
    config
}

fn grid(config: &Config) -> TileGrid {
    TileGrid::new(config.engine.grid_rows, config.engine.grid_columns).unwrap()
}

fn run_until_idle(renderer: &mut Renderer, viewport: &mut Viewport) {
    let deadline = Instant::now() + Duration::from_secs(60);
    while renderer.tick(viewport).unwrap() != TickOutcome::Idle {
        assert!(Instant::now() < deadline, "render did not settle");
        thread::sleep(Duration::from_millis(1));
    }
}

fn same_pixels(a: &Frame, b: &Frame) -> bool {
    a.width() == b.width() && a.height() == b.height() && a.pixels() == b.pixels()
}

#[test_log::test]
fn pool_render_matches_rayon_render() {
    let config = config(97, 61, 200);
    let mut viewport = Viewport::from_config(&config).unwrap();
    viewport.set_camera_str("-0.75", "0.1").unwrap();
    viewport.set_zoom(8);

    let reference = render_blocking(&viewport, grid(&config)).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();
    run_until_idle(&mut renderer, &mut viewport);

    assert!(renderer.is_idle(&viewport));
    assert_eq!(renderer.frame().generation(), 1);
    assert!(same_pixels(renderer.frame(), &reference));
}

#[test_log::test]
fn extended_precision_render_matches_rayon_render() {
    let mut config = config(40, 30, 100);
    config.render.precision = Precision::Extended { digits: 30 };
    let mut viewport = Viewport::from_config(&config).unwrap();

    let reference = render_blocking(&viewport, grid(&config)).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();
    run_until_idle(&mut renderer, &mut viewport);
    assert!(same_pixels(renderer.frame(), &reference));
}

#[test_log::test]
fn repeated_identical_changes_start_one_generation() {
    let config = config(64, 64, 100);
    let mut viewport = Viewport::from_config(&config).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();
    run_until_idle(&mut renderer, &mut viewport);
    assert_eq!(renderer.generation(), 1);

    for _ in 0..5 {
        viewport.set_zoom(0);
        viewport.set_screen_size(64, 64);
        viewport.set_max_iterations(100);
        viewport.pan(Pan {
            dt: 0.5,
            dir_x: 0,
            dir_y: 0,
        });
        viewport.reset();
        assert_eq!(renderer.tick(&mut viewport).unwrap(), TickOutcome::Idle);
    }
    assert_eq!(renderer.generation(), 1);

    viewport.set_zoom(3);
    viewport.set_zoom(3);
    run_until_idle(&mut renderer, &mut viewport);
    assert_eq!(renderer.generation(), 2);
}

#[test_log::test]
fn generations_never_interleave() {
    let config = config(80, 60, 3000);
    let mut viewport = Viewport::from_config(&config).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();

    // 計算中に表示を何度も変える
    let mut views = Vec::new();
    for zoom in [0, 4, 9, 2] {
        viewport.set_zoom(zoom);
        views.push(viewport.clone());
        for _ in 0..3 {
            renderer.tick(&mut viewport).unwrap();
            let frame = renderer.frame();
            if frame.generation() > 0 {
                let view = &views[views.len() - 1];
                assert!(frame.generation() as usize <= views.len());
                assert_eq!((frame.width(), frame.height()), (view.width(), view.height()));
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
    run_until_idle(&mut renderer, &mut viewport);

    let reference = render_blocking(&viewport, grid(&config)).unwrap();
    assert!(same_pixels(renderer.frame(), &reference));
}

#[test_log::test]
fn each_generation_shows_only_its_own_view() {
    let config = config(48, 48, 500);
    let mut viewport = Viewport::from_config(&config).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();

    // 世代ごとの正解画像
    let zooms = [0u32, 6, 12];
    let mut references = Vec::new();
    for &zoom in &zooms {
        let mut view = viewport.clone();
        view.set_zoom(zoom);
        references.push(render_blocking(&view, grid(&config)).unwrap());
    }

    let mut step = 0;
    let mut ticks = 0;
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut generation_zoom = Vec::new();
    loop {
        if ticks % 3 == 0 && step < zooms.len() {
            viewport.set_zoom(zooms[step]);
            step += 1;
        }
        ticks += 1;
        let outcome = renderer.tick(&mut viewport).unwrap();
        if outcome == TickOutcome::Started {
            generation_zoom.push(viewport.zoom());
        }

        // 貼られているタイルは、その世代の正解画像と同じピクセルでなければならない
        let frame = renderer.frame();
        if frame.generation() > 0 {
            let zoom = generation_zoom[frame.generation() as usize - 1];
            let index = zooms.iter().position(|&z| z == zoom).unwrap();
            let reference = &references[index];
            for (pixel, expected) in frame.pixels().iter().zip(reference.pixels()) {
                assert!(*pixel == *expected || *pixel == BACKGROUND);
            }
        }

        if step == zooms.len() && outcome == TickOutcome::Idle {
            break;
        }
        assert!(Instant::now() < deadline, "render did not settle");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(same_pixels(renderer.frame(), references.last().unwrap()));
}

#[test_log::test]
fn minimised_window_waits_then_resumes() {
    let config = config(50, 40, 50);
    let mut viewport = Viewport::from_config(&config).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();
    run_until_idle(&mut renderer, &mut viewport);

    viewport.set_screen_size(0, 0);
    assert!(viewport.is_degenerate());
    assert_eq!(renderer.tick(&mut viewport).unwrap(), TickOutcome::Waiting);
    assert_eq!(renderer.tick(&mut viewport).unwrap(), TickOutcome::Waiting);
    assert_eq!(renderer.generation(), 1);

    viewport.set_screen_size(30, 20);
    run_until_idle(&mut renderer, &mut viewport);
    assert_eq!(renderer.generation(), 2);
    assert_eq!((renderer.frame().width(), renderer.frame().height()), (30, 20));
}

#[test_log::test]
fn dropping_renderer_mid_render_is_prompt() {
    let mut config = config(200, 200, 1_000_000);
    config.engine.workers = 2;
    let mut viewport = Viewport::from_config(&config).unwrap();
    let mut renderer = Renderer::new(&config.engine, &viewport).unwrap();
    assert_eq!(renderer.tick(&mut viewport).unwrap(), TickOutcome::Started);
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    drop(renderer);
    assert!(started.elapsed() < Duration::from_secs(10));
}
