//! ビューポート（カメラ）モデル
//!
//! 複素平面上の表示範囲を任意精度で保持する。変更はすべて明示的なセッター経由で、
//! 変更があるたびに派生値（表示範囲・1ピクセルあたりの刻み）を計算し直し、
//! `settings_applied` を下ろす。タイルの再計算はスケジューラの仕事。

use std::fmt;

use log::{debug, info};
use rug::{ops::Pow, Float};

use crate::common::colors::Palette;
use crate::common::constants::BASE_RANGE;
use crate::common::real::{digits_to_bits, parse_float, Precision};
use crate::config::Config;
use crate::error::Result;

/// 複素平面上の点
#[derive(Clone, Debug, PartialEq)]
pub struct WorldPoint {
    pub x: Float,
    pub y: Float,
}

impl WorldPoint {
    pub fn new(x: Float, y: Float) -> Self {
        Self { x, y }
    }

    pub fn from_f64(x: f64, y: f64, bits: u32) -> Self {
        Self::new(Float::with_val(bits, x), Float::with_val(bits, y))
    }

    /// 10進文字列から生成する
    pub fn parse(x: &str, y: &str, bits: u32) -> Result<Self> {
        Ok(Self::new(parse_float(x, bits)?, parse_float(y, bits)?))
    }

    pub fn to_f64(&self) -> (f64, f64) {
        (self.x.to_f64(), self.y.to_f64())
    }

    fn zero(bits: u32) -> Self {
        Self::from_f64(0.0, 0.0, bits)
    }

    fn with_prec(&self, bits: u32) -> Self {
        Self::new(Float::with_val(bits, &self.x), Float::with_val(bits, &self.y))
    }

    fn set_prec(&mut self, bits: u32) {
        self.x.set_prec(bits);
        self.y.set_prec(bits);
    }
}

impl fmt::Display for WorldPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_f64();
        write!(f, "({:.6}, {:.6}i)", x, y)
    }
}

/// パン入力（方向は -1, 0, 1）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pan {
    pub dt: f32,
    pub dir_x: i32,
    pub dir_y: i32,
}

/// 表示状態
#[derive(Clone, Debug)]
pub struct Viewport {
    coord_bits: u32,
    scale_factor: Float,
    pan_speed: f64,
    zoom: u32,
    camera: WorldPoint,
    width: usize,
    height: usize,

    scale: Float,
    coord_range: WorldPoint,
    min_coord: WorldPoint,
    max_coord: WorldPoint,
    step_per_pixel: WorldPoint,

    palette: Palette,
    precision: Precision,
    extended_digits: u32,
    auto_precision: bool,
    auto_precision_threshold: f64,
    max_iterations: u32,

    home_camera: WorldPoint,
    home_zoom: u32,

    settings_applied: bool,
}

impl Viewport {
    /// 既定の設定で指定サイズのビューポートを作る
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let mut config = Config::default();
        config.view.width = width;
        config.view.height = height;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let view = &config.view;
        let render = &config.render;
        let bits = digits_to_bits(view.coordinate_digits);
        let camera = WorldPoint::parse(&view.center_x, &view.center_y, bits)?;
        let extended_digits = match render.precision {
            Precision::Extended { digits } => digits,
            Precision::Double => render.extended_digits,
        };

        let mut viewport = Self {
            coord_bits: bits,
            scale_factor: Float::with_val(bits, view.scale_factor),
            pan_speed: view.pan_speed,
            zoom: view.zoom,
            camera: camera.clone(),
            width: view.width,
            height: view.height,
            scale: Float::with_val(bits, 1),
            coord_range: WorldPoint::zero(bits),
            min_coord: WorldPoint::zero(bits),
            max_coord: WorldPoint::zero(bits),
            step_per_pixel: WorldPoint::zero(bits),
            palette: config.palette.clone(),
            precision: render.precision,
            extended_digits,
            auto_precision: render.auto_precision,
            auto_precision_threshold: render.auto_precision_threshold,
            max_iterations: render.max_iterations,
            home_camera: camera,
            home_zoom: view.zoom,
            settings_applied: false,
        };
        viewport.update();
        Ok(viewport)
    }

    // ===== セッター =====

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom.saturating_add(1));
    }

    /// ズーム0より外には出ない
    pub fn zoom_out(&mut self) {
        if self.zoom != 0 {
            self.set_zoom(self.zoom - 1);
        }
    }

    pub fn set_zoom(&mut self, zoom: u32) {
        if zoom != self.zoom {
            self.zoom = zoom;
            self.update();
        }
    }

    /// 画面サイズを更新する（0 は最小化中として許容する）
    pub fn set_screen_size(&mut self, width: usize, height: usize) {
        if width != self.width || height != self.height {
            debug!("ビューポートのサイズ変更: {}x{} → {}x{}", self.width, self.height, width, height);
            self.width = width;
            self.height = height;
            self.update();
        }
    }

    pub fn pan(&mut self, pan: Pan) {
        if pan.dir_x == 0 && pan.dir_y == 0 {
            return;
        }

        let delta = self.pan_speed * pan.dt as f64;
        if delta == 0.0 {
            return;
        }

        let bits = self.coord_bits;
        if pan.dir_x != 0 {
            let shift = delta * pan.dir_x.signum() as f64;
            self.camera.x += Float::with_val(bits, &self.coord_range.x * shift);
        }
        if pan.dir_y != 0 {
            let shift = delta * pan.dir_y.signum() as f64;
            self.camera.y += Float::with_val(bits, &self.coord_range.y * shift);
        }
        self.update();
    }

    /// 画面上のピクセルを新しい中心にする
    ///
    /// `flip_y` は画面の原点が左上のとき（クリック座標）に使う。
    pub fn move_camera_to_pixel(&mut self, x: usize, y: usize, flip_y: bool) {
        if self.is_degenerate() {
            return;
        }

        let bits = self.coord_bits;
        let row = if flip_y { self.height.saturating_sub(y) } else { y };
        let rel_x = Float::with_val(bits, x as f64) / self.width as f64;
        let rel_y = Float::with_val(bits, row as f64) / self.height as f64;

        let target = WorldPoint::new(
            rel_x * &self.coord_range.x + &self.min_coord.x,
            rel_y * &self.coord_range.y + &self.min_coord.y,
        );
        self.set_camera(target);
    }

    pub fn set_camera(&mut self, camera: WorldPoint) {
        let camera = camera.with_prec(self.coord_bits);
        if camera == self.camera {
            return;
        }
        self.camera = camera;
        self.update();
    }

    /// 10進文字列でカメラ位置を指定する
    pub fn set_camera_str(&mut self, x: &str, y: &str) -> Result<()> {
        let camera = WorldPoint::parse(x, y, self.coord_bits)?;
        self.set_camera(camera);
        Ok(())
    }

    pub fn set_palette(&mut self, palette: Palette) {
        if palette != self.palette {
            self.palette = palette;
            self.settings_applied = false;
        }
    }

    pub fn set_precision(&mut self, precision: Precision) -> Result<()> {
        precision.validate()?;
        if precision != self.precision {
            info!("モード切替: {} → {}", self.precision, precision);
            self.precision = precision;
            self.settings_applied = false;
        }
        if let Precision::Extended { digits } = precision {
            self.extended_digits = digits;
            if self.ensure_coordinate_bits(digits_to_bits(digits)) {
                self.update();
            }
        }
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32) {
        if max_iterations != self.max_iterations {
            self.max_iterations = max_iterations;
            self.settings_applied = false;
        }
    }

    pub fn set_auto_precision(&mut self, enabled: bool) {
        if enabled != self.auto_precision {
            self.auto_precision = enabled;
            self.update();
        }
    }

    /// 初期表示に戻す
    pub fn reset(&mut self) {
        let home = self.home_camera.with_prec(self.coord_bits);
        if self.zoom == self.home_zoom && self.camera == home {
            return;
        }
        self.zoom = self.home_zoom;
        self.camera = home;
        self.update();
    }

    pub(crate) fn mark_applied(&mut self) {
        self.settings_applied = true;
    }

    // ===== 参照 =====

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn camera(&self) -> &WorldPoint {
        &self.camera
    }

    pub fn scale(&self) -> &Float {
        &self.scale
    }

    /// 初期表示に対する拡大率
    pub fn magnification(&self) -> f64 {
        self.scale.to_f64().recip()
    }

    pub fn coord_range(&self) -> &WorldPoint {
        &self.coord_range
    }

    pub fn min_coord(&self) -> &WorldPoint {
        &self.min_coord
    }

    pub fn max_coord(&self) -> &WorldPoint {
        &self.max_coord
    }

    pub fn step_per_pixel(&self) -> &WorldPoint {
        &self.step_per_pixel
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn auto_precision(&self) -> bool {
        self.auto_precision
    }

    /// 高精度モードへ切り替えるときに使う桁数
    pub fn extended_digits(&self) -> u32 {
        self.extended_digits
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn coordinate_bits(&self) -> u32 {
        self.coord_bits
    }

    pub fn settings_applied(&self) -> bool {
        self.settings_applied
    }

    /// ピクセル座標（行0が min.y 側）を複素平面上の座標に変換
    pub fn coord_at_pixel(&self, x: usize, y: usize) -> WorldPoint {
        let bits = self.coord_bits;
        WorldPoint::new(
            Float::with_val(bits, &self.step_per_pixel.x * x as f64) + &self.min_coord.x,
            Float::with_val(bits, &self.step_per_pixel.y * y as f64) + &self.min_coord.y,
        )
    }

    // ===== 内部 =====

    fn update(&mut self) {
        self.settings_applied = false;

        self.scale = self.compute_scale();
        if self.auto_precision {
            self.apply_auto_precision();
        }

        let bits = self.coord_bits;
        let half = Float::with_val(bits, &self.scale * (BASE_RANGE / 2.0));
        let mut half_x = half.clone();
        let mut half_y = half;

        // 長辺方向はアスペクト比に合わせて広げる
        if !self.is_degenerate() && self.width != self.height {
            if self.width > self.height {
                half_x *= self.width as f64;
                half_x /= self.height as f64;
            } else {
                half_y *= self.height as f64;
                half_y /= self.width as f64;
            }
        }

        self.min_coord = WorldPoint::new(
            Float::with_val(bits, &self.camera.x - &half_x),
            Float::with_val(bits, &self.camera.y - &half_y),
        );
        self.max_coord = WorldPoint::new(
            Float::with_val(bits, &self.camera.x + &half_x),
            Float::with_val(bits, &self.camera.y + &half_y),
        );
        self.coord_range = WorldPoint::new(
            Float::with_val(bits, &half_x * 2u32),
            Float::with_val(bits, &half_y * 2u32),
        );

        self.step_per_pixel = if self.is_degenerate() {
            WorldPoint::zero(bits)
        } else {
            WorldPoint::new(
                Float::with_val(bits, &self.coord_range.x / self.width as f64),
                Float::with_val(bits, &self.coord_range.y / self.height as f64),
            )
        };
    }

    fn compute_scale(&self) -> Float {
        Float::with_val(self.coord_bits, self.scale_factor.clone().pow(self.zoom))
    }

    fn apply_auto_precision(&mut self) {
        let next = Precision::for_scale(
            &self.scale,
            self.auto_precision_threshold,
            self.extended_digits,
        );
        if let Precision::Extended { digits } = next {
            if self.ensure_coordinate_bits(digits_to_bits(digits)) {
                self.scale = self.compute_scale();
            }
        }
        if next != self.precision {
            info!("モード切替: {} → {}", self.precision, next);
            self.precision = next;
        }
    }

    /// 座標の精度を必要なら引き上げる
    fn ensure_coordinate_bits(&mut self, bits: u32) -> bool {
        if bits <= self.coord_bits {
            return false;
        }

        debug!("座標精度を引き上げ: {} → {} ビット", self.coord_bits, bits);
        self.coord_bits = bits;
        self.scale_factor.set_prec(bits);
        self.camera.set_prec(bits);
        self.home_camera.set_prec(bits);
        true
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "中心: {} | ズーム: {} (x{:.2e}) | {}x{} | {}",
            self.camera,
            self.zoom,
            self.magnification(),
            self.width,
            self.height,
            self.precision
        )
    }
}
