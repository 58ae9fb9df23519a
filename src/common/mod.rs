//! 計算カーネルと色・精度の共通部品

pub mod colors;
pub mod constants;
pub mod mandelbrot;
pub mod real;
