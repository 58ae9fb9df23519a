//! 計算精度の抽象化
//!
//! f64 と rug の任意精度浮動小数点を同じ演算インターフェースで扱う。
//! 精度はタイル単位で選ぶので、カーネルはジェネリクスで単相化される。

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use rug::Float;
use serde::{Deserialize, Serialize};

use crate::common::constants::MAX_PRECISION;
use crate::error::{FractalError, Result};

/// 10進1桁あたりのビット数 (log2(10))
const BITS_PER_DIGIT: f64 = std::f64::consts::LOG2_10;

/// カーネルが要求する数値型
pub trait Real:
    Clone
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    /// 自身と同じ精度の定数を作る
    fn constant(&self, value: f64) -> Self;

    fn to_f64(&self) -> f64;
}

impl Real for f64 {
    #[inline]
    fn constant(&self, value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(&self) -> f64 {
        *self
    }
}

/// 10進桁数を rug の精度（ビット）に換算
pub fn digits_to_bits(digits: u32) -> u32 {
    let bits = (digits as f64 * BITS_PER_DIGIT).ceil() as u32;
    bits.clamp(rug::float::prec_min(), rug::float::prec_max())
}

/// ビット数を10進桁数に換算（切り上げ）
pub fn bits_to_digits(bits: u32) -> u32 {
    (bits as f64 / BITS_PER_DIGIT).ceil() as u32
}

/// 任意精度の実数
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct BigReal(Float);

impl BigReal {
    pub fn with_digits(value: f64, digits: u32) -> Self {
        Self(Float::with_val(digits_to_bits(digits), value))
    }

    /// 10進文字列から指定桁数で生成する
    pub fn parse(text: &str, digits: u32) -> Result<Self> {
        Ok(Self(parse_float(text, digits_to_bits(digits))?))
    }

    pub fn from_float(value: Float) -> Self {
        Self(value)
    }

    pub fn precision_bits(&self) -> u32 {
        self.0.prec()
    }
}

/// 10進文字列を指定ビット精度の Float に変換する
pub fn parse_float(text: &str, bits: u32) -> Result<Float> {
    let parsed = Float::parse(text.trim()).map_err(|err| FractalError::InvalidNumber {
        text: text.to_string(),
        reason: err.to_string(),
    })?;
    Ok(Float::with_val(bits, parsed))
}

impl Add for BigReal {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for BigReal {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul for BigReal {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl Div for BigReal {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self(self.0 / rhs.0)
    }
}

impl Real for BigReal {
    fn constant(&self, value: f64) -> Self {
        Self(Float::with_val(self.0.prec(), value))
    }

    fn to_f64(&self) -> f64 {
        self.0.to_f64()
    }
}

impl fmt::Display for BigReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 計算モード
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Precision {
    /// f64 による高速計算
    #[default]
    Double,
    /// rug による任意精度計算（10進桁数）
    Extended { digits: u32 },
}

impl Precision {
    pub fn extended(digits: u32) -> Result<Self> {
        if digits == 0 {
            return Err(FractalError::InvalidPrecision(digits));
        }
        Ok(Precision::Extended { digits })
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Precision::Extended { digits: 0 } => Err(FractalError::InvalidPrecision(0)),
            _ => Ok(()),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, Precision::Extended { .. })
    }

    /// 表示スケール（ズーム0に対する縮尺）に応じた計算モードを選ぶ
    ///
    /// 倍率 `1 / scale` が閾値を超えたら任意精度に切り替え、深くなるほど桁数を増やす。
    /// 必要ビット数は 2 のべき乗に丸めて `MAX_PRECISION` で頭打ちにする。
    /// 倍率は f64 に収まらないことがあるので、rug のまま log2 を取る。
    pub fn for_scale(scale: &Float, threshold: f64, min_digits: u32) -> Self {
        let magnification_log2 = -Float::with_val(53, scale.log2_ref()).to_f64();
        if magnification_log2.is_nan() || magnification_log2 <= threshold.log2() {
            return Precision::Double;
        }

        // f64 → u32 の変換は飽和する
        let required_bits = ((magnification_log2 * 3.5) as u32)
            .saturating_add(64)
            .min(MAX_PRECISION)
            .next_power_of_two();
        Precision::Extended {
            digits: bits_to_digits(required_bits).max(min_digits),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Double => write!(f, "高速 (f64)"),
            Precision::Extended { digits } => write!(f, "高精度 ({}桁)", digits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rug::ops::Pow;

    #[test]
    fn digits_round_up_to_bits() {
        assert_eq!(digits_to_bits(1), 4);
        assert_eq!(digits_to_bits(100), 333);
        assert!(bits_to_digits(digits_to_bits(64)) >= 64);
    }

    #[test]
    fn parse_keeps_requested_precision() {
        let value = BigReal::parse(" -0.7436438870371587 ", 100).unwrap();
        assert_eq!(value.precision_bits(), digits_to_bits(100));
        assert!((value.to_f64() + 0.7436438870371587).abs() < 1e-16);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = BigReal::parse("1.2.3", 50).unwrap_err();
        assert!(matches!(err, FractalError::InvalidNumber { .. }));
    }

    #[test]
    fn comparisons_are_exact() {
        let one = BigReal::with_digits(1.0, 100);
        let tiny = BigReal::parse("1e-90", 100).unwrap();
        let sum = one.clone() + tiny;
        assert!(sum > one);
        assert_ne!(sum, one);
        // f64 では同じ値に潰れる
        assert_eq!(sum.to_f64(), 1.0);
    }

    #[test]
    fn constant_inherits_precision() {
        let x = BigReal::with_digits(0.5, 64);
        assert_eq!(x.constant(4.0).precision_bits(), x.precision_bits());
    }

    #[test]
    fn zero_digits_is_rejected() {
        assert!(Precision::extended(0).is_err());
        assert!(Precision::Extended { digits: 0 }.validate().is_err());
        assert!(Precision::extended(80).unwrap().validate().is_ok());
    }

    fn scale(value: f64) -> Float {
        Float::with_val(64, value)
    }

    #[test]
    fn scale_selects_mode() {
        assert_eq!(Precision::for_scale(&scale(1e-6), 1e13, 100), Precision::Double);
        match Precision::for_scale(&scale(1e-20), 1e13, 10) {
            Precision::Extended { digits } => assert!(digits >= 39),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            Precision::for_scale(&scale(1e-14), 1e13, 100),
            Precision::Extended { digits: 100 }
        );
    }

    #[test]
    fn scale_below_f64_range_is_capped() {
        // 0.95^20000 は f64 では 0 になる
        let tiny = Float::with_val(64, 0.95).pow(20_000u32);
        assert_eq!(tiny.to_f64(), 0.0);
        assert_eq!(
            Precision::for_scale(&tiny, 1e13, 100),
            Precision::Extended {
                digits: bits_to_digits(MAX_PRECISION)
            }
        );
    }
}
