//! マンデルブロ集合計算関数

use super::real::Real;

/// マンデルブロ集合の反復回数を計算
///
/// `z = z^2 + c` を `|z|^2 > 4` になるか `max_iter` に達するまで繰り返す。
/// f64 でも任意精度でも打ち切り条件は同じ。
pub fn escape_time<R: Real>(x0: &R, y0: &R, max_iter: u32) -> u32 {
    let limit = x0.constant(4.0);
    let two = x0.constant(2.0);
    let mut x = x0.constant(0.0);
    let mut y = x0.constant(0.0);

    let mut iteration = 0;
    while iteration != max_iter {
        let xs = x.clone() * x.clone();
        let ys = y.clone() * y.clone();
        if xs.clone() + ys.clone() > limit {
            break;
        }

        let next_x = xs - ys + x0.clone();
        y = two.clone() * x * y + y0.clone();
        x = next_x;
        iteration += 1;
    }

    iteration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::real::BigReal;

    fn big(value: f64) -> BigReal {
        BigReal::with_digits(value, 100)
    }

    #[test]
    fn origin_never_escapes() {
        assert_eq!(escape_time(&0.0, &0.0, 1000), 1000);
    }

    #[test]
    fn period_two_point_stays_bounded() {
        assert_eq!(escape_time(&-1.0, &0.0, 1000), 1000);
    }

    #[test]
    fn outside_points_escape_quickly() {
        // z1 = 2 は |z|^2 = 4 でまだ発散扱いにならない
        assert_eq!(escape_time(&2.0, &0.0, 1000), 2);
        assert_eq!(escape_time(&3.0, &0.0, 1000), 1);
        assert_eq!(escape_time(&0.5, &0.5, 1000), 5);
    }

    #[test]
    fn zero_iterations() {
        assert_eq!(escape_time(&3.0, &3.0, 0), 0);
        assert_eq!(escape_time(&big(3.0), &big(3.0), 0), 0);
    }

    #[test]
    fn double_and_extended_agree() {
        let points = [
            (0.0, 0.0),
            (-1.0, 0.0),
            (2.0, 0.0),
            (0.5, 0.5),
            (-0.2, 0.1),
            (0.1, 0.1),
            (1.0, 1.0),
            (-2.5, 0.75),
            (0.3, -0.9),
        ];
        for (x, y) in points {
            assert_eq!(
                escape_time(&x, &y, 500),
                escape_time(&big(x), &big(y), 500),
                "point ({x}, {y})"
            );
        }
    }
}
