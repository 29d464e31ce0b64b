//! 时间戳重缩放.
//!
//! 对标 FFmpeg libavutil/mathematics 中的 `av_rescale_rnd` / `av_rescale_q_rnd`
//! 与 `av_compare_ts`. 中间结果使用 i128 计算, 不会溢出.

use std::cmp::Ordering;

use crate::rational::Rational;
use crate::timestamp::NOPTS_VALUE;

/// 舍入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// 向零舍入
    Zero,
    /// 远离零舍入
    Inf,
    /// 向负无穷舍入
    Down,
    /// 向正无穷舍入
    Up,
    /// 四舍五入, 恰好一半时远离零
    NearInf,
}

/// 计算 `a * b / c` 并按 `rounding` 舍入
///
/// - `c` 必须为正, `b` 不能为负, 否则返回 `NOPTS_VALUE`
/// - `pass_min_max` 为真时, `i64::MIN` (即 `NOPTS_VALUE`) 与 `i64::MAX` 原样返回
/// - 结果超出 i64 时钳制到 `[i64::MIN + 1, i64::MAX]`, 不会意外变成 `NOPTS_VALUE`
pub fn rescale_rnd(a: i64, b: i64, c: i64, rounding: Rounding, pass_min_max: bool) -> i64 {
    if c <= 0 || b < 0 {
        return NOPTS_VALUE;
    }
    if pass_min_max && (a == i64::MIN || a == i64::MAX) {
        return a;
    }

    let n = i128::from(a) * i128::from(b);
    let d = i128::from(c);
    let q = match rounding {
        Rounding::Zero => n / d,
        Rounding::Inf => {
            if n >= 0 {
                (n + d - 1) / d
            } else {
                (n - d + 1) / d
            }
        }
        Rounding::Down => n.div_euclid(d),
        Rounding::Up => -((-n).div_euclid(d)),
        Rounding::NearInf => {
            let half = d / 2;
            if n >= 0 { (n + half) / d } else { (n - half) / d }
        }
    };

    q.clamp(i128::from(i64::MIN) + 1, i128::from(i64::MAX)) as i64
}

/// 将以 `from` 为时间基的值转换到 `to` 时间基, 指定舍入方式
///
/// 任一时间基无效时返回 `NOPTS_VALUE`.
pub fn rescale_q_rnd(
    a: i64,
    from: Rational,
    to: Rational,
    rounding: Rounding,
    pass_min_max: bool,
) -> i64 {
    if !from.is_valid() || !to.is_valid() {
        return NOPTS_VALUE;
    }
    let b = i64::from(from.num) * i64::from(to.den);
    let c = i64::from(to.num) * i64::from(from.den);
    rescale_rnd(a, b, c, rounding, pass_min_max)
}

/// 将以 `from` 为时间基的值转换到 `to` 时间基 (四舍五入)
pub fn rescale_q(a: i64, from: Rational, to: Rational) -> i64 {
    rescale_q_rnd(a, from, to, Rounding::NearInf, false)
}

/// 精确比较两个不同时间基下的时间戳
///
/// 交叉相乘后比较, 不经过浮点, 也不会丢失精度.
pub fn compare_ts(ts_a: i64, tb_a: Rational, ts_b: i64, tb_b: Rational) -> Ordering {
    let lhs = i128::from(ts_a) * i128::from(tb_a.num) * i128::from(tb_b.den);
    let rhs = i128::from(ts_b) * i128::from(tb_b.num) * i128::from(tb_a.den);
    lhs.cmp(&rhs)
}
