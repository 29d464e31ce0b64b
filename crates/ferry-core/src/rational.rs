//! 有理数类型, 用于表示时间基 (time_base) 与帧率.
//!
//! 对标 FFmpeg 的 `AVRational`.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 转封装中主要用作时间基: 时间戳 `ts` 对应的秒数为 `ts * num / den`.
/// 例如 FLV 的时间基为 1/1000, 44.1kHz 的 WAV 为 1/44100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 毫秒时间基 (1/1_000)
    pub const MILLI: Self = Self { num: 1, den: 1_000 };

    /// 微秒时间基 (1/1_000_000), 对标 `AV_TIME_BASE_Q`
    pub const MICRO: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// 是否可用作时间基 (分子分母均为正)
    pub const fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    /// 转换为 f64, 分母为 0 时返回 NaN
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_validity() {
        assert!(Rational::MILLI.is_valid());
        assert!(!Rational::UNDEFINED.is_valid());
        assert!(!Rational::new(1, -1000).is_valid());
        assert!(Rational::UNDEFINED.to_f64().is_nan());
    }

    #[test]
    fn test_rational_display() {
        assert_eq!(Rational::new(1, 44100).to_string(), "1/44100");
        assert_eq!(Rational::new(30000, 1001).to_string(), "30000/1001");
    }
}
