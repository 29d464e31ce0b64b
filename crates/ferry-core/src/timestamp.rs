//! 时间戳类型, 用于表示媒体流中的时间点.
//!
//! 对标 FFmpeg 中基于 `time_base` 的时间戳系统.

use std::fmt;

use crate::rational::Rational;
use crate::rescale::rescale_q;

/// 表示"未定义"的时间戳值, 对标 `AV_NOPTS_VALUE`
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 带时间基的时间戳
///
/// 实际时间 (秒) = value * time_base.num / time_base.den.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 时间戳值, `NOPTS_VALUE` 表示未定义
    pub value: i64,
    /// 时间基
    pub time_base: Rational,
}

impl Timestamp {
    /// 创建新的时间戳
    pub const fn new(value: i64, time_base: Rational) -> Self {
        Self { value, time_base }
    }

    /// 是否有效
    pub const fn is_valid(&self) -> bool {
        self.value != NOPTS_VALUE && self.time_base.is_valid()
    }

    /// 重缩放到新的时间基
    pub fn rescale(&self, time_base: Rational) -> Self {
        if !self.is_valid() {
            return Self::new(NOPTS_VALUE, time_base);
        }
        Self::new(rescale_q(self.value, self.time_base, time_base), time_base)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "N/A");
        }
        let total_ms = self.rescale(Rational::MILLI).value;
        let sign = if total_ms < 0 { "-" } else { "" };
        let ms = total_ms.unsigned_abs();
        write!(
            f,
            "{sign}{:02}:{:02}:{:02}.{:03}",
            ms / 3_600_000,
            ms / 60_000 % 60,
            ms / 1000 % 60,
            ms % 1000
        )
    }
}
