//! # ferry-core
//!
//! Ferry 转封装引擎核心库, 提供基础类型定义、错误处理和时间基运算.
//!
//! 本 crate 对标 FFmpeg 的 libavutil 中与转封装相关的部分.

pub mod error;
pub mod media_type;
pub mod rational;
pub mod rescale;
pub mod timestamp;

// 重导出常用类型
pub use error::{FerryError, FerryResult};
pub use media_type::MediaType;
pub use rational::Rational;
pub use rescale::{Rounding, compare_ts, rescale_q, rescale_q_rnd, rescale_rnd};
pub use timestamp::{NOPTS_VALUE, Timestamp};
