//! # Ferry
//!
//! 纯 Rust 实现的流式媒体重封装引擎.
//!
//! Ferry 不解码也不重新编码, 只把压缩后的数据包从一种容器原样搬运到另一种容器:
//! - **解封装**: WAV, FLV
//! - **封装**: WAV, FLV, null (丢弃输出, 用于校验)
//! - **转封装任务**: 时间基换算, 进度回调, 取消, 后台线程执行
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ferry::remux::{Progress, RemuxJob};
//!
//! let mut job = RemuxJob::create("input.flv", "output.wav")?;
//! let summary = job.process_with(|percent| {
//!     println!("进度: {percent:.1}%");
//!     Progress::Continue
//! })?;
//! println!("结束原因: {:?}", summary.end);
//! # Ok::<(), ferry::remux::RemuxError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ferry-core` | 核心类型与工具 |
//! | `ferry-format` | 容器格式框架 |
//! | `ferry-remux` | 转封装任务 |

/// 核心类型与工具 (时间基, 时间戳换算, 错误类型)
pub use ferry_core as core;

/// 容器格式框架 (解封装器, 封装器, 格式注册表)
pub use ferry_format as format;

/// 转封装任务
pub use ferry_remux as remux;

/// 获取 Ferry 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> ferry_format::FormatRegistry {
    ferry_format::default_registry()
}
