//! # ferry-remux
//!
//! Ferry 转封装引擎.
//!
//! [`RemuxJob`] 独占一个输入上下文与一个输出上下文, 负责
//! 打开 → 流映射 → 数据包搬运 → 写尾部 → 释放 的完整流程.
//! 数据包只做时间基换算, 负载原样写出.
//!
//! ```no_run
//! use ferry_remux::{Progress, RemuxJob};
//!
//! let mut job = RemuxJob::create("input.wav", "output.flv")?;
//! let summary = job.process_with(|percent| {
//!     println!("{percent:.1}%");
//!     Progress::Continue
//! })?;
//! println!("写出 {} 个数据包", summary.packets_written);
//! # Ok::<(), ferry_remux::RemuxError>(())
//! ```

mod error;
mod job;
mod options;
mod progress;
mod worker;

pub use error::RemuxError;
pub use job::{LoopEnd, RemuxJob, RemuxSummary};
pub use options::{DEFAULT_PROGRESS_INTERVAL, RemuxOptions};
pub use progress::Progress;
pub use worker::{RemuxEvent, RemuxHandle, spawn};
