//! # ferry-format
//!
//! Ferry 容器格式库, 提供封装/解封装框架.
//!
//! 本 crate 对标 FFmpeg 的 libavformat, 负责多媒体容器格式的读写:
//! - [`Demuxer`] / [`Muxer`]: 每种容器格式的读写实现
//! - [`InputContext`] / [`OutputContext`]: 拥有 I/O 与格式实例的句柄,
//!   分别对应 `avformat_open_input` 与 `avformat_alloc_output_context2` 的产物
//! - [`FormatRegistry`]: 格式注册、探测与按文件名猜测输出格式

mod amf;
pub mod codec_id;
pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod input;
pub mod interleave;
pub mod io;
pub mod muxer;
pub mod muxers;
pub mod output;
pub mod packet;
pub mod probe;
pub mod registry;
pub mod stream;

// 重导出常用类型
pub use codec_id::CodecId;
pub use demuxer::Demuxer;
pub use format_id::FormatId;
pub use input::InputContext;
pub use io::IoContext;
pub use muxer::{Muxer, MuxerFlags};
pub use output::{OutputContext, PacketWriteError, WriteStats};
pub use packet::Packet;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream::Stream;

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
    muxers::register_all_muxers(registry);
}

/// 创建已注册全部内置格式的注册表
pub fn default_registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    register_all(&mut registry);
    registry
}
