//! 封装器 (Muxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVOutputFormat`, 定义了将数据包写入容器格式的接口.

use bitflags::bitflags;
use ferry_core::FerryResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::stream::Stream;

bitflags! {
    /// 封装器能力标志, 对标 `AVFMT_*`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MuxerFlags: u32 {
        /// 不需要输出文件 (对标 `AVFMT_NOFILE`), 由封装器自行处理 I/O
        const NO_FILE = 1 << 0;
        /// 容器只支持单条流
        const SINGLE_STREAM = 1 << 1;
    }
}

/// 封装器 trait
///
/// 使用流程:
/// 1. 对每条输出流调用 `init_stream()`, 由封装器决定其时间基
/// 2. 调用 `write_header()` 写入容器头部
/// 3. 循环调用 `write_packet()` 写入数据包 (时间戳已是输出流时间基)
/// 4. 调用 `write_trailer()` 写入容器尾部, 回填头部中的大小/时长字段
pub trait Muxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 能力标志
    fn flags(&self) -> MuxerFlags {
        MuxerFlags::empty()
    }

    /// 初始化一条输出流, 可改写其时间基
    ///
    /// 默认保留输入流的时间基.
    fn init_stream(&self, _stream: &mut Stream) -> FerryResult<()> {
        Ok(())
    }

    /// 写入容器头部
    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> FerryResult<()>;

    /// 写入一个数据包
    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> FerryResult<()>;

    /// 写入容器尾部, 完成封装
    fn write_trailer(&mut self, io: &mut IoContext) -> FerryResult<()>;
}
