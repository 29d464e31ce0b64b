//! 空封装器.
//!
//! 对标 FFmpeg 的 `null` 输出格式: 不产生任何文件, 丢弃所有数据包.
//! 用于只验证输入可以被完整读取与转封装的场景 (dry run).

use ferry_core::FerryResult;
use log::debug;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::{Muxer, MuxerFlags};
use crate::packet::Packet;
use crate::stream::Stream;

/// 空封装器
pub struct NullMuxer {
    packets: u64,
    bytes: u64,
}

impl NullMuxer {
    /// 创建空封装器 (工厂函数)
    pub fn create() -> FerryResult<Box<dyn Muxer>> {
        Ok(Box::new(Self {
            packets: 0,
            bytes: 0,
        }))
    }
}

impl Muxer for NullMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Null
    }

    fn name(&self) -> &str {
        "null"
    }

    fn flags(&self) -> MuxerFlags {
        MuxerFlags::NO_FILE
    }

    fn write_header(&mut self, _io: &mut IoContext, _streams: &[Stream]) -> FerryResult<()> {
        Ok(())
    }

    fn write_packet(&mut self, _io: &mut IoContext, packet: &Packet) -> FerryResult<()> {
        self.packets += 1;
        self.bytes += packet.size() as u64;
        Ok(())
    }

    fn write_trailer(&mut self, _io: &mut IoContext) -> FerryResult<()> {
        debug!("null: 丢弃 {} 个数据包, 共 {} 字节", self.packets, self.bytes);
        Ok(())
    }
}
