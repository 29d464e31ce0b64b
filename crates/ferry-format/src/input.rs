//! 输入上下文.
//!
//! 对标 FFmpeg `avformat_open_input` + `avformat_find_stream_info` 的产物:
//! 拥有输入 I/O 与解封装器实例, 按顺序读出数据包.

use std::path::{Path, PathBuf};

use ferry_core::{FerryError, FerryResult, Timestamp};
use log::debug;

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::registry::FormatRegistry;
use crate::stream::{Stream, StreamParams};

/// 输入上下文
pub struct InputContext {
    path: PathBuf,
    io: IoContext,
    demuxer: Box<dyn Demuxer>,
}

impl InputContext {
    /// 打开输入文件: 探测格式并解析容器头部
    pub fn open(path: &Path, registry: &FormatRegistry) -> FerryResult<Self> {
        let io = IoContext::open_read(path)?;
        let filename = path.to_str();
        Self::open_io(io, filename, registry).map(|mut ctx| {
            ctx.path = path.to_path_buf();
            ctx
        })
    }

    /// 从已有 I/O 打开输入
    pub fn open_io(
        mut io: IoContext,
        filename: Option<&str>,
        registry: &FormatRegistry,
    ) -> FerryResult<Self> {
        let probe = registry.probe_input(&mut io, filename)?;
        let mut demuxer = registry.create_demuxer(probe.format_id)?;
        demuxer.open(&mut io)?;
        debug!(
            "打开输入: {} ({} 条流)",
            demuxer.name(),
            demuxer.streams().len()
        );
        Ok(Self {
            path: PathBuf::from(filename.unwrap_or_default()),
            io,
            demuxer,
        })
    }

    /// 输入路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 输入格式
    pub fn format_id(&self) -> FormatId {
        self.demuxer.format_id()
    }

    /// 解封装器名称
    pub fn format_name(&self) -> &str {
        self.demuxer.name()
    }

    /// 流列表
    pub fn streams(&self) -> &[Stream] {
        self.demuxer.streams()
    }

    /// 按索引获取流
    pub fn stream(&self, index: usize) -> FerryResult<&Stream> {
        self.streams()
            .get(index)
            .ok_or(FerryError::StreamNotFound(index))
    }

    /// 总时长 (秒)
    pub fn duration(&self) -> Option<f64> {
        self.demuxer.duration()
    }

    /// 容器级元数据
    pub fn metadata(&self) -> &[(String, String)] {
        self.demuxer.metadata()
    }

    /// 读取下一个数据包, 文件结束时返回 `FerryError::Eof`
    pub fn read_packet(&mut self) -> FerryResult<Packet> {
        self.demuxer.read_packet(&mut self.io)
    }

    /// 以 debug 级别输出流布局 (对标 `av_dump_format`)
    pub fn dump(&self) {
        debug!(
            "输入 '{}': 格式 {}, 时长 {}",
            self.path.display(),
            self.format_name(),
            self.duration()
                .map_or_else(|| "N/A".to_string(), |d| format!("{d:.3}s"))
        );
        for (key, value) in self.metadata() {
            debug!("  {key}: {value}");
        }
        for stream in self.streams() {
            let duration = Timestamp::new(stream.duration, stream.time_base);
            let detail = match &stream.params {
                StreamParams::Audio(a) => format!(
                    "{} Hz, {} 声道, {} bit",
                    a.sample_rate, a.channels, a.bits_per_sample
                ),
                StreamParams::Video(v) => format!("{}x{}", v.width, v.height),
                StreamParams::Other => String::new(),
            };
            debug!(
                "  流 #{}: {} {} ({}), 时间基 {}, 时长 {}",
                stream.index, stream.media_type, stream.codec_id, detail, stream.time_base, duration
            );
        }
    }
}
