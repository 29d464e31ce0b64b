//! 输出上下文.
//!
//! 对标 FFmpeg 的 `AVFormatContext` (输出侧): 拥有封装器实例、输出流列表、
//! 可选的输出 I/O 以及交错队列. 生命周期:
//! `create` → `add_stream`* → `open_file` → `write_header` →
//! `write_interleaved`* → `write_trailer` → `close` (Drop 时自动执行).

use std::path::{Path, PathBuf};

use ferry_core::{FerryError, FerryResult, NOPTS_VALUE, rescale_q};
use log::{debug, warn};
use thiserror::Error;

use crate::format_id::FormatId;
use crate::interleave::Interleaver;
use crate::io::IoContext;
use crate::muxer::{Muxer, MuxerFlags};
use crate::packet::Packet;
use crate::registry::FormatRegistry;
use crate::stream::Stream;

/// 单个数据包写入失败的分类
///
/// `CorruptSource` 与 `InvalidArgument` 只影响当前数据包, 调用方可以丢弃后继续;
/// `Fatal` 表示输出已不可用.
#[derive(Debug, Error)]
pub enum PacketWriteError {
    /// 数据包内容无效 (如负载为空、不满足容器的对齐要求)
    #[error("数据包内容无效: {0}")]
    CorruptSource(String),

    /// 数据包参数无效 (如流索引越界、时间戳倒退)
    #[error("数据包参数无效: {0}")]
    InvalidArgument(String),

    /// 不可恢复的错误 (如 I/O 失败)
    #[error(transparent)]
    Fatal(FerryError),
}

impl PacketWriteError {
    /// 是否可以丢弃当前数据包后继续
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

impl From<FerryError> for PacketWriteError {
    fn from(err: FerryError) -> Self {
        match err {
            FerryError::InvalidData(msg) => Self::CorruptSource(msg),
            FerryError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            other => Self::Fatal(other),
        }
    }
}

/// 封装器实际处理的数据包统计
///
/// 交错队列会延后写出, 因此某个数据包被封装器拒绝时, 往往已经不是调用方刚交给
/// `write_interleaved` 的那一个. 这里按真正交给封装器的数据包计数.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// 封装器接受的数据包数
    pub written: u64,
    /// 封装器以可恢复错误拒绝的数据包数
    pub dropped: u64,
}

/// 写入阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Setup,
    HeaderWritten,
    TrailerWritten,
}

/// 输出上下文
pub struct OutputContext {
    path: PathBuf,
    format_id: FormatId,
    muxer: Box<dyn Muxer>,
    /// 输出 I/O; NO_FILE 格式在创建时即持有空输出
    io: Option<IoContext>,
    streams: Vec<Stream>,
    interleaver: Interleaver,
    /// 每条流最近写入的 DTS
    last_dts: Vec<i64>,
    stats: WriteStats,
    state: WriteState,
    closed: bool,
}

impl OutputContext {
    /// 根据输出文件名猜测格式并创建输出上下文
    ///
    /// 此时还不会创建输出文件, 见 [`OutputContext::open_file`].
    pub fn create(path: &Path, registry: &FormatRegistry) -> FerryResult<Self> {
        let format_id = registry.guess_output_format(path)?;
        Self::create_with_format(path, format_id, registry)
    }

    /// 以指定格式创建输出上下文
    pub fn create_with_format(
        path: &Path,
        format_id: FormatId,
        registry: &FormatRegistry,
    ) -> FerryResult<Self> {
        let muxer = registry.create_muxer(format_id)?;
        let io = if muxer.flags().contains(MuxerFlags::NO_FILE) {
            Some(IoContext::null())
        } else {
            None
        };
        debug!("创建输出: {} (格式 {})", path.display(), muxer.name());
        Ok(Self {
            path: path.to_path_buf(),
            format_id,
            muxer,
            io,
            streams: Vec::new(),
            interleaver: Interleaver::new(Vec::new()),
            last_dts: Vec::new(),
            stats: WriteStats::default(),
            state: WriteState::Setup,
            closed: false,
        })
    }

    /// 输出路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 输出格式
    pub fn format_id(&self) -> FormatId {
        self.format_id
    }

    /// 封装器名称
    pub fn format_name(&self) -> &str {
        self.muxer.name()
    }

    /// 封装器标志
    pub fn flags(&self) -> MuxerFlags {
        self.muxer.flags()
    }

    /// 是否需要输出文件
    pub fn needs_file(&self) -> bool {
        !self.flags().contains(MuxerFlags::NO_FILE)
    }

    /// 输出流列表 (写头部后时间基为封装器选定的值)
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// 封装器已处理的数据包统计
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// 以输入流为模板新增一条输出流
    ///
    /// 复制媒体类型、编解码参数、私有数据与元数据, 容器相关的 `codec_tag` 置 0.
    pub fn add_stream(&mut self, template: &Stream) -> FerryResult<&mut Stream> {
        if self.state != WriteState::Setup {
            return Err(FerryError::Internal("写入头部后不能再新增流".into()));
        }
        if self.flags().contains(MuxerFlags::SINGLE_STREAM) && !self.streams.is_empty() {
            return Err(FerryError::Unsupported(format!(
                "{} 只支持一条流",
                self.muxer.name()
            )));
        }
        let mut stream = template.clone();
        stream.index = self.streams.len();
        stream.codec_tag = 0;
        self.streams.push(stream);
        let last = self.streams.len() - 1;
        Ok(&mut self.streams[last])
    }

    /// 创建 (或截断) 输出文件; NO_FILE 格式无操作
    pub fn open_file(&mut self) -> FerryResult<()> {
        if self.io.is_none() {
            self.io = Some(IoContext::open_write(&self.path)?);
        }
        Ok(())
    }

    /// 使用自定义 I/O 代替输出文件
    pub fn set_io(&mut self, io: IoContext) {
        self.io = Some(io);
    }

    fn io_mut(&mut self) -> FerryResult<&mut IoContext> {
        self.io
            .as_mut()
            .ok_or_else(|| FerryError::Internal("输出 I/O 尚未打开".into()))
    }

    /// 写入容器头部
    ///
    /// 封装器在此确定各输出流的时间基, 流时长随之换算.
    pub fn write_header(&mut self) -> FerryResult<()> {
        if self.state != WriteState::Setup {
            return Err(FerryError::Internal("头部已经写入".into()));
        }
        if self.streams.is_empty() {
            return Err(FerryError::InvalidArgument("输出没有任何流".into()));
        }
        for stream in &mut self.streams {
            let before = stream.time_base;
            self.muxer.init_stream(stream)?;
            if stream.time_base != before && stream.duration > 0 {
                stream.duration = rescale_q(stream.duration, before, stream.time_base);
            }
        }

        let io = self
            .io
            .as_mut()
            .ok_or_else(|| FerryError::Internal("输出 I/O 尚未打开".into()))?;
        self.muxer.write_header(io, &self.streams)?;

        self.interleaver = Interleaver::new(self.streams.iter().map(|s| s.time_base).collect());
        self.last_dts = vec![NOPTS_VALUE; self.streams.len()];
        self.state = WriteState::HeaderWritten;
        Ok(())
    }

    /// 校验数据包后放入交错队列, 并写出所有已可写的数据包
    ///
    /// 数据包的时间戳必须已换算到对应输出流的时间基. 返回的可恢复错误只针对
    /// 本次传入的数据包; 队列中其他数据包被封装器拒绝时记录日志并计入
    /// [`WriteStats::dropped`]. 封装器的不可恢复错误总是返回.
    pub fn write_interleaved(&mut self, packet: Packet) -> Result<(), PacketWriteError> {
        if self.state != WriteState::HeaderWritten {
            return Err(PacketWriteError::Fatal(FerryError::Internal(
                "头部未写入或尾部已写入".into(),
            )));
        }
        self.check_packet(&packet)?;
        if packet.dts != NOPTS_VALUE {
            self.last_dts[packet.stream_index] = packet.dts;
        }
        self.interleaver.push(packet);

        while let Some(ready) = self.interleaver.pop_ready() {
            self.mux_packet(&ready).map_err(PacketWriteError::Fatal)?;
        }
        Ok(())
    }

    /// 把一个数据包交给封装器; 可恢复错误在此丢弃, 只返回不可恢复错误
    fn mux_packet(&mut self, packet: &Packet) -> FerryResult<()> {
        let io = self
            .io
            .as_mut()
            .ok_or_else(|| FerryError::Internal("输出 I/O 已关闭".into()))?;
        match self.muxer.write_packet(io, packet).map_err(PacketWriteError::from) {
            Ok(()) => {
                self.stats.written += 1;
                Ok(())
            }
            Err(PacketWriteError::Fatal(e)) => Err(e),
            Err(recoverable) => {
                warn!(
                    "封装器丢弃数据包 (流 {}, dts {}): {recoverable}",
                    packet.stream_index, packet.dts
                );
                self.stats.dropped += 1;
                Ok(())
            }
        }
    }

    fn check_packet(&self, packet: &Packet) -> Result<(), PacketWriteError> {
        let idx = packet.stream_index;
        if idx >= self.streams.len() {
            return Err(PacketWriteError::InvalidArgument(format!(
                "流索引 {idx} 越界 (共 {} 条流)",
                self.streams.len()
            )));
        }
        if packet.is_empty() {
            return Err(PacketWriteError::CorruptSource(format!("流 {idx}: 数据包负载为空")));
        }
        if packet.pts != NOPTS_VALUE && packet.dts != NOPTS_VALUE && packet.pts < packet.dts {
            return Err(PacketWriteError::InvalidArgument(format!(
                "流 {idx}: pts ({}) < dts ({})",
                packet.pts, packet.dts
            )));
        }
        let last = self.last_dts[idx];
        if packet.dts != NOPTS_VALUE && last != NOPTS_VALUE && packet.dts < last {
            return Err(PacketWriteError::InvalidArgument(format!(
                "流 {idx}: dts 非单调递增 ({} < {last})",
                packet.dts
            )));
        }
        Ok(())
    }

    /// 冲刷交错队列并写入容器尾部
    ///
    /// 冲刷时被封装器拒绝的数据包同样计入 [`WriteStats::dropped`].
    pub fn write_trailer(&mut self) -> FerryResult<()> {
        if self.state != WriteState::HeaderWritten {
            return Err(FerryError::Internal("头部未写入或尾部已写入".into()));
        }
        self.state = WriteState::TrailerWritten;

        while let Some(packet) = self.interleaver.pop_any() {
            self.mux_packet(&packet)?;
        }
        let io = self
            .io
            .as_mut()
            .ok_or_else(|| FerryError::Internal("输出 I/O 已关闭".into()))?;
        self.muxer.write_trailer(io)?;
        io.flush()
    }

    /// 关闭输出: 需要文件的格式落盘并关闭文件
    ///
    /// 可重复调用, 只有第一次生效.
    pub fn close(&mut self) -> FerryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let needs_file = self.needs_file();
        match self.io.take() {
            Some(mut io) if needs_file => io.flush(),
            _ => Ok(()),
        }
    }
}

impl Drop for OutputContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("关闭输出 {} 失败: {e}", self.path.display());
        }
    }
}
