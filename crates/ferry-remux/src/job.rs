//! 转封装任务.

use std::fs;
use std::path::{Path, PathBuf};

use ferry_core::{FerryError, Rational, Rounding, rescale_q, rescale_q_rnd};
use ferry_format::{
    FormatId, FormatRegistry, InputContext, OutputContext, Packet, PacketWriteError, Stream,
};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::error::RemuxError;
use crate::options::RemuxOptions;
use crate::progress::{Progress, ProgressReporter};

/// 数据包循环的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopEnd {
    /// 读到输入末尾
    #[default]
    EndOfStream,
    /// 读取出错, 已写出的部分照常收尾
    ReadAborted,
    /// 进度回调要求停止
    Cancelled,
}

/// 一次成功的转封装的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemuxSummary {
    pub end: LoopEnd,
    /// 从输入读出的数据包数
    pub packets_read: u64,
    /// 封装器实际写出的数据包数
    pub packets_written: u64,
    /// 因可恢复错误丢弃的数据包数 (校验未通过或被封装器拒绝)
    pub packets_dropped: u64,
}

/// 输入与输出句柄
///
/// 析构时先释放输入, 再关闭输出; 未设置的句柄跳过.
#[derive(Default)]
struct JobHandles {
    input: Option<InputContext>,
    output: Option<OutputContext>,
}

impl Drop for JobHandles {
    fn drop(&mut self) {
        if let Some(input) = self.input.take() {
            debug!("释放输入: {}", input.path().display());
            drop(input);
        }
        if let Some(mut output) = self.output.take() {
            debug!("释放输出: {}", output.path().display());
            if let Err(e) = output.close() {
                warn!("关闭输出 {} 失败: {e}", output.path().display());
            }
        }
    }
}

/// 转封装任务
///
/// 独占一个输入上下文和一个输出上下文. 输出流与输入流一一对应, 顺序相同.
/// 任务析构时释放全部句柄, 与处理结果无关.
pub struct RemuxJob {
    input_path: PathBuf,
    output_path: PathBuf,
    /// 创建时的输入文件大小, 只用于计算进度
    input_size: u64,
    options: RemuxOptions,
    handles: JobHandles,
    processed: bool,
}

impl RemuxJob {
    /// 使用内置格式与默认选项创建任务
    pub fn create(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Self, RemuxError> {
        Self::create_with(
            input,
            output,
            &ferry_format::default_registry(),
            RemuxOptions::default(),
        )
    }

    /// 使用指定的格式注册表与选项创建任务
    ///
    /// 失败时不会返回任务, 已经打开的句柄按先输入后输出的顺序释放.
    /// 输出文件一旦创建就会被截断, 创建失败也不会删除它.
    pub fn create_with(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        registry: &FormatRegistry,
        options: RemuxOptions,
    ) -> Result<Self, RemuxError> {
        let input_path = input.as_ref().to_path_buf();
        let output_path = output.as_ref().to_path_buf();

        if !input_path.is_file() {
            return Err(RemuxError::InputNotFound(input_path));
        }
        if is_same_file(&input_path, &output_path) {
            return Err(RemuxError::SamePath(output_path));
        }

        let input_size = match fs::metadata(&input_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("获取输入大小失败, 进度将不可用: {e}");
                0
            }
        };

        let mut handles = JobHandles::default();

        let input_ctx = handles.input.insert(
            InputContext::open(&input_path, registry).map_err(|source| RemuxError::OpenInput {
                path: input_path.clone(),
                source,
            })?,
        );
        if input_ctx.streams().is_empty() {
            return Err(RemuxError::NoStreams(input_path));
        }
        if options.dump_format {
            input_ctx.dump();
        }

        let format_id = resolve_output_format(&output_path, registry, &options)?;
        let output_ctx = handles.output.insert(
            OutputContext::create_with_format(&output_path, format_id, registry).map_err(
                |source| RemuxError::CreateOutput {
                    path: output_path.clone(),
                    source,
                },
            )?,
        );
        for stream in input_ctx.streams() {
            output_ctx
                .add_stream(stream)
                .map_err(|source| RemuxError::AddStream {
                    index: stream.index,
                    source,
                })?;
        }
        output_ctx
            .open_file()
            .map_err(|source| RemuxError::OpenOutput {
                path: output_path.clone(),
                source,
            })?;

        info!(
            "创建转封装任务: {} ({}) -> {} ({}), {} 条流",
            input_path.display(),
            input_ctx.format_name(),
            output_path.display(),
            output_ctx.format_name(),
            output_ctx.streams().len()
        );

        Ok(Self {
            input_path,
            output_path,
            input_size,
            options,
            handles,
            processed: false,
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// 创建时记录的输入文件大小 (字节)
    pub fn input_size(&self) -> u64 {
        self.input_size
    }

    pub fn options(&self) -> &RemuxOptions {
        &self.options
    }

    /// 输入流列表
    pub fn input_streams(&self) -> &[Stream] {
        match &self.handles.input {
            Some(input) => input.streams(),
            None => &[],
        }
    }

    /// 输出流列表
    pub fn output_streams(&self) -> &[Stream] {
        match &self.handles.output {
            Some(output) => output.streams(),
            None => &[],
        }
    }

    /// 输出格式
    pub fn output_format(&self) -> Option<FormatId> {
        self.handles.output.as_ref().map(OutputContext::format_id)
    }

    /// 不带进度回调地执行转封装
    pub fn process(&mut self) -> Result<RemuxSummary, RemuxError> {
        self.run(None)
    }

    /// 执行转封装, 期间调用 `callback` 报告进度 (百分比, 0 ~ 100)
    ///
    /// 回调在 0% 时、每隔若干数据包、以及写完尾部后 (100%) 各调用一次.
    /// 回调返回 [`Progress::Cancel`] 时停止读取, 尾部照常写入, 结果仍为成功.
    pub fn process_with<F>(&mut self, mut callback: F) -> Result<RemuxSummary, RemuxError>
    where
        F: FnMut(f32) -> Progress,
    {
        self.run(Some(&mut callback))
    }

    fn run(
        &mut self,
        callback: Option<&mut dyn FnMut(f32) -> Progress>,
    ) -> Result<RemuxSummary, RemuxError> {
        if self.processed {
            return Err(RemuxError::AlreadyProcessed);
        }
        self.processed = true;

        let JobHandles {
            input: Some(input),
            output: Some(output),
        } = &mut self.handles
        else {
            return Err(RemuxError::AlreadyProcessed);
        };

        output.write_header().map_err(|e| {
            error!("写入头部失败: {e}");
            RemuxError::WriteHeader(e)
        })?;

        let mut reporter =
            ProgressReporter::new(callback, self.input_size, self.options.progress_interval);
        let mut summary = RemuxSummary::default();

        let outcome = if reporter.start().is_cancel() {
            Ok(LoopEnd::Cancelled)
        } else {
            copy_packets(input, output, &mut reporter, &mut summary)
        };

        let trailer = output.write_trailer();
        if let Err(e) = &trailer {
            error!("写入尾部失败: {e}");
        }
        reporter.finish();

        // 交错队列中的数据包在尾部冲刷时才交给封装器, 统计以封装器为准
        let stats = output.stats();
        summary.packets_written = stats.written;
        summary.packets_dropped += stats.dropped;

        summary.end = outcome?;
        trailer.map_err(RemuxError::WriteTrailer)?;

        info!(
            "转封装完成 ({:?}): 读取 {} 个数据包, 写出 {}, 丢弃 {}",
            summary.end, summary.packets_read, summary.packets_written, summary.packets_dropped
        );
        Ok(summary)
    }
}

/// 数据包搬运循环
fn copy_packets(
    input: &mut InputContext,
    output: &mut OutputContext,
    reporter: &mut ProgressReporter<'_>,
    summary: &mut RemuxSummary,
) -> Result<LoopEnd, RemuxError> {
    // 输出时间基在写头部时才确定
    let time_bases: Vec<(Rational, Rational)> = input
        .streams()
        .iter()
        .zip(output.streams())
        .map(|(i, o)| (i.time_base, o.time_base))
        .collect();

    loop {
        let mut packet = match input.read_packet() {
            Ok(packet) => packet,
            Err(FerryError::Eof) => return Ok(LoopEnd::EndOfStream),
            Err(e) => {
                error!("读取数据包失败: {e}");
                return Ok(LoopEnd::ReadAborted);
            }
        };
        summary.packets_read += 1;

        if reporter.tick(packet.pos).is_cancel() {
            info!("进度回调要求停止, 已读取 {} 个数据包", summary.packets_read);
            return Ok(LoopEnd::Cancelled);
        }

        if let Some(&(from, to)) = time_bases.get(packet.stream_index) {
            rescale_packet(&mut packet, from, to);
        }
        packet.pos = -1;

        let stream_index = packet.stream_index;
        match output.write_interleaved(packet) {
            Ok(()) => {}
            Err(PacketWriteError::Fatal(source)) => {
                error!("写入数据包失败 (流 {stream_index}): {source}");
                return Err(RemuxError::WritePacket {
                    stream_index,
                    source,
                });
            }
            Err(e) => {
                warn!("丢弃数据包 (流 {stream_index}): {e}");
                summary.packets_dropped += 1;
            }
        }
    }
}

/// 把数据包的时间戳从输入流时间基换算到输出流时间基
fn rescale_packet(packet: &mut Packet, from: Rational, to: Rational) {
    packet.pts = rescale_q_rnd(packet.pts, from, to, Rounding::NearInf, true);
    packet.dts = rescale_q_rnd(packet.dts, from, to, Rounding::NearInf, true);
    packet.duration = rescale_q(packet.duration, from, to);
}

fn resolve_output_format(
    path: &Path,
    registry: &FormatRegistry,
    options: &RemuxOptions,
) -> Result<FormatId, RemuxError> {
    let unknown = |source: FerryError| RemuxError::UnknownOutputFormat {
        path: path.to_path_buf(),
        source,
    };
    match options.output_format.as_deref() {
        Some(name) => FormatId::from_name(name).ok_or_else(|| {
            unknown(FerryError::FormatNotFound(format!("未知的输出格式: {name}")))
        }),
        None => registry.guess_output_format(path).map_err(unknown),
    }
}

/// 两个路径是否指向同一个文件
fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
