//! 故障注入测试: 用包装过的 WAV 解封装器/封装器替换注册表中的默认实现,
//! 验证读错误、损坏数据包、写头部/数据包/尾部失败时任务的行为与资源释放.
//!
//! 注入方式与计数都放在 thread_local 中, 每个测试在自己的线程里同步执行任务.

use std::cell::{Cell, RefCell};
use std::path::Path;

use ferry::core::{FerryError, FerryResult};
use ferry::format::demuxers::wav::WavDemuxer;
use ferry::format::muxers::wav::WavMuxer;
use ferry::format::{
    Demuxer, FormatId, FormatRegistry, InputContext, IoContext, Muxer, MuxerFlags, Packet,
    Stream,
};
use ferry::remux::{LoopEnd, Progress, RemuxError, RemuxJob, RemuxOptions, RemuxSummary};
use tempfile::TempDir;

/// 注入的故障 (数据包序号从 1 开始)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Fault {
    #[default]
    None,
    /// 第 n 个数据包被截成奇数长度
    CorruptPacket(u64),
    /// 第 n 个数据包负载为空
    EmptyPacket(u64),
    /// 读取第 n 个数据包时返回错误
    ReadError(u64),
    /// 写头部失败
    HeaderFail,
    /// 写第 n 个数据包时 I/O 失败
    PacketIoFail(u64),
    /// 写尾部失败
    TrailerFail,
}

thread_local! {
    static FAULT: Cell<Fault> = Cell::new(Fault::None);
    static LIVE_DEMUXERS: Cell<i32> = const { Cell::new(0) };
    static LIVE_MUXERS: Cell<i32> = const { Cell::new(0) };
    static TRAILER_CALLS: Cell<u32> = const { Cell::new(0) };
    static DROP_ORDER: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static WRITTEN_POS: RefCell<Vec<i64>> = const { RefCell::new(Vec::new()) };
}

/// 设置本线程要注入的故障并清空计数
fn set_fault(fault: Fault) {
    FAULT.with(|f| f.set(fault));
    TRAILER_CALLS.with(|n| n.set(0));
    DROP_ORDER.with(|d| d.borrow_mut().clear());
    WRITTEN_POS.with(|p| p.borrow_mut().clear());
}

fn fault() -> Fault {
    FAULT.with(Cell::get)
}

fn live_demuxers() -> i32 {
    LIVE_DEMUXERS.with(Cell::get)
}

fn live_muxers() -> i32 {
    LIVE_MUXERS.with(Cell::get)
}

fn trailer_calls() -> u32 {
    TRAILER_CALLS.with(Cell::get)
}

fn drop_order() -> Vec<&'static str> {
    DROP_ORDER.with(|d| d.borrow().clone())
}

/// 封装器收到的每个数据包的 `pos`
fn written_pos() -> Vec<i64> {
    WRITTEN_POS.with(|p| p.borrow().clone())
}

/// 包装 WAV 解封装器, 按 [`Fault`] 篡改读出的数据包
struct FaultyDemuxer {
    inner: Box<dyn Demuxer>,
    read: u64,
}

impl FaultyDemuxer {
    fn create() -> FerryResult<Box<dyn Demuxer>> {
        LIVE_DEMUXERS.with(|n| n.set(n.get() + 1));
        Ok(Box::new(Self {
            inner: WavDemuxer::create()?,
            read: 0,
        }))
    }
}

impl Drop for FaultyDemuxer {
    fn drop(&mut self) {
        LIVE_DEMUXERS.with(|n| n.set(n.get() - 1));
        DROP_ORDER.with(|d| d.borrow_mut().push("input"));
    }
}

impl Demuxer for FaultyDemuxer {
    fn format_id(&self) -> FormatId {
        self.inner.format_id()
    }

    fn name(&self) -> &str {
        "faulty-wav"
    }

    fn open(&mut self, io: &mut IoContext) -> FerryResult<()> {
        self.inner.open(io)
    }

    fn streams(&self) -> &[Stream] {
        self.inner.streams()
    }

    fn read_packet(&mut self, io: &mut IoContext) -> FerryResult<Packet> {
        self.read += 1;
        match fault() {
            Fault::ReadError(n) if n == self.read => {
                return Err(FerryError::InvalidData("注入的读取错误".into()));
            }
            _ => {}
        }
        let mut packet = self.inner.read_packet(io)?;
        match fault() {
            Fault::CorruptPacket(n) if n == self.read => {
                packet.data = packet.data.slice(..packet.data.len() - 1);
            }
            Fault::EmptyPacket(n) if n == self.read => {
                packet.data = bytes::Bytes::new();
            }
            _ => {}
        }
        Ok(packet)
    }

    fn duration(&self) -> Option<f64> {
        self.inner.duration()
    }
}

/// 包装 WAV 封装器, 按 [`Fault`] 在各阶段注入失败
struct FaultyMuxer {
    inner: Box<dyn Muxer>,
    written: u64,
}

impl FaultyMuxer {
    fn create() -> FerryResult<Box<dyn Muxer>> {
        LIVE_MUXERS.with(|n| n.set(n.get() + 1));
        Ok(Box::new(Self {
            inner: WavMuxer::create()?,
            written: 0,
        }))
    }
}

impl Drop for FaultyMuxer {
    fn drop(&mut self) {
        LIVE_MUXERS.with(|n| n.set(n.get() - 1));
        DROP_ORDER.with(|d| d.borrow_mut().push("output"));
    }
}

impl Muxer for FaultyMuxer {
    fn format_id(&self) -> FormatId {
        self.inner.format_id()
    }

    fn name(&self) -> &str {
        "faulty-wav"
    }

    fn flags(&self) -> MuxerFlags {
        self.inner.flags()
    }

    fn init_stream(&self, stream: &mut Stream) -> FerryResult<()> {
        self.inner.init_stream(stream)
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> FerryResult<()> {
        if fault() == Fault::HeaderFail {
            return Err(FerryError::Io(std::io::Error::other("注入的写头部错误")));
        }
        self.inner.write_header(io, streams)
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> FerryResult<()> {
        self.written += 1;
        WRITTEN_POS.with(|p| p.borrow_mut().push(packet.pos));
        match fault() {
            Fault::PacketIoFail(n) if n == self.written => {
                Err(FerryError::Io(std::io::Error::other("注入的写数据包错误")))
            }
            _ => self.inner.write_packet(io, packet),
        }
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> FerryResult<()> {
        TRAILER_CALLS.with(|n| n.set(n.get() + 1));
        if fault() == Fault::TrailerFail {
            return Err(FerryError::Io(std::io::Error::other("注入的写尾部错误")));
        }
        self.inner.write_trailer(io)
    }
}

/// 内置格式 + 用故障版本覆盖 WAV
fn faulty_registry() -> FormatRegistry {
    let mut registry = ferry::default_format_registry();
    registry.register_demuxer(FormatId::Wav, "wav", FaultyDemuxer::create);
    registry.register_muxer(FormatId::Wav, "wav", FaultyMuxer::create);
    registry
}

/// 生成单声道 8kHz 的 WAV: 每个数据包 4096 采样 (8192 字节), 共 `packets` 个
fn write_wav(path: &Path, packets: usize) -> Vec<u8> {
    let pcm: Vec<u8> = (0..packets * 4096)
        .flat_map(|i| ((i % 2000) as i16 - 1000).to_le_bytes())
        .collect();
    let mut buf = Vec::with_capacity(44 + pcm.len());
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    buf.extend_from_slice(b"WAVEfmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&8000u32.to_le_bytes());
    buf.extend_from_slice(&16000u32.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pcm);
    std::fs::write(path, buf).unwrap();
    pcm
}

/// 用默认注册表读出全部负载
fn read_payload(path: &Path) -> Vec<u8> {
    let registry = ferry::default_format_registry();
    let mut input = InputContext::open(path, &registry).unwrap();
    let mut data = Vec::new();
    loop {
        match input.read_packet() {
            Ok(pkt) => data.extend_from_slice(&pkt.data),
            Err(e) if e.is_eof() => break,
            Err(e) => panic!("读取数据包失败: {e}"),
        }
    }
    data
}

/// 执行一次 WAV → WAV 任务, 返回结果与源 PCM
fn run_job(fault: Fault, packets: usize) -> (TempDir, Result<RemuxSummary, RemuxError>, Vec<u8>) {
    let _ = env_logger::builder().is_test(true).try_init();
    set_fault(fault);
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    let dst = dir.path().join("dst.wav");
    let pcm = write_wav(&src, packets);

    let registry = faulty_registry();
    let mut job = RemuxJob::create_with(&src, &dst, &registry, RemuxOptions::default()).unwrap();
    let result = job.process();
    drop(job);
    assert_eq!(live_demuxers(), 0, "解封装器未释放");
    assert_eq!(live_muxers(), 0, "封装器未释放");
    (dir, result, pcm)
}

#[test]
fn test_无故障时全部写出() {
    let (dir, result, pcm) = run_job(Fault::None, 6);
    let summary = result.unwrap();
    assert_eq!(summary.end, LoopEnd::EndOfStream);
    assert_eq!(summary.packets_read, 6);
    assert_eq!(summary.packets_written, 6);
    assert_eq!(trailer_calls(), 1);
    assert_eq!(read_payload(&dir.path().join("dst.wav")), pcm);
}

#[test]
fn test_交给封装器的数据包位置未知() {
    let (dir, result, _) = run_job(Fault::None, 4);
    result.unwrap();
    let positions = written_pos();
    assert_eq!(positions.len(), 4);
    assert!(positions.iter().all(|&pos| pos == -1), "pos 应为 -1: {positions:?}");

    // 源数据包本身带有字节偏移
    let registry = ferry::default_format_registry();
    let mut input = InputContext::open(&dir.path().join("src.wav"), &registry).unwrap();
    assert_eq!(input.read_packet().unwrap().pos, 44);
}

#[test]
fn test_损坏数据包被丢弃_其余照常写出() {
    let (dir, result, pcm) = run_job(Fault::CorruptPacket(3), 6);
    let summary = result.unwrap();
    assert_eq!(summary.end, LoopEnd::EndOfStream);
    assert_eq!(summary.packets_read, 6);
    assert_eq!(summary.packets_written, 5);
    assert_eq!(summary.packets_dropped, 1);

    let mut expected = pcm[..2 * 8192].to_vec();
    expected.extend_from_slice(&pcm[3 * 8192..]);
    assert_eq!(read_payload(&dir.path().join("dst.wav")), expected);
}

#[test]
fn test_空数据包被丢弃() {
    let (_dir, result, _) = run_job(Fault::EmptyPacket(1), 4);
    let summary = result.unwrap();
    assert_eq!(summary.packets_written, 3);
    assert_eq!(summary.packets_dropped, 1);
}

#[test]
fn test_读取错误_已写部分照常收尾() {
    let (dir, result, pcm) = run_job(Fault::ReadError(4), 6);
    let summary = result.unwrap();
    assert_eq!(summary.end, LoopEnd::ReadAborted);
    assert_eq!(summary.packets_read, 3);
    assert_eq!(trailer_calls(), 1);
    assert_eq!(read_payload(&dir.path().join("dst.wav")), pcm[..3 * 8192].to_vec());
}

#[test]
fn test_写头部失败_不调用回调也不写尾部() {
    set_fault(Fault::HeaderFail);
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    write_wav(&src, 2);

    let registry = faulty_registry();
    let dst = dir.path().join("dst.wav");
    let mut job = RemuxJob::create_with(&src, &dst, &registry, RemuxOptions::default()).unwrap();
    let mut called = false;
    let err = job
        .process_with(|_| {
            called = true;
            Progress::Continue
        })
        .unwrap_err();
    drop(job);

    assert!(matches!(err, RemuxError::WriteHeader(_)), "错误类型: {err}");
    assert!(!called, "写头部失败时不应报告进度");
    assert_eq!(trailer_calls(), 0);
    assert_eq!(live_demuxers(), 0);
    assert_eq!(live_muxers(), 0);
}

#[test]
fn test_写数据包失败_仍尝试写尾部() {
    let (_dir, result, _) = run_job(Fault::PacketIoFail(2), 5);
    let err = result.unwrap_err();
    assert!(
        matches!(err, RemuxError::WritePacket { stream_index: 0, .. }),
        "错误类型: {err}"
    );
    assert_eq!(trailer_calls(), 1);
}

#[test]
fn test_写尾部失败() {
    let (_dir, result, _) = run_job(Fault::TrailerFail, 3);
    let err = result.unwrap_err();
    assert!(matches!(err, RemuxError::WriteTrailer(_)), "错误类型: {err}");
    assert_eq!(trailer_calls(), 1);
}

#[test]
fn test_创建失败时先释放输入再释放输出() {
    set_fault(Fault::None);
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    write_wav(&src, 1);

    // 输出目录不存在, 打开输出文件失败时输入与输出都已创建
    let dst = dir.path().join("missing").join("dst.wav");
    let registry = faulty_registry();
    let err = RemuxJob::create_with(&src, &dst, &registry, RemuxOptions::default())
        .err()
        .unwrap();

    assert!(matches!(err, RemuxError::OpenOutput { .. }), "错误类型: {err}");
    assert!(err.is_creation_error());
    assert_eq!(live_demuxers(), 0);
    assert_eq!(live_muxers(), 0);
    assert_eq!(drop_order(), vec!["input", "output"]);
}

#[test]
fn test_任务析构释放全部句柄() {
    set_fault(Fault::None);
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.wav");
    write_wav(&src, 2);

    let registry = faulty_registry();
    let dst = dir.path().join("dst.wav");
    let job = RemuxJob::create_with(&src, &dst, &registry, RemuxOptions::default()).unwrap();
    assert_eq!(live_demuxers(), 1);
    assert_eq!(live_muxers(), 1);

    // 未执行就析构
    drop(job);
    assert_eq!(live_demuxers(), 0);
    assert_eq!(live_muxers(), 0);
    assert_eq!(drop_order(), vec!["input", "output"]);
}
