//! I/O 抽象层.
//!
//! 对标 FFmpeg 的 `AVIOContext`, 为解封装器/封装器提供统一的读写接口,
//! 支持文件、内存缓冲区与空输出等不同后端.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::Path;

use ferry_core::{FerryError, FerryResult};

/// I/O 上下文
///
/// 封装底层 I/O 操作. 读取经过内部缓冲区, 写入直接交给后端.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的 I/O 来源.
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示末尾
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 全部写入
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
    /// 将缓冲的写入数据落盘
    fn flush(&mut self) -> io::Result<()>;
}

/// 默认读缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 以只读方式打开文件
    pub fn open_read(path: &Path) -> FerryResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata().ok().map(|m| m.len());
        Ok(Self::new(Box::new(FileReader { file, size })))
    }

    /// 以写入方式打开文件 (创建或截断)
    pub fn open_write(path: &Path) -> FerryResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(FileWriter {
            file: BufWriter::new(file),
        })))
    }

    /// 丢弃所有写入数据的上下文
    pub fn null() -> Self {
        Self::new(Box::new(NullBackend { pos: 0 }))
    }

    // ========================
    // 读取方法
    // ========================

    /// 读满 `buf`, 数据不足时返回 `FerryError::Eof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> FerryResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.buf_pos == self.buf_len {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    return Err(FerryError::Eof);
                }
            }
            let n = (self.buf_len - self.buf_pos).min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + n]);
            self.buf_pos += n;
            filled += n;
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> FerryResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> FerryResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// 读取 u16 小端
    pub fn read_u16_le(&mut self) -> FerryResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// 读取 u32 小端
    pub fn read_u32_le(&mut self) -> FerryResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// 读取 u24 大端
    pub fn read_u24_be(&mut self) -> FerryResult<u32> {
        let b: [u8; 3] = self.read_array()?;
        Ok((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
    }

    /// 读取 u32 大端
    pub fn read_u32_be(&mut self) -> FerryResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// 读取 4 字节标签 (FourCC)
    pub fn read_tag(&mut self) -> FerryResult<[u8; 4]> {
        self.read_array()
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> FerryResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> FerryResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }

        let remaining = count - buffered;
        self.buf_pos = self.buf_len;

        if self.inner.is_seekable() {
            self.inner.seek(io::SeekFrom::Current(remaining as i64))?;
            return Ok(());
        }

        // 不可 seek 时逐块丢弃
        let mut left = remaining;
        while left > 0 {
            let to_read = left.min(self.buffer.len());
            let n = self.inner.read(&mut self.buffer[..to_read])?;
            if n == 0 {
                return Err(FerryError::Eof);
            }
            left -= n;
        }
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(())
    }

    // ========================
    // 写入方法
    // ========================

    /// 写入全部数据
    pub fn write_all(&mut self, buf: &[u8]) -> FerryResult<()> {
        self.inner.write_all(buf)?;
        Ok(())
    }

    /// 写入 u8
    pub fn write_u8(&mut self, v: u8) -> FerryResult<()> {
        self.write_all(&[v])
    }

    /// 写入 u16 小端
    pub fn write_u16_le(&mut self, v: u16) -> FerryResult<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// 写入 u32 小端
    pub fn write_u32_le(&mut self, v: u32) -> FerryResult<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// 写入 u24 大端 (高 8 位被丢弃)
    pub fn write_u24_be(&mut self, v: u32) -> FerryResult<()> {
        self.write_all(&v.to_be_bytes()[1..])
    }

    /// 写入 u32 大端
    pub fn write_u32_be(&mut self, v: u32) -> FerryResult<()> {
        self.write_all(&v.to_be_bytes())
    }

    /// 写入 4 字节标签 (FourCC)
    pub fn write_tag(&mut self, tag: &[u8; 4]) -> FerryResult<()> {
        self.write_all(tag)
    }

    /// 将缓冲的写入数据落盘
    pub fn flush(&mut self) -> FerryResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    // ========================
    // 定位方法
    // ========================

    /// 定位 (seek), 会清空读缓冲区
    pub fn seek(&mut self, pos: io::SeekFrom) -> FerryResult<u64> {
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前逻辑位置 (扣除读缓冲区中尚未消耗的数据)
    pub fn position(&mut self) -> FerryResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 只读文件后端
struct FileReader {
    file: File,
    size: Option<u64>,
}

impl IoBackend for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "只读文件不支持写入",
        ))
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 带写缓冲的文件后端
struct FileWriter {
    file: BufWriter<File>,
}

impl IoBackend for FileWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.flush()?;
        self.file.get_mut().read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// 空后端: 丢弃写入, 读取立即到达末尾
struct NullBackend {
    pos: u64,
}

impl IoBackend for NullBackend {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "空输出不支持 seek",
        ))
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建 (用于读取)
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// 创建空缓冲区 (用于写入)
    pub fn new() -> Self {
        Self::from_data(Vec::new())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
