//! WAV (RIFF WAVE) 解封装器.
//!
//! WAV 文件结构:
//! ```text
//! RIFF header:  "RIFF" + file_size-8 + "WAVE"
//! fmt  chunk:   "fmt " + chunk_size + audio_format + channels + sample_rate
//!              + byte_rate + block_align + bits_per_sample [+ cbSize + 扩展]
//! LIST chunk:   "LIST" + chunk_size + "INFO" + (id + size + 文本)*   (可选)
//! data chunk:   "data" + data_size + PCM samples...
//! ```

use std::io::SeekFrom;

use bytes::Bytes;
use ferry_core::{FerryError, FerryResult, Rational};
use log::{debug, warn};

use crate::codec_id::CodecId;
use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::probe::{self, FormatProbe, ProbeScore};
use crate::stream::{AudioStreamParams, Stream, StreamParams};

/// WAV 格式码
pub(crate) const WAV_FORMAT_PCM: u16 = 0x0001;
pub(crate) const WAV_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub(crate) const WAV_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// 每个数据包包含的采样数
const SAMPLES_PER_PACKET: u64 = 4096;

/// RIFF INFO 子块 ID 与通用元数据键的对应关系
pub(crate) const INFO_TAGS: &[(&[u8; 4], &str)] = &[
    (b"INAM", "title"),
    (b"IART", "artist"),
    (b"IPRD", "album"),
    (b"ICMT", "comment"),
    (b"ICRD", "date"),
    (b"IGNR", "genre"),
    (b"ICOP", "copyright"),
    (b"ISFT", "encoder"),
];

/// fmt 块内容
struct WavFormat {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

/// WAV 解封装器
pub struct WavDemuxer {
    streams: Vec<Stream>,
    /// data 块在文件中的起始偏移
    data_offset: u64,
    /// data 块的大小 (字节)
    data_size: u64,
    /// 当前读取位置 (相对于 data 块起始)
    data_pos: u64,
    block_align: u64,
    metadata: Vec<(String, String)>,
}

impl WavDemuxer {
    /// 创建 WAV 解封装器实例 (工厂函数)
    pub fn create() -> FerryResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
            data_offset: 0,
            data_size: 0,
            data_pos: 0,
            block_align: 0,
            metadata: Vec::new(),
        }))
    }

    /// 根据格式码和位深确定 CodecId
    fn resolve_codec_id(format_tag: u16, bits_per_sample: u16) -> FerryResult<CodecId> {
        match (format_tag, bits_per_sample) {
            (WAV_FORMAT_PCM, 8) => Ok(CodecId::PcmU8),
            (WAV_FORMAT_PCM, 16) => Ok(CodecId::PcmS16le),
            (WAV_FORMAT_PCM, 24) => Ok(CodecId::PcmS24le),
            (WAV_FORMAT_PCM, 32) => Ok(CodecId::PcmS32le),
            (WAV_FORMAT_IEEE_FLOAT, 32) => Ok(CodecId::PcmF32le),
            (WAV_FORMAT_PCM | WAV_FORMAT_IEEE_FLOAT, bits) => Err(FerryError::Unsupported(
                format!("不支持的 PCM 位深: {bits}"),
            )),
            (tag, _) => Err(FerryError::Unsupported(format!(
                "不支持的 WAV 格式码: 0x{tag:04X}"
            ))),
        }
    }

    fn read_fmt(io: &mut IoContext, chunk_size: u64) -> FerryResult<WavFormat> {
        if chunk_size < 16 {
            return Err(FerryError::InvalidData("fmt 块大小不足 16 字节".into()));
        }
        let mut fmt = WavFormat {
            format_tag: io.read_u16_le()?,
            channels: io.read_u16_le()?,
            sample_rate: io.read_u32_le()?,
            block_align: 0,
            bits_per_sample: 0,
        };
        let _byte_rate = io.read_u32_le()?;
        fmt.block_align = io.read_u16_le()?;
        fmt.bits_per_sample = io.read_u16_le()?;
        let mut consumed = 16u64;

        // WAVE_FORMAT_EXTENSIBLE: 真实格式码在 SubFormat GUID 的前两个字节
        if fmt.format_tag == WAV_FORMAT_EXTENSIBLE && chunk_size >= 40 {
            let _cb_size = io.read_u16_le()?;
            let _valid_bits = io.read_u16_le()?;
            let _channel_mask = io.read_u32_le()?;
            let guid = io.read_bytes(16)?;
            fmt.format_tag = u16::from_le_bytes([guid[0], guid[1]]);
            consumed = 40;
        }
        io.skip((chunk_size - consumed) as usize)?;

        debug!(
            "fmt: format=0x{:04X}, channels={}, rate={}, block_align={}, bits={}",
            fmt.format_tag, fmt.channels, fmt.sample_rate, fmt.block_align, fmt.bits_per_sample,
        );
        Ok(fmt)
    }

    /// 解析 LIST 块, 只关心 INFO 类型
    fn read_list(&mut self, io: &mut IoContext, chunk_size: u64) -> FerryResult<()> {
        if chunk_size < 4 {
            return io.skip(chunk_size as usize);
        }
        let list_type = io.read_tag()?;
        let mut body_size = chunk_size - 4;
        // 块大小来自文件本身, 读取前先按剩余字节数截断
        if let Some(size) = io.size() {
            let remaining = size.saturating_sub(io.position()?);
            if body_size > remaining {
                warn!("LIST 块声明 {body_size} 字节, 文件只剩 {remaining} 字节");
                body_size = remaining;
            }
        }
        let body = io.read_bytes(body_size as usize)?;
        if &list_type != b"INFO" {
            return Ok(());
        }

        let mut pos = 0;
        while pos + 8 <= body.len() {
            let id = &body[pos..pos + 4];
            let size = u32::from_le_bytes([body[pos + 4], body[pos + 5], body[pos + 6], body[pos + 7]])
                as usize;
            let start = pos + 8;
            let end = (start + size).min(body.len());
            let text = String::from_utf8_lossy(&body[start..end])
                .trim_end_matches('\0')
                .to_string();
            match INFO_TAGS.iter().find(|(tag, _)| tag.as_slice() == id) {
                Some((_, key)) if !text.is_empty() => self.metadata.push(((*key).to_string(), text)),
                Some(_) => {}
                None => debug!("跳过 INFO 子块 '{}'", String::from_utf8_lossy(id)),
            }
            pos = start + size + (size & 1);
        }
        Ok(())
    }

    /// data 块之后的块 (部分工具把 LIST 写在文件末尾)
    fn read_trailing_chunks(&mut self, io: &mut IoContext) -> FerryResult<()> {
        let end = self.data_offset + self.data_size + (self.data_size & 1);
        if io.size().is_none_or(|size| end >= size) {
            return Ok(());
        }
        io.seek(SeekFrom::Start(end))?;
        loop {
            let chunk_id = match io.read_tag() {
                Ok(tag) => tag,
                Err(FerryError::Eof) => break,
                Err(e) => return Err(e),
            };
            let chunk_size = u64::from(io.read_u32_le()?);
            if &chunk_id == b"LIST" {
                self.read_list(io, chunk_size)?;
            } else {
                io.skip(chunk_size as usize)?;
            }
            if chunk_size & 1 == 1 {
                io.skip(1)?;
            }
        }
        Ok(())
    }
}

impl Demuxer for WavDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Wav
    }

    fn name(&self) -> &str {
        "wav"
    }

    fn open(&mut self, io: &mut IoContext) -> FerryResult<()> {
        if &io.read_tag()? != b"RIFF" {
            return Err(FerryError::InvalidData("不是有效的 RIFF 文件".into()));
        }
        let _riff_size = io.read_u32_le()?;
        if &io.read_tag()? != b"WAVE" {
            return Err(FerryError::InvalidData("不是有效的 WAVE 文件".into()));
        }

        let mut format: Option<WavFormat> = None;
        let data_size = loop {
            let chunk_id = match io.read_tag() {
                Ok(tag) => tag,
                Err(FerryError::Eof) => {
                    return Err(FerryError::InvalidData("未找到 data 块".into()));
                }
                Err(e) => return Err(e),
            };
            let chunk_size = u64::from(io.read_u32_le()?);

            match &chunk_id {
                b"fmt " => format = Some(Self::read_fmt(io, chunk_size)?),
                b"LIST" => self.read_list(io, chunk_size)?,
                b"data" => break chunk_size,
                other => {
                    warn!(
                        "跳过未知块: '{}', 大小={chunk_size}",
                        String::from_utf8_lossy(other)
                    );
                    io.skip(chunk_size as usize)?;
                }
            }
            // RIFF 块按偶数对齐
            if chunk_size & 1 == 1 {
                io.skip(1)?;
            }
        };

        let fmt = format.ok_or_else(|| FerryError::InvalidData("data 块出现在 fmt 块之前".into()))?;
        if fmt.channels == 0 || fmt.sample_rate == 0 || fmt.block_align == 0 {
            return Err(FerryError::InvalidData("fmt 块参数无效".into()));
        }
        let codec_id = Self::resolve_codec_id(fmt.format_tag, fmt.bits_per_sample)?;
        // 目前支持的格式都是 PCM, 块大小由声道数与位深唯一确定
        let expected_align = u32::from(fmt.channels) * u32::from(fmt.bits_per_sample) / 8;
        if u32::from(fmt.block_align) != expected_align {
            return Err(FerryError::InvalidData(format!(
                "fmt 块大小不一致: block_align={}, {} 声道 x {} 位应为 {expected_align}",
                fmt.block_align, fmt.channels, fmt.bits_per_sample
            )));
        }
        let time_base_den = i32::try_from(fmt.sample_rate).map_err(|_| {
            FerryError::InvalidData(format!("采样率超出范围: {}", fmt.sample_rate))
        })?;

        self.data_offset = io.position()?;
        let available = io.size().map(|size| size.saturating_sub(self.data_offset));
        // 流式写入的文件 data 大小可能为 0 或 0xFFFFFFFF
        self.data_size = match (data_size, available) {
            (0 | 0xFFFF_FFFF, Some(avail)) => avail,
            (size, Some(avail)) => size.min(avail),
            (size, None) => size,
        };
        self.block_align = u64::from(fmt.block_align);

        if io.is_seekable() {
            // 尾部块只提供元数据, 残缺时保留已解析的部分
            match self.read_trailing_chunks(io) {
                Ok(()) => {}
                Err(e @ (FerryError::Eof | FerryError::InvalidData(_))) => {
                    warn!("data 块之后的数据不完整, 已忽略: {e}");
                }
                Err(e) => return Err(e),
            }
            io.seek(SeekFrom::Start(self.data_offset))?;
        }

        let total_samples = self.data_size / self.block_align;
        let mut stream = Stream::new(
            0,
            codec_id,
            Rational::new(1, time_base_den),
            StreamParams::Audio(AudioStreamParams {
                sample_rate: fmt.sample_rate,
                channels: u32::from(fmt.channels),
                bits_per_sample: u32::from(fmt.bits_per_sample),
                bit_rate: u64::from(fmt.sample_rate) * self.block_align * 8,
                frame_size: 0,
            }),
        );
        stream.codec_tag = u32::from(fmt.format_tag);
        stream.duration = total_samples as i64;
        stream.metadata = self.metadata.clone();
        self.streams = vec![stream];
        self.data_pos = 0;

        debug!(
            "WAV 打开完成: {} Hz, {} 声道, {} 位, 总采样数={total_samples}",
            fmt.sample_rate, fmt.channels, fmt.bits_per_sample,
        );
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> FerryResult<Packet> {
        let remaining = self.data_size.saturating_sub(self.data_pos);
        // 只读取完整的采样块
        let size = remaining.min(SAMPLES_PER_PACKET * self.block_align) / self.block_align
            * self.block_align;
        if size == 0 {
            return Err(FerryError::Eof);
        }

        let pos = self.data_offset + self.data_pos;
        let data = io.read_bytes(size as usize)?;

        let mut pkt = Packet::from_data(Bytes::from(data));
        pkt.stream_index = 0;
        pkt.pts = (self.data_pos / self.block_align) as i64;
        pkt.dts = pkt.pts;
        pkt.duration = (size / self.block_align) as i64;
        pkt.is_keyframe = true;
        pkt.pos = pos as i64;

        self.data_pos += size;
        Ok(pkt)
    }

    fn duration(&self) -> Option<f64> {
        let stream = self.streams.first()?;
        Some(stream.duration as f64 * stream.time_base.to_f64())
    }

    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }
}

/// WAV 格式探测器
pub struct WavProbe;

impl FormatProbe for WavProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return Some(probe::SCORE_MAX);
        }
        if probe::extension_matches(filename, FormatId::Wav) {
            return Some(probe::SCORE_EXTENSION);
        }
        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::Wav
    }
}
