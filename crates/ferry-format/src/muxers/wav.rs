//! WAV (RIFF WAVE) 封装器.
//!
//! 写入流程:
//! 1. `write_header()` - 写入 RIFF、fmt 与 LIST/INFO 块, 预留 data 块大小
//! 2. `write_packet()` - 追加 PCM 数据
//! 3. `write_trailer()` - 回填 RIFF 大小和 data 块大小

use std::io::SeekFrom;

use ferry_core::{FerryError, FerryResult, Rational};
use log::{debug, warn};

use crate::codec_id::CodecId;
use crate::demuxers::wav::{INFO_TAGS, WAV_FORMAT_IEEE_FLOAT, WAV_FORMAT_PCM};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::{Muxer, MuxerFlags};
use crate::packet::Packet;
use crate::stream::Stream;

/// WAV 封装器
pub struct WavMuxer {
    /// data 块大小字段的文件偏移 (需要回填)
    data_size_offset: u64,
    /// 已写入的数据字节数
    data_written: u64,
    block_align: u64,
}

impl WavMuxer {
    /// 创建 WAV 封装器实例 (工厂函数)
    pub fn create() -> FerryResult<Box<dyn Muxer>> {
        Ok(Box::new(Self {
            data_size_offset: 0,
            data_written: 0,
            block_align: 0,
        }))
    }

    /// 根据 CodecId 确定 WAV 格式码和位深
    fn resolve_wav_format(codec_id: CodecId) -> FerryResult<(u16, u16)> {
        match codec_id {
            CodecId::PcmU8 => Ok((WAV_FORMAT_PCM, 8)),
            CodecId::PcmS16le => Ok((WAV_FORMAT_PCM, 16)),
            CodecId::PcmS24le => Ok((WAV_FORMAT_PCM, 24)),
            CodecId::PcmS32le => Ok((WAV_FORMAT_PCM, 32)),
            CodecId::PcmF32le => Ok((WAV_FORMAT_IEEE_FLOAT, 32)),
            _ => Err(FerryError::Unsupported(format!(
                "WAV 不支持编解码器: {codec_id}"
            ))),
        }
    }

    /// 由流元数据生成 LIST/INFO 块内容, 没有可写的条目时返回 None
    fn build_info_list(stream: &Stream) -> Option<Vec<u8>> {
        let mut body = b"INFO".to_vec();
        for (id, key) in INFO_TAGS {
            let Some(value) = stream.metadata_value(key) else {
                continue;
            };
            // 文本以 NUL 结尾, 子块按偶数对齐
            let size = value.len() + 1;
            body.extend_from_slice(*id);
            body.extend_from_slice(&(size as u32).to_le_bytes());
            body.extend_from_slice(value.as_bytes());
            body.push(0);
            if size % 2 == 1 {
                body.push(0);
            }
        }
        (body.len() > 4).then_some(body)
    }
}

impl Muxer for WavMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Wav
    }

    fn name(&self) -> &str {
        "wav"
    }

    fn flags(&self) -> MuxerFlags {
        MuxerFlags::SINGLE_STREAM
    }

    fn init_stream(&self, stream: &mut Stream) -> FerryResult<()> {
        let rate = stream
            .audio()
            .and_then(|a| i32::try_from(a.sample_rate).ok())
            .filter(|&rate| rate > 0);
        if let Some(rate) = rate {
            stream.time_base = Rational::new(1, rate);
        }
        Ok(())
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> FerryResult<()> {
        let [stream] = streams else {
            return Err(FerryError::InvalidArgument("WAV 仅支持单个音频流".into()));
        };
        let audio = stream
            .audio()
            .ok_or_else(|| FerryError::InvalidArgument("WAV 仅支持音频流".into()))?;

        let (format_tag, bits_per_sample) = Self::resolve_wav_format(stream.codec_id)?;
        if audio.channels == 0 || audio.channels > u32::from(u16::MAX) || audio.sample_rate == 0 {
            return Err(FerryError::InvalidArgument(format!(
                "WAV: 无效的音频参数 ({} Hz, {} 声道)",
                audio.sample_rate, audio.channels
            )));
        }
        let channels = audio.channels as u16;
        let (block_align, byte_rate) = channels
            .checked_mul(bits_per_sample / 8)
            .and_then(|align| Some((align, audio.sample_rate.checked_mul(u32::from(align))?)))
            .ok_or_else(|| {
                FerryError::InvalidArgument(format!(
                    "WAV: 音频参数超出 fmt 块可表示的范围 ({} Hz, {channels} 声道, {bits_per_sample} 位)",
                    audio.sample_rate
                ))
            })?;

        // RIFF header, 大小在 trailer 中回填
        io.write_tag(b"RIFF")?;
        io.write_u32_le(0)?;
        io.write_tag(b"WAVE")?;

        io.write_tag(b"fmt ")?;
        io.write_u32_le(16)?;
        io.write_u16_le(format_tag)?;
        io.write_u16_le(channels)?;
        io.write_u32_le(audio.sample_rate)?;
        io.write_u32_le(byte_rate)?;
        io.write_u16_le(block_align)?;
        io.write_u16_le(bits_per_sample)?;

        if let Some(info) = Self::build_info_list(stream) {
            io.write_tag(b"LIST")?;
            io.write_u32_le(info.len() as u32)?;
            io.write_all(&info)?;
        }

        io.write_tag(b"data")?;
        self.data_size_offset = io.position()?;
        io.write_u32_le(0)?;

        self.data_written = 0;
        self.block_align = u64::from(block_align);
        debug!(
            "WAV 写入头部: {} Hz, {channels} 声道, {bits_per_sample} 位",
            audio.sample_rate
        );
        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> FerryResult<()> {
        if self.block_align > 0 && packet.size() as u64 % self.block_align != 0 {
            return Err(FerryError::InvalidData(format!(
                "WAV: 数据包大小 {} 不是块大小 {} 的整数倍",
                packet.size(),
                self.block_align
            )));
        }
        io.write_all(&packet.data)?;
        self.data_written += packet.size() as u64;
        Ok(())
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> FerryResult<()> {
        if !io.is_seekable() {
            debug!("WAV 输出不支持 seek, 无法回填大小字段");
            return Ok(());
        }

        let end = io.position()?;
        let data_size = u32::try_from(self.data_written).unwrap_or_else(|_| {
            warn!("WAV: 数据超过 4 GiB, 大小字段将不准确");
            u32::MAX
        });
        let riff_size = u32::try_from(end - 8).unwrap_or(u32::MAX);

        io.seek(SeekFrom::Start(4))?;
        io.write_u32_le(riff_size)?;
        io.seek(SeekFrom::Start(self.data_size_offset))?;
        io.write_u32_le(data_size)?;
        io.seek(SeekFrom::Start(end))?;

        debug!("WAV 写入尾部: riff_size={riff_size}, data_size={data_size}");
        Ok(())
    }
}
