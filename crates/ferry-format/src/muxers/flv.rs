//! FLV (Flash Video) 封装器.
//!
//! FLV 文件结构:
//! - FLV Header (9 bytes)
//! - PreviousTagSize0 (4 bytes = 0)
//! - onMetaData 脚本 Tag
//! - 音视频 sequence header Tag (AAC / AVC / HEVC)
//! - [FLV Tag + PreviousTagSize] ...
//!
//! 所有输出流的时间基固定为 1/1000. 输出可 seek 时, 尾部会回填
//! onMetaData 中的 duration 与 filesize.

use std::io::SeekFrom;

use ferry_core::{FerryError, FerryResult, MediaType, NOPTS_VALUE, Rational};
use log::debug;

use crate::amf::AmfWriter;
use crate::codec_id::CodecId;
use crate::demuxers::flv::{
    FLV_AUDIO_AAC, FLV_AUDIO_MP3, FLV_AUDIO_PCM_LE, FLV_CODEC_AVC, FLV_CODEC_H263, FLV_CODEC_HEVC,
    FLV_CODEC_VP6, SOUND_RATES, TAG_AUDIO, TAG_HEADER_SIZE, TAG_SCRIPT, TAG_VIDEO,
};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::packet::Packet;
use crate::stream::Stream;

/// Tag 数据长度上限 (24 位)
const MAX_TAG_DATA_SIZE: usize = 0xFF_FFFF;

/// 写入的编码器标识
const ENCODER_NAME: &str = concat!("ferry ", env!("CARGO_PKG_VERSION"));

/// 每条输出流的写入参数
#[derive(Debug, Clone, Copy)]
enum TrackKind {
    Audio {
        /// 音频 Tag 的首字节 (SoundFormat | SoundRate | SoundSize | SoundType)
        flags: u8,
        is_aac: bool,
    },
    Video {
        codec_byte: u8,
        /// 是否带 PacketType + CompositionTime 字段
        has_cts: bool,
    },
}

/// FLV 封装器
pub struct FlvMuxer {
    tracks: Vec<TrackKind>,
    /// onMetaData 中 duration 数值的文件偏移
    duration_offset: Option<u64>,
    /// onMetaData 中 filesize 数值的文件偏移
    filesize_offset: Option<u64>,
    /// 已写入数据包的最大结束时间 (毫秒)
    max_end_ms: i64,
    /// 第一个数据包的时间 (毫秒)
    first_ms: Option<i64>,
}

impl FlvMuxer {
    /// 创建 FLV 封装器 (工厂函数)
    pub fn create() -> FerryResult<Box<dyn Muxer>> {
        Ok(Box::new(Self {
            tracks: Vec::new(),
            duration_offset: None,
            filesize_offset: None,
            max_end_ms: 0,
            first_ms: None,
        }))
    }

    fn audio_track(stream: &Stream) -> FerryResult<TrackKind> {
        let audio = stream
            .audio()
            .ok_or_else(|| FerryError::InvalidArgument("FLV: 音频流缺少音频参数".into()))?;
        let stereo = u8::from(audio.channels >= 2);
        let rate_index = |exact: bool| -> FerryResult<u8> {
            match SOUND_RATES.iter().position(|&r| r == audio.sample_rate) {
                Some(idx) => Ok(idx as u8),
                None if !exact => Ok(3),
                None => Err(FerryError::Unsupported(format!(
                    "FLV: PCM 不支持采样率 {} Hz",
                    audio.sample_rate
                ))),
            }
        };

        let (format, rate, size) = match stream.codec_id {
            // AAC 的参数在 AudioSpecificConfig 中, 头字节按规范固定
            CodecId::Aac => (FLV_AUDIO_AAC, 3, 1),
            CodecId::Mp3 => (FLV_AUDIO_MP3, rate_index(false)?, 1),
            CodecId::PcmS16le => (FLV_AUDIO_PCM_LE, rate_index(true)?, 1),
            CodecId::PcmU8 => (FLV_AUDIO_PCM_LE, rate_index(true)?, 0),
            other => {
                return Err(FerryError::Unsupported(format!(
                    "FLV 不支持音频编解码器: {other}"
                )));
            }
        };
        let stereo = if stream.codec_id == CodecId::Aac { 1 } else { stereo };
        Ok(TrackKind::Audio {
            flags: (format << 4) | (rate << 2) | (size << 1) | stereo,
            is_aac: stream.codec_id == CodecId::Aac,
        })
    }

    fn video_track(stream: &Stream) -> FerryResult<TrackKind> {
        let codec_byte = match stream.codec_id {
            CodecId::H264 => FLV_CODEC_AVC,
            CodecId::H265 => FLV_CODEC_HEVC,
            CodecId::Vp6 => FLV_CODEC_VP6,
            CodecId::Mpeg4 => FLV_CODEC_H263,
            other => {
                return Err(FerryError::Unsupported(format!(
                    "FLV 不支持视频编解码器: {other}"
                )));
            }
        };
        Ok(TrackKind::Video {
            codec_byte,
            has_cts: matches!(codec_byte, FLV_CODEC_AVC | FLV_CODEC_HEVC),
        })
    }

    /// 写入一个完整的 FLV Tag (含 PreviousTagSize)
    fn write_tag(io: &mut IoContext, tag_type: u8, timestamp: i64, data: &[u8]) -> FerryResult<()> {
        let data_size = data.len() as u32;
        let ts = timestamp as u32;
        io.write_u8(tag_type)?;
        io.write_u24_be(data_size)?;
        io.write_u24_be(ts & 0xFF_FFFF)?;
        io.write_u8((ts >> 24) as u8)?;
        io.write_u24_be(0)?;
        io.write_all(data)?;
        io.write_u32_be(TAG_HEADER_SIZE + data_size)?;
        Ok(())
    }

    /// 写入 onMetaData 脚本 Tag, 记录需要回填的字段偏移
    fn write_metadata(&mut self, io: &mut IoContext, streams: &[Stream]) -> FerryResult<()> {
        let duration_secs = streams
            .iter()
            .filter(|s| s.duration > 0)
            .map(|s| s.duration as f64 * s.time_base.to_f64())
            .fold(0.0, f64::max);

        let mut w = AmfWriter::new();
        w.string("onMetaData");
        w.begin_ecma_array(0);
        let duration_pos = w.number_property("duration", duration_secs);
        for stream in streams {
            if let Some(v) = stream.video() {
                if v.width > 0 && v.height > 0 {
                    w.number_property("width", f64::from(v.width));
                    w.number_property("height", f64::from(v.height));
                }
                if v.frame_rate.is_valid() {
                    w.number_property("framerate", v.frame_rate.to_f64());
                }
                if v.bit_rate > 0 {
                    w.number_property("videodatarate", v.bit_rate as f64 / 1000.0);
                }
                if let Some(TrackKind::Video { codec_byte, .. }) = self.tracks.get(stream.index) {
                    w.number_property("videocodecid", f64::from(*codec_byte));
                }
            }
            if let Some(a) = stream.audio() {
                w.number_property("audiosamplerate", f64::from(a.sample_rate));
                w.bool_property("stereo", a.channels >= 2);
                if let Some(TrackKind::Audio { flags, .. }) = self.tracks.get(stream.index) {
                    w.number_property("audiocodecid", f64::from(flags >> 4));
                }
            }
        }
        w.string_property("encoder", ENCODER_NAME);
        let filesize_pos = w.number_property("filesize", 0.0);
        w.end_object();

        let data = w.into_bytes();
        let data_start = io.position()? + u64::from(TAG_HEADER_SIZE);
        Self::write_tag(io, TAG_SCRIPT, 0, &data)?;
        if io.is_seekable() {
            self.duration_offset = Some(data_start + duration_pos as u64);
            self.filesize_offset = Some(data_start + filesize_pos as u64);
        }
        Ok(())
    }

    fn write_sequence_headers(&self, io: &mut IoContext, streams: &[Stream]) -> FerryResult<()> {
        for (stream, track) in streams.iter().zip(&self.tracks) {
            if stream.extra_data.is_empty() {
                continue;
            }
            let mut tag_data = Vec::with_capacity(stream.extra_data.len() + 5);
            match *track {
                TrackKind::Video {
                    codec_byte,
                    has_cts: true,
                } => {
                    tag_data.push((1 << 4) | codec_byte);
                    tag_data.extend_from_slice(&[0, 0, 0, 0]);
                    tag_data.extend_from_slice(&stream.extra_data);
                    Self::write_tag(io, TAG_VIDEO, 0, &tag_data)?;
                }
                TrackKind::Audio {
                    flags,
                    is_aac: true,
                } => {
                    tag_data.push(flags);
                    tag_data.push(0);
                    tag_data.extend_from_slice(&stream.extra_data);
                    Self::write_tag(io, TAG_AUDIO, 0, &tag_data)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Muxer for FlvMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn name(&self) -> &str {
        "flv"
    }

    fn init_stream(&self, stream: &mut Stream) -> FerryResult<()> {
        stream.time_base = Rational::MILLI;
        Ok(())
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> FerryResult<()> {
        if streams.is_empty() {
            return Err(FerryError::InvalidArgument("FLV: 没有输入流".into()));
        }

        let mut tracks = Vec::with_capacity(streams.len());
        let (mut has_audio, mut has_video) = (false, false);
        for stream in streams {
            let track = match stream.media_type {
                MediaType::Audio if has_audio => {
                    return Err(FerryError::InvalidArgument("FLV 只支持一路音频".into()));
                }
                MediaType::Video if has_video => {
                    return Err(FerryError::InvalidArgument("FLV 只支持一路视频".into()));
                }
                MediaType::Audio => {
                    has_audio = true;
                    Self::audio_track(stream)?
                }
                MediaType::Video => {
                    has_video = true;
                    Self::video_track(stream)?
                }
                other => {
                    return Err(FerryError::Unsupported(format!("FLV 不支持{other}流")));
                }
            };
            tracks.push(track);
        }
        self.tracks = tracks;

        io.write_all(b"FLV")?;
        io.write_u8(1)?;
        io.write_u8(if has_audio { 0x04 } else { 0 } | if has_video { 0x01 } else { 0 })?;
        io.write_u32_be(9)?;
        io.write_u32_be(0)?;

        self.write_metadata(io, streams)?;
        self.write_sequence_headers(io, streams)?;
        debug!("FLV 写入头部: audio={has_audio} video={has_video}");
        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> FerryResult<()> {
        let track = *self
            .tracks
            .get(packet.stream_index)
            .ok_or(FerryError::StreamNotFound(packet.stream_index))?;

        if packet.dts == NOPTS_VALUE || packet.dts < 0 {
            return Err(FerryError::InvalidArgument(format!(
                "FLV: 无效的时间戳 dts={}",
                packet.dts
            )));
        }
        if packet.dts > i64::from(u32::MAX) {
            return Err(FerryError::InvalidArgument(format!(
                "FLV: 时间戳超出范围 dts={}",
                packet.dts
            )));
        }

        let mut tag_data = Vec::with_capacity(packet.size() + 5);
        let tag_type = match track {
            TrackKind::Video {
                codec_byte,
                has_cts,
            } => {
                let frame_type: u8 = if packet.is_keyframe { 1 } else { 2 };
                tag_data.push((frame_type << 4) | codec_byte);
                if has_cts {
                    let cts = if packet.pts == NOPTS_VALUE {
                        0
                    } else {
                        packet.pts - packet.dts
                    };
                    if !(-0x80_0000..0x80_0000).contains(&cts) {
                        return Err(FerryError::InvalidArgument(format!(
                            "FLV: CompositionTime 超出 24 位范围: {cts}"
                        )));
                    }
                    tag_data.push(1);
                    tag_data.extend_from_slice(&(cts as i32).to_be_bytes()[1..]);
                }
                TAG_VIDEO
            }
            TrackKind::Audio { flags, is_aac } => {
                tag_data.push(flags);
                if is_aac {
                    tag_data.push(1);
                }
                TAG_AUDIO
            }
        };
        tag_data.extend_from_slice(&packet.data);
        if tag_data.len() > MAX_TAG_DATA_SIZE {
            return Err(FerryError::InvalidArgument(format!(
                "FLV: 数据包过大 ({} 字节)",
                packet.size()
            )));
        }

        Self::write_tag(io, tag_type, packet.dts, &tag_data)?;

        self.first_ms.get_or_insert(packet.dts);
        let end = packet.dts + packet.duration.max(0);
        self.max_end_ms = self.max_end_ms.max(end);
        Ok(())
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> FerryResult<()> {
        let (Some(duration_offset), Some(filesize_offset)) =
            (self.duration_offset, self.filesize_offset)
        else {
            return Ok(());
        };

        let end = io.position()?;
        let duration = (self.max_end_ms - self.first_ms.unwrap_or(0)).max(0) as f64 / 1000.0;

        io.seek(SeekFrom::Start(duration_offset))?;
        io.write_all(&duration.to_be_bytes())?;
        io.seek(SeekFrom::Start(filesize_offset))?;
        io.write_all(&(end as f64).to_be_bytes())?;
        io.seek(SeekFrom::Start(end))?;

        debug!("FLV 写入尾部: duration={duration:.3}s filesize={end}");
        Ok(())
    }
}
