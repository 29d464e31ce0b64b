//! FLV (Flash Video) 容器解封装器.
//!
//! # FLV 文件结构
//! ```text
//! FLV Header (9 bytes):
//!   "FLV" (3 bytes)
//!   Version (1 byte, 通常 = 1)
//!   Flags (1 byte): bit0=video, bit2=audio
//!   DataOffset (4 bytes, BE): 头部大小 (通常 9)
//!
//! PreviousTagSize0 (4 bytes, BE): 0
//!
//! FLV Tag:
//!   TagType (1 byte): 8=Audio, 9=Video, 18=Script
//!   DataSize (3 bytes, BE)
//!   Timestamp (3 bytes, BE) + TimestampExtended (1 byte, 高8位)
//!   StreamID (3 bytes, BE): always 0
//!   TagData (DataSize bytes)
//! PreviousTagSize (4 bytes, BE)
//! ```
//!
//! # 音频 Tag 数据
//! ```text
//! SoundFormat (4 bits): 0/3=PCM, 2=MP3, 10=AAC, 14=MP3-8kHz
//! SoundRate (2 bits): 0=5.5kHz, 1=11kHz, 2=22kHz, 3=44kHz
//! SoundSize (1 bit): 0=8bit, 1=16bit
//! SoundType (1 bit): 0=mono, 1=stereo
//! [AAC: AACPacketType (1 byte): 0=Sequence Header, 1=Raw]
//! ```
//!
//! # 视频 Tag 数据
//! ```text
//! FrameType (4 bits): 1=keyframe, 2=inter, 5=info
//! CodecID (4 bits): 2=H.263, 4=VP6, 7=AVC, 12=HEVC, 13=AV1
//! [AVC/HEVC: PacketType (1 byte): 0=SeqHeader, 1=NALU, 2=EndOfSeq]
//! [AVC/HEVC: CompositionTimeOffset (3 bytes, BE, signed)]
//! ```

use std::io::SeekFrom;

use bytes::Bytes;
use ferry_core::{FerryError, FerryResult, Rational, rescale_q};
use log::{debug, warn};

use crate::amf::{AmfReader, AmfValue};
use crate::codec_id::CodecId;
use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::probe::{self, FormatProbe, ProbeScore};
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

/// FLV Tag 类型
pub(crate) const TAG_AUDIO: u8 = 8;
pub(crate) const TAG_VIDEO: u8 = 9;
pub(crate) const TAG_SCRIPT: u8 = 18;

/// Tag 头部长度
pub(crate) const TAG_HEADER_SIZE: u32 = 11;

/// FLV 视频编解码器 ID
pub(crate) const FLV_CODEC_H263: u8 = 2;
pub(crate) const FLV_CODEC_VP6: u8 = 4;
pub(crate) const FLV_CODEC_AVC: u8 = 7;
pub(crate) const FLV_CODEC_HEVC: u8 = 12;
pub(crate) const FLV_CODEC_AV1: u8 = 13;

/// FLV 音频编解码器 ID (SoundFormat)
pub(crate) const FLV_AUDIO_PCM: u8 = 0;
pub(crate) const FLV_AUDIO_MP3: u8 = 2;
pub(crate) const FLV_AUDIO_PCM_LE: u8 = 3;
pub(crate) const FLV_AUDIO_AAC: u8 = 10;
pub(crate) const FLV_AUDIO_MP3_8K: u8 = 14;

/// SoundRate 索引对应的采样率
pub(crate) const SOUND_RATES: [u32; 4] = [5512, 11025, 22050, 44100];

/// FLV 时间基: 毫秒
const FLV_TIME_BASE: Rational = Rational::MILLI;

/// 打开时最多预读的 Tag 数
const MAX_PROBE_TAGS: usize = 32;

/// Tag 头部
struct TagHeader {
    tag_type: u8,
    data_size: u32,
    timestamp: i64,
    /// Tag 在文件中的起始偏移
    pos: u64,
}

/// onMetaData 中关心的字段
#[derive(Default)]
struct ScriptInfo {
    width: Option<u32>,
    height: Option<u32>,
    frame_rate: Option<Rational>,
    video_bit_rate: Option<u64>,
    audio_bit_rate: Option<u64>,
}

/// FLV 解封装器
pub struct FlvDemuxer {
    streams: Vec<Stream>,
    audio_stream_idx: Option<usize>,
    video_stream_idx: Option<usize>,
    /// 文件头声明的音视频标志
    header_has_audio: bool,
    header_has_video: bool,
    /// 文件时长 (秒, 来自 onMetaData)
    duration_secs: Option<f64>,
    script_info: ScriptInfo,
    metadata: Vec<(String, String)>,
    /// 第一个 Tag 的偏移 (PreviousTagSize0 之后)
    first_tag_offset: u64,
}

impl FlvDemuxer {
    /// 创建 FLV 解封装器实例 (工厂函数)
    pub fn create() -> FerryResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
            audio_stream_idx: None,
            video_stream_idx: None,
            header_has_audio: false,
            header_has_video: false,
            duration_secs: None,
            script_info: ScriptInfo::default(),
            metadata: Vec::new(),
            first_tag_offset: 0,
        }))
    }

    fn read_header(&mut self, io: &mut IoContext) -> FerryResult<()> {
        let sig = io.read_bytes(3)?;
        if sig != b"FLV" {
            return Err(FerryError::InvalidData("不是 FLV 文件".into()));
        }
        let version = io.read_u8()?;
        let flags = io.read_u8()?;
        let data_offset = io.read_u32_be()?;
        if data_offset < 9 {
            return Err(FerryError::InvalidData(format!(
                "FLV: 无效的头部长度 {data_offset}"
            )));
        }

        self.header_has_audio = flags & 0x04 != 0;
        self.header_has_video = flags & 0x01 != 0;
        debug!(
            "FLV: version={version} audio={} video={} data_offset={data_offset}",
            self.header_has_audio, self.header_has_video
        );

        io.seek(SeekFrom::Start(u64::from(data_offset)))?;
        let _prev_size0 = io.read_u32_be()?;
        self.first_tag_offset = u64::from(data_offset) + 4;
        Ok(())
    }

    fn read_tag_header(io: &mut IoContext) -> FerryResult<TagHeader> {
        let pos = io.position()?;
        let tag_type = io.read_u8()?;
        let data_size = io.read_u24_be()?;
        let timestamp_low = io.read_u24_be()?;
        let timestamp_ext = io.read_u8()?;
        let _stream_id = io.read_u24_be()?;
        // 扩展字节是无符号 32 位毫秒时间戳的高 8 位
        let timestamp = i64::from((u32::from(timestamp_ext) << 24) | timestamp_low);
        Ok(TagHeader {
            tag_type,
            data_size,
            timestamp,
            pos,
        })
    }

    /// 读取 Tag 末尾的 PreviousTagSize; 文件在此截断不算错误
    fn skip_previous_tag_size(io: &mut IoContext) -> FerryResult<()> {
        match io.read_u32_be() {
            Ok(_) | Err(FerryError::Eof) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 读取并处理一个 Tag, 返回可能产生的数据包
    fn read_tag(&mut self, io: &mut IoContext) -> FerryResult<Option<Packet>> {
        let tag = Self::read_tag_header(io)?;
        let body = Bytes::from(io.read_bytes(tag.data_size as usize)?);
        Self::skip_previous_tag_size(io)?;

        match tag.tag_type {
            TAG_AUDIO => self.handle_audio_tag(&tag, body),
            TAG_VIDEO => self.handle_video_tag(&tag, body),
            TAG_SCRIPT => {
                if let Err(e) = self.parse_script_tag(&body) {
                    warn!("FLV: 解析脚本 Tag 失败: {e}");
                }
                Ok(None)
            }
            other => {
                debug!("FLV: 跳过未知 Tag 类型 {other} (pos={})", tag.pos);
                Ok(None)
            }
        }
    }

    fn audio_codec(sound_format: u8, sound_size: u8) -> CodecId {
        match sound_format {
            FLV_AUDIO_PCM | FLV_AUDIO_PCM_LE => {
                if sound_size == 1 {
                    CodecId::PcmS16le
                } else {
                    CodecId::PcmU8
                }
            }
            FLV_AUDIO_MP3 | FLV_AUDIO_MP3_8K => CodecId::Mp3,
            FLV_AUDIO_AAC => CodecId::Aac,
            _ => CodecId::None,
        }
    }

    fn video_codec(codec_byte: u8) -> CodecId {
        match codec_byte {
            FLV_CODEC_H263 => CodecId::Mpeg4,
            FLV_CODEC_VP6 => CodecId::Vp6,
            FLV_CODEC_AVC => CodecId::H264,
            FLV_CODEC_HEVC => CodecId::H265,
            FLV_CODEC_AV1 => CodecId::Av1,
            _ => CodecId::None,
        }
    }

    fn handle_audio_tag(&mut self, tag: &TagHeader, body: Bytes) -> FerryResult<Option<Packet>> {
        let Some(&flags) = body.first() else {
            return Ok(None);
        };
        let sound_format = flags >> 4;
        let sound_rate = SOUND_RATES[usize::from((flags >> 2) & 0x03)];
        let sound_size = (flags >> 1) & 0x01;
        let channels = if flags & 0x01 == 1 { 2 } else { 1 };
        let codec_id = Self::audio_codec(sound_format, sound_size);

        let idx = match self.audio_stream_idx {
            Some(idx) => idx,
            None => {
                let idx = self.streams.len();
                let sample_rate = match sound_format {
                    // AAC 的真实采样率在 AudioSpecificConfig 中, 按规范填 44.1kHz
                    FLV_AUDIO_AAC => 44100,
                    FLV_AUDIO_MP3_8K => 8000,
                    _ => sound_rate,
                };
                let mut stream = Stream::new(
                    idx,
                    codec_id,
                    FLV_TIME_BASE,
                    StreamParams::Audio(AudioStreamParams {
                        sample_rate,
                        channels,
                        bits_per_sample: codec_id.pcm_bits().unwrap_or(0),
                        bit_rate: 0,
                        frame_size: if codec_id == CodecId::Aac { 1024 } else { 0 },
                    }),
                );
                stream.codec_tag = u32::from(sound_format);
                self.streams.push(stream);
                self.audio_stream_idx = Some(idx);
                idx
            }
        };

        let mut offset = 1;
        if sound_format == FLV_AUDIO_AAC {
            let Some(&aac_packet_type) = body.get(1) else {
                return Ok(None);
            };
            offset = 2;
            if aac_packet_type == 0 {
                debug!("FLV: 收到 AAC sequence header, {} 字节", body.len() - offset);
                self.streams[idx].extra_data = body[offset..].to_vec();
                return Ok(None);
            }
        }

        let payload = body.slice(offset..);
        if payload.is_empty() {
            return Ok(None);
        }

        let mut pkt = Packet::from_data(payload);
        pkt.stream_index = idx;
        pkt.pts = tag.timestamp;
        pkt.dts = tag.timestamp;
        pkt.is_keyframe = true;
        pkt.pos = tag.pos as i64;
        if let Some(bits) = codec_id.pcm_bits() {
            let samples = pkt.size() as i64 / i64::from(channels * bits / 8);
            pkt.duration = rescale_q(samples, Rational::new(1, sound_rate as i32), FLV_TIME_BASE);
        }
        Ok(Some(pkt))
    }

    fn handle_video_tag(&mut self, tag: &TagHeader, body: Bytes) -> FerryResult<Option<Packet>> {
        let Some(&flags) = body.first() else {
            return Ok(None);
        };
        let frame_type = flags >> 4;
        let codec_byte = flags & 0x0F;
        // 视频信息/命令帧不含画面数据
        if frame_type == 5 {
            return Ok(None);
        }

        let idx = match self.video_stream_idx {
            Some(idx) => idx,
            None => {
                let idx = self.streams.len();
                let mut stream = Stream::new(
                    idx,
                    Self::video_codec(codec_byte),
                    FLV_TIME_BASE,
                    StreamParams::Video(VideoStreamParams {
                        width: 0,
                        height: 0,
                        frame_rate: Rational::new(0, 1),
                        bit_rate: 0,
                    }),
                );
                stream.codec_tag = u32::from(codec_byte);
                self.streams.push(stream);
                self.video_stream_idx = Some(idx);
                idx
            }
        };

        let mut offset = 1;
        let mut cts = 0i64;
        if matches!(codec_byte, FLV_CODEC_AVC | FLV_CODEC_HEVC | FLV_CODEC_AV1) {
            if body.len() < 5 {
                return Ok(None);
            }
            let packet_type = body[1];
            let raw = (u32::from(body[2]) << 16) | (u32::from(body[3]) << 8) | u32::from(body[4]);
            // 有符号 24 位
            cts = i64::from(((raw << 8) as i32) >> 8);
            offset = 5;
            match packet_type {
                0 => {
                    debug!("FLV: 收到视频 sequence header, {} 字节", body.len() - offset);
                    self.streams[idx].extra_data = body[offset..].to_vec();
                    return Ok(None);
                }
                2 => return Ok(None),
                _ => {}
            }
        }

        let payload = body.slice(offset..);
        if payload.is_empty() {
            return Ok(None);
        }

        let mut pkt = Packet::from_data(payload);
        pkt.stream_index = idx;
        pkt.dts = tag.timestamp;
        pkt.pts = tag.timestamp + cts;
        pkt.is_keyframe = frame_type == 1;
        pkt.pos = tag.pos as i64;
        Ok(Some(pkt))
    }

    /// 解析 onMetaData (AMF0)
    fn parse_script_tag(&mut self, body: &[u8]) -> FerryResult<()> {
        let mut reader = AmfReader::new(body);
        let name = reader.read_value()?;
        if name.as_str() != Some("onMetaData") {
            return Ok(());
        }
        let meta = reader.read_value()?;
        let AmfValue::Object(props) = &meta else {
            return Ok(());
        };

        let positive = |key: &str| {
            meta.get(key)
                .and_then(AmfValue::as_number)
                .filter(|v| v.is_finite() && *v > 0.0)
        };

        if let Some(d) = positive("duration") {
            debug!("FLV: onMetaData duration={d}s");
            self.duration_secs = Some(d);
        }
        self.script_info.width = positive("width").map(|v| v as u32);
        self.script_info.height = positive("height").map(|v| v as u32);
        self.script_info.frame_rate =
            positive("framerate").map(|fps| Rational::new((fps * 1000.0).round() as i32, 1000).reduce());
        self.script_info.video_bit_rate = positive("videodatarate").map(|kbps| (kbps * 1000.0) as u64);
        self.script_info.audio_bit_rate = positive("audiodatarate").map(|kbps| (kbps * 1000.0) as u64);

        for (key, value) in props {
            if let AmfValue::String(s) = value {
                self.metadata.push((key.clone(), s.clone()));
            }
        }
        Ok(())
    }

    /// 将 onMetaData 中的信息补充到流参数
    fn apply_script_info(&mut self) {
        let info = &self.script_info;
        for stream in &mut self.streams {
            match &mut stream.params {
                StreamParams::Video(v) => {
                    v.width = info.width.unwrap_or(v.width);
                    v.height = info.height.unwrap_or(v.height);
                    v.frame_rate = info.frame_rate.unwrap_or(v.frame_rate);
                    v.bit_rate = info.video_bit_rate.unwrap_or(v.bit_rate);
                }
                StreamParams::Audio(a) => {
                    a.bit_rate = info.audio_bit_rate.unwrap_or(a.bit_rate);
                }
                StreamParams::Other => {}
            }
            if let Some(secs) = self.duration_secs {
                stream.duration = (secs * 1000.0).round() as i64;
            }
        }
    }
}

impl Demuxer for FlvDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn name(&self) -> &str {
        "flv"
    }

    fn open(&mut self, io: &mut IoContext) -> FerryResult<()> {
        self.read_header(io)?;

        // 预读若干 Tag 以建立流信息 (包括 sequence header)
        for _ in 0..MAX_PROBE_TAGS {
            match self.read_tag(io) {
                Ok(_) => {}
                Err(FerryError::Eof) => break,
                Err(e) => return Err(e),
            }
            let audio_done = !self.header_has_audio || self.audio_stream_idx.is_some();
            let video_done = !self.header_has_video || self.video_stream_idx.is_some();
            let configs_done = self.streams.iter().all(|s| {
                !matches!(s.codec_id, CodecId::Aac | CodecId::H264 | CodecId::H265)
                    || !s.extra_data.is_empty()
            });
            if audio_done && video_done && configs_done && !self.streams.is_empty() {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(FerryError::InvalidData("FLV: 未找到音频或视频流".into()));
        }
        self.apply_script_info();

        // 回到第一个 Tag, 准备顺序读取
        io.seek(SeekFrom::Start(self.first_tag_offset))?;
        debug!("FLV: 打开完成, {} 个流", self.streams.len());
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> FerryResult<Packet> {
        loop {
            if let Some(pkt) = self.read_tag(io)? {
                return Ok(pkt);
            }
        }
    }

    fn duration(&self) -> Option<f64> {
        self.duration_secs
    }

    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }
}

/// FLV 格式探测器
pub struct FlvProbe;

impl FormatProbe for FlvProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 9 && data.starts_with(b"FLV") && data[3] == 1 {
            return Some(probe::SCORE_MAX);
        }
        if probe::extension_matches(filename, FormatId::Flv) {
            return Some(probe::SCORE_EXTENSION);
        }
        None
    }

    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }
}
