//! 流信息定义.
//!
//! 对标 FFmpeg 的 `AVStream` + `AVCodecParameters`, 描述容器中的一条流.

use ferry_core::{MediaType, Rational};

use crate::codec_id::CodecId;

/// 流信息
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 容器相关的编解码器标签 (如 WAV 格式码、FLV SoundFormat), 0 表示未设置
    pub codec_tag: u32,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 起始时间 (以 time_base 为单位)
    pub start_time: i64,
    /// 编解码器私有数据 (extradata, 如 AVCDecoderConfigurationRecord)
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
    /// 元数据 (标题, 语言等)
    pub metadata: Vec<(String, String)>,
}

/// 流特定参数
#[derive(Debug, Clone, PartialEq)]
pub enum StreamParams {
    /// 视频流参数
    Video(VideoStreamParams),
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 其他
    Other,
}

/// 视频流参数
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamParams {
    /// 宽度 (像素, 0 表示未知)
    pub width: u32,
    /// 高度 (像素, 0 表示未知)
    pub height: u32,
    /// 帧率 (0/1 表示未知)
    pub frame_rate: Rational,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
}

/// 音频流参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 每个采样的位深 (压缩格式为 0)
    pub bits_per_sample: u32,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
    /// 每帧采样数 (0 表示可变)
    pub frame_size: u32,
}

impl Stream {
    /// 创建一条只有基本信息的流, 其余字段取默认值
    pub fn new(index: usize, codec_id: CodecId, time_base: Rational, params: StreamParams) -> Self {
        Self {
            index,
            media_type: codec_id.media_type(),
            codec_id,
            codec_tag: 0,
            time_base,
            duration: -1,
            start_time: 0,
            extra_data: Vec::new(),
            params,
            metadata: Vec::new(),
        }
    }

    /// 音频参数 (如果是音频流)
    pub fn audio(&self) -> Option<&AudioStreamParams> {
        match &self.params {
            StreamParams::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// 视频参数 (如果是视频流)
    pub fn video(&self) -> Option<&VideoStreamParams> {
        match &self.params {
            StreamParams::Video(v) => Some(v),
            _ => None,
        }
    }

    /// 按键名查找元数据 (不区分大小写)
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
