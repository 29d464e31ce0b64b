//! 编解码器标识符.
//!
//! 对标 FFmpeg 的 `AVCodecID`. 转封装不解码, 编解码器标识只用于
//! 在不同容器之间原样传递"这是什么数据".

use std::fmt;

use ferry_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// AV1
    Av1,
    /// MPEG-4 Part 2 / Sorenson H.263
    Mpeg4,
    /// On2 VP6
    Vp6,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC
    Aac,
    /// MP3
    Mp3,
    /// PCM 无符号 8 位
    PcmU8,
    /// PCM 有符号 16 位小端
    PcmS16le,
    /// PCM 有符号 24 位小端
    PcmS24le,
    /// PCM 有符号 32 位小端
    PcmS32le,
    /// PCM 32 位浮点小端
    PcmF32le,
}

impl CodecId {
    /// 所属媒体类型, 未知编解码器视为数据流
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::H264 | Self::H265 | Self::Av1 | Self::Mpeg4 | Self::Vp6 => MediaType::Video,
            Self::Aac
            | Self::Mp3
            | Self::PcmU8
            | Self::PcmS16le
            | Self::PcmS24le
            | Self::PcmS32le
            | Self::PcmF32le => MediaType::Audio,
            Self::None => MediaType::Data,
        }
    }

    /// PCM 编码的采样位深, 非 PCM 返回 None
    pub const fn pcm_bits(&self) -> Option<u32> {
        match self {
            Self::PcmU8 => Some(8),
            Self::PcmS16le => Some(16),
            Self::PcmS24le => Some(24),
            Self::PcmS32le | Self::PcmF32le => Some(32),
            _ => None,
        }
    }

    /// 编解码器名称 (与 FFmpeg 的命名一致)
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Av1 => "av1",
            Self::Mpeg4 => "mpeg4",
            Self::Vp6 => "vp6",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::PcmU8 => "pcm_u8",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmS24le => "pcm_s24le",
            Self::PcmS32le => "pcm_s32le",
            Self::PcmF32le => "pcm_f32le",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
