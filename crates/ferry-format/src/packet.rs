//! 压缩数据包 (Packet).
//!
//! 对标 FFmpeg 的 `AVPacket`. 转封装时数据包的负载原样搬运,
//! 只有时间戳与 `pos` 会被改写.

use bytes::Bytes;
use ferry_core::NOPTS_VALUE;

/// 压缩数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS), 以所属流的 time_base 为单位
    pub pts: i64,
    /// 解码时间戳 (DTS)
    pub dts: i64,
    /// 时长 (以 time_base 为单位, 0 表示未知)
    pub duration: i64,
    /// 所属流的索引
    pub stream_index: usize,
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 在输入容器中的字节偏移 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 从数据创建数据包, 时间戳均未定义
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            duration: 0,
            stream_index: 0,
            is_keyframe: false,
            pos: -1,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否没有负载
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 用于排序的时间戳: 优先 DTS, 其次 PTS
    pub fn ordering_ts(&self) -> i64 {
        if self.dts != NOPTS_VALUE {
            self.dts
        } else {
            self.pts
        }
    }
}
