//! 解封装器 (Demuxer) trait 定义.
//!
//! 对标 FFmpeg 的 `AVInputFormat`, 定义了从容器格式中读取数据包的接口.

use ferry_core::FerryResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 解析容器头部, 必要时预读若干数据包以建立流信息
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包, 直到返回 `FerryError::Eof`
///
/// `open()` 预读之后必须把读取位置恢复到第一个数据包之前,
/// 保证随后的顺序读取不会丢包.
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    fn open(&mut self, io: &mut IoContext) -> FerryResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取, `packet.pos` 为其在输入中的字节偏移
    /// - `Err(FerryError::Eof)`: 已到达文件末尾
    fn read_packet(&mut self, io: &mut IoContext) -> FerryResult<Packet>;

    /// 获取容器时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;

    /// 获取容器级元数据
    fn metadata(&self) -> &[(String, String)] {
        &[]
    }
}
