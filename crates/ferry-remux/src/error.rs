//! 转封装错误类型.

use std::path::PathBuf;

use ferry_core::FerryError;
use thiserror::Error;

/// 转封装错误
///
/// 创建阶段的错误意味着没有得到任何任务; 处理阶段的错误意味着输出文件
/// 不完整 (不会被删除). 单个数据包的可恢复错误不会出现在这里.
#[derive(Debug, Error)]
pub enum RemuxError {
    /// 输入文件不存在
    #[error("输入文件不存在: {}", .0.display())]
    InputNotFound(PathBuf),

    /// 输入与输出指向同一个文件
    #[error("输入与输出是同一个文件: {}", .0.display())]
    SamePath(PathBuf),

    /// 无法打开或解析输入
    #[error("打开输入 {} 失败: {source}", .path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: FerryError,
    },

    /// 输入中没有任何流
    #[error("输入 {} 中没有任何流", .0.display())]
    NoStreams(PathBuf),

    /// 无法根据输出文件名确定容器格式
    #[error("无法确定输出格式 {}: {source}", .path.display())]
    UnknownOutputFormat {
        path: PathBuf,
        #[source]
        source: FerryError,
    },

    /// 创建输出上下文失败
    #[error("创建输出 {} 失败: {source}", .path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: FerryError,
    },

    /// 无法为某条输入流创建对应的输出流
    #[error("创建输出流 #{index} 失败: {source}")]
    AddStream {
        index: usize,
        #[source]
        source: FerryError,
    },

    /// 无法创建输出文件
    #[error("打开输出文件 {} 失败: {source}", .path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: FerryError,
    },

    /// 写入容器头部失败
    #[error("写入头部失败: {0}")]
    WriteHeader(#[source] FerryError),

    /// 不可恢复的数据包写入错误
    #[error("写入数据包失败 (流 {stream_index}): {source}")]
    WritePacket {
        stream_index: usize,
        #[source]
        source: FerryError,
    },

    /// 写入容器尾部失败
    #[error("写入尾部失败: {0}")]
    WriteTrailer(#[source] FerryError),

    /// 任务已经执行过一次
    #[error("转封装任务已经执行过")]
    AlreadyProcessed,

    /// 后台转封装线程异常退出
    #[error("转封装线程异常退出")]
    WorkerPanicked,
}

impl RemuxError {
    /// 是否为创建阶段的错误
    pub fn is_creation_error(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound(_)
                | Self::SamePath(_)
                | Self::OpenInput { .. }
                | Self::NoStreams(_)
                | Self::UnknownOutputFormat { .. }
                | Self::CreateOutput { .. }
                | Self::AddStream { .. }
                | Self::OpenOutput { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RemuxError::SamePath(PathBuf::from("a.flv"));
        assert_eq!(err.to_string(), "输入与输出是同一个文件: a.flv");
        assert!(err.is_creation_error());

        let err = RemuxError::WriteTrailer(FerryError::Io(std::io::Error::other("磁盘已满")));
        assert!(err.to_string().contains("磁盘已满"));
        assert!(!err.is_creation_error());
        assert!(std::error::Error::source(&err).is_some());
    }
}
