//! 统一错误类型定义.
//!
//! 所有 Ferry crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Ferry 统一错误类型
#[derive(Debug, Error)]
pub enum FerryError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 无效数据 (损坏的码流、非法的容器结构等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl FerryError {
    /// 是否为流末尾
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/// Ferry 统一 Result 类型
pub type FerryResult<T> = Result<T, FerryError>;
