//! 格式探测.
//!
//! 通过分析文件头部数据和文件扩展名, 自动识别容器格式.

use crate::format_id::FormatId;

/// 探测置信度, 数值越高越可信
pub type ProbeScore = u32;

/// 仅根据扩展名匹配
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 魔数完全匹配
pub const SCORE_MAX: ProbeScore = 100;

/// 探测时最多读取的头部字节数
pub const PROBE_SIZE: usize = 8192;

/// 探测结果
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// 识别出的格式
    pub format_id: FormatId,
    /// 置信度分数
    pub score: ProbeScore,
}

/// 格式探测器 trait
///
/// 每种格式的解封装器可以实现此 trait 以支持自动格式识别.
pub trait FormatProbe {
    /// 根据文件头部数据探测格式
    ///
    /// # 参数
    /// - `data`: 文件开头的若干字节 (不超过 [`PROBE_SIZE`])
    /// - `filename`: 文件名 (可选, 用于扩展名匹配)
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore>;

    /// 此探测器对应的格式标识
    fn format_id(&self) -> FormatId;
}

/// 扩展名匹配辅助函数
pub(crate) fn extension_matches(filename: Option<&str>, format_id: FormatId) -> bool {
    filename
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FormatId::from_extension(ext) == Some(format_id))
}
