//! 转封装选项.

use serde::{Deserialize, Serialize};

/// 默认每隔多少个数据包报告一次进度
pub const DEFAULT_PROGRESS_INTERVAL: u32 = 11;

/// 转封装选项
///
/// 可以从 JSON 等配置反序列化, 缺省字段取默认值.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemuxOptions {
    /// 每隔多少个数据包调用一次进度回调 (0 视为 1)
    pub progress_interval: u32,
    /// 打开输入后是否以 debug 级别输出流布局
    pub dump_format: bool,
    /// 强制输出格式名 (如 "flv", "null"), 为空时按输出文件扩展名猜测
    pub output_format: Option<String>,
}

impl Default for RemuxOptions {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            dump_format: true,
            output_format: None,
        }
    }
}
