//! 容器格式标识符.
//!
//! 对标 FFmpeg 的输入/输出格式名称.

use std::fmt;
use std::path::Path;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// Flash Video (FLV)
    Flv,
    /// WAV (RIFF WAVE)
    Wav,
    /// 空输出 (丢弃所有数据, 不创建文件)
    Null,
}

impl FormatId {
    /// 所有已知格式标识的列表
    pub const ALL: &[FormatId] = &[Self::Flv, Self::Wav, Self::Null];

    /// 格式短名
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flv => "flv",
            Self::Wav => "wav",
            Self::Null => "null",
        }
    }

    /// 格式常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Flv => &["flv"],
            Self::Wav => &["wav", "wave"],
            Self::Null => &[],
        }
    }

    /// 按短名查找格式 (不区分大小写)
    pub fn from_name(name: &str) -> Option<FormatId> {
        Self::ALL
            .iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
            .copied()
    }

    /// 根据文件扩展名猜测格式 (不含 `.`)
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext.as_str()))
            .copied()
    }

    /// 从文件路径猜测格式
    pub fn from_path(path: &Path) -> Option<FormatId> {
        let ext = path.extension()?.to_str()?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_from_path() {
        assert_eq!(FormatId::from_path(Path::new("a/b/c.FLV")), Some(FormatId::Flv));
        assert_eq!(FormatId::from_path(Path::new("take.wav")), Some(FormatId::Wav));
        assert_eq!(FormatId::from_path(Path::new("noext")), None);
        assert_eq!(FormatId::from_path(Path::new("clip.mkv")), None);
    }

    #[test]
    fn test_null_only_by_name() {
        assert_eq!(FormatId::from_name("NULL"), Some(FormatId::Null));
        assert_eq!(FormatId::from_extension("null"), None);
    }
}
