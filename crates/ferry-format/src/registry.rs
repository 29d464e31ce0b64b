//! 容器格式注册表.
//!
//! 管理所有已注册的解封装器/封装器, 支持按格式标识查找、自动探测输入格式
//! 以及按输出文件名猜测输出格式.

use std::collections::HashMap;
use std::path::Path;

use ferry_core::{FerryError, FerryResult};
use log::debug;

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::probe::{FormatProbe, PROBE_SIZE, ProbeResult};

/// 解封装器工厂函数类型
pub type DemuxerFactory = fn() -> FerryResult<Box<dyn Demuxer>>;

/// 封装器工厂函数类型
pub type MuxerFactory = fn() -> FerryResult<Box<dyn Muxer>>;

/// 容器格式注册表
///
/// 同一格式重复注册时, 后注册的工厂覆盖先注册的.
pub struct FormatRegistry {
    demuxers: HashMap<FormatId, (String, DemuxerFactory)>,
    muxers: HashMap<FormatId, (String, MuxerFactory)>,
    probes: Vec<Box<dyn FormatProbe + Send + Sync>>,
}

impl FormatRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            demuxers: HashMap::new(),
            muxers: HashMap::new(),
            probes: Vec::new(),
        }
    }

    /// 注册一个解封装器
    pub fn register_demuxer(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: DemuxerFactory,
    ) {
        self.demuxers.insert(format_id, (name.into(), factory));
    }

    /// 注册一个封装器
    pub fn register_muxer(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: MuxerFactory,
    ) {
        self.muxers.insert(format_id, (name.into(), factory));
    }

    /// 注册一个格式探测器
    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe + Send + Sync>) {
        self.probes.push(probe);
    }

    /// 创建指定格式的解封装器实例
    pub fn create_demuxer(&self, format_id: FormatId) -> FerryResult<Box<dyn Demuxer>> {
        let (_, factory) = self.demuxers.get(&format_id).ok_or_else(|| {
            FerryError::FormatNotFound(format!("未找到 {format_id} 的解封装器"))
        })?;
        factory()
    }

    /// 创建指定格式的封装器实例
    pub fn create_muxer(&self, format_id: FormatId) -> FerryResult<Box<dyn Muxer>> {
        let (_, factory) = self
            .muxers
            .get(&format_id)
            .ok_or_else(|| FerryError::FormatNotFound(format!("未找到 {format_id} 的封装器")))?;
        factory()
    }

    /// 是否注册了指定格式的封装器
    pub fn has_muxer(&self, format_id: FormatId) -> bool {
        self.muxers.contains_key(&format_id)
    }

    /// 探测数据的容器格式, 返回置信度最高的结果
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
        let mut best: Option<ProbeResult> = None;
        for probe in &self.probes {
            if let Some(score) = probe.probe(data, filename) {
                if best.as_ref().is_none_or(|b| score > b.score) {
                    best = Some(ProbeResult {
                        format_id: probe.format_id(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// 探测输入格式
    ///
    /// 读取至多 [`PROBE_SIZE`] 字节头部数据进行探测, 然后 seek 回起始位置,
    /// 探测读走的数据不会影响之后的顺序读取.
    pub fn probe_input(&self, io: &mut IoContext, filename: Option<&str>) -> FerryResult<ProbeResult> {
        let probe_size = io
            .size()
            .map_or(PROBE_SIZE, |size| (size as usize).min(PROBE_SIZE));
        let probe_buf = io.read_bytes(probe_size)?;

        let result = self
            .probe(&probe_buf, filename)
            .ok_or_else(|| FerryError::FormatNotFound("无法识别输入文件格式".into()))?;

        io.seek(std::io::SeekFrom::Start(0))?;
        debug!(
            "探测到输入格式: {} (score={})",
            result.format_id, result.score
        );
        Ok(result)
    }

    /// 根据输出文件名猜测输出格式, 只返回已注册封装器的格式
    pub fn guess_output_format(&self, path: &Path) -> FerryResult<FormatId> {
        FormatId::from_path(path)
            .filter(|id| self.has_muxer(*id))
            .ok_or_else(|| {
                FerryError::FormatNotFound(format!(
                    "无法从输出文件名确定格式: '{}'",
                    path.display()
                ))
            })
    }

    /// 获取所有已注册的解封装器 (按名称排序)
    pub fn list_demuxers(&self) -> Vec<(FormatId, &str)> {
        let mut list: Vec<_> = self
            .demuxers
            .iter()
            .map(|(id, (name, _))| (*id, name.as_str()))
            .collect();
        list.sort_by_key(|(_, name)| *name);
        list
    }

    /// 获取所有已注册的封装器 (按名称排序)
    pub fn list_muxers(&self) -> Vec<(FormatId, &str)> {
        let mut list: Vec<_> = self
            .muxers
            .iter()
            .map(|(id, (name, _))| (*id, name.as_str()))
            .collect();
        list.sort_by_key(|(_, name)| *name);
        list
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
