//! 进度报告与取消.
//!
//! 采样频率 ([`ProgressThrottle`]) 由任务内部决定, 是否继续 ([`Progress`])
//! 由回调决定, 两者互不影响.

/// 进度回调的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// 继续处理
    Continue,
    /// 停止读取后续数据包, 已写出的部分照常收尾
    Cancel,
}

impl Progress {
    pub fn is_cancel(self) -> bool {
        self == Self::Cancel
    }
}

impl From<bool> for Progress {
    /// `true` 表示继续
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Self::Continue
        } else {
            Self::Cancel
        }
    }
}

/// 每 `interval` 个数据包触发一次
#[derive(Debug)]
pub(crate) struct ProgressThrottle {
    interval: u32,
    counter: u32,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
        }
    }

    /// 记录一个数据包, 返回本次是否应报告进度
    pub(crate) fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.interval {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

/// 进度回调的包装: 负责节流、换算百分比并保证数值单调且在 [0, 100] 内
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a mut dyn FnMut(f32) -> Progress>,
    throttle: ProgressThrottle,
    input_size: u64,
    last: f32,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(
        callback: Option<&'a mut dyn FnMut(f32) -> Progress>,
        input_size: u64,
        interval: u32,
    ) -> Self {
        Self {
            callback,
            throttle: ProgressThrottle::new(interval),
            input_size,
            last: 0.0,
        }
    }

    /// 报告 0%
    pub(crate) fn start(&mut self) -> Progress {
        self.report(0.0)
    }

    /// 每读到一个数据包调用一次; `pos` 为该数据包在输入中的字节偏移
    pub(crate) fn tick(&mut self, pos: i64) -> Progress {
        if self.callback.is_none() || !self.throttle.tick() {
            return Progress::Continue;
        }
        let percent = if self.input_size > 0 && pos >= 0 {
            (pos as f64 / self.input_size as f64 * 100.0) as f32
        } else {
            self.last
        };
        self.report(percent)
    }

    /// 报告 100%, 返回值被忽略
    pub(crate) fn finish(&mut self) {
        self.report(100.0);
    }

    fn report(&mut self, percent: f32) -> Progress {
        let Some(callback) = self.callback.as_mut() else {
            return Progress::Continue;
        };
        let value = percent.clamp(0.0, 100.0).max(self.last);
        self.last = value;
        callback(value)
    }
}
