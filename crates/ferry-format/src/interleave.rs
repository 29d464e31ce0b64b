//! 跨流交错排序.
//!
//! 对标 FFmpeg `av_interleaved_write_frame` 内部的交错队列:
//! 每条流一个 FIFO, 只有当所有流都有待写数据包时, 才按 DTS 放行最早的一个.
//! 若某条流长期无数据, 队列跨度超过 `max_delta` 后也会强制放行,
//! 避免内存无限增长.

use std::cmp::Ordering;
use std::collections::VecDeque;

use ferry_core::{Rational, compare_ts, rescale_q};

use crate::packet::Packet;

/// 默认最大交错跨度: 10 秒 (微秒)
pub const DEFAULT_MAX_INTERLEAVE_DELTA: i64 = 10_000_000;

/// 交错队列
pub struct Interleaver {
    /// 每条流的待写队列
    queues: Vec<VecDeque<Packet>>,
    /// 每条流的时间基
    time_bases: Vec<Rational>,
    /// 最大交错跨度 (微秒), 0 表示不限制
    max_delta: i64,
}

impl Interleaver {
    /// 为给定时间基的各条流创建交错队列
    pub fn new(time_bases: Vec<Rational>) -> Self {
        Self {
            queues: time_bases.iter().map(|_| VecDeque::new()).collect(),
            time_bases,
            max_delta: DEFAULT_MAX_INTERLEAVE_DELTA,
        }
    }

    /// 设置最大交错跨度 (微秒)
    pub fn with_max_delta(mut self, max_delta: i64) -> Self {
        self.max_delta = max_delta;
        self
    }

    /// 排队一个数据包, 调用方保证 `stream_index` 有效
    pub fn push(&mut self, packet: Packet) {
        if let Some(queue) = self.queues.get_mut(packet.stream_index) {
            queue.push_back(packet);
        }
    }

    /// 队列中的数据包总数
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    /// 取出下一个可以安全写出的数据包
    pub fn pop_ready(&mut self) -> Option<Packet> {
        let earliest = self.earliest_head()?;
        let all_present = self.queues.iter().all(|q| !q.is_empty());
        if all_present || self.span_exceeded(earliest) {
            return self.queues[earliest].pop_front();
        }
        None
    }

    /// 不论其他流状态, 按时间顺序取出下一个数据包 (写尾部时冲刷)
    pub fn pop_any(&mut self) -> Option<Packet> {
        let earliest = self.earliest_head()?;
        self.queues[earliest].pop_front()
    }

    /// 队首时间戳最小的流; 时间戳相同时取索引小的
    fn earliest_head(&self) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (idx, queue) in self.queues.iter().enumerate() {
            let Some(head) = queue.front() else {
                continue;
            };
            let ts = head.ordering_ts();
            let earlier = match best {
                None => true,
                Some((best_idx, best_ts)) => {
                    compare_ts(ts, self.time_bases[idx], best_ts, self.time_bases[best_idx])
                        == Ordering::Less
                }
            };
            if earlier {
                best = Some((idx, ts));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// 最早队首与各队列最新数据包之间的跨度是否超过上限
    fn span_exceeded(&self, earliest: usize) -> bool {
        if self.max_delta <= 0 {
            return false;
        }
        let Some(head) = self.queues[earliest].front() else {
            return false;
        };
        let head_us = rescale_q(head.ordering_ts(), self.time_bases[earliest], Rational::MICRO);
        self.queues.iter().enumerate().any(|(idx, queue)| {
            queue.back().is_some_and(|tail| {
                let tail_us = rescale_q(tail.ordering_ts(), self.time_bases[idx], Rational::MICRO);
                tail_us.saturating_sub(head_us) > self.max_delta
            })
        })
    }
}
