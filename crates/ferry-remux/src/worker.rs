//! 后台转封装线程.
//!
//! 在独立线程上执行 [`RemuxJob`], 进度与结果通过通道送回调用方,
//! 取消通过共享标志传入进度回调.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::RemuxError;
use crate::job::{RemuxJob, RemuxSummary};
use crate::progress::Progress;

/// 后台线程发出的事件
#[derive(Debug)]
pub enum RemuxEvent {
    /// 进度百分比 (0 ~ 100, 单调不减)
    Progress(f32),
    /// 任务结束; 此时输入输出句柄均已释放
    Finished(Result<RemuxSummary, RemuxError>),
}

/// 后台转封装任务句柄
pub struct RemuxHandle {
    events: Receiver<RemuxEvent>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// 在新线程上执行转封装
pub fn spawn(mut job: RemuxJob) -> std::io::Result<RemuxHandle> {
    let (sender, events) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();

    let thread = thread::Builder::new()
        .name("ferry-remux".into())
        .spawn(move || {
            let progress_sender = sender.clone();
            let result = job.process_with(|percent| {
                // 接收端已关闭时不再发送, 但任务照常完成
                let _ = progress_sender.send(RemuxEvent::Progress(percent));
                if cancel_flag.load(Ordering::Relaxed) {
                    Progress::Cancel
                } else {
                    Progress::Continue
                }
            });
            drop(job);
            if sender.send(RemuxEvent::Finished(result)).is_err() {
                debug!("转封装结果无人接收");
            }
        })?;

    Ok(RemuxHandle {
        events,
        cancel,
        thread: Some(thread),
    })
}

impl RemuxHandle {
    /// 请求取消; 在下一次进度回调时生效
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// 是否已请求取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// 非阻塞地取出一个事件
    pub fn try_event(&self) -> Option<RemuxEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// 阻塞等待任务结束, 期间的进度交给 `on_progress`
    pub fn wait_with<F>(mut self, mut on_progress: F) -> Result<RemuxSummary, RemuxError>
    where
        F: FnMut(f32),
    {
        let mut result = Err(RemuxError::WorkerPanicked);
        for event in self.events.iter() {
            match event {
                RemuxEvent::Progress(percent) => on_progress(percent),
                RemuxEvent::Finished(r) => {
                    result = r;
                    break;
                }
            }
        }
        self.join();
        result
    }

    /// 阻塞等待任务结束, 丢弃进度事件
    pub fn wait(self) -> Result<RemuxSummary, RemuxError> {
        self.wait_with(|_| {})
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("转封装线程 panic");
            }
        }
    }
}

impl Drop for RemuxHandle {
    /// 句柄被丢弃时请求取消并等待线程退出, 避免后台线程继续写文件
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            self.join();
        }
    }
}
