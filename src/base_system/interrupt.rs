//! Ctrl-C 处理：第一次只置位停止标志，第二次直接退出。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    stop: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// 注册进程级信号处理器，返回共享的停止标志。
pub fn install() -> Result<InterruptFlag, ctrlc::Error> {
    let flag = InterruptFlag::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            warn!(target: "crawl", "收到停止信号，当前条目结束后退出（再按一次立即退出）");
            handler_flag.trigger();
        } else {
            std::process::exit(130);
        }
    })?;
    Ok(flag)
}
