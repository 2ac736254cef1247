use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct SignalState {
    shutdown_requested: AtomicBool,
    completed: Mutex<bool>,
    completed_cv: Condvar,
}

/// 關閉信號：廣播式的取消旗標，加上讓擁有者等待背景工作完全結束的完成旗標
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    state: Arc<SignalState>,
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 要求停止；重複呼叫無副作用，只有第一次呼叫回傳 `true`
    pub fn request_shutdown(&self) -> bool {
        !self.state.shutdown_requested.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.state.shutdown_requested.load(Ordering::SeqCst)
    }

    /// 背景工作結束時呼叫，喚醒所有等待者
    pub fn mark_completed(&self) {
        let mut completed = self
            .state
            .completed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *completed = true;
        self.state.completed_cv.notify_all();
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        *self
            .state
            .completed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// 等待完成信號，逾時回傳 `false`
    pub fn wait_completed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self
            .state
            .completed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        while !*completed {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .state
                .completed_cv
                .wait_timeout(completed, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            completed = guard;
        }

        true
    }
}

pub fn setup_shutdown_signal() -> Result<ShutdownSignal> {
    let shutdown_signal = ShutdownSignal::new();
    let signal_clone = shutdown_signal.clone();

    ctrlc::set_handler(move || {
        if signal_clone.request_shutdown() {
            eprintln!("\n收到中斷信號，正在安全關閉...");
        }
    })
    .context("無法設定 Ctrl-C 處理器")?;

    Ok(shutdown_signal)
}
