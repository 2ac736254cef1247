use crate::signal::ShutdownSignal;
use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 程序被關閉信號中止
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("操作已取消")
    }
}

impl std::error::Error for Cancelled {}

/// 執行外部程序直到結束；收到關閉信號時直接終止子程序
///
/// 標準輸出丟棄，標準錯誤收集起來放進失敗訊息。
pub fn run_cancellable(mut command: Command, shutdown_signal: &ShutdownSignal) -> Result<()> {
    let program = command.get_program().to_string_lossy().to_string();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("無法啟動 {program}"))?;
    let pid = child.id();
    debug!("啟動程序 [{pid}]: {program}");

    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).trim().to_string()
        })
    });

    let status: ExitStatus = loop {
        if shutdown_signal.is_shutdown_requested() {
            warn!("終止程序 [{pid}]: {program}");
            let _ = child.kill();
            let _ = child.wait();
            return Err(Cancelled.into());
        }

        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e).with_context(|| format!("無法檢查程序狀態 [{pid}]"));
            }
        }
    };

    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        bail!("{program} 執行失敗 ({status}): {stderr}");
    }

    Ok(())
}

/// 錯誤鏈中是否包含取消
#[must_use]
pub fn is_cancelled(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<Cancelled>())
}
