//! ffmpeg `-progress` 進度接收器
//!
//! ffmpeg 會連到本機的 TCP 位址，逐行送出 `key=value`，每段以
//! `progress=continue` 或 `progress=end` 結束。這裡把每段組成一筆
//! [`ProgressSnapshot`] 交給目前登記的回呼。

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 一段進度：總長固定，已處理時間與速度由串流更新
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub duration: Duration,
    pub out_time: Duration,
    pub speed: f64,
}

impl ProgressSnapshot {
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            out_time: Duration::ZERO,
            speed: 0.0,
        }
    }

    /// 依目前速度估計的剩餘時間；速度未知時為 `None`
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return None;
        }
        let left = self.duration.saturating_sub(self.out_time);
        Some(Duration::from_secs_f64(left.as_secs_f64() / self.speed))
    }
}

/// 把逐行的 `key=value` 累積成進度快照
#[derive(Debug)]
pub struct ProgressCollector {
    duration: Duration,
    current: Option<ProgressSnapshot>,
}

impl ProgressCollector {
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            current: None,
        }
    }

    /// 處理一行；遇到 `progress` 時回傳累積的快照並重置
    pub fn collect(&mut self, line: &str) -> Option<ProgressSnapshot> {
        let duration = self.duration;
        let snapshot = self
            .current
            .get_or_insert_with(|| ProgressSnapshot::new(duration));

        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        let value = value.trim();

        match key.trim() {
            "out_time_ms" => {
                if let Ok(micros) = value.parse::<i64>() {
                    snapshot.out_time = Duration::from_micros(micros.max(0).unsigned_abs());
                }
            }
            "speed" => {
                let raw = value.strip_suffix('x').unwrap_or(value).trim();
                if let Ok(speed) = raw.parse::<f64>() {
                    snapshot.speed = speed;
                }
            }
            "progress" => return self.current.take(),
            _ => {}
        }

        None
    }
}

pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// 目前這個工作的總長與回呼
pub struct ProgressSource {
    pub duration: Duration,
    pub callback: ProgressCallback,
}

impl ProgressSource {
    pub fn new<F>(duration: Duration, callback: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        Self {
            duration,
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for ProgressSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSource")
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

type ArmedSource = Arc<Mutex<Option<ProgressSource>>>;

/// 本機進度接收服務
///
/// 同一時間只會有一個登記中的來源：`arm` 取代舊的，新連線取走後清空。
pub struct ProgressRelay {
    local_addr: SocketAddr,
    armed: ArmedSource,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ProgressRelay {
    /// 綁定 127.0.0.1 上系統分配的埠並開始接受連線
    pub fn start() -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).context("無法啟動進度服務")?;
        listener
            .set_nonblocking(true)
            .context("無法設定進度服務為非阻塞")?;
        let local_addr = listener.local_addr().context("無法取得進度服務位址")?;

        let armed: ArmedSource = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let accept_thread = {
            let armed = Arc::clone(&armed);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("progress-relay".to_string())
                .spawn(move || accept_loop(&listener, &armed, &stop))
                .context("無法建立進度服務執行緒")?
        };

        let relay = Self {
            local_addr,
            armed,
            stop,
            accept_thread: Some(accept_thread),
        };
        info!("進度服務地址: {}", relay.addr());
        Ok(relay)
    }

    /// `tcp://host:port`，直接給 ffmpeg `-progress` 使用
    #[must_use]
    pub fn addr(&self) -> String {
        format!("tcp://{}", self.local_addr)
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 登記下一個連線要使用的來源，取代尚未被取走的舊來源
    pub fn arm(&self, source: ProgressSource) {
        let mut guard = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(source);
    }

    /// 取走目前登記的來源
    pub fn take_source(&self) -> Option<ProgressSource> {
        take_armed(&self.armed)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                warn!("進度服務執行緒異常結束");
            }
            debug!("進度服務已停止: {}", self.local_addr);
        }
    }
}

impl Drop for ProgressRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn take_armed(armed: &ArmedSource) -> Option<ProgressSource> {
    armed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

fn accept_loop(listener: &TcpListener, armed: &ArmedSource, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("進度連線: {peer}");
                // 沒有登記來源的連線直接關閉，不回呼
                let Some(source) = take_armed(armed) else {
                    continue;
                };
                let spawned = thread::Builder::new()
                    .name("progress-conn".to_string())
                    .spawn(move || handle_connection(stream, &source));
                if let Err(e) = spawned {
                    warn!("無法建立進度連線執行緒: {e}");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) => {
                warn!("接收進度連線失敗: {e}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn handle_connection(stream: TcpStream, source: &ProgressSource) {
    if let Err(e) = stream.set_nonblocking(false) {
        warn!("無法設定進度連線為阻塞模式: {e}");
        return;
    }

    let mut reader = BufReader::new(stream);
    let mut collector = ProgressCollector::new(source.duration);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if let Some(snapshot) = collector.collect(line) {
                    (source.callback)(&snapshot);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("進度連線中斷: {e}");
                break;
            }
        }
    }
}
