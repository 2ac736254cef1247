use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use video_preview_indexer::component::preview_indexer::{IndexReport, PreviewIndexer, VideoStore};
use video_preview_indexer::config::{Config, SETTINGS_FILE, add_recent_path, save_settings};
use video_preview_indexer::init;
use video_preview_indexer::signal::setup_shutdown_signal;

const WAIT_TICK: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    init::init();
    let shutdown_signal = setup_shutdown_signal()?;

    let mut config = Config::new()?;
    if config.video_dirs.is_empty() {
        prompt_video_dir(&mut config)?;
    }
    config.validate()?;
    config.absolutize_paths()?;

    println!("{}", style("=== 影片預覽索引 ===").cyan().bold());
    for dir in &config.video_dirs {
        println!("  掃描目錄: {}", dir.display());
    }
    println!("  快取目錄: {}", config.cache_dir.display());

    let video_store = Arc::new(VideoStore::new());
    let indexer = PreviewIndexer::new(
        config.clone(),
        Arc::clone(&video_store),
        shutdown_signal.clone(),
    );
    let worker = thread::Builder::new()
        .name("preview-indexer".to_string())
        .spawn(move || indexer.run())
        .context("無法建立索引執行緒")?;

    // 等到索引完成，或收到中斷信號
    while !shutdown_signal.wait_completed(WAIT_TICK) {
        if shutdown_signal.is_shutdown_requested() {
            break;
        }
    }

    if !shutdown_signal.is_completed() {
        let grace = Duration::from_secs(config.shutdown_grace_secs);
        info!("等待索引停止（最多 {} 秒）", grace.as_secs());
        if !shutdown_signal.wait_completed(grace) {
            warn!("索引未在時限內停止，直接結束");
            print_store(&video_store);
            return Ok(());
        }
    }

    match worker.join() {
        Ok(Ok(report)) => print_summary(&report),
        Ok(Err(e)) => {
            error!("索引失敗: {e:#}");
            eprintln!("{} {e:#}", style("錯誤:").red().bold());
        }
        Err(_) => error!("索引執行緒異常結束"),
    }

    print_store(&video_store);
    Ok(())
}

fn prompt_video_dir(config: &mut Config) -> Result<()> {
    let mut input = Input::<String>::new().with_prompt("請輸入影片資料夾路徑");
    if let Some(recent) = config.recent_paths.first() {
        input = input.default(recent.clone());
    }
    let input_path = input.interact_text()?;
    let dir = std::path::absolute(input_path.trim())
        .with_context(|| format!("無法取得資料夾路徑: {}", input_path.trim()))?;
    let path = dir.to_string_lossy().to_string();

    config.video_dirs.push(dir);
    add_recent_path(config, &path);

    if let Err(e) = save_settings(config, Path::new(SETTINGS_FILE)) {
        warn!("無法儲存設定: {e:#}");
    }
    Ok(())
}

fn print_summary(report: &IndexReport) {
    println!();
    println!("{}", style("=== 索引摘要 ===").cyan().bold());
    println!("  影片: {} 個", report.video_files);
    println!("  待生成: {} 個", report.dirty);
    if report.pruned > 0 {
        println!("  已移除: {} 筆", style(report.pruned).yellow());
    }

    if let Some(generation) = &report.generation {
        println!("  成功: {} 個", style(generation.generated).green());
        if generation.failed > 0 {
            println!("  失敗: {} 個", style(generation.failed).red());
        }
    }

    if report.cancelled {
        println!("  {}", style("已中斷，下次執行會繼續").yellow());
    }
}

fn print_store(video_store: &VideoStore) {
    let records = video_store.snapshot();
    println!("  已索引影片: {} 個", records.len());
    for record in records.iter().take(20) {
        let seconds = record.duration_ms / 1000;
        println!(
            "    {} ({}x{}, {:02}:{:02}:{:02})",
            record.name,
            record.width,
            record.height,
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        );
    }
    if records.len() > 20 {
        println!("    {}", style(format!("…以及另外 {} 個", records.len() - 20)).dim());
    }
}
