//! 整合測試 - 以暫存目錄建立的測試資料驗證索引流程
//!
//! 外部工具以 shell 腳本代替，不需要安裝 ffmpeg。

use std::fs;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use video_preview_indexer::component::preview_indexer::{
    CacheStore, PreviewArtifact, ProgressRelay, ProgressSource, ThumbnailSprite, VideoRecord,
    compose_grid, preview_dir_for, scan_directories,
};
use video_preview_indexer::config::PreviewSettings;
use video_preview_indexer::signal::ShutdownSignal;

const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isommp41";
const WEBM_HEADER: &[u8] = b"\x1a\x45\xdf\xa3\x9f\x42\x86\x81\x01webm";

/// 建立影片資料夾：兩個影片與一個文字檔
fn create_video_tree(root: &Path) -> (PathBuf, PathBuf) {
    let nested = root.join("nested");
    fs::create_dir_all(&nested).unwrap();

    let a = root.join("a.mp4");
    let b = nested.join("b.webm");
    fs::write(&a, MP4_HEADER).unwrap();
    fs::write(&b, WEBM_HEADER).unwrap();
    fs::write(root.join("notes.txt"), "not a video\n").unwrap();
    (a, b)
}

/// 在快取目錄寫入假的預覽檔並回傳完整的索引
fn complete_record(cache_dir: &Path, video: &Path) -> VideoRecord {
    let preview_dir = preview_dir_for(cache_dir, video);
    fs::create_dir_all(&preview_dir).unwrap();
    let cover = preview_dir.join("cover.jpg");
    let sprite = preview_dir.join("thumbs.jpg");
    fs::write(&cover, b"cover").unwrap();
    fs::write(&sprite, b"sprite").unwrap();

    VideoRecord {
        name: video.file_name().unwrap().to_string_lossy().to_string(),
        path: video.to_path_buf(),
        duration_ms: 10_000,
        width: 640,
        height: 360,
        preview: Some(PreviewArtifact {
            cover,
            thumbs: ThumbnailSprite {
                path: sprite,
                width: 1600,
                height: 900,
                thumb_width: 160,
                thumb_height: 90,
                count: 2,
            },
        }),
    }
}

fn write_frame(path: &Path, color: [u8; 3]) {
    image::RgbImage::from_pixel(64, 36, image::Rgb(color))
        .save(path)
        .unwrap();
}

/// 測試 1: 已完成的影片再次掃描不會列入待生成
#[test]
fn test_scan_is_idempotent_after_generation() {
    let temp_dir = TempDir::new().unwrap();
    let videos = temp_dir.path().join("videos");
    let cache_dir = temp_dir.path().join("cache");
    let (a, b) = create_video_tree(&videos);
    let signal = ShutdownSignal::new();
    let roots = vec![videos];

    let mut cache = CacheStore::new();
    let first = scan_directories(&roots, &mut cache, &signal);
    assert_eq!(first.video_files, 2);
    assert_eq!(first.dirty, vec![a.clone(), b.clone()]);

    // 尚未生成預覽前，仍然都是待生成
    let again = scan_directories(&roots, &mut cache, &signal);
    assert_eq!(again.dirty.len(), 2);

    cache.insert_video(complete_record(&cache_dir, &a));
    cache.insert_video(complete_record(&cache_dir, &b));

    let settled = scan_directories(&roots, &mut cache, &signal);
    assert!(settled.dirty.is_empty());
    assert_eq!(settled.video_files, 2);

    println!("✓ 重複掃描測試通過");
}

/// 測試 2: 精靈圖被刪除後，影片重新列入待生成
#[test]
fn test_missing_sprite_marks_video_incomplete() {
    let temp_dir = TempDir::new().unwrap();
    let videos = temp_dir.path().join("videos");
    let cache_dir = temp_dir.path().join("cache");
    let (a, b) = create_video_tree(&videos);
    let signal = ShutdownSignal::new();
    let roots = vec![videos];

    let mut cache = CacheStore::new();
    scan_directories(&roots, &mut cache, &signal);
    let record_a = complete_record(&cache_dir, &a);
    let sprite = record_a.preview.as_ref().unwrap().thumbs.path.clone();
    cache.insert_video(record_a);
    cache.insert_video(complete_record(&cache_dir, &b));

    fs::remove_file(&sprite).unwrap();
    assert!(!cache.is_complete(&a));

    let outcome = scan_directories(&roots, &mut cache, &signal);
    assert_eq!(outcome.dirty, vec![a.clone()]);
    assert!(cache.video(&a).is_none());
    assert!(cache.modified_time(&a).is_some());
    assert!(cache.is_complete(&b));
}

/// 測試 3: 修改過的影片會被清除索引並重新生成，且只會被列入一次
#[test]
fn test_modified_video_is_regenerated_once() {
    let temp_dir = TempDir::new().unwrap();
    let videos = temp_dir.path().join("videos");
    let cache_dir = temp_dir.path().join("cache");
    let (a, b) = create_video_tree(&videos);
    let signal = ShutdownSignal::new();
    let roots = vec![videos];

    let mut cache = CacheStore::new();
    scan_directories(&roots, &mut cache, &signal);
    cache.insert_video(complete_record(&cache_dir, &a));
    cache.insert_video(complete_record(&cache_dir, &b));

    let newer = SystemTime::now() + Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(&a)
        .unwrap()
        .set_modified(newer)
        .unwrap();

    let outcome = scan_directories(&roots, &mut cache, &signal);
    assert_eq!(outcome.dirty, vec![a.clone()]);
    assert!(cache.video(&a).is_none());
    assert_eq!(
        cache.modified_time(&a),
        fs::metadata(&a).unwrap().modified().ok()
    );

    // 重新生成後，下一次掃描不再列入
    cache.insert_video(complete_record(&cache_dir, &a));
    let settled = scan_directories(&roots, &mut cache, &signal);
    assert!(settled.dirty.is_empty());
}

/// 測試 4: 來源被刪除的影片會從快取移除，並可寫回檔案
#[test]
fn test_deleted_video_is_pruned_and_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let videos = temp_dir.path().join("videos");
    let cache_dir = temp_dir.path().join("cache");
    let cache_file = cache_dir.join("cache.json");
    let (a, b) = create_video_tree(&videos);
    let signal = ShutdownSignal::new();
    let roots = vec![videos];

    let mut cache = CacheStore::new();
    scan_directories(&roots, &mut cache, &signal);
    cache.insert_video(complete_record(&cache_dir, &a));
    cache.insert_video(complete_record(&cache_dir, &b));
    assert!(cache.save(&cache_file).unwrap());

    fs::remove_file(&b).unwrap();

    let mut reloaded = CacheStore::load(&cache_file).unwrap();
    assert_eq!(reloaded.video_count(), 2);

    let outcome = scan_directories(&roots, &mut reloaded, &signal);
    assert_eq!(outcome.pruned, 1);
    assert!(outcome.dirty.is_empty());
    assert!(reloaded.video(&b).is_none());
    assert!(reloaded.modified_time(&b).is_none());
    assert!(!preview_dir_for(&cache_dir, &b).exists());
    assert!(reloaded.is_complete(&a));

    reloaded.save(&cache_file).unwrap();
    let persisted = CacheStore::load(&cache_file).unwrap();
    assert_eq!(persisted.videos(), vec![reloaded.video(&a).unwrap().clone()]);
}

/// 測試 5: 中斷後掃描立即停止
#[test]
fn test_scan_stops_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let videos = temp_dir.path().join("videos");
    create_video_tree(&videos);

    let signal = ShutdownSignal::new();
    signal.request_shutdown();

    let mut cache = CacheStore::new();
    let outcome = scan_directories(&[videos], &mut cache, &signal);
    assert!(outcome.cancelled);
    assert!(outcome.dirty.is_empty());
}

/// 測試 6: 進度服務只把第一個連線交給登記的來源
#[test]
fn test_progress_relay_over_tcp() {
    let mut relay = ProgressRelay::start().unwrap();
    assert!(relay.addr().starts_with("tcp://127.0.0.1:"));

    let (tx, rx) = mpsc::channel();
    relay.arm(ProgressSource::new(Duration::from_secs(100), move |snapshot| {
        let _ = tx.send(*snapshot);
    }));

    let mut stream = TcpStream::connect(relay.local_addr()).unwrap();
    stream
        .write_all(b"frame=10\nout_time_ms=25000000\nspeed=2.5x\r\nprogress=continue\n")
        .unwrap();
    stream
        .write_all(b"out_time_ms=50000000\nspeed=5x\nprogress=end\n")
        .unwrap();
    drop(stream);

    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.out_time, Duration::from_secs(25));
    assert!((first.speed - 2.5).abs() < 1e-9);
    assert_eq!(first.remaining(), Some(Duration::from_secs(30)));

    let last = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(last.out_time, Duration::from_secs(50));
    assert_eq!(last.remaining(), Some(Duration::from_secs(10)));

    // 來源已被取走，第二個連線不會觸發回呼
    assert!(relay.take_source().is_none());
    let mut late = TcpStream::connect(relay.local_addr()).unwrap();
    let _ = late.write_all(b"out_time_ms=1000000\nspeed=1x\nprogress=end\n");
    drop(late);
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());

    relay.stop();
}

/// 測試 7: 以預設設定合成精靈圖
#[test]
fn test_compose_grid_with_default_settings() {
    let temp_dir = TempDir::new().unwrap();
    let frames: Vec<PathBuf> = (1..=3)
        .map(|i| {
            let path = temp_dir.path().join(format!("thum{i:03}.jpg"));
            write_frame(&path, [200, 40, 40]);
            path
        })
        .collect();

    let settings = PreviewSettings::default();
    let output = temp_dir.path().join("thumbs.jpg");
    let sprite = compose_grid(
        &frames,
        &output,
        settings.sheet_width,
        settings.sheet_height,
        settings.grid_rows(),
        settings.grid_cols(),
        settings.jpeg_quality,
    )
    .unwrap();

    assert_eq!(sprite.count, 3);
    assert_eq!((sprite.width, sprite.height), (1600, 900));
    assert_eq!((sprite.thumb_width, sprite.thumb_height), (160, 90));

    let decoded = image::open(&output).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1600, 900));
}

#[cfg(unix)]
mod stub_tools {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;
    use video_preview_indexer::component::preview_indexer::{PreviewIndexer, VideoStore};
    use video_preview_indexer::config::Config;

    const PROBE_JSON: &str =
        r#"{"streams":[{"width":640,"height":360}],"format":{"duration":"12.345000"}}"#;

    fn write_script(path: &Path, body: &str) {
        {
            let mut file = fs::File::create(path).unwrap();
            writeln!(file, "#!/bin/sh").unwrap();
            file.write_all(body.as_bytes()).unwrap();
            file.sync_all().unwrap();
        }
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// 建立假的 ffprobe / ffmpeg：ffmpeg 把預先做好的畫格複製到輸出目錄
    fn stub_config(root: &Path, probe_ok: bool) -> Config {
        let bin = root.join("bin");
        fs::create_dir_all(&bin).unwrap();

        let probe_json = root.join("probe.json");
        fs::write(&probe_json, PROBE_JSON).unwrap();
        let ffprobe = bin.join("ffprobe");
        if probe_ok {
            write_script(&ffprobe, &format!("cat '{}'\n", probe_json.display()));
        } else {
            write_script(&ffprobe, "echo 'invalid data' >&2\nexit 1\n");
        }

        let frame = root.join("frame.jpg");
        write_frame(&frame, [30, 160, 30]);
        let ffmpeg = bin.join("ffmpeg");
        write_script(
            &ffmpeg,
            &format!(
                "for last; do :; done\n\
                 dir=$(dirname \"$last\")\n\
                 cp '{frame}' \"$dir/thum001.jpg\"\n\
                 cp '{frame}' \"$dir/thum002.jpg\"\n",
                frame = frame.display()
            ),
        );

        Config {
            video_dirs: vec![root.join("videos")],
            cache_dir: root.join("cache"),
            ffprobe,
            ffmpeg,
            ..Config::default()
        }
    }

    /// 測試 8: 完整流程產生封面、精靈圖與快取，第二次執行不再生成
    #[test]
    fn test_indexer_with_stub_tools() {
        let temp_dir = TempDir::new().unwrap();
        let (a, b) = create_video_tree(&temp_dir.path().join("videos"));
        let config = stub_config(temp_dir.path(), true);
        config.validate().unwrap();

        let video_store = Arc::new(VideoStore::new());
        let signal = ShutdownSignal::new();
        let report = PreviewIndexer::new(config.clone(), Arc::clone(&video_store), signal.clone())
            .without_progress_bar()
            .run()
            .unwrap();

        assert!(signal.is_completed());
        assert_eq!(report.dirty, 2);
        let generation = report.generation.unwrap();
        assert_eq!(generation.generated, 2);
        assert_eq!(generation.failed, 0);
        assert_eq!(video_store.len(), 2);

        let cache = CacheStore::load(&config.cache_file()).unwrap();
        for video in [&a, &b] {
            assert!(cache.is_complete(video));
            let record = cache.video(video).unwrap();
            assert_eq!(record.duration_ms, 12_345);
            assert_eq!((record.width, record.height), (640, 360));
            let preview = record.preview.as_ref().unwrap();
            assert_eq!(preview.thumbs.count, 2);
            assert!(preview.cover.starts_with(preview_dir_for(&config.cache_dir, video)));
        }

        // 暫存畫格目錄已清除
        let leftovers: Vec<_> = fs::read_dir(&config.cache_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".frames-"))
            .collect();
        assert!(leftovers.is_empty());

        let second_store = Arc::new(VideoStore::new());
        let second = PreviewIndexer::new(config, Arc::clone(&second_store), ShutdownSignal::new())
            .without_progress_bar()
            .run()
            .unwrap();
        assert_eq!(second.dirty, 0);
        assert!(second.generation.is_none());
        assert_eq!(second_store.len(), 2);
    }

    /// 測試 9: ffprobe 失敗時不寫入索引，下次執行會再試
    #[test]
    fn test_failed_probe_leaves_no_record() {
        let temp_dir = TempDir::new().unwrap();
        let (a, _) = create_video_tree(&temp_dir.path().join("videos"));
        let config = stub_config(temp_dir.path(), false);
        config.validate().unwrap();

        let video_store = Arc::new(VideoStore::new());
        let report = PreviewIndexer::new(
            config.clone(),
            Arc::clone(&video_store),
            ShutdownSignal::new(),
        )
        .without_progress_bar()
        .run()
        .unwrap();

        let generation = report.generation.unwrap();
        assert_eq!(generation.generated, 0);
        assert_eq!(generation.failed, 2);
        assert!(video_store.is_empty());

        let cache = CacheStore::load(&config.cache_file()).unwrap();
        assert!(cache.video(&a).is_none());
        assert!(cache.modified_time(&a).is_some());

        let retry = PreviewIndexer::new(config, Arc::new(VideoStore::new()), ShutdownSignal::new())
            .without_progress_bar()
            .run()
            .unwrap();
        assert_eq!(retry.dirty, 2);
    }

    /// 測試 10: 生成途中中斷，ffmpeg 被終止，快取仍寫入一次並發出完成信號
    #[test]
    fn test_shutdown_during_generation() {
        let temp_dir = TempDir::new().unwrap();
        let (a, b) = create_video_tree(&temp_dir.path().join("videos"));
        let config = stub_config(temp_dir.path(), true);
        config.validate().unwrap();

        let started = temp_dir.path().join("ffmpeg.started");
        write_script(
            &config.ffmpeg,
            &format!("touch '{}'\nexec sleep 30\n", started.display()),
        );

        let signal = ShutdownSignal::new();
        let canceller = {
            let signal = signal.clone();
            let started = started.clone();
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(10);
                while !started.exists() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(20));
                }
                thread::sleep(Duration::from_millis(200));
                signal.request_shutdown();
            })
        };

        let begin = Instant::now();
        let video_store = Arc::new(VideoStore::new());
        let report = PreviewIndexer::new(config.clone(), Arc::clone(&video_store), signal.clone())
            .without_progress_bar()
            .run()
            .unwrap();
        let elapsed = begin.elapsed();
        canceller.join().unwrap();

        assert!(started.exists(), "ffmpeg 應該已經啟動");
        assert!(elapsed < Duration::from_secs(15), "中斷太慢: {elapsed:?}");
        assert!(report.cancelled);
        let generation = report.generation.unwrap();
        assert!(generation.cancelled);
        assert_eq!(generation.generated, 0);
        assert_eq!(generation.failed, 0);
        assert!(signal.is_completed());
        assert!(video_store.is_empty());

        // 掃描時記下的時間戳已寫入快取，索引則沒有
        let cache = CacheStore::load(&config.cache_file()).unwrap();
        for video in [&a, &b] {
            assert!(cache.modified_time(video).is_some());
            assert!(cache.video(video).is_none());
        }

        let leftovers: Vec<_> = fs::read_dir(&config.cache_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".frames-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
