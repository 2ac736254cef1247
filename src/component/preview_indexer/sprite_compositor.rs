use super::models::ThumbnailSprite;
use crate::tools::{copy_file, ensure_parent_dir};
use anyhow::{Context, Result, bail};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// 等比縮放到目標框內
///
/// 原圖相對目標框較寬時貼齊寬度、依比例算高度；較高時貼齊高度；
/// 比例相同時直接回傳目標框。任一邊為 0 時回傳目標框。
#[must_use]
pub fn fit_aspect(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || target_width == 0 || target_height == 0 {
        return (target_width, target_height);
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let (tw, th) = (u64::from(target_width), u64::from(target_height));

    if w * th > tw * h {
        (target_width, ((tw * h / w) as u32).max(1))
    } else if h * tw > th * w {
        (((th * w / h) as u32).max(1), target_height)
    } else {
        (target_width, target_height)
    }
}

/// 將畫格依序排入 rows x cols 的網格並輸出成 JPEG
///
/// 超過格數的畫格直接捨棄，不足的格子保留黑色背景。
pub fn compose_grid(
    frames: &[impl AsRef<Path>],
    output_path: &Path,
    sheet_width: u32,
    sheet_height: u32,
    rows: u32,
    cols: u32,
    quality: u8,
) -> Result<ThumbnailSprite> {
    if rows == 0 || cols == 0 {
        bail!("網格大小不合法: {rows}x{cols}");
    }

    let cell_width = sheet_width / cols;
    let cell_height = sheet_height / rows;
    if cell_width == 0 || cell_height == 0 {
        bail!("精靈圖 {sheet_width}x{sheet_height} 放不下 {rows}x{cols} 格");
    }

    let capacity = (rows as usize).saturating_mul(cols as usize);
    let count = capacity.min(frames.len());

    debug!(
        "合成精靈圖: {count} 張畫格, {cols}x{rows} 格, 每格 {cell_width}x{cell_height}"
    );

    let mut canvas = RgbImage::new(sheet_width, sheet_height);

    for (index, frame) in frames.iter().take(count).enumerate() {
        let index = index as u32;
        let cell_x = (index % cols) * cell_width;
        let cell_y = (index / cols) * cell_height;
        draw_cell(&mut canvas, frame.as_ref(), cell_x, cell_y, cell_width, cell_height)
            .with_context(|| format!("繪製縮圖錯誤: {}", frame.as_ref().display()))?;
    }

    write_jpeg(&canvas, output_path, quality)?;

    Ok(ThumbnailSprite {
        path: output_path.to_path_buf(),
        width: sheet_width,
        height: sheet_height,
        thumb_width: cell_width,
        thumb_height: cell_height,
        count: count as u32,
    })
}

/// 縮放一張畫格並置中放進指定格子
fn draw_cell(
    canvas: &mut RgbImage,
    frame_path: &Path,
    cell_x: u32,
    cell_y: u32,
    cell_width: u32,
    cell_height: u32,
) -> Result<()> {
    let frame = image::open(frame_path)
        .with_context(|| format!("無法讀取畫格: {}", frame_path.display()))?
        .to_rgb8();

    let (fit_width, fit_height) =
        fit_aspect(frame.width(), frame.height(), cell_width, cell_height);

    let (offset_x, offset_y) = if cell_height > fit_height {
        (0, (cell_height - fit_height) / 2)
    } else if cell_width > fit_width {
        ((cell_width - fit_width) / 2, 0)
    } else {
        (0, 0)
    };

    let scaled = imageops::resize(&frame, fit_width, fit_height, FilterType::Nearest);
    imageops::replace(
        canvas,
        &scaled,
        i64::from(cell_x + offset_x),
        i64::from(cell_y + offset_y),
    );

    Ok(())
}

fn write_jpeg(canvas: &RgbImage, output_path: &Path, quality: u8) -> Result<()> {
    ensure_parent_dir(output_path)?;

    let file = File::create(output_path)
        .with_context(|| format!("精靈圖建立失敗: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(canvas)
        .with_context(|| format!("精靈圖寫入失敗: {}", output_path.display()))?;
    writer
        .flush()
        .with_context(|| format!("精靈圖寫入失敗: {}", output_path.display()))?;

    Ok(())
}

/// 複製中間那張畫格作為封面，不縮放
pub fn write_cover(frames: &[impl AsRef<Path>], output_path: &Path) -> Result<()> {
    let Some(middle) = frames.get(frames.len() / 2) else {
        bail!("沒有可用的畫格，無法產生封面");
    };

    copy_file(middle.as_ref(), output_path).context("生成封面錯誤")?;
    Ok(())
}
