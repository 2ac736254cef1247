//! 依檔頭魔術數字判斷內容類型
//!
//! 只讀前 512 位元組，不看副檔名。

use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const SNIFF_LEN: usize = 512;
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const TS_PACKET_LEN: usize = 188;

/// 由檔頭位元組推測 MIME 類型，無法辨識時回傳 `application/octet-stream`
#[must_use]
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if data.starts_with(b"\x1A\x45\xDF\xA3") {
        return "video/webm";
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"AVI " {
        return "video/avi";
    }
    if let Some(content_type) = sniff_ftyp(data) {
        return content_type;
    }
    if data.starts_with(b"\x00\x00\x01\xBA") || data.starts_with(b"\x00\x00\x01\xB3") {
        return "video/mpeg";
    }
    if data.starts_with(b"FLV\x01") {
        return "video/x-flv";
    }
    if data.starts_with(b"\x30\x26\xB2\x75\x8E\x66\xCF\x11") {
        return "video/x-ms-asf";
    }
    if data.len() > TS_PACKET_LEN && data[0] == 0x47 && data[TS_PACKET_LEN] == 0x47 {
        return "video/mp2t";
    }
    if data.starts_with(b"OggS\x00") {
        return "application/ogg";
    }
    if data.starts_with(b"\xFF\xD8\xFF") {
        return "image/jpeg";
    }
    if data.starts_with(b"\x89PNG\x0D\x0A\x1A\x0A") {
        return "image/png";
    }
    if !data.is_empty() && looks_like_text(data) {
        return "text/plain; charset=utf-8";
    }

    FALLBACK_CONTENT_TYPE
}

/// ISO base media（mp4 / mov / 3gp）：第一個 box 必須是 ftyp
fn sniff_ftyp(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return None;
    }

    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size < 12 || box_size % 4 != 0 {
        return None;
    }

    let major_brand = &data[8..12];
    if major_brand.starts_with(b"qt") {
        Some("video/quicktime")
    } else if major_brand.starts_with(b"3g") {
        Some("video/3gpp")
    } else {
        Some("video/mp4")
    }
}

fn looks_like_text(data: &[u8]) -> bool {
    std::str::from_utf8(data).is_ok_and(|text| {
        !text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0C'))
    })
}

/// 讀取檔頭判斷內容類型
pub fn sniff_file(path: &Path) -> std::io::Result<&'static str> {
    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buffer)?;
    Ok(detect_content_type(&buffer))
}

/// 是否為影片檔；讀取失敗一律視為否
#[must_use]
pub fn is_video_file(path: &Path) -> bool {
    sniff_file(path).is_ok_and(|content_type| content_type.contains("video"))
}
