use super::models::VideoRecord;
use std::sync::{PoisonError, RwLock};

/// 對外發佈的影片清單
///
/// 只有索引執行緒會寫入；展示層可以隨時讀取快照，讀到舊資料是可接受的。
#[derive(Debug, Default)]
pub struct VideoStore {
    records: RwLock<Vec<VideoRecord>>,
}

impl VideoStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 整批替換（不合併）
    pub fn replace_all(&self, records: Vec<VideoRecord>) {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        *guard = records;
    }

    /// 同路徑的索引整筆取代，否則附加在最後
    pub fn upsert(&self, record: VideoRecord) {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match guard.iter_mut().find(|existing| existing.path == record.path) {
            Some(existing) => *existing = record,
            None => guard.push(record),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<VideoRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
