use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;

use super::{ArchiveStore, BundleStore, ListPage, ObjectHandle, day_prefix};
use crate::error::{HistoryError, Result};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Bundle and archive storage on a local directory mirroring the bucket layout:
///
/// ```text
/// <root>/2025-11-03/batch_20251103_101500.json.gz
/// <root>/dynamodb_backup.csv.gz
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides how many objects a single listing page returns.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn day_keys(&self, day: NaiveDate) -> Result<Vec<String>> {
        let prefix = day_prefix(day);
        let dir = self.root.join(day.format("%Y-%m-%d").to_string());

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HistoryError::storage(
                    format!("listing objects in folder {prefix}"),
                    e,
                ));
            }
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HistoryError::storage(format!("listing objects in folder {prefix}"), e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(format!("{prefix}{name}"));
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.root.join(key))
            .await
            .map_err(|e| HistoryError::storage(format!("downloading {key}"), e))
    }
}

#[async_trait]
impl BundleStore for LocalStore {
    async fn exists_for_day(&self, day: NaiveDate) -> Result<bool> {
        Ok(!self.day_keys(day).await?.is_empty())
    }

    async fn list_page(&self, day: NaiveDate, token: Option<String>) -> Result<ListPage> {
        let keys = self.day_keys(day).await?;

        let start = match token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|e| HistoryError::decode(format!("continuation token '{token}'"), e))?,
            None => 0,
        };
        let end = (start + self.page_size).min(keys.len());

        let objects = keys
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(ObjectHandle::new)
            .collect();
        let next_token = (end < keys.len()).then(|| end.to_string());

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn fetch(&self, object: &ObjectHandle) -> Result<Vec<u8>> {
        self.read(&object.key).await
    }
}

#[async_trait]
impl ArchiveStore for LocalStore {
    async fn fetch_full_export(&self, key: &str) -> Result<Vec<u8>> {
        self.read(key).await
    }
}
