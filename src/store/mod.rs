//! Storage boundary for daily bundles and the archive export.
//!
//! [`BundleStore`] answers "is there anything for this day", pages through
//! the day's objects and downloads them. [`ArchiveStore`] downloads the
//! single bulk export. [`S3Store`] backs both with a bucket, [`LocalStore`]
//! with a directory using the same key layout.

mod local;
mod s3;

pub use local::LocalStore;
pub use s3::S3Store;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;

/// A resolvable reference to one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub key: String,
}

impl ObjectHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// One page of a day listing. `next_token` is `None` on the last page.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectHandle>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Cheap probe: does at least one object live under the day's prefix.
    async fn exists_for_day(&self, day: NaiveDate) -> Result<bool>;

    /// Lists one page of the day's objects, starting at `token`.
    async fn list_page(&self, day: NaiveDate, token: Option<String>) -> Result<ListPage>;

    /// Downloads the raw (still compressed) bytes of one object.
    async fn fetch(&self, object: &ObjectHandle) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Downloads the compressed archive export stored at `key`.
    async fn fetch_full_export(&self, key: &str) -> Result<Vec<u8>>;
}

/// Key prefix under which a day's bundles are stored, e.g. `2025-11-03/`.
pub fn day_prefix(day: NaiveDate) -> String {
    format!("{}/", day.format("%Y-%m-%d"))
}
