use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::NaiveDate;
use tracing::debug;

use super::{ArchiveStore, BundleStore, ListPage, ObjectHandle, day_prefix};
use crate::error::{HistoryError, Result};

/// Bundle and archive storage backed by one S3 bucket.
///
/// Daily bundles live under `<YYYY-MM-DD>/`, the archive export at the
/// bucket root.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the ambient AWS configuration (env vars,
    /// instance profile, ...).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), bucket)
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| HistoryError::storage(format!("downloading {key}"), e))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| HistoryError::storage(format!("reading body of {key}"), e))?;

        Ok(body.into_bytes().to_vec())
    }
}

#[async_trait]
impl BundleStore for S3Store {
    async fn exists_for_day(&self, day: NaiveDate) -> Result<bool> {
        let prefix = day_prefix(day);
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| HistoryError::storage(format!("checking if folder {prefix} exists"), e))?;

        Ok(!resp.contents().is_empty())
    }

    async fn list_page(&self, day: NaiveDate, token: Option<String>) -> Result<ListPage> {
        let prefix = day_prefix(day);
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| HistoryError::storage(format!("listing objects in folder {prefix}"), e))?;

        let objects: Vec<ObjectHandle> = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(ObjectHandle::new)
            .collect();

        let next_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(prefix = %prefix, objects = objects.len(), more = next_token.is_some(), "Listed page");
        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn fetch(&self, object: &ObjectHandle) -> Result<Vec<u8>> {
        self.get_bytes(&object.key).await
    }
}

#[async_trait]
impl ArchiveStore for S3Store {
    async fn fetch_full_export(&self, key: &str) -> Result<Vec<u8>> {
        self.get_bytes(key).await
    }
}
