//! Blob store client
//!
//! The rest of the service treats storage as a key/value object store with
//! content-type metadata and per-object integrity tags. `S3Store` is the
//! production implementation; tests use the in-memory store below.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use crate::config::S3Config;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object does not exist. Distinct so the reconciler can treat a
    /// missing object as "this variant's bytes are gone".
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage operation failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Bytes, StorageError>;
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Integrity tag (ETag) of the stored object, surrounding quotes stripped
    async fn etag(&self, key: &str) -> Result<String, StorageError>;
}

/// S3-compatible object store (S3 proper, Backblaze B2, MinIO)
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn from_config(config: &S3Config) -> Self {
        use aws_sdk_s3::config::{Credentials, Region};

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "image_service_s3",
        );

        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let aws_config = builder.load().await;

        Self {
            client: aws_sdk_s3::Client::new(&aws_config),
            bucket: config.bucket.clone(),
        }
    }
}

fn classify(key: &str, err: impl std::fmt::Display) -> StorageError {
    let msg = err.to_string();
    if msg.contains("404") || msg.contains("NotFound") || msg.contains("NoSuchKey") {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Other(msg)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download(&self, key: &str) -> Result<Bytes, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(key, aws_sdk_s3::error::DisplayErrorContext(e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Other(aws_sdk_s3::error::DisplayErrorContext(e).to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Other(aws_sdk_s3::error::DisplayErrorContext(e).to_string()))?;

        Ok(())
    }

    async fn etag(&self, key: &str) -> Result<String, StorageError> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(key, aws_sdk_s3::error::DisplayErrorContext(e)))?;

        let etag = response
            .e_tag()
            .ok_or_else(|| StorageError::Other(format!("no etag for {key}")))?;

        Ok(etag.trim_matches('"').to_string())
    }
}

/// In-memory store used by unit tests
#[cfg(test)]
pub mod memory {
    use super::*;
    use md5::{Digest, Md5};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        objects: Mutex<HashMap<String, (Bytes, String)>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contains(&self, key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(key)
        }

        pub fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn download(&self, key: &str) -> Result<Bytes, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .map(|(data, _)| data.clone())
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        }

        async fn upload(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<(), StorageError> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), (data, content_type.to_string()));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn etag(&self, key: &str) -> Result<String, StorageError> {
            let objects = self.objects.lock().unwrap();
            let (data, _) = objects
                .get(key)
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
            // S3 ETags for single-part uploads are the MD5 of the body
            Ok(hex::encode(Md5::digest(data)))
        }
    }
}
