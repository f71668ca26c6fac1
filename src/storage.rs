use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

/// A file accepted by `POST /api/upload`, ready to be written to the bucket.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_disposition: Option<String>,
}

/// Destination of uploaded portal files. Files are only written here and are
/// read back through their public URL.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    async fn store(&self, file: StoredFile) -> Result<()>;
}

pub struct S3FileStore {
    client: S3Client,
    bucket: String,
}

impl S3FileStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn store(&self, file: StoredFile) -> Result<()> {
        let StoredFile {
            key,
            bytes,
            content_type,
            content_disposition,
        } = file;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .set_content_disposition(content_disposition)
            .send()
            .await
            .with_context(|| format!("failed to store {key} in bucket {}", self.bucket))?;

        Ok(())
    }
}
