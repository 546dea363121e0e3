//! AWS S3 archive.
//!
//! Prefix listing uses `list_objects_v2` with a `/` delimiter, following
//! continuation tokens until the listing is complete.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::storage::{ArchiveStorage, Listing};

/// S3-backed snapshot archive.
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Create S3 storage with credentials and region from the environment.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket)
    }
}

#[async_trait]
impl ArchiveStorage for S3Storage {
    async fn list(&self, prefix: &str) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| AppError::storage(e.into_service_error()))?;

            listing.prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );
            listing.objects.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }

        listing.prefixes.sort();
        listing.objects.sort();
        Ok(listing)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(AppError::missing_archive(format!(
                        "no object at s3://{}/{}",
                        self.bucket, key
                    )));
                }
                return Err(AppError::storage(service_err));
            }
        };

        let bytes = output.body.collect().await.map_err(AppError::storage)?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn write(&self, key: &str, body: &[u8], content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::storage(e.into_service_error()))?;

        log::debug!("Wrote {} bytes to s3://{}/{}", body.len(), self.bucket, key);
        Ok(())
    }
}
