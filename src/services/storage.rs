use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::config::StorageConfig;

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Writes `content` at `path` in `bucket`, replacing any existing object.
    async fn put(&self, bucket: &str, path: &str, content: &str) -> Result<()>;
}

/// S3-compatible store. Pointed at `https://storage.googleapis.com` with HMAC
/// keys it talks to Cloud Storage's interoperability API.
#[derive(Clone)]
pub struct StorageService {
    client: Client,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let creds = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "hmac",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(creds)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ReportStore for StorageService {
    async fn put(&self, bucket: &str, path: &str, content: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(path)
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .content_type(TEXT_CONTENT_TYPE)
            .send()
            .await
            .with_context(|| format!("Failed to upload {bucket}/{path}"))?;

        tracing::info!(bucket, path, bytes = content.len(), "Report uploaded");
        Ok(())
    }
}

pub fn report_key(folder: &str, report_name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        format!("{report_name}.txt")
    } else {
        format!("{folder}/{report_name}.txt")
    }
}
