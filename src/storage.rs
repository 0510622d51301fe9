use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;

use crate::config::StorageConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;

    /// Publicly fetchable URL of an object.
    fn public_url(&self, key: &str) -> String;

    /// Inverse of [`StorageClient::public_url`]; `None` for foreign URLs.
    fn key_from_public_url(&self, url: &str) -> Option<String>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    public_base: String,
}

impl Storage {
    pub async fn new(cfg: &StorageConfig, region: &str) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base: cfg.public_url.trim_end_matches('/').to_string(),
        })
    }
}

pub(crate) fn join_public(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

pub(crate) fn strip_public(base: &str, url: &str) -> Option<String> {
    let base = base.trim_end_matches('/');
    // cache-busting query strings are appended by clients
    let url = url.split('?').next().unwrap_or(url);
    url.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(seconds),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }

    fn public_url(&self, key: &str) -> String {
        join_public(&self.public_base, key)
    }

    fn key_from_public_url(&self, url: &str) -> Option<String> {
        strip_public(&self.public_base, url)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_round_trips_through_key() {
        let url = join_public("https://cdn.example.com/images/", "u1/pic_back_01_06_2024.jpg");
        assert_eq!(url, "https://cdn.example.com/images/u1/pic_back_01_06_2024.jpg");
        assert_eq!(
            strip_public("https://cdn.example.com/images", &url).as_deref(),
            Some("u1/pic_back_01_06_2024.jpg")
        );
    }

    #[test]
    fn strip_public_ignores_query_and_foreign_hosts() {
        let base = "https://cdn.example.com/images";
        assert_eq!(
            strip_public(base, "https://cdn.example.com/images/a/b.jpg?timestamp=1").as_deref(),
            Some("a/b.jpg")
        );
        assert_eq!(strip_public(base, "https://elsewhere.com/a/b.jpg"), None);
        assert_eq!(strip_public(base, "https://cdn.example.com/images/"), None);
    }
}
