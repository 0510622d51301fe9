use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;

/// Body of a successful `/api/analyze` call, kept loosely typed until
/// [`super::transform::into_result`] shapes it.
pub type RawAnalysis = Map<String, Value>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("analysis response is not a JSON object")]
    Decode,
}

#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn analyze(&self, image_url: &str) -> Result<RawAnalysis, AnalysisError>;
}

#[derive(Clone)]
pub struct HttpAnalysisClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAnalysisClient {
    pub fn new(cfg: &AnalysisConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: format!("{}/api/analyze", cfg.base_url.trim_end_matches('/')),
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    async fn fetch(&self, image_url: &str) -> Result<RawAnalysis, AnalysisError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("image", image_url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "analysis endpoint rejected request");
            return Err(AnalysisError::Status(status.as_u16()));
        }

        match response.json::<Value>().await? {
            Value::Object(map) => Ok(map),
            _ => Err(AnalysisError::Decode),
        }
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisClient {
    async fn analyze(&self, image_url: &str) -> Result<RawAnalysis, AnalysisError> {
        debug!(image_url, "requesting analysis");
        // dropping the future aborts the in-flight request
        match tokio::time::timeout(self.timeout, self.fetch(image_url)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(self.timeout)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoint_without_double_slash() {
        let client = HttpAnalysisClient::new(&AnalysisConfig {
            base_url: "https://analyzer.example.com/".into(),
            timeout_secs: 30,
        })
        .unwrap();
        assert_eq!(client.endpoint, "https://analyzer.example.com/api/analyze");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn unreachable_endpoint_within_timeout_is_not_a_timeout() {
        let client = HttpAnalysisClient::new(&AnalysisConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 5,
        })
        .unwrap();
        let err = client.analyze("https://x/a.jpg").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Http(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accept the connection and never answer
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = HttpAnalysisClient::new(&AnalysisConfig {
            base_url: format!("http://{addr}"),
            timeout_secs: 1,
        })
        .unwrap();
        let started = std::time::Instant::now();
        let err = client.analyze("https://x/a.jpg").await.unwrap_err();
        assert!(
            matches!(err, AnalysisError::Timeout(d) if d == Duration::from_secs(1)),
            "got {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }
}
