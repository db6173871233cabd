//! HTTP client for per-frame person counting
//!
//! Sends one base64 JPEG per request; the service answers with
//! `{"peopleCount": n, "subgroupA": a, "subgroupB": b}`.

use crate::domain::types::FrameObservation;
use crate::infra::config::Config;
use crate::io::risk_client::split_basic_auth;
use crate::services::video::FrameInference;
use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use tracing::debug;

pub struct HttpFrameInference {
    client: reqwest::Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpFrameInference {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let (url, username, password) = split_basic_auth(config.inference_url());
        let client = reqwest::Client::builder()
            .timeout(config.inference_timeout())
            .build()
            .context("failed to build inference HTTP client")?;
        Ok(Self { client, url, username, password })
    }
}

/// Request body for one frame
pub fn frame_payload(jpeg: &[u8]) -> serde_json::Value {
    json!({
        "mimeType": "image/jpeg",
        "frameData": STANDARD.encode(jpeg),
    })
}

#[async_trait]
impl FrameInference for HttpFrameInference {
    async fn infer(&self, jpeg: &[u8]) -> anyhow::Result<FrameObservation> {
        let mut req = self.client.post(&self.url).json(&frame_payload(jpeg));
        if let Some(username) = &self.username {
            req = req.basic_auth(username, self.password.as_ref());
        }

        let response = req.send().await.with_context(|| format!("POST {} failed", self.url))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("inference service returned {}", status);
        }

        let observation: FrameObservation =
            response.json().await.context("malformed inference response")?;
        debug!(
            bytes = %jpeg.len(),
            people = %observation.people,
            "frame_inference_response"
        );
        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_payload_encodes_jpeg() {
        let payload = frame_payload(&[0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(payload["frameData"], "/9j/4A==");
        assert_eq!(payload["mimeType"], "image/jpeg");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let config = Config::default().with_inference_url("http://127.0.0.1:9/infer");
        let inference = HttpFrameInference::new(&config).unwrap();
        assert!(inference.infer(&[0xFF, 0xD8]).await.is_err());
    }
}
