use crate::core::config::FunctionConfig;
use crate::core::error::GenerationError;
use crate::core::model::Selection;
use crate::services::generation::{http_client, BackendResponse, GenerationBackend};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use url::Url;

#[derive(Debug)]
pub struct FunctionBackend {
    url: Url,
    anon_key: Option<String>,
    client: reqwest::Client,
}

impl FunctionBackend {
    pub fn new(config: &FunctionConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            client: http_client(timeout)?,
        })
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl GenerationBackend for FunctionBackend {
    async fn generate(&self, selection: &Selection) -> Result<BackendResponse, GenerationError> {
        debug!(
            "POST {} theme={} style={} topic={:?}",
            self.url, selection.theme, selection.style, selection.topic.as_str()
        );

        let mut request = self.client.post(self.url.clone()).json(selection);
        if let Some(key) = &self.anon_key {
            request = request
                .header("Authorization", format!("Bearer {}", key))
                .header("apikey", key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("Generation function returned {}: {}", status, message);
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            GenerationError::Malformed(format!("{}. Body: {}", e, body))
        })
    }
}
