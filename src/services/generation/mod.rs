use crate::core::config::Config;
use crate::core::error::GenerationError;
use crate::core::model::{ContentField, MediaRef, Selection};
use crate::core::ServiceBounds;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

pub mod fallback;
pub mod function;
pub mod huggingface;

/// Body returned by a generation backend. Every field may be absent; only
/// `error` marks the whole response as failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryPayload {
    pub text: Option<String>,
    pub image: Option<MediaRef>,
    pub video: Option<MediaRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    Ok(StoryPayload),
    Partial {
        payload: StoryPayload,
        missing: Vec<ContentField>,
    },
    Error {
        reason: GenerationError,
    },
}

impl BackendOutcome {
    pub fn classify(response: std::result::Result<BackendResponse, GenerationError>) -> Self {
        let response = match response {
            Ok(r) => r,
            Err(reason) => return BackendOutcome::Error { reason },
        };

        if let Some(error) = response.error {
            let message = match response.details {
                Some(details) => format!("{}: {}", error, details),
                None => error,
            };
            return BackendOutcome::Error {
                reason: GenerationError::Backend {
                    status: 200,
                    message,
                },
            };
        }

        let payload = StoryPayload {
            text: response
                .text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            image: parse_media("image", response.image),
            video: parse_media("videoUrl", response.video_url),
        };

        let mut missing = Vec::new();
        if payload.text.is_none() {
            missing.push(ContentField::Text);
        }
        if payload.image.is_none() {
            missing.push(ContentField::Image);
        }
        if payload.video.is_none() {
            missing.push(ContentField::Video);
        }

        if missing.is_empty() {
            BackendOutcome::Ok(payload)
        } else {
            BackendOutcome::Partial { payload, missing }
        }
    }
}

fn parse_media(field: &str, raw: Option<String>) -> Option<MediaRef> {
    let raw = raw.filter(|r| !r.trim().is_empty())?;
    match raw.parse::<MediaRef>() {
        Ok(media) => Some(media),
        Err(e) => {
            warn!("Ignoring unusable {} in generation response: {:#}", field, e);
            None
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait GenerationBackend: ServiceBounds + Debug {
    async fn generate(
        &self,
        selection: &Selection,
    ) -> std::result::Result<BackendResponse, GenerationError>;
}

pub fn create_backend(config: &Config) -> Result<Arc<dyn GenerationBackend>> {
    info!(
        "Initializing generation backend: {}",
        config.generation.provider
    );
    let timeout = std::time::Duration::from_secs(config.generation.timeout_seconds);
    match config.generation.provider.as_str() {
        "function" => {
            let cfg = config
                .generation
                .function
                .as_ref()
                .context("Function config missing")?;
            Ok(Arc::new(function::FunctionBackend::new(cfg, timeout)?))
        }
        "huggingface" => {
            let cfg = config
                .generation
                .huggingface
                .as_ref()
                .context("Hugging Face config missing")?;
            Ok(Arc::new(huggingface::HuggingFaceBackend::new(
                cfg.clone(),
                timeout,
            )?))
        }
        _ => Err(anyhow!(
            "Unknown generation provider: {}",
            config.generation.provider
        )),
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    #[cfg(not(target_arch = "wasm32"))]
    let builder = reqwest::Client::builder().timeout(timeout);
    #[cfg(target_arch = "wasm32")]
    let builder = {
        let _ = timeout;
        reqwest::Client::builder()
    };
    builder.build().context("Failed to build HTTP client")
}
