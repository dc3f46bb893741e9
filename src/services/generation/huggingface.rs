use crate::core::config::HuggingFaceConfig;
use crate::core::error::GenerationError;
use crate::core::model::{MediaRef, Selection, Style, Theme};
use crate::services::generation::{http_client, BackendResponse, GenerationBackend};
use crate::utils::text::strip_instruction;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

fn library_clip(style: Style, theme: Theme) -> &'static str {
    match (style, theme) {
        (Style::Ghibli, Theme::Education) => "ForBiggerBlazes.mp4",
        (Style::Ghibli, Theme::Planet) => "ForBiggerEscapes.mp4",
        (Style::Ghibli, Theme::Bedtime) => "ForBiggerJoyrides.mp4",
        (Style::Ghibli, Theme::Rhyme) => "ForBiggerFun.mp4",
        (Style::Animation, Theme::Education) => "ElephantsDream.mp4",
        (Style::Animation, Theme::Planet) => "TearsOfSteel.mp4",
        (Style::Animation, Theme::Bedtime) => "Sintel.mp4",
        (Style::Animation, Theme::Rhyme) => "SubaruOutbackOnStreetAndDirt.mp4",
        (Style::Cartoon, Theme::Education) => "WeAreGoingOnBullrun.mp4",
        (Style::Cartoon, Theme::Planet) => "BigBuckBunny.mp4",
        (Style::Cartoon, Theme::Bedtime) => "WhatCarCanYouGetForAGrand.mp4",
        (Style::Cartoon, Theme::Rhyme) => "VolkswagenGTIReview.mp4",
        (Style::Watercolor, Theme::Education) => "ForBiggerMeltdowns.mp4",
        (Style::Watercolor, Theme::Planet) => "VolkswagenGTIReview.mp4",
        (Style::Watercolor, Theme::Bedtime) => "ForBiggerBlazes.mp4",
        (Style::Watercolor, Theme::Rhyme) => "ForBiggerJoyrides.mp4",
    }
}

pub fn story_prompt(selection: &Selection) -> String {
    let topic = selection.topic.as_str();
    format!(
        "Write a short {} story about \"{}\" {}. \
         Make it engaging, focused specifically on {}, and suitable for a video presentation. \
         Keep it under 300 words and make sure it's appropriate for all ages. \
         The story should have a clear beginning, middle, and end.",
        selection.theme.prompt_description(),
        topic,
        selection.style.prompt_description(),
        topic
    )
}

pub fn image_prompt(selection: &Selection) -> String {
    format!(
        "A {} illustration for a {} story about {}, detailed and vibrant",
        selection.style, selection.theme, selection.topic
    )
}

// --- Wire types ---

#[derive(Serialize)]
struct TextGenerationRequest {
    inputs: String,
    parameters: TextGenerationParameters,
}

#[derive(Serialize)]
struct TextGenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    do_sample: bool,
}

#[derive(Deserialize)]
struct TextGenerationOutput {
    #[serde(default)]
    generated_text: Option<String>,
}

#[derive(Serialize)]
struct TextToImageRequest {
    inputs: String,
    parameters: TextToImageParameters,
}

#[derive(Serialize)]
struct TextToImageParameters {
    negative_prompt: String,
    guidance_scale: f32,
}

#[derive(Deserialize, Debug)]
struct InferenceError {
    error: String,
}

// --- Client ---

#[derive(Debug)]
pub struct HuggingFaceBackend {
    config: HuggingFaceConfig,
    client: reqwest::Client,
}

impl HuggingFaceBackend {
    pub fn new(config: HuggingFaceConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            config,
            client: http_client(timeout)?,
        })
    }

    fn model_url(&self, model: &str) -> Result<Url, GenerationError> {
        self.config
            .base_url
            .join(&format!("models/{}", model))
            .map_err(|e| GenerationError::Unreachable(e.to_string()))
    }

    // A library that cannot hold relative paths leaves the video to the
    // orchestrator's fallback.
    pub fn video_for(&self, selection: &Selection) -> Option<Url> {
        self.config
            .video_library
            .join(library_clip(selection.style, selection.theme))
            .map_err(|e| warn!("No library clip under {}: {}", self.config.video_library, e))
            .ok()
    }

    async fn post(
        &self,
        model: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::Response, GenerationError> {
        let resp = self
            .client
            .post(self.model_url(model)?)
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<InferenceError>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    async fn generate_text(&self, selection: &Selection) -> Result<String, GenerationError> {
        let prompt = story_prompt(selection);
        info!("Generating story with prompt: {}", prompt);

        let request = TextGenerationRequest {
            inputs: format!("<s>[INST] {} [/INST]", prompt),
            parameters: TextGenerationParameters {
                max_new_tokens: 500,
                temperature: 0.7,
                top_p: 0.9,
                do_sample: true,
            },
        };

        let resp = self.post(&self.config.text_model, &request).await?;
        let outputs: Vec<TextGenerationOutput> = resp
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text = outputs
            .into_iter()
            .next()
            .and_then(|o| o.generated_text)
            .map(|t| strip_instruction(&t))
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenerationError::Malformed("empty generated_text".to_string()));
        }
        Ok(text)
    }

    async fn generate_image(&self, selection: &Selection) -> Result<MediaRef, GenerationError> {
        let prompt = image_prompt(selection);
        info!("Generating image with prompt: {}", prompt);

        let request = TextToImageRequest {
            inputs: prompt,
            parameters: TextToImageParameters {
                negative_prompt: "low quality, blurry, distorted".to_string(),
                guidance_scale: 7.5,
            },
        };

        let resp = self.post(&self.config.image_model, &request).await?;
        let is_image = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("image/"));
        if !is_image {
            let text = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Malformed(format!(
                "expected image bytes, got: {}",
                text
            )));
        }

        let bytes = resp.bytes().await?;
        debug!("Image generated ({} bytes)", bytes.len());
        Ok(MediaRef::inline_base64("image/png", &bytes))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl GenerationBackend for HuggingFaceBackend {
    async fn generate(&self, selection: &Selection) -> Result<BackendResponse, GenerationError> {
        let (text, image) = futures_util::future::join(
            self.generate_text(selection),
            self.generate_image(selection),
        )
        .await;

        // Both halves failing means the service itself is out of reach.
        if let (Err(text_err), Err(image_err)) = (&text, &image) {
            warn!("Image generation failed: {}", image_err);
            return Err(text_err.clone());
        }

        let text = text
            .map_err(|e| warn!("Text generation failed: {}", e))
            .ok();
        let image = image
            .map_err(|e| warn!("Image generation failed: {}", e))
            .ok();

        Ok(BackendResponse {
            text,
            image: image.map(|i| i.to_string()),
            image_prompt: Some(image_prompt(selection)),
            video_url: self.video_for(selection).map(|u| u.to_string()),
            error: None,
            details: None,
        })
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::core::model::{ContentField, Topic};
    use crate::services::generation::BackendOutcome;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a];

    fn selection(theme: Theme, style: Style) -> Selection {
        Selection {
            theme,
            style,
            topic: Topic::parse("Journey to Mars").unwrap(),
        }
    }

    fn config(base_url: Url) -> HuggingFaceConfig {
        HuggingFaceConfig {
            access_token: "hf_test".to_string(),
            base_url,
            text_model: "text-model".to_string(),
            image_model: "image-model".to_string(),
            video_library: Url::parse("https://storage.googleapis.com/gtv-videos-bucket/sample/")
                .unwrap(),
        }
    }

    fn backend() -> HuggingFaceBackend {
        let base = Url::parse("https://api-inference.huggingface.co/").unwrap();
        HuggingFaceBackend::new(config(base), Duration::from_secs(1)).unwrap()
    }

    fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&received);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if received.len() >= head_end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        String::from_utf8_lossy(&received).to_string()
    }

    /// Serves the text and image models concurrently, one connection each.
    fn serve_models(listener: TcpListener, text: Vec<u8>, image: Vec<u8>) {
        tokio::spawn(async move {
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let (text, image) = (text.clone(), image.clone());
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let reply = if request.starts_with("POST /models/text-model") {
                        text
                    } else {
                        image
                    };
                    socket.write_all(&reply).await.unwrap();
                    socket.shutdown().await.ok();
                });
            }
        });
    }

    async fn local_backend(listener: &TcpListener) -> HuggingFaceBackend {
        let addr = listener.local_addr().unwrap();
        let base = Url::parse(&format!("http://{}/", addr)).unwrap();
        HuggingFaceBackend::new(config(base), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_prompts_carry_selection() {
        let s = selection(Theme::Planet, Style::Cartoon);
        let prompt = story_prompt(&s);
        assert!(prompt.starts_with(
            "Write a short about planets and space exploration story about \"Journey to Mars\""
        ));
        assert!(prompt.contains("with fun cartoon characters and lively action"));
        assert_eq!(
            image_prompt(&s),
            "A cartoon illustration for a planet story about Journey to Mars, detailed and vibrant"
        );
    }

    #[test]
    fn test_video_library_lookup() {
        let b = backend();
        assert_eq!(
            b.video_for(&selection(Theme::Bedtime, Style::Animation))
                .unwrap()
                .as_str(),
            "https://storage.googleapis.com/gtv-videos-bucket/sample/Sintel.mp4"
        );
        assert!(b
            .video_for(&selection(Theme::Rhyme, Style::Watercolor))
            .unwrap()
            .as_str()
            .ends_with("ForBiggerJoyrides.mp4"));
    }

    #[test]
    fn test_unusable_video_library_leaves_video_out() {
        let mut cfg = config(Url::parse("https://api-inference.huggingface.co/").unwrap());
        cfg.video_library = Url::parse("data:text/plain,clips").unwrap();
        let b = HuggingFaceBackend::new(cfg, Duration::from_secs(1)).unwrap();
        assert!(b.video_for(&selection(Theme::Planet, Style::Ghibli)).is_none());
    }

    #[test]
    fn test_model_url() {
        assert_eq!(
            backend().model_url("mistralai/Mistral-7B-Instruct-v0.2").unwrap().as_str(),
            "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2"
        );
    }

    #[test]
    fn test_text_generation_output_parsing() {
        let json = r#"[{"generated_text": "<s>[INST] Write [/INST] Once upon a time on Mars."}]"#;
        let outputs: Vec<TextGenerationOutput> = serde_json::from_str(json).unwrap();
        let text = strip_instruction(outputs[0].generated_text.as_deref().unwrap());
        assert_eq!(text, "Once upon a time on Mars.");
    }

    #[test]
    fn test_inference_error_parsing() {
        let json = r#"{"error": "Model is currently loading", "estimated_time": 20.0}"#;
        let err: InferenceError = serde_json::from_str(json).unwrap();
        assert_eq!(err.error, "Model is currently loading");
    }

    #[tokio::test]
    async fn test_text_and_image_both_succeed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = local_backend(&listener).await;
        serve_models(
            listener,
            http_response(
                "200 OK",
                "application/json",
                br#"[{"generated_text":"<s>[INST] Write [/INST] Mars was red."}]"#,
            ),
            http_response("200 OK", "image/png", PNG),
        );

        let s = selection(Theme::Planet, Style::Cartoon);
        let response = backend.generate(&s).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("Mars was red."));
        assert!(matches!(
            BackendOutcome::classify(Ok(response)),
            BackendOutcome::Ok(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_text_keeps_image_and_video() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = local_backend(&listener).await;
        serve_models(
            listener,
            http_response(
                "503 Service Unavailable",
                "application/json",
                br#"{"error":"Model is currently loading"}"#,
            ),
            http_response("200 OK", "image/png", PNG),
        );

        let s = selection(Theme::Bedtime, Style::Animation);
        let response = backend.generate(&s).await.unwrap();
        assert!(response.text.is_none());
        assert_eq!(
            response.image.as_deref(),
            Some(MediaRef::inline_base64("image/png", PNG).to_string().as_str())
        );
        assert_eq!(
            response.video_url.as_deref(),
            Some("https://storage.googleapis.com/gtv-videos-bucket/sample/Sintel.mp4")
        );
        assert_eq!(response.image_prompt, Some(image_prompt(&s)));

        match BackendOutcome::classify(Ok(response)) {
            BackendOutcome::Partial { missing, .. } => {
                assert_eq!(missing, vec![ContentField::Text])
            }
            other => panic!("expected a partial outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_both_halves_failing_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = local_backend(&listener).await;
        serve_models(
            listener,
            http_response(
                "503 Service Unavailable",
                "application/json",
                br#"{"error":"Model is currently loading"}"#,
            ),
            http_response("500 Internal Server Error", "text/plain", b"boom"),
        );

        let err = backend
            .generate(&selection(Theme::Rhyme, Style::Ghibli))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::Backend {
                status: 503,
                message: "Model is currently loading".to_string()
            }
        );
    }
}
