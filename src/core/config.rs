use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

const CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_store_folder")]
    pub store_folder: String,

    pub generation: GenerationConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    /// Hosted accounts and story table. Without it stories stay on this machine.
    pub supabase: Option<SupabaseConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    pub provider: String, // "function" or "huggingface"
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub function: Option<FunctionConfig>,
    pub huggingface: Option<HuggingFaceConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FunctionConfig {
    pub url: Url,
    pub anon_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HuggingFaceConfig {
    pub access_token: String,
    #[serde(default = "default_hf_base_url")]
    pub base_url: Url,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Folder holding the per style and theme sample clips.
    #[serde(default = "default_video_library")]
    pub video_library: Url,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_video")]
    pub video_url: Url,
    #[serde(default = "default_fallback_thumbnail")]
    pub thumbnail_url: Url,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            video_url: default_fallback_video(),
            thumbnail_url: default_fallback_thumbnail(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerConfig {
    #[serde(default = "default_true")]
    pub autoplay: bool,
    /// Play stories as a looping captioned reel instead of a single video.
    #[serde(default)]
    pub reel: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: true,
            reel: false,
            volume: default_volume(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: String,
    #[serde(default = "default_stories_table")]
    pub stories_table: String,
}

fn default_store_folder() -> String {
    "stories".to_string()
}
fn default_timeout_seconds() -> u64 {
    60
}
fn default_hf_base_url() -> Url {
    Url::parse("https://api-inference.huggingface.co/").expect("static url")
}
fn default_text_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.2".to_string()
}
fn default_image_model() -> String {
    "stabilityai/stable-diffusion-xl-base-1.0".to_string()
}
fn default_video_library() -> Url {
    Url::parse("https://storage.googleapis.com/gtv-videos-bucket/sample/").expect("static url")
}
fn default_fallback_video() -> Url {
    Url::parse("https://storage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4")
        .expect("static url")
}
fn default_fallback_thumbnail() -> Url {
    Url::parse("https://images.unsplash.com/photo-1464802686167-b939a6910659?w=800&auto=format&fit=crop")
        .expect("static url")
}
fn default_true() -> bool {
    true
}
fn default_volume() -> f64 {
    1.0
}
fn default_stories_table() -> String {
    "stories".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(content)?;
        if !(0.0..=1.0).contains(&config.player.volume) {
            anyhow::bail!("player.volume must be between 0 and 1");
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(CONFIG_PATH, content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if self.supabase.is_none() {
            fs::create_dir_all(&self.store_folder)?;
        }
        Ok(())
    }
}
