use crate::core::error::ValidationError;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const TOPIC_MAX_CHARS: usize = 100;

// --- Theme ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Education,
    Planet,
    Bedtime,
    Rhyme,
}

impl Theme {
    pub const ALL: [Theme; 4] = [Theme::Education, Theme::Planet, Theme::Bedtime, Theme::Rhyme];

    pub fn id(&self) -> &'static str {
        match self {
            Theme::Education => "education",
            Theme::Planet => "planet",
            Theme::Bedtime => "bedtime",
            Theme::Rhyme => "rhyme",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Theme::Education => "Education",
            Theme::Planet => "Planet",
            Theme::Bedtime => "Bedtime Story",
            Theme::Rhyme => "Rhyme",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Theme::Education => "Learn fascinating facts through engaging stories",
            Theme::Planet => "Explore worlds beyond our imagination",
            Theme::Bedtime => "Perfect for winding down before sleep",
            Theme::Rhyme => "Poetic tales with rhythmic patterns",
        }
    }

    pub fn prompt_description(&self) -> &'static str {
        match self {
            Theme::Education => "educational and informative",
            Theme::Planet => "about planets and space exploration",
            Theme::Bedtime => "calming and suitable for bedtime",
            Theme::Rhyme => "with rhyming verses and poetic structure",
        }
    }

    pub fn popular_topics(&self) -> [&'static str; 4] {
        match self {
            Theme::Education => [
                "The Water Cycle",
                "Solar System Adventure",
                "Dinosaur Discovery",
                "Ocean Explorers",
            ],
            Theme::Planet => [
                "Journey to Mars",
                "Underwater City",
                "Rainforest Secrets",
                "Arctic Wonders",
            ],
            Theme::Bedtime => [
                "Dream Castle",
                "Friendly Dragon",
                "Starlight Adventure",
                "Forest Friends",
            ],
            Theme::Rhyme => [
                "Dancing Animals",
                "Musical Ocean",
                "Singing Trees",
                "Rhyming Journey",
            ],
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Theme {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownTheme(s.to_string()))
    }
}

// --- Style ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Ghibli,
    Animation,
    Cartoon,
    Watercolor,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Ghibli, Style::Animation, Style::Cartoon, Style::Watercolor];

    pub fn id(&self) -> &'static str {
        match self {
            Style::Ghibli => "ghibli",
            Style::Animation => "animation",
            Style::Cartoon => "cartoon",
            Style::Watercolor => "watercolor",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Style::Ghibli => "Studio Ghibli",
            Style::Animation => "3D Animation",
            Style::Cartoon => "Cartoon",
            Style::Watercolor => "Watercolor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Style::Ghibli => "Magical, whimsical worlds with detailed backgrounds",
            Style::Animation => "Modern, vibrant 3D animated style",
            Style::Cartoon => "Fun, expressive cartoon characters",
            Style::Watercolor => "Soft, dreamy watercolor illustrations",
        }
    }

    pub fn prompt_description(&self) -> &'static str {
        match self {
            Style::Ghibli => "with magical landscapes and whimsical characters",
            Style::Animation => "with vibrant 3D animated scenes",
            Style::Cartoon => "with fun cartoon characters and lively action",
            Style::Watercolor => "with dreamy watercolor visuals and soft transitions",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Style {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownStyle(s.to_string()))
    }
}

// --- Topic ---

/// A trimmed, non-empty topic of bounded length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn parse(raw: &str) -> std::result::Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        let len = trimmed.chars().count();
        if len > TOPIC_MAX_CHARS {
            return Err(ValidationError::TopicTooLong {
                len,
                max: TOPIC_MAX_CHARS,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Topic::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// --- Selection ---

/// What the wizard collected. Serializes as the generation request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub theme: Theme,
    pub style: Style,
    pub topic: Topic,
}

// --- Media ---

/// Where playable content lives: a remote URL or an inline `data:` blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Url(Url),
    Inline { mime: String, data: String },
}

impl MediaRef {
    pub fn inline_base64(mime: &str, payload: &[u8]) -> Self {
        use base64::Engine;
        MediaRef::Inline {
            mime: mime.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(payload),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, MediaRef::Inline { .. })
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaRef::Url(url) => write!(f, "{}", url),
            MediaRef::Inline { mime, data } => write!(f, "data:{};base64,{}", mime, data),
        }
    }
}

impl FromStr for MediaRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("data:") {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| anyhow!("inline media is missing its payload"))?;
            let mime = header
                .strip_suffix(";base64")
                .ok_or_else(|| anyhow!("inline media must be base64 encoded"))?;
            if mime.is_empty() {
                return Err(anyhow!("inline media is missing its mime type"));
            }
            return Ok(MediaRef::Inline {
                mime: mime.to_string(),
                data: data.to_string(),
            });
        }
        Ok(MediaRef::Url(Url::parse(s)?))
    }
}

impl Serialize for MediaRef {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MediaRef {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// --- Generation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    Text,
    Image,
    Video,
}

/// How much of a result came from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSource {
    Generated,
    Partial { missing: Vec<ContentField> },
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub title: String,
    pub text: String,
    pub media_ref: MediaRef,
    pub image: Option<MediaRef>,
    pub thumbnail_ref: Url,
    pub attempt: u32,
    pub source: ContentSource,
}

// --- Accounts ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => "User".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
}

/// A saved story, in the shape of the `stories` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub title: String,
    pub theme: Theme,
    pub style: Style,
    pub topic: String,
    pub story: String,
    pub video_url: MediaRef,
    #[serde(default)]
    pub image: Option<MediaRef>,
    pub thumbnail: Url,
}

impl StoryRecord {
    pub fn from_result(user: &User, selection: &Selection, result: &GenerationResult) -> Self {
        Self {
            id: None,
            user_id: user.id.clone(),
            title: result.title.clone(),
            theme: selection.theme,
            style: selection.style,
            topic: selection.topic.to_string(),
            story: result.text.clone(),
            video_url: result.media_ref.clone(),
            image: result.image.clone(),
            thumbnail: result.thumbnail_ref.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_wire_shape() {
        let selection = Selection {
            theme: Theme::Bedtime,
            style: Style::Ghibli,
            topic: Topic::parse("  Forest Friends ").unwrap(),
        };
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"theme": "bedtime", "style": "ghibli", "topic": "Forest Friends"})
        );
    }

    #[test]
    fn test_topic_bounds() {
        assert_eq!(Topic::parse("   "), Err(ValidationError::EmptyTopic));
        assert!(Topic::parse(&"a".repeat(TOPIC_MAX_CHARS)).is_ok());
        assert_eq!(
            Topic::parse(&"a".repeat(TOPIC_MAX_CHARS + 1)),
            Err(ValidationError::TopicTooLong {
                len: TOPIC_MAX_CHARS + 1,
                max: TOPIC_MAX_CHARS
            })
        );
        assert!(serde_json::from_str::<Topic>("\"\"").is_err());
    }

    #[test]
    fn test_theme_and_style_parsing() {
        assert_eq!("Rhyme".parse::<Theme>(), Ok(Theme::Rhyme));
        assert_eq!("watercolor".parse::<Style>(), Ok(Style::Watercolor));
        assert_eq!(
            "space".parse::<Theme>(),
            Err(ValidationError::UnknownTheme("space".to_string()))
        );
    }

    #[test]
    fn test_media_ref_parsing() {
        let url: MediaRef = "https://example.com/a.mp4".parse().unwrap();
        assert!(!url.is_inline());

        let inline: MediaRef = "data:image/png;base64,iVBORw0KGgo=".parse().unwrap();
        assert_eq!(
            inline,
            MediaRef::Inline {
                mime: "image/png".to_string(),
                data: "iVBORw0KGgo=".to_string()
            }
        );
        assert_eq!(inline.to_string(), "data:image/png;base64,iVBORw0KGgo=");

        assert!("data:image/png,raw".parse::<MediaRef>().is_err());
        assert!("not a url".parse::<MediaRef>().is_err());
    }

    #[test]
    fn test_inline_base64_encoding() {
        let media = MediaRef::inline_base64("image/png", b"abc");
        assert_eq!(media.to_string(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_display_name() {
        let mut user = User {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
        };
        assert_eq!(user.display_name(), "Ada");
        user.name = None;
        assert_eq!(user.display_name(), "ada");
        user.email = String::new();
        assert_eq!(user.display_name(), "User");
    }
}
