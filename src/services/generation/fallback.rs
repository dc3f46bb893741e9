use crate::core::config::FallbackConfig;
use crate::core::error::GenerationError;
use crate::core::model::{ContentSource, GenerationResult, MediaRef, Selection, Theme};
use crate::services::generation::{BackendOutcome, StoryPayload};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackContent {
    video: MediaRef,
    thumbnail: Url,
}

impl FallbackContent {
    pub fn new(video: Url, thumbnail: Url) -> Self {
        Self {
            video: MediaRef::Url(video),
            thumbnail,
        }
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(config.video_url.clone(), config.thumbnail_url.clone())
    }

    pub fn video(&self) -> &MediaRef {
        &self.video
    }

    pub fn thumbnail(&self) -> &Url {
        &self.thumbnail
    }

    pub fn text(&self, selection: &Selection) -> String {
        let topic = selection.topic.as_str();
        let theme_line = match selection.theme {
            Theme::Education => {
                format!("There were many interesting facts about {} to learn from this story.", topic)
            }
            Theme::Planet => format!(
                "The story took us to fascinating worlds and cosmic adventures related to {}.",
                topic
            ),
            Theme::Bedtime => format!(
                "It was the perfect calming tale about {} to help anyone drift into peaceful sleep.",
                topic
            ),
            Theme::Rhyme => format!(
                "The rhyming verses about {} created a musical quality to the storytelling.",
                topic
            ),
        };

        format!(
            "Once upon a time, there was a fascinating story about {topic}. \
             It was a {theme} tale told in the beautiful {style} style. \
             The story featured interesting characters and an engaging plot centered around {topic}. \
             {theme_line} \
             Everyone who experienced this story was captivated by its magic.",
            topic = topic,
            theme = selection.theme,
            style = selection.style,
            theme_line = theme_line,
        )
    }

    /// Turns a backend outcome into something playable, filling gaps from the
    /// fallback. The returned error is a notice for the UI, never a failure.
    pub fn assemble(
        &self,
        selection: &Selection,
        outcome: BackendOutcome,
        attempt: u32,
    ) -> (GenerationResult, Option<GenerationError>) {
        let (payload, source, notice) = match outcome {
            BackendOutcome::Ok(payload) => (payload, ContentSource::Generated, None),
            BackendOutcome::Partial { payload, missing } => {
                (payload, ContentSource::Partial { missing }, None)
            }
            BackendOutcome::Error { reason } => {
                (StoryPayload::default(), ContentSource::Fallback, Some(reason))
            }
        };

        let result = GenerationResult {
            title: selection.topic.to_string(),
            text: payload.text.unwrap_or_else(|| self.text(selection)),
            media_ref: payload.video.unwrap_or_else(|| self.video.clone()),
            image: payload.image,
            thumbnail_ref: self.thumbnail.clone(),
            attempt,
            source,
        };
        (result, notice)
    }
}
