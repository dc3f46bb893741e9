use crate::core::model::{GenerationResult, MediaRef};
use crate::utils::text::paragraphs;
use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub media: MediaRef,
    pub caption: Option<String>,
}

impl Segment {
    pub fn new(media: MediaRef) -> Self {
        Self {
            media,
            caption: None,
        }
    }
}

/// Ordered segments the player walks through. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Reel {
    segments: Vec<Segment>,
    looping: bool,
}

impl Reel {
    pub fn new(segments: Vec<Segment>, looping: bool) -> Result<Self> {
        if segments.is_empty() {
            bail!("a reel needs at least one segment");
        }
        Ok(Self { segments, looping })
    }

    pub fn single(media: MediaRef) -> Self {
        Self {
            segments: vec![Segment::new(media)],
            looping: false,
        }
    }

    /// Builds the reel for a generated story. As a reel, every paragraph of
    /// the story becomes a captioned segment over the story video, and the
    /// whole thing loops.
    pub fn from_result(result: &GenerationResult, as_reel: bool) -> Self {
        if !as_reel {
            return Self::single(result.media_ref.clone());
        }

        let segments: Vec<Segment> = paragraphs(&result.text)
            .into_iter()
            .map(|caption| Segment {
                media: result.media_ref.clone(),
                caption: Some(caption),
            })
            .collect();

        if segments.is_empty() {
            return Self::single(result.media_ref.clone());
        }
        Self {
            segments,
            looping: true,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Index after `index`, wrapping for looping reels.
    pub fn next_index(&self, index: usize) -> Option<usize> {
        if index + 1 < self.segments.len() {
            Some(index + 1)
        } else if self.looping {
            Some(0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ContentSource;
    use url::Url;

    fn result(text: &str) -> GenerationResult {
        GenerationResult {
            title: "Dream Castle".to_string(),
            text: text.to_string(),
            media_ref: "https://example.com/castle.mp4".parse().unwrap(),
            image: None,
            thumbnail_ref: Url::parse("https://example.com/castle.jpg").unwrap(),
            attempt: 0,
            source: ContentSource::Generated,
        }
    }

    #[test]
    fn test_single_reel() {
        let reel = Reel::from_result(&result("One.\n\nTwo."), false);
        assert_eq!(reel.len(), 1);
        assert!(!reel.is_looping());
        assert_eq!(reel.next_index(0), None);
    }

    #[test]
    fn test_paragraph_reel_loops() {
        let reel = Reel::from_result(&result("Once upon a time.\n\nThe castle glowed.\n\nThe end."), true);
        assert_eq!(reel.len(), 3);
        assert!(reel.is_looping());
        assert_eq!(reel.segment(1).unwrap().caption.as_deref(), Some("The castle glowed."));
        assert_eq!(reel.next_index(1), Some(2));
        assert_eq!(reel.next_index(2), Some(0));
    }

    #[test]
    fn test_blank_story_falls_back_to_single() {
        let reel = Reel::from_result(&result("  \n\n "), true);
        assert_eq!(reel.len(), 1);
        assert!(!reel.is_looping());
    }

    #[test]
    fn test_empty_reel_rejected() {
        assert!(Reel::new(Vec::new(), true).is_err());
    }
}
