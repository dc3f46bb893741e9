//! The story creation wizard: theme, then style, then topic, then generation.
//!
//! Forward moves happen only through the `select_*` actions of the current
//! step. Going back never clears what was picked, so stepping back and
//! forward again keeps earlier answers until they are overwritten.

use crate::core::error::{ValidationError, WizardError};
use crate::core::model::{Selection, Style, Theme, Topic};
use log::debug;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WizardStep {
    Theme,
    Style,
    Topic,
    Generate,
}

impl WizardStep {
    pub fn previous(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Theme => None,
            WizardStep::Style => Some(WizardStep::Theme),
            WizardStep::Topic => Some(WizardStep::Style),
            WizardStep::Generate => Some(WizardStep::Topic),
        }
    }

    pub fn position(&self) -> usize {
        *self as usize + 1
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Theme => "theme",
            WizardStep::Style => "style",
            WizardStep::Topic => "topic",
            WizardStep::Generate => "generate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardAction {
    SelectTheme,
    SelectStyle,
    SelectTopic,
    Back,
}

impl fmt::Display for WizardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardAction::SelectTheme => "select a theme",
            WizardAction::SelectStyle => "select a style",
            WizardAction::SelectTopic => "select a topic",
            WizardAction::Back => "go back",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoryWizard {
    step: Option<WizardStep>,
    theme: Option<Theme>,
    style: Option<Style>,
    topic: Option<Topic>,
}

impl StoryWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> WizardStep {
        self.step.unwrap_or(WizardStep::Theme)
    }

    pub fn theme(&self) -> Option<Theme> {
        self.theme
    }

    pub fn style(&self) -> Option<Style> {
        self.style
    }

    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    pub fn popular_topics(&self) -> Vec<&'static str> {
        self.theme
            .map(|t| t.popular_topics().to_vec())
            .unwrap_or_default()
    }

    pub fn selection(&self) -> Option<Selection> {
        if self.step() != WizardStep::Generate {
            return None;
        }
        Some(Selection {
            theme: self.theme?,
            style: self.style?,
            topic: self.topic.clone()?,
        })
    }

    pub fn can_go_back(&self) -> bool {
        self.step().previous().is_some()
    }

    pub fn select_theme(&mut self, theme: Theme) -> Result<WizardStep, WizardError> {
        self.expect_step(WizardStep::Theme, WizardAction::SelectTheme)?;
        self.theme = Some(theme);
        Ok(self.enter(WizardStep::Style))
    }

    pub fn select_style(&mut self, style: Style) -> Result<WizardStep, WizardError> {
        self.expect_step(WizardStep::Style, WizardAction::SelectStyle)?;
        if self.theme.is_none() {
            return Err(ValidationError::MissingTheme.into());
        }
        self.style = Some(style);
        Ok(self.enter(WizardStep::Topic))
    }

    /// Completes the wizard. The returned selection is what the caller sends
    /// to the generation backend, once per successful call.
    pub fn select_topic(&mut self, raw_topic: &str) -> Result<Selection, WizardError> {
        self.expect_step(WizardStep::Topic, WizardAction::SelectTopic)?;
        let theme = self.theme.ok_or(ValidationError::MissingTheme)?;
        let style = self.style.ok_or(ValidationError::MissingStyle)?;
        let topic = Topic::parse(raw_topic)?;

        self.topic = Some(topic.clone());
        self.enter(WizardStep::Generate);
        Ok(Selection {
            theme,
            style,
            topic,
        })
    }

    pub fn go_back(&mut self) -> Result<WizardStep, WizardError> {
        let from = self.step();
        let previous = from.previous().ok_or(WizardError::InvalidTransition {
            from,
            action: WizardAction::Back,
        })?;
        Ok(self.enter(previous))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn expect_step(&self, expected: WizardStep, action: WizardAction) -> Result<(), WizardError> {
        let from = self.step();
        if from != expected {
            return Err(WizardError::InvalidTransition { from, action });
        }
        Ok(())
    }

    fn enter(&mut self, step: WizardStep) -> WizardStep {
        debug!("wizard: {} -> {}", self.step(), step);
        self.step = Some(step);
        step
    }
}
