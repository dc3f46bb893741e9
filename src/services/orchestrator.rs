//! Issues generation requests for a completed wizard and decides which
//! response is shown.
//!
//! A request is split in three so callers can keep several in flight:
//! [`GenerationOrchestrator::begin`] records the attempt, [`PendingGeneration::run`]
//! talks to the backend without borrowing the orchestrator, and
//! [`GenerationOrchestrator::resolve`] applies the result unless a newer
//! attempt already landed.

use crate::core::error::GenerationError;
use crate::core::model::{GenerationResult, Selection};
use crate::services::generation::fallback::FallbackContent;
use crate::services::generation::{BackendOutcome, GenerationBackend};
use log::{debug, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Idle,
    Loading { attempt: u32 },
    Ready,
}

#[derive(Debug)]
pub struct PendingGeneration {
    session: u64,
    attempt: u32,
    selection: Selection,
    backend: Arc<dyn GenerationBackend>,
    fallback: FallbackContent,
}

impl PendingGeneration {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub async fn run(self) -> Resolution {
        let response = self.backend.generate(&self.selection).await;
        let outcome = BackendOutcome::classify(response);
        let (result, notice) = self.fallback.assemble(&self.selection, outcome, self.attempt);
        if let Some(e) = &notice {
            warn!(
                "Generation attempt {} failed, showing fallback content: {}",
                self.attempt, e
            );
        }
        Resolution {
            session: self.session,
            attempt: self.attempt,
            result,
            notice,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    session: u64,
    attempt: u32,
    pub result: GenerationResult,
    pub notice: Option<GenerationError>,
}

impl Resolution {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug)]
pub struct GenerationOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    fallback: FallbackContent,
    session: u64,
    selection: Option<Selection>,
    attempt: u32,
    result: Option<GenerationResult>,
    notice: Option<GenerationError>,
}

impl GenerationOrchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>, fallback: FallbackContent) -> Self {
        Self {
            backend,
            fallback,
            session: 0,
            selection: None,
            attempt: 0,
            result: None,
            notice: None,
        }
    }

    /// Starts a new wizard session for `selection` at attempt 0. Anything
    /// still in flight for an earlier session will be ignored.
    pub fn begin(&mut self, selection: Selection) -> PendingGeneration {
        self.session += 1;
        self.attempt = 0;
        self.result = None;
        self.notice = None;
        info!(
            "Requesting story: theme={} style={} topic={:?}",
            selection.theme, selection.style, selection.topic.as_str()
        );
        self.selection = Some(selection.clone());
        self.pending(selection)
    }

    /// Re-issues the current selection with the next attempt number. The
    /// earlier request is not cancelled; its answer is dropped if it loses.
    pub fn regenerate(&mut self) -> Option<PendingGeneration> {
        let selection = self.selection.clone()?;
        self.attempt += 1;
        info!("Regenerating story (attempt {})", self.attempt);
        Some(self.pending(selection))
    }

    /// Applies a finished request. Returns whether it became the displayed
    /// result.
    pub fn resolve(&mut self, resolution: Resolution) -> bool {
        if resolution.session != self.session {
            debug!("Dropping response from a previous session");
            return false;
        }
        if let Some(current) = &self.result {
            if current.attempt >= resolution.attempt {
                debug!(
                    "Dropping stale attempt {} (showing {})",
                    resolution.attempt, current.attempt
                );
                return false;
            }
        }
        self.notice = resolution.notice;
        self.result = Some(resolution.result);
        true
    }

    pub async fn request_generation(&mut self, selection: Selection) -> GenerationResult {
        let resolution = self.begin(selection).run().await;
        let result = resolution.result.clone();
        self.resolve(resolution);
        result
    }

    pub async fn regenerate_now(&mut self) -> Option<GenerationResult> {
        let resolution = self.regenerate()?.run().await;
        let result = resolution.result.clone();
        self.resolve(resolution);
        Some(result)
    }

    pub fn clear(&mut self) {
        self.session += 1;
        self.selection = None;
        self.attempt = 0;
        self.result = None;
        self.notice = None;
    }

    pub fn status(&self) -> GenerationStatus {
        if self.selection.is_none() {
            return GenerationStatus::Idle;
        }
        match &self.result {
            Some(r) if r.attempt == self.attempt => GenerationStatus::Ready,
            _ => GenerationStatus::Loading {
                attempt: self.attempt,
            },
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn notice(&self) -> Option<&GenerationError> {
        self.notice.as_ref()
    }

    pub fn should_offer_retry(&self) -> bool {
        self.notice.as_ref().is_some_and(|n| n.is_transient())
    }

    fn pending(&self, selection: Selection) -> PendingGeneration {
        PendingGeneration {
            session: self.session,
            attempt: self.attempt,
            selection,
            backend: self.backend.clone(),
            fallback: self.fallback.clone(),
        }
    }
}
