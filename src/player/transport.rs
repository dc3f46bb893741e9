//! Binding between the playback controller and one playable element.
//!
//! Elements push raw events into an [`EventSink`]. Each sink is stamped with
//! the binding it was handed out for, so anything an old element still
//! delivers after a swap is dropped instead of reaching the controller twice.

use crate::core::error::PlaybackBlocked;
use crate::core::model::MediaRef;
use log::debug;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementEventKind {
    LoadedMetadata,
    DurationChange,
    TimeUpdate,
    Play,
    Pause,
    Ended,
    PlayRejected,
    /// A pending `play()` was cut short by a later pause or load.
    PlayInterrupted,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementEvent {
    pub kind: ElementEventKind,
    pub current_time: f64,
    pub duration: f64,
    pub message: Option<String>,
}

impl ElementEvent {
    pub fn new(kind: ElementEventKind, current_time: f64, duration: f64) -> Self {
        Self {
            kind,
            current_time,
            duration,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ElementEventKind::PlayRejected,
            current_time: 0.0,
            duration: f64::NAN,
            message: Some(message.into()),
        }
    }

    /// A failed `play()` request as the browser names it. `AbortError` only
    /// says a newer pause or load superseded the request.
    pub fn play_failed(name: &str, message: &str) -> Self {
        let mut event = Self::rejected(format!("{}: {}", name, message));
        if name == "AbortError" {
            event.kind = ElementEventKind::PlayInterrupted;
        }
        event
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64 },
    TimeUpdate { current_time: f64 },
    Ended,
    Blocked(PlaybackBlocked),
}

type EventQueue = Rc<RefCell<VecDeque<(u64, ElementEvent)>>>;

#[derive(Clone)]
pub struct EventSink {
    binding: u64,
    queue: EventQueue,
}

impl EventSink {
    pub fn push(&self, event: ElementEvent) {
        self.queue.borrow_mut().push_back((self.binding, event));
    }
}

pub trait MediaElement {
    /// Start delivering events to `sink`. Replaces any previous listener.
    fn attach(&mut self, sink: EventSink);
    fn detach(&mut self);
    fn load(&mut self, source: &MediaRef);
    /// Errors here are a synchronous refusal; elements may also report a
    /// refusal later through a `PlayRejected` event.
    fn play(&mut self) -> Result<(), PlaybackBlocked>;
    fn pause(&mut self);
    fn set_current_time(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
}

pub struct MediaTransport<E: MediaElement> {
    element: E,
    queue: EventQueue,
    binding: u64,
    source: Option<MediaRef>,
}

impl<E: MediaElement> MediaTransport<E> {
    pub fn new(element: E) -> Self {
        Self {
            element,
            queue: Rc::new(RefCell::new(VecDeque::new())),
            binding: 0,
            source: None,
        }
    }

    /// Points the element at `source`. A previous binding is paused and its
    /// listener released first.
    pub fn bind(&mut self, source: MediaRef) {
        self.unbind();
        self.binding += 1;
        debug!("transport: binding #{} -> {}", self.binding, preview(&source));
        self.element.attach(EventSink {
            binding: self.binding,
            queue: self.queue.clone(),
        });
        self.element.load(&source);
        self.source = Some(source);
    }

    pub fn unbind(&mut self) {
        if self.source.take().is_some() {
            self.element.pause();
            self.element.detach();
        }
        // Nothing queued so far can belong to the next binding.
        self.queue.borrow_mut().clear();
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    pub fn poll(&mut self) -> Vec<MediaEvent> {
        let raw: Vec<(u64, ElementEvent)> = self.queue.borrow_mut().drain(..).collect();
        raw.into_iter()
            .filter(|(binding, _)| *binding == self.binding && self.source.is_some())
            .filter_map(|(_, event)| normalize(event))
            .collect()
    }

    pub fn play(&mut self) -> Result<(), PlaybackBlocked> {
        if !self.is_bound() {
            return Err(PlaybackBlocked::new("no media loaded"));
        }
        self.element.play()
    }

    pub fn pause(&mut self) {
        if self.is_bound() {
            self.element.pause();
        }
    }

    pub fn set_current_time(&mut self, seconds: f64) {
        if self.is_bound() {
            self.element.set_current_time(seconds);
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.element.set_volume(volume);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.element.set_muted(muted);
    }

    pub fn element(&self) -> &E {
        &self.element
    }
}

fn normalize(event: ElementEvent) -> Option<MediaEvent> {
    match event.kind {
        ElementEventKind::LoadedMetadata => {
            // Live streams report an infinite duration; nothing to seek in.
            (event.duration.is_finite() && event.duration > 0.0).then_some(
                MediaEvent::LoadedMetadata {
                    duration: event.duration,
                },
            )
        }
        ElementEventKind::TimeUpdate => event.current_time.is_finite().then_some(
            MediaEvent::TimeUpdate {
                current_time: event.current_time.max(0.0),
            },
        ),
        ElementEventKind::Ended => Some(MediaEvent::Ended),
        ElementEventKind::PlayRejected | ElementEventKind::Error => {
            Some(MediaEvent::Blocked(PlaybackBlocked::new(
                event
                    .message
                    .unwrap_or_else(|| "media element error".to_string()),
            )))
        }
        ElementEventKind::DurationChange
        | ElementEventKind::Play
        | ElementEventKind::Pause
        | ElementEventKind::PlayInterrupted => None,
    }
}

fn preview(source: &MediaRef) -> String {
    match source {
        MediaRef::Url(url) => url.to_string(),
        MediaRef::Inline { mime, data } => format!("inline {} ({} bytes)", mime, data.len()),
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{Call, FakeElement};
    use super::*;

    fn media(name: &str) -> MediaRef {
        format!("https://example.com/{}.mp4", name).parse().unwrap()
    }

    #[test]
    fn test_events_are_normalized() {
        let mut transport = MediaTransport::new(FakeElement::default());
        transport.bind(media("a"));
        let el = transport.element();
        el.emit(ElementEventKind::LoadedMetadata, 0.0, 12.5);
        el.emit(ElementEventKind::Play, 0.0, 12.5);
        el.emit(ElementEventKind::TimeUpdate, -0.1, 12.5);
        el.emit(ElementEventKind::TimeUpdate, 3.0, 12.5);
        el.emit(ElementEventKind::Ended, 12.5, 12.5);

        assert_eq!(
            transport.poll(),
            vec![
                MediaEvent::LoadedMetadata { duration: 12.5 },
                MediaEvent::TimeUpdate { current_time: 0.0 },
                MediaEvent::TimeUpdate { current_time: 3.0 },
                MediaEvent::Ended,
            ]
        );
        assert!(transport.poll().is_empty());
    }

    #[test]
    fn test_unknown_duration_is_ignored() {
        let mut transport = MediaTransport::new(FakeElement::default());
        transport.bind(media("live"));
        transport.element().metadata(f64::INFINITY);
        transport.element().metadata(f64::NAN);
        assert!(transport.poll().is_empty());
    }

    #[test]
    fn test_swap_releases_previous_listener() {
        let mut transport = MediaTransport::new(FakeElement::default());
        transport.bind(media("a"));
        transport.element().metadata(10.0);
        transport.bind(media("b"));

        assert_eq!(
            transport.element().calls,
            vec![
                Call::Attach,
                Call::Load("https://example.com/a.mp4".to_string()),
                Call::Pause,
                Call::Detach,
                Call::Attach,
                Call::Load("https://example.com/b.mp4".to_string()),
            ]
        );

        // A late delivery through the old sink must not surface.
        let old_sink = transport.element().sinks[0].clone();
        old_sink.push(ElementEvent::new(ElementEventKind::Ended, 10.0, 10.0));
        transport.element().metadata(4.0);
        assert_eq!(
            transport.poll(),
            vec![MediaEvent::LoadedMetadata { duration: 4.0 }]
        );
    }

    #[test]
    fn test_rejection_becomes_blocked() {
        let mut transport = MediaTransport::new(FakeElement::default());
        transport.bind(media("a"));
        transport
            .element()
            .sink
            .as_ref()
            .unwrap()
            .push(ElementEvent::rejected("NotAllowedError"));
        assert_eq!(
            transport.poll(),
            vec![MediaEvent::Blocked(PlaybackBlocked::new("NotAllowedError"))]
        );
    }

    #[test]
    fn test_interrupted_play_is_dropped() {
        let mut transport = MediaTransport::new(FakeElement::default());
        transport.bind(media("a"));
        let sink = transport.element().sink.clone().unwrap();
        sink.push(ElementEvent::play_failed(
            "AbortError",
            "The play() request was interrupted by a call to pause().",
        ));
        sink.push(ElementEvent::play_failed("NotAllowedError", "play() failed"));
        assert_eq!(
            transport.poll(),
            vec![MediaEvent::Blocked(PlaybackBlocked::new(
                "NotAllowedError: play() failed"
            ))]
        );
    }

    #[test]
    fn test_unbound_transport_refuses_play() {
        let mut transport = MediaTransport::new(FakeElement::default());
        assert!(transport.play().is_err());
        transport.pause();
        transport.unbind();
        assert!(transport.element().calls.is_empty());
    }
}
