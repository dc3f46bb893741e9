use crate::core::error::PlaybackBlocked;
use crate::core::model::MediaRef;
use crate::player::transport::{ElementEvent, ElementEventKind, EventSink, MediaElement};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{DomException, Event, HtmlVideoElement};

const EVENTS: [(&str, ElementEventKind); 7] = [
    ("loadedmetadata", ElementEventKind::LoadedMetadata),
    ("durationchange", ElementEventKind::DurationChange),
    ("timeupdate", ElementEventKind::TimeUpdate),
    ("play", ElementEventKind::Play),
    ("pause", ElementEventKind::Pause),
    ("ended", ElementEventKind::Ended),
    ("error", ElementEventKind::Error),
];

/// `<video>` element driven by the playback controller. `notify` runs after
/// every delivered event so the UI can pump the controller.
pub struct VideoElement {
    video: HtmlVideoElement,
    notify: Rc<dyn Fn()>,
    sink: Option<EventSink>,
    listeners: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
}

impl VideoElement {
    pub fn new(video: HtmlVideoElement, notify: Rc<dyn Fn()>) -> Self {
        Self {
            video,
            notify,
            sink: None,
            listeners: Vec::new(),
        }
    }
}

fn describe_rejection(e: &JsValue) -> String {
    match e.dyn_ref::<DomException>() {
        Some(dom) => format!("{}: {}", dom.name(), dom.message()),
        None => format!("{:?}", e),
    }
}

impl MediaElement for VideoElement {
    fn attach(&mut self, sink: EventSink) {
        self.detach();
        for (name, kind) in EVENTS {
            let video = self.video.clone();
            let sink_for_event = sink.clone();
            let notify = self.notify.clone();
            let closure = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
                let mut event = ElementEvent::new(kind, video.current_time(), video.duration());
                if kind == ElementEventKind::Error {
                    event.message = video
                        .error()
                        .map(|e| format!("media error (code {})", e.code()));
                }
                sink_for_event.push(event);
                notify();
            });
            if let Err(e) = self
                .video
                .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
            {
                log::error!("Failed to listen for {}: {:?}", name, e);
                continue;
            }
            self.listeners.push((name, closure));
        }
        self.sink = Some(sink);
    }

    fn detach(&mut self) {
        for (name, closure) in self.listeners.drain(..) {
            let _ = self
                .video
                .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
        self.sink = None;
    }

    fn load(&mut self, source: &MediaRef) {
        self.video.set_src(&source.to_string());
        self.video.load();
    }

    fn play(&mut self) -> Result<(), PlaybackBlocked> {
        let promise = self
            .video
            .play()
            .map_err(|e| PlaybackBlocked::new(describe_rejection(&e)))?;

        // Autoplay policies reject the promise later instead of failing here.
        if let Some(sink) = self.sink.clone() {
            let notify = self.notify.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                    let event = match e.dyn_ref::<DomException>() {
                        Some(dom) => ElementEvent::play_failed(&dom.name(), &dom.message()),
                        None => ElementEvent::rejected(describe_rejection(&e)),
                    };
                    sink.push(event);
                    notify();
                }
            });
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Err(e) = self.video.pause() {
            log::warn!("pause failed: {:?}", e);
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.video.set_current_time(seconds);
    }

    fn set_volume(&mut self, volume: f64) {
        self.video.set_volume(volume);
    }

    fn set_muted(&mut self, muted: bool) {
        self.video.set_muted(muted);
    }
}

impl Drop for VideoElement {
    fn drop(&mut self) {
        self.detach();
    }
}
