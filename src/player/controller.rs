//! Playback state machine.
//!
//! `Idle -> Loading -> Ready <-> {Playing, Paused} -> Ended`. Transport
//! events are applied by [`PlaybackController::pump`]; every other method is
//! a user control. Volume and mute live outside the phase and carry over
//! between segments.

use crate::core::config::PlayerConfig;
use crate::core::error::PlaybackBlocked;
use crate::player::reel::Reel;
use crate::player::transport::{MediaElement, MediaEvent, MediaTransport};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    /// Position as a fraction of the duration, clamped to `[0, 1]`.
    Fraction(f64),
    Seconds(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub is_muted: bool,
    pub segment_index: usize,
}

pub struct PlaybackController<E: MediaElement> {
    transport: MediaTransport<E>,
    reel: Option<Reel>,
    phase: PlayerPhase,
    state: PlaybackState,
    autoplay: bool,
    play_requested: bool,
    blocked: Option<PlaybackBlocked>,
}

impl<E: MediaElement> PlaybackController<E> {
    pub fn new(element: E, config: &PlayerConfig) -> Self {
        let mut controller = Self {
            transport: MediaTransport::new(element),
            reel: None,
            phase: PlayerPhase::Idle,
            state: PlaybackState {
                is_playing: false,
                current_time: 0.0,
                duration: 0.0,
                volume: clamp_volume(config.volume).unwrap_or(1.0),
                is_muted: false,
                segment_index: 0,
            },
            autoplay: config.autoplay,
            play_requested: false,
            blocked: None,
        };
        controller.apply_audio();
        controller
    }

    // --- Queries ---

    pub fn phase(&self) -> PlayerPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn reel(&self) -> Option<&Reel> {
        self.reel.as_ref()
    }

    pub fn blocked(&self) -> Option<&PlaybackBlocked> {
        self.blocked.as_ref()
    }

    pub fn caption(&self) -> Option<&str> {
        self.reel
            .as_ref()?
            .segment(self.state.segment_index)?
            .caption
            .as_deref()
    }

    pub fn segment_count(&self) -> usize {
        self.reel.as_ref().map_or(0, Reel::len)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.state.duration > 0.0 {
            (self.state.current_time / self.state.duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    pub fn time_label(&self) -> String {
        format!(
            "{}s / {}s",
            self.state.current_time.floor() as u64,
            self.state.duration.floor() as u64
        )
    }

    pub fn transport(&self) -> &MediaTransport<E> {
        &self.transport
    }

    // --- Lifecycle ---

    /// Starts loading the first segment of `reel`. Playback begins once
    /// metadata arrives if autoplay is on.
    pub fn load(&mut self, reel: Reel) {
        info!(
            "Loading reel: {} segment(s){}",
            reel.len(),
            if reel.is_looping() { ", looping" } else { "" }
        );
        self.reel = Some(reel);
        self.blocked = None;
        self.enter_segment(0, false);
        self.play_requested = self.autoplay;
    }

    pub fn unload(&mut self) {
        self.transport.unbind();
        self.reel = None;
        self.phase = PlayerPhase::Idle;
        self.play_requested = false;
        self.blocked = None;
        self.reset_clock(0);
    }

    // --- Controls ---

    pub fn play(&mut self) {
        match self.phase {
            PlayerPhase::Loading => self.play_requested = true,
            PlayerPhase::Ready | PlayerPhase::Paused => self.start(),
            PlayerPhase::Idle | PlayerPhase::Playing | PlayerPhase::Ended => {}
        }
    }

    pub fn pause(&mut self) {
        match self.phase {
            PlayerPhase::Loading => self.play_requested = false,
            PlayerPhase::Playing => {
                self.transport.pause();
                self.phase = PlayerPhase::Paused;
                self.state.is_playing = false;
            }
            _ => {}
        }
    }

    pub fn toggle_play(&mut self) {
        match self.phase {
            PlayerPhase::Playing => self.pause(),
            PlayerPhase::Ended => self.restart(),
            PlayerPhase::Loading if self.play_requested => self.pause(),
            _ => self.play(),
        }
    }

    /// Moves the playhead. Ignored until the duration is known.
    pub fn seek(&mut self, target: SeekTarget) {
        if matches!(self.phase, PlayerPhase::Idle | PlayerPhase::Loading)
            || self.state.duration <= 0.0
        {
            debug!("Seek ignored, no metadata yet");
            return;
        }

        let duration = self.state.duration;
        let seconds = match target {
            SeekTarget::Fraction(f) if f.is_finite() => f.clamp(0.0, 1.0) * duration,
            SeekTarget::Seconds(s) if s.is_finite() => s.clamp(0.0, duration),
            _ => return,
        };

        self.state.current_time = seconds;
        self.transport.set_current_time(seconds);
        if self.phase == PlayerPhase::Ended && seconds < duration {
            self.phase = PlayerPhase::Paused;
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        if let Some(volume) = clamp_volume(volume) {
            self.state.volume = volume;
            self.transport.set_volume(volume);
        }
    }

    pub fn toggle_mute(&mut self) {
        self.state.is_muted = !self.state.is_muted;
        self.transport.set_muted(self.state.is_muted);
    }

    /// Back to the start of the reel, playing.
    pub fn restart(&mut self) {
        if self.reel.is_none() {
            return;
        }
        self.blocked = None;
        if self.state.segment_index == 0 && self.phase != PlayerPhase::Loading {
            self.state.current_time = 0.0;
            self.transport.set_current_time(0.0);
            self.start();
        } else {
            self.enter_segment(0, true);
        }
    }

    /// Moves to the next segment, wrapping on looping reels. At the end of a
    /// non-looping reel the player ends instead. Returns whether a new
    /// segment was entered.
    pub fn advance_segment(&mut self) -> bool {
        let Some(next) = self
            .reel
            .as_ref()
            .and_then(|r| r.next_index(self.state.segment_index))
        else {
            if self.reel.is_some() {
                self.finish();
            }
            return false;
        };
        let resume = self.phase == PlayerPhase::Playing || self.play_requested;
        self.enter_segment(next, resume);
        true
    }

    /// Applies every pending transport event. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let events = self.transport.poll();
        let count = events.len();
        for event in events {
            self.apply(event);
        }
        count
    }

    // --- Internals ---

    fn apply(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                self.state.duration = duration;
                self.state.current_time = self.state.current_time.min(duration);
                if self.phase == PlayerPhase::Loading {
                    self.phase = PlayerPhase::Ready;
                    if self.play_requested {
                        self.start();
                    }
                }
            }
            MediaEvent::TimeUpdate { current_time } => {
                if self.phase == PlayerPhase::Idle {
                    return;
                }
                self.state.current_time = if self.state.duration > 0.0 {
                    current_time.min(self.state.duration)
                } else {
                    current_time
                };
            }
            MediaEvent::Ended => {
                self.state.current_time = self.state.duration;
                self.state.is_playing = false;
                if !self.advance_segment() {
                    debug!("Reel finished");
                }
            }
            MediaEvent::Blocked(blocked) => self.block(blocked),
        }
    }

    fn start(&mut self) {
        self.blocked = None;
        match self.transport.play() {
            Ok(()) => {
                self.phase = PlayerPhase::Playing;
                self.state.is_playing = true;
                self.play_requested = false;
            }
            Err(blocked) => self.block(blocked),
        }
    }

    fn block(&mut self, blocked: PlaybackBlocked) {
        warn!("{}", blocked);
        if self.phase != PlayerPhase::Idle {
            self.phase = PlayerPhase::Paused;
        }
        self.state.is_playing = false;
        self.play_requested = false;
        self.blocked = Some(blocked);
    }

    fn finish(&mut self) {
        self.transport.pause();
        self.phase = PlayerPhase::Ended;
        self.state.is_playing = false;
        self.play_requested = false;
    }

    fn enter_segment(&mut self, index: usize, resume: bool) {
        let Some(segment) = self.reel.as_ref().and_then(|r| r.segment(index)) else {
            return;
        };
        let media = segment.media.clone();
        debug!("Entering segment {}", index);

        self.transport.bind(media);
        self.apply_audio();
        self.reset_clock(index);
        if resume {
            self.start();
        } else {
            self.phase = PlayerPhase::Loading;
            self.play_requested = false;
        }
    }

    fn reset_clock(&mut self, segment_index: usize) {
        self.state.current_time = 0.0;
        self.state.duration = 0.0;
        self.state.is_playing = false;
        self.state.segment_index = segment_index;
    }

    fn apply_audio(&mut self) {
        self.transport.set_volume(self.state.volume);
        self.transport.set_muted(self.state.is_muted);
    }
}

fn clamp_volume(volume: f64) -> Option<f64> {
    volume.is_finite().then(|| volume.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::MediaRef;
    use crate::player::reel::Segment;
    use crate::player::transport::fake::{Call, FakeElement};
    use crate::player::transport::{ElementEvent, ElementEventKind};

    fn media(name: &str) -> MediaRef {
        format!("https://example.com/{}.mp4", name).parse().unwrap()
    }

    fn config(autoplay: bool) -> PlayerConfig {
        PlayerConfig {
            autoplay,
            reel: false,
            volume: 0.8,
        }
    }

    fn looping_reel() -> Reel {
        Reel::new(
            vec![
                Segment {
                    media: media("one"),
                    caption: Some("First".to_string()),
                },
                Segment {
                    media: media("two"),
                    caption: Some("Second".to_string()),
                },
            ],
            true,
        )
        .unwrap()
    }

    fn emit(player: &PlaybackController<FakeElement>, kind: ElementEventKind, t: f64, d: f64) {
        player.transport().element().emit(kind, t, d);
    }

    fn loaded(autoplay: bool, reel: Reel, duration: f64) -> PlaybackController<FakeElement> {
        let mut player = PlaybackController::new(FakeElement::default(), &config(autoplay));
        player.load(reel);
        player.transport().element().metadata(duration);
        player.pump();
        player
    }

    #[test]
    fn test_load_then_metadata_reaches_ready() {
        let mut player = PlaybackController::new(FakeElement::default(), &config(false));
        assert_eq!(player.phase(), PlayerPhase::Idle);
        player.load(Reel::single(media("story")));
        assert_eq!(player.phase(), PlayerPhase::Loading);
        player.transport().element().metadata(20.0);
        assert_eq!(player.pump(), 1);
        assert_eq!(player.phase(), PlayerPhase::Ready);
        assert_eq!(player.state().duration, 20.0);
        assert!(!player.state().is_playing);
    }

    #[test]
    fn test_autoplay_waits_for_metadata() {
        let mut player = PlaybackController::new(FakeElement::default(), &config(true));
        player.load(Reel::single(media("story")));
        assert!(!player.transport().element().calls.contains(&Call::Play));

        player.transport().element().metadata(20.0);
        player.pump();
        assert_eq!(player.phase(), PlayerPhase::Playing);
        assert!(player.state().is_playing);
    }

    #[test]
    fn test_play_requested_while_loading_is_honoured() {
        let mut player = PlaybackController::new(FakeElement::default(), &config(false));
        player.load(Reel::single(media("story")));
        player.play();
        assert_eq!(player.phase(), PlayerPhase::Loading);
        player.transport().element().metadata(5.0);
        player.pump();
        assert_eq!(player.phase(), PlayerPhase::Playing);
    }

    #[test]
    fn test_seek_before_metadata_is_noop() {
        let mut player = PlaybackController::new(FakeElement::default(), &config(false));
        player.seek(SeekTarget::Fraction(0.5));
        player.load(Reel::single(media("story")));
        player.seek(SeekTarget::Fraction(0.5));
        player.seek(SeekTarget::Seconds(3.0));
        assert_eq!(player.state().current_time, 0.0);
        assert!(!player
            .transport()
            .element()
            .calls
            .iter()
            .any(|c| matches!(c, Call::Seek(_))));
    }

    #[test]
    fn test_seek_after_metadata() {
        let mut player = loaded(false, Reel::single(media("story")), 42.0);
        player.seek(SeekTarget::Fraction(0.5));
        assert!((player.state().current_time - 21.0).abs() < 1e-9);
        assert_eq!(player.progress_percent(), 50.0);
        assert_eq!(player.transport().element().calls.last(), Some(&Call::Seek(21.0)));

        player.seek(SeekTarget::Seconds(99.0));
        assert_eq!(player.state().current_time, 42.0);
        player.seek(SeekTarget::Fraction(-1.0));
        assert_eq!(player.state().current_time, 0.0);
    }

    #[test]
    fn test_time_updates_and_label() {
        let mut player = loaded(true, Reel::single(media("story")), 30.9);
        emit(&player, ElementEventKind::TimeUpdate, 12.7, 30.9);
        player.pump();
        assert_eq!(player.time_label(), "12s / 30s");
    }

    #[test]
    fn test_toggle_play_and_pause() {
        let mut player = loaded(false, Reel::single(media("story")), 10.0);
        player.toggle_play();
        assert_eq!(player.phase(), PlayerPhase::Playing);
        player.toggle_play();
        assert_eq!(player.phase(), PlayerPhase::Paused);
        assert!(!player.state().is_playing);
        assert_eq!(player.transport().element().calls.last(), Some(&Call::Pause));
    }

    #[test]
    fn test_single_reel_ends_until_restart() {
        let mut player = loaded(true, Reel::single(media("story")), 10.0);
        emit(&player, ElementEventKind::Ended, 10.0, 10.0);
        player.pump();
        assert_eq!(player.phase(), PlayerPhase::Ended);
        assert!(!player.state().is_playing);

        player.play();
        assert_eq!(player.phase(), PlayerPhase::Ended);

        player.restart();
        assert_eq!(player.phase(), PlayerPhase::Playing);
        assert_eq!(player.state().current_time, 0.0);
    }

    #[test]
    fn test_looping_reel_wraps_and_keeps_playing() {
        let mut player = loaded(true, looping_reel(), 8.0);
        assert_eq!(player.caption(), Some("First"));

        emit(&player, ElementEventKind::Ended, 8.0, 8.0);
        player.pump();
        assert_eq!(player.state().segment_index, 1);
        assert_eq!(player.caption(), Some("Second"));
        assert!(player.state().is_playing);

        emit(&player, ElementEventKind::Ended, 8.0, 8.0);
        player.pump();
        assert_eq!(player.state().segment_index, 0);
        assert_eq!(player.phase(), PlayerPhase::Playing);
    }

    #[test]
    fn test_volume_and_mute_survive_segments() {
        let mut player = loaded(true, looping_reel(), 8.0);
        player.set_volume(0.3);
        player.toggle_mute();
        assert!(player.advance_segment());

        assert_eq!(player.state().volume, 0.3);
        assert!(player.state().is_muted);
        let calls = &player.transport().element().calls;
        let bind = calls
            .iter()
            .rposition(|c| *c == Call::Load("https://example.com/two.mp4".to_string()))
            .unwrap();
        assert!(calls[bind..].contains(&Call::Volume(0.3)));
        assert!(calls[bind..].contains(&Call::Muted(true)));
    }

    #[test]
    fn test_volume_is_clamped_and_independent_of_mute() {
        let mut player = loaded(false, Reel::single(media("story")), 10.0);
        assert_eq!(player.state().volume, 0.8);
        player.set_volume(1.7);
        assert_eq!(player.state().volume, 1.0);
        player.set_volume(f64::NAN);
        assert_eq!(player.state().volume, 1.0);
        player.set_volume(0.0);
        assert!(!player.state().is_muted);
    }

    #[test]
    fn test_rejected_play_stays_paused() {
        let mut element = FakeElement::default();
        element.reject_play = Some("NotAllowedError: autoplay".to_string());
        let mut player = PlaybackController::new(element, &config(true));
        player.load(Reel::single(media("story")));
        player.transport().element().metadata(10.0);
        player.pump();

        assert_eq!(player.phase(), PlayerPhase::Paused);
        assert!(!player.state().is_playing);
        assert_eq!(
            player.blocked().map(|b| b.reason.as_str()),
            Some("NotAllowedError: autoplay")
        );
    }

    #[test]
    fn test_late_rejection_pauses_player() {
        let mut player = loaded(true, Reel::single(media("story")), 10.0);
        assert_eq!(player.phase(), PlayerPhase::Playing);
        player
            .transport()
            .element()
            .sink
            .as_ref()
            .unwrap()
            .push(ElementEvent::rejected("NotAllowedError"));
        player.pump();
        assert_eq!(player.phase(), PlayerPhase::Paused);
        assert!(player.blocked().is_some());

        player.play();
        assert_eq!(player.phase(), PlayerPhase::Playing);
        assert!(player.blocked().is_none());
    }

    #[test]
    fn test_play_interrupted_by_pause_keeps_playing() {
        let mut player = loaded(true, looping_reel(), 8.0);
        player.pause();
        player.play();
        player
            .transport()
            .element()
            .sink
            .as_ref()
            .unwrap()
            .push(ElementEvent::play_failed(
                "AbortError",
                "The play() request was interrupted by a call to pause().",
            ));
        player.pump();

        assert_eq!(player.phase(), PlayerPhase::Playing);
        assert!(player.state().is_playing);
        assert!(player.blocked().is_none());
        assert_eq!(player.transport().element().calls.last(), Some(&Call::Play));
    }

    #[test]
    fn test_stale_events_after_reload_are_ignored() {
        let mut player = loaded(true, Reel::single(media("first")), 10.0);
        let old_sink = player.transport().element().sink.clone().unwrap();
        player.load(Reel::single(media("second")));
        old_sink.push(ElementEvent::new(ElementEventKind::Ended, 10.0, 10.0));
        player.pump();
        assert_eq!(player.phase(), PlayerPhase::Loading);
    }

    #[test]
    fn test_unload_returns_to_idle() {
        let mut player = loaded(true, looping_reel(), 8.0);
        player.unload();
        assert_eq!(player.phase(), PlayerPhase::Idle);
        assert_eq!(player.segment_count(), 0);
        assert_eq!(player.progress_percent(), 0.0);
        player.play();
        assert_eq!(player.phase(), PlayerPhase::Idle);
    }
}
