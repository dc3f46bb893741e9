pub mod controller;
pub mod reel;
pub mod transport;

pub use controller::{PlaybackController, PlaybackState, PlayerPhase, SeekTarget};
pub use reel::{Reel, Segment};
pub use transport::{ElementEvent, ElementEventKind, EventSink, MediaElement, MediaEvent, MediaTransport};
