//! The UI adapter boundary (§6). The controller only ever emits `Event`
//! values through a `UiPort`; it never reaches into UI state directly or
//! spawns background work from inside an event handler — any follow-up
//! action a `Command` implies is queued back through the same channel the
//! caller used, not fired off inline.

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    ProcessDocument { source: String },
    Play,
    Pause,
    NextSentence,
    PreviousSentence,
    JumpTo(usize),
    SetSpeed(f32),
    SetVolume(f32),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TtsInitializing,
    TtsReady,
    Playing { sentence_id: u64 },
    Paused,
    Resumed,
    Stopped,
    SentenceChanged { sentence_id: u64, index: usize, total: usize, text: String, progress: f32 },
    PositionUpdate { millis: u64, duration_millis: u64 },
    BufferStatus { queue_depth: usize, cached_count: usize },
    VoiceChanged { voice: String },
    SpeedChanged { speed: f32 },
    VolumeChanged { volume: f32 },
    /// Emitted when `NextSentence`/`PreviousSentence`/`JumpTo` would move
    /// past either end of the document; the current sentence is left alone.
    NavigationBoundary { at_start: bool },
    TtsError { kind: ErrorKind, component: Option<&'static str>, message: String, recoverable: bool },
}

/// The controller's only way to talk to a UI. A real frontend adapts this
/// to its own widget/event loop; tests use `InMemoryUiPort` to assert on
/// emitted events without any UI at all.
pub trait UiPort: Send + Sync {
    fn emit(&self, event: Event);
}

/// Test double recording every emitted event in order.
#[derive(Default)]
pub struct InMemoryUiPort {
    events: parking_lot::Mutex<Vec<Event>>,
}

impl InMemoryUiPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn last(&self) -> Option<Event> {
        self.events.lock().last().cloned()
    }
}

impl UiPort for InMemoryUiPort {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}
