//! Synthesis, caching, and playback core for a terminal document reader's
//! text-to-speech subsystem.
//!
//! The subsystem is subprocess-based end to end: Piper and the cloud
//! engine pair are invoked as external binaries rather than linked in, so
//! the core never depends on a model runtime or a network client
//! directly. See [`subprocess`] for the stdin-binding contract every
//! engine adapter relies on.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod player;
pub mod port;
pub mod queue;
pub mod subprocess;

pub use cancellation::{CancellationToken, Context};
pub use config::Config;
pub use controller::state::ControllerState;
pub use controller::Controller;
pub use error::{ErrorKind, Result, TtsError};
pub use model::{AudioData, Priority, Sentence, Speed};
pub use port::{Command, Event, InMemoryUiPort, UiPort};
