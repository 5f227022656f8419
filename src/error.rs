//! Stable error taxonomy (§7). `ErrorKind` values are the identifiers the
//! controller's retry/fatal policy and the UI adapter's `TTSError` event
//! switch on; they must stay stable across refactors.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoEngineConfigured,
    InvalidEngine,
    Dependency,
    Model,
    EngineFailure,
    EngineTimeout,
    Timeout,
    Canceled,
    AudioDevice,
    AudioFormat,
    ItemTooLarge,
    QueueFull,
    QueueEmpty,
    InvalidStateTransition,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoEngineConfigured => "NoEngineConfigured",
            ErrorKind::InvalidEngine => "InvalidEngine",
            ErrorKind::Dependency => "Dependency",
            ErrorKind::Model => "Model",
            ErrorKind::EngineFailure => "EngineFailure",
            ErrorKind::EngineTimeout => "EngineTimeout",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Canceled => "Canceled",
            ErrorKind::AudioDevice => "AudioDevice",
            ErrorKind::AudioFormat => "AudioFormat",
            ErrorKind::ItemTooLarge => "ItemTooLarge",
            ErrorKind::QueueFull => "QueueFull",
            ErrorKind::QueueEmpty => "QueueEmpty",
            ErrorKind::InvalidStateTransition => "InvalidStateTransition",
            ErrorKind::InvalidInput => "InvalidInput",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate's single error type. `component` names the subsystem that
/// raised it (`"subprocess"`, `"cache.l2"`, `"player"`, ...) so the UI
/// adapter's `TTSError` event can surface it without string-matching the
/// message.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TtsError {
    pub kind: ErrorKind,
    pub message: String,
    pub component: Option<&'static str>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl TtsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            component: None,
            source: None,
        }
    }

    pub fn with_component(mut self, component: &'static str) -> Self {
        self.component = Some(component);
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Retryable per §7: the controller retries these up to three times
    /// with exponential backoff starting at 100ms.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Timeout | ErrorKind::EngineTimeout | ErrorKind::ItemTooLarge
        )
    }

    /// Fatal per §7: the controller transitions to `Error` and does not
    /// retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Dependency | ErrorKind::AudioDevice)
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;
