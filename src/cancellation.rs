//! Cooperative cancellation tokens shared by the subprocess manager, the
//! controller, and the lookahead worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, TtsError};

/// A cheaply cloneable flag that several components can observe and one
/// component (the controller, on `Stop`) can raise.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self, stage: &'static str) -> Result<(), TtsError> {
        if self.is_cancelled() {
            return Err(TtsError::new(ErrorKind::Canceled, format!("cancelled at stage={stage}")));
        }
        Ok(())
    }
}

/// A deadline paired with a cancellation token, passed down to every
/// external I/O call (subprocess spawn/wait, disk write) per §5.
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn and_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self, stage: &'static str) -> Result<(), TtsError> {
        if self.token.is_cancelled() {
            return Err(TtsError::new(ErrorKind::Canceled, format!("cancelled at stage={stage}")));
        }
        if self.is_expired() {
            return Err(TtsError::new(ErrorKind::Timeout, format!("deadline elapsed at stage={stage}")));
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
