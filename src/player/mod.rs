//! PCM playback engine (§6). The one invariant every method here exists
//! to protect: once `play` hands a buffer to the audio backend, that
//! buffer's bytes must stay alive, untouched, for the full playback
//! duration. rodio's `SamplesBuffer` takes ownership of a `Vec<i16>` we
//! build fresh from the incoming `AudioData`, so the backend is never
//! holding a borrow that could be invalidated out from under it; we also
//! keep our own `Arc<AudioData>` in `state` so `GetPosition`/diagnostics
//! can inspect what's currently loaded without touching the sink.
//!
//! Two locks, not one: `state` guards cheap bookkeeping so `get_position`
//! never blocks behind a slow device operation, while `transition` is held
//! across the multi-step sequences (stop-old-sink, build-new-source,
//! append, start-clock) that must not interleave with each other.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::debug;

use crate::error::{ErrorKind, TtsError};
use crate::model::AudioData;

const VALID_SAMPLE_RATES: &[u32] = &[22_050, 44_100, 48_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Playing,
    Paused,
}

struct PlaybackState {
    phase: Phase,
    current: Option<Arc<AudioData>>,
    started_at: Option<Instant>,
    accumulated: Duration,
    volume: f32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self { phase: Phase::Idle, current: None, started_at: None, accumulated: Duration::ZERO, volume: 1.0 }
    }
}

/// Object-safe playback boundary the controller drives. `AudioPlayer` is
/// the only real implementation; tests substitute a fake that records
/// calls without opening an audio device, the same way `Engine`/`UiPort`
/// already have test doubles.
pub trait Player: Send + Sync {
    fn play(&self, audio: Arc<AudioData>) -> Result<(), TtsError>;
    fn pause(&self) -> Result<(), TtsError>;
    fn resume(&self) -> Result<(), TtsError>;
    fn stop(&self) -> Result<(), TtsError>;
    fn set_volume(&self, volume: f32);
    fn get_position(&self) -> Duration;
    fn get_current_duration(&self) -> Duration;
    fn has_finished(&self) -> bool;
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn close(&self) -> Result<(), TtsError>;
}

pub struct AudioPlayer {
    // Held for the player's lifetime: dropping it tears down the device.
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Mutex<Sink>,
    state: Mutex<PlaybackState>,
    transition: Mutex<()>,
    sample_rate: u32,
    channels: u16,
}

impl AudioPlayer {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, TtsError> {
        if !VALID_SAMPLE_RATES.contains(&sample_rate) {
            return Err(TtsError::new(ErrorKind::AudioFormat, format!("unsupported sample rate: {sample_rate}"))
                .with_component("player"));
        }
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            TtsError::new(ErrorKind::AudioDevice, format!("failed to open audio device: {e}")).with_component("player")
        })?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| TtsError::new(ErrorKind::AudioDevice, format!("failed to create sink: {e}")).with_component("player"))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: Mutex::new(sink),
            state: Mutex::new(PlaybackState::default()),
            transition: Mutex::new(()),
            sample_rate,
            channels,
        })
    }

    /// Loads `audio` and starts playback immediately, replacing whatever
    /// was previously loaded.
    pub fn play(&self, audio: Arc<AudioData>) -> Result<(), TtsError> {
        let _guard = self.transition.lock();

        let samples = bytes_to_i16_samples(audio.bytes());
        let source = rodio::buffer::SamplesBuffer::new(self.channels, self.sample_rate, samples);

        {
            let mut sink = self.sink.lock();
            sink.stop();
            *sink = Sink::try_new(&self.stream_handle)
                .map_err(|e| TtsError::new(ErrorKind::AudioDevice, format!("failed to create sink: {e}")).with_component("player"))?;
            let volume = self.state.lock().volume;
            sink.set_volume(volume);
            sink.append(source);
            sink.play();
        }

        let mut state = self.state.lock();
        state.phase = Phase::Playing;
        state.current = Some(audio);
        state.started_at = Some(Instant::now());
        state.accumulated = Duration::ZERO;
        debug!("playback started");
        Ok(())
    }

    pub fn pause(&self) -> Result<(), TtsError> {
        let _guard = self.transition.lock();
        let mut state = self.state.lock();
        if state.phase != Phase::Playing {
            return Err(TtsError::new(ErrorKind::InvalidStateTransition, "pause requires Playing phase").with_component("player"));
        }
        self.sink.lock().pause();
        if let Some(started) = state.started_at.take() {
            state.accumulated += started.elapsed();
        }
        state.phase = Phase::Paused;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), TtsError> {
        let _guard = self.transition.lock();
        let mut state = self.state.lock();
        if state.phase != Phase::Paused {
            return Err(TtsError::new(ErrorKind::InvalidStateTransition, "resume requires Paused phase").with_component("player"));
        }
        self.sink.lock().play();
        state.started_at = Some(Instant::now());
        state.phase = Phase::Playing;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), TtsError> {
        let _guard = self.transition.lock();
        self.sink.lock().stop();
        let mut state = self.state.lock();
        state.phase = Phase::Idle;
        state.current = None;
        state.started_at = None;
        state.accumulated = Duration::ZERO;
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.sink.lock().set_volume(clamped);
        self.state.lock().volume = clamped;
    }

    /// Clamped to the loaded clip's duration so a caller polling this after
    /// natural completion never sees a value past the end of the clip.
    /// Completion itself is still detected by the monitor thread's
    /// `has_finished()` poll (sink-empty), not by position reaching
    /// duration — a sink can finish draining slightly before or after the
    /// elapsed-time estimate crosses the nominal duration, so using
    /// position-reaches-duration as the completion signal would race the
    /// sink's own state.
    pub fn get_position(&self) -> Duration {
        let state = self.state.lock();
        let live = state.started_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
        let position = state.accumulated + live;
        let duration = state.current.as_ref().map(|a| a.duration());
        clamp_position(position, duration)
    }

    /// Full duration of whatever is currently loaded, or zero if idle.
    pub fn get_current_duration(&self) -> Duration {
        self.state.lock().current.as_ref().map(|a| a.duration()).unwrap_or(Duration::ZERO)
    }

    /// True once the sink has no more queued audio and we are not paused
    /// mid-buffer — i.e. the sentence played to completion.
    pub fn has_finished(&self) -> bool {
        let state = self.state.lock();
        state.phase == Phase::Playing && self.sink.lock().empty()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().phase == Phase::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().phase == Phase::Paused
    }

    pub fn close(&self) -> Result<(), TtsError> {
        self.stop()
    }
}

impl Player for AudioPlayer {
    fn play(&self, audio: Arc<AudioData>) -> Result<(), TtsError> {
        AudioPlayer::play(self, audio)
    }

    fn pause(&self) -> Result<(), TtsError> {
        AudioPlayer::pause(self)
    }

    fn resume(&self) -> Result<(), TtsError> {
        AudioPlayer::resume(self)
    }

    fn stop(&self) -> Result<(), TtsError> {
        AudioPlayer::stop(self)
    }

    fn set_volume(&self, volume: f32) {
        AudioPlayer::set_volume(self, volume)
    }

    fn get_position(&self) -> Duration {
        AudioPlayer::get_position(self)
    }

    fn get_current_duration(&self) -> Duration {
        AudioPlayer::get_current_duration(self)
    }

    fn has_finished(&self) -> bool {
        AudioPlayer::has_finished(self)
    }

    fn is_playing(&self) -> bool {
        AudioPlayer::is_playing(self)
    }

    fn is_paused(&self) -> bool {
        AudioPlayer::is_paused(self)
    }

    fn close(&self) -> Result<(), TtsError> {
        AudioPlayer::close(self)
    }
}

fn bytes_to_i16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
}

/// No loaded clip means no ceiling to clamp against.
fn clamp_position(position: Duration, duration: Option<Duration>) -> Duration {
    match duration {
        Some(d) => position.min(d),
        None => position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_sample_rate() {
        let err = AudioPlayer::new(11_025, 1);
        assert!(matches!(err, Err(e) if e.kind == ErrorKind::AudioFormat));
    }

    #[test]
    fn bytes_to_i16_samples_handles_even_length() {
        let bytes = vec![0x01, 0x00, 0xFF, 0xFF];
        let samples = bytes_to_i16_samples(&bytes);
        assert_eq!(samples, vec![1, -1]);
    }

    #[test]
    fn bytes_to_i16_samples_drops_trailing_odd_byte() {
        // AudioData::from_pcm_bytes already pads odd input, so this only
        // matters if a caller hands raw bytes directly; chunks_exact
        // silently drops a dangling final byte rather than panicking.
        let bytes = vec![0x01, 0x00, 0x02];
        let samples = bytes_to_i16_samples(&bytes);
        assert_eq!(samples, vec![1]);
    }

    #[test]
    fn clamp_position_caps_at_the_loaded_clip_duration() {
        let duration = Duration::from_secs(5);
        assert_eq!(clamp_position(Duration::from_secs(7), Some(duration)), duration);
        assert_eq!(clamp_position(Duration::from_secs(3), Some(duration)), Duration::from_secs(3));
    }

    #[test]
    fn clamp_position_passes_through_with_nothing_loaded() {
        assert_eq!(clamp_position(Duration::from_secs(7), None), Duration::from_secs(7));
    }
}
