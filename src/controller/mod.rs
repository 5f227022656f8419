//! The controller (§5): owns the document's sentence sequence, drives the
//! state machine, and keeps the lookahead window synthesized ahead of
//! playback. Public methods are synchronous and short; the actual
//! lookahead work and end-of-sentence advancement happen on a dedicated
//! background thread so a caller invoking `play()` is never blocked on a
//! subprocess synthesis call it didn't ask for.

pub mod scheduler;
pub mod state;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::cache::{AudioCache, Durability};
use crate::cancellation::Context;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::TtsError;
use crate::model::{AudioData, DocumentId, Sentence, Speed};
use crate::player::{AudioPlayer, Player};
use crate::port::{Command, Event, UiPort};
use crate::queue::LookaheadQueue;

use scheduler::{next_fill_candidates, RetryPolicy};
use state::ControllerState;

const MONITOR_TICK: Duration = Duration::from_millis(50);

struct SharedState {
    state: ControllerState,
    sentences: Vec<Sentence>,
    current_index: Option<usize>,
    document_id: Option<DocumentId>,
    voice: String,
    speed: Speed,
}

impl SharedState {
    fn transition(&mut self, to: ControllerState) -> Result<(), TtsError> {
        if !state::is_allowed(self.state, to) {
            return Err(TtsError::new(
                crate::error::ErrorKind::InvalidStateTransition,
                format!("{:?} -> {:?} is not allowed", self.state, to),
            )
            .with_component("controller"));
        }
        self.state = to;
        Ok(())
    }
}

pub struct Controller {
    shared: Arc<Mutex<SharedState>>,
    cache: Arc<AudioCache>,
    engine: Arc<dyn Engine>,
    player: Arc<dyn Player>,
    queue: Arc<LookaheadQueue>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    ui: Arc<dyn UiPort>,
    config: Config,
    retry_policy: RetryPolicy,
    shutdown: Arc<AtomicBool>,
    monitor_handle: Option<std::thread::JoinHandle<()>>,
    cleanup_handle: Option<std::thread::JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: Config, engine: Arc<dyn Engine>, ui: Arc<dyn UiPort>) -> Result<Self, TtsError> {
        let player = Arc::new(AudioPlayer::new(config.player.sample_rate, config.player.channels)?);
        Self::new_with_player(config, engine, ui, player)
    }

    /// Shared by `new` and the test suite: the real constructor always
    /// builds a real `AudioPlayer` (which opens an actual audio device),
    /// while tests substitute a fake `Player` so `Controller`'s own
    /// state-machine and navigation behavior can run without one.
    fn new_with_player(config: Config, engine: Arc<dyn Engine>, ui: Arc<dyn UiPort>, player: Arc<dyn Player>) -> Result<Self, TtsError> {
        let cache = Arc::new(AudioCache::open(&config.cache)?);
        let queue = Arc::new(LookaheadQueue::new(config.lookahead.depth));

        let shared = Arc::new(Mutex::new(SharedState {
            state: ControllerState::Idle,
            sentences: Vec::new(),
            current_index: None,
            document_id: None,
            voice: "default".to_string(),
            speed: Speed::snap(config.default_speed),
        }));

        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let monitor_handle = spawn_monitor_thread(
            Arc::clone(&shared),
            Arc::clone(&cache),
            Arc::clone(&engine),
            Arc::clone(&player),
            Arc::clone(&queue),
            Arc::clone(&in_flight),
            Arc::clone(&ui),
            Arc::clone(&shutdown),
            config.lookahead.depth,
            config.engine.subprocess_timeout_secs,
        );
        let cleanup_handle = spawn_cleanup_thread(Arc::clone(&cache), Arc::clone(&shutdown), config.cache.cleanup_interval_secs, config.cache.l2_ttl_secs);

        Ok(Self {
            shared,
            cache,
            engine,
            player,
            queue,
            in_flight,
            ui,
            config,
            retry_policy: RetryPolicy::default(),
            shutdown,
            monitor_handle: Some(monitor_handle),
            cleanup_handle: Some(cleanup_handle),
        })
    }

    pub fn start(&self) -> Result<(), TtsError> {
        let mut shared = self.shared.lock();
        shared.transition(ControllerState::Initializing)?;
        drop(shared);
        self.ui.emit(Event::TtsInitializing);

        let validation = self.engine.validate();
        let mut shared = self.shared.lock();
        match validation {
            Ok(()) => {
                shared.transition(ControllerState::Ready)?;
                drop(shared);
                self.ui.emit(Event::TtsReady);
                Ok(())
            }
            Err(e) => {
                shared.transition(ControllerState::Error)?;
                drop(shared);
                self.ui.emit(Event::TtsError {
                    kind: e.kind,
                    component: e.component,
                    message: e.message.clone(),
                    recoverable: !e.is_fatal(),
                });
                Err(e)
            }
        }
    }

    /// Parses `source` into sentences and resets progress to the start.
    /// Per the operation's own description this leaves the controller in
    /// `Processing` "until the first audio is ready"; `play()` or the
    /// lookahead thread is what carries it on to `Playing`.
    pub fn process_document(&self, source: &str) -> Result<(), TtsError> {
        let document_id = crate::parser::document_id(source);
        let sentences = crate::parser::parse_document(source, self.config.parser.code_block_mode);
        let mut shared = self.shared.lock();
        shared.transition(ControllerState::Processing)?;
        let same_document = shared.document_id.as_ref() == Some(&document_id);
        shared.sentences = sentences;
        shared.document_id = Some(document_id);
        if !same_document {
            shared.current_index = None;
        }
        drop(shared);

        if !same_document {
            self.queue.clear();
            self.in_flight.lock().clear();
        }
        Ok(())
    }

    pub fn play(&self) -> Result<(), TtsError> {
        let target_index = {
            let shared = self.shared.lock();
            shared.current_index.unwrap_or(0)
        };
        self.play_sentence_at(target_index)
    }

    pub fn pause(&self) -> Result<(), TtsError> {
        let mut shared = self.shared.lock();
        shared.transition(ControllerState::Paused)?;
        drop(shared);
        self.player.pause()?;
        self.ui.emit(Event::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), TtsError> {
        let mut shared = self.shared.lock();
        shared.transition(ControllerState::Playing)?;
        drop(shared);
        self.player.resume()?;
        self.ui.emit(Event::Resumed);
        Ok(())
    }

    pub fn next_sentence(&self) -> Result<(), TtsError> {
        let (total, target) = {
            let shared = self.shared.lock();
            (shared.sentences.len(), shared.current_index.map(|i| i + 1).unwrap_or(0))
        };
        if target >= total {
            self.ui.emit(Event::NavigationBoundary { at_start: false });
            return Ok(());
        }
        self.navigate_to(target)
    }

    pub fn previous_sentence(&self) -> Result<(), TtsError> {
        let current = self.shared.lock().current_index;
        let Some(target) = current.and_then(|i| i.checked_sub(1)) else {
            self.ui.emit(Event::NavigationBoundary { at_start: true });
            return Ok(());
        };
        self.navigate_to(target)
    }

    /// Jumps directly to sentence `index`. Out-of-range indices emit a
    /// boundary event and leave playback untouched, same as `Next`/`Previous`.
    pub fn jump_to(&self, index: usize) -> Result<(), TtsError> {
        let total = self.shared.lock().sentences.len();
        if index >= total {
            self.ui.emit(Event::NavigationBoundary { at_start: false });
            return Ok(());
        }
        self.navigate_to(index)
    }

    /// Shared `Next`/`Previous`/`JumpTo` behavior: if Playing, drop the
    /// lookahead queue and priority-synthesize the new current sentence; if
    /// Paused, only the index moves, nothing is synthesized or played yet.
    fn navigate_to(&self, target: usize) -> Result<(), TtsError> {
        let state = self.shared.lock().state;
        match state {
            ControllerState::Paused => {
                let mut shared = self.shared.lock();
                shared.current_index = Some(target);
                Ok(())
            }
            ControllerState::Playing => {
                self.queue.clear();
                self.in_flight.lock().clear();
                {
                    let mut shared = self.shared.lock();
                    shared.transition(ControllerState::Processing)?;
                }
                self.play_sentence_at(target)
            }
            _ => self.play_sentence_at(target),
        }
    }

    pub fn set_speed(&self, speed: f32) {
        let snapped = Speed::snap(speed);
        self.shared.lock().speed = snapped;
        // A speed change invalidates any pre-synthesized lookahead audio,
        // since the cache key is speed-dependent.
        self.queue.clear();
        self.in_flight.lock().clear();
        self.ui.emit(Event::SpeedChanged { speed: snapped.get() });
    }

    pub fn set_volume(&self, volume: f32) {
        self.player.set_volume(volume);
        self.ui.emit(Event::VolumeChanged { volume });
    }

    pub fn stop(&self) -> Result<(), TtsError> {
        {
            let mut shared = self.shared.lock();
            shared.transition(ControllerState::Stopping)?;
        }
        self.player.stop()?;
        self.queue.clear();
        self.in_flight.lock().clear();
        let mut shared = self.shared.lock();
        shared.current_index = None;
        shared.transition(ControllerState::Idle)?;
        drop(shared);
        self.ui.emit(Event::Stopped);
        Ok(())
    }

    pub fn get_state(&self) -> ControllerState {
        self.shared.lock().state
    }

    /// `(current sentence index, total sentences, position within the
    /// current sentence, aggregate progress in `[0, 100]`)`.
    ///
    /// `progress = (currentIndex + currentPosition / currentDuration) /
    /// totalSentences * 100`, guarded for zero totals/durations.
    pub fn get_progress(&self) -> (Option<usize>, usize, Duration, f32) {
        let shared = self.shared.lock();
        let total = shared.sentences.len();
        let index = shared.current_index;
        drop(shared);

        let position = self.player.get_position();
        let progress = match (index, total) {
            (_, 0) => 0.0,
            (None, _) => 0.0,
            (Some(i), total) => {
                let duration = self.player.get_current_duration();
                let within = if duration.is_zero() { 0.0 } else { position.as_secs_f32() / duration.as_secs_f32() };
                (i as f32 + within.min(1.0)) / total as f32 * 100.0
            }
        };
        (index, total, position, progress)
    }

    /// Routes a `Command` from the UI adapter's command surface (§6) to the
    /// matching method. `Command::Play` resumes in place rather than
    /// restarting from the top of the current sentence when the controller
    /// is currently `Paused`, matching the `Resume`-from-`Paused` behavior
    /// the player contract describes.
    pub fn dispatch(&self, command: Command) -> Result<(), TtsError> {
        match command {
            Command::Start => self.start(),
            Command::ProcessDocument { source } => self.process_document(&source),
            Command::Play => {
                if self.get_state() == ControllerState::Paused {
                    self.resume()
                } else {
                    self.play()
                }
            }
            Command::Pause => self.pause(),
            Command::NextSentence => self.next_sentence(),
            Command::PreviousSentence => self.previous_sentence(),
            Command::JumpTo(index) => self.jump_to(index),
            Command::SetSpeed(speed) => {
                self.set_speed(speed);
                Ok(())
            }
            Command::SetVolume(volume) => {
                self.set_volume(volume);
                Ok(())
            }
            Command::Stop => self.stop(),
        }
    }

    fn play_sentence_at(&self, index: usize) -> Result<(), TtsError> {
        let (text, voice, speed) = {
            let shared = self.shared.lock();
            let Some(sentence) = shared.sentences.get(index) else {
                return Ok(()); // past the end of the document: nothing to play
            };
            (sentence.text.clone(), shared.voice.clone(), shared.speed)
        };

        let audio = self.obtain_audio(&text, &voice, speed)?;

        {
            let mut shared = self.shared.lock();
            shared.transition(ControllerState::Playing)?;
            shared.current_index = Some(index);
        }
        self.player.play(audio)?;
        let (sentence_id, text, total) = {
            let shared = self.shared.lock();
            let sentence = &shared.sentences[index];
            (sentence.id, sentence.text.clone(), shared.sentences.len())
        };
        self.ui.emit(Event::Playing { sentence_id });
        self.ui.emit(Event::SentenceChanged {
            sentence_id,
            index,
            total,
            text,
            progress: self.get_progress().3,
        });
        self.in_flight.lock().remove(&sentence_id);
        Ok(())
    }

    /// Cache-first, then synthesize with the retry policy from §7: a
    /// retryable failure is retried with exponential backoff up to
    /// `max_attempts`; a fatal failure transitions straight to `Error`.
    fn obtain_audio(&self, text: &str, voice: &str, speed: Speed) -> Result<Arc<AudioData>, TtsError> {
        if let Some(audio) = self.cache.get(text, voice, speed) {
            return Ok(audio);
        }

        let timeout = Duration::from_secs(self.config.engine.subprocess_timeout_secs);
        let mut attempt = 0u32;
        loop {
            let ctx = Context::with_timeout(timeout);
            match self.engine.synthesize(&ctx, text, voice, speed) {
                Ok(audio) => {
                    let audio = Arc::new(audio);
                    if let Err(e) = self.cache.put(text, voice, speed, Arc::clone(&audio), Durability::Durable) {
                        warn!("failed to persist synthesized audio to cache: {e}");
                    }
                    return Ok(audio);
                }
                Err(e) if e.is_retryable() && self.retry_policy.should_retry(attempt) => {
                    warn!(attempt, "retryable synthesis error, backing off: {e}");
                    std::thread::sleep(self.retry_policy.delay_for(attempt));
                    attempt += 1;
                }
                Err(e) if e.is_fatal() => {
                    let mut shared = self.shared.lock();
                    let _ = shared.transition(ControllerState::Error);
                    drop(shared);
                    self.ui.emit(Event::TtsError {
                        kind: e.kind,
                        component: e.component,
                        message: e.message.clone(),
                        recoverable: false,
                    });
                    return Err(e);
                }
                Err(e) => {
                    // Retries exhausted or a non-retryable, non-fatal kind:
                    // surface the error but return to Ready without
                    // advancing the sentence.
                    let mut shared = self.shared.lock();
                    let _ = shared.transition(ControllerState::Ready);
                    drop(shared);
                    self.ui.emit(Event::TtsError {
                        kind: e.kind,
                        component: e.component,
                        message: e.message.clone(),
                        recoverable: true,
                    });
                    return Err(e);
                }
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(h) = self.monitor_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.cleanup_handle.take() {
            let _ = h.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_monitor_thread(
    shared: Arc<Mutex<SharedState>>,
    cache: Arc<AudioCache>,
    engine: Arc<dyn Engine>,
    player: Arc<dyn Player>,
    queue: Arc<LookaheadQueue>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    ui: Arc<dyn UiPort>,
    shutdown: Arc<AtomicBool>,
    depth: usize,
    timeout_secs: u64,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Acquire) {
            std::thread::sleep(MONITOR_TICK);

            let is_playing = { shared.lock().state == ControllerState::Playing };
            if is_playing && player.has_finished() {
                advance_after_finish(&shared, &cache, &engine, &player, &queue, &in_flight, &ui, timeout_secs);
            }

            if is_playing {
                let position = player.get_position();
                let duration = player.get_current_duration();
                ui.emit(Event::PositionUpdate { millis: position.as_millis() as u64, duration_millis: duration.as_millis() as u64 });
            }

            refill_lookahead(&shared, &cache, &engine, &queue, &in_flight, &ui, depth, timeout_secs);
        }
    })
}

/// Called once the player's sink drains after `Playing`. Either advances to
/// the next sentence or, at end of document, winds the controller down
/// through the only legal path back to rest: `Playing -> Stopping -> Idle`.
#[allow(clippy::too_many_arguments)]
fn advance_after_finish(
    shared: &Arc<Mutex<SharedState>>,
    cache: &Arc<AudioCache>,
    engine: &Arc<dyn Engine>,
    player: &Arc<dyn Player>,
    queue: &Arc<LookaheadQueue>,
    in_flight: &Arc<Mutex<HashSet<u64>>>,
    ui: &Arc<dyn UiPort>,
    timeout_secs: u64,
) {
    let next_index = {
        let s = shared.lock();
        s.current_index.map(|i| i + 1)
    };
    let Some(next_index) = next_index else { return };

    let (text, voice, speed, sentence) = {
        let s = shared.lock();
        match s.sentences.get(next_index) {
            Some(sentence) => (sentence.text.clone(), s.voice.clone(), s.speed, sentence.clone()),
            None => {
                let _ = player.stop();
                queue.clear();
                in_flight.lock().clear();
                let mut s = shared.lock();
                if s.transition(ControllerState::Stopping).is_ok() {
                    let _ = s.transition(ControllerState::Idle);
                }
                s.current_index = None;
                drop(s);
                ui.emit(Event::Stopped);
                return;
            }
        }
    };

    let audio = match cache.get(&text, &voice, speed) {
        Some(audio) => audio,
        None => {
            let ctx = Context::with_timeout(Duration::from_secs(timeout_secs));
            match engine.synthesize(&ctx, &text, &voice, speed) {
                Ok(audio) => {
                    let audio = Arc::new(audio);
                    let _ = cache.put(&text, &voice, speed, Arc::clone(&audio), Durability::Durable);
                    audio
                }
                Err(e) => {
                    error!("synthesis failed advancing to next sentence: {e}");
                    let mut s = shared.lock();
                    let _ = s.transition(ControllerState::Error);
                    drop(s);
                    ui.emit(Event::TtsError {
                        kind: e.kind,
                        component: e.component,
                        message: e.message,
                        recoverable: !e.is_fatal(),
                    });
                    return;
                }
            }
        }
    };

    if let Err(e) = player.play(audio) {
        error!("player failed to start next sentence: {e}");
        return;
    }

    let (total, s_index) = {
        let mut s = shared.lock();
        s.current_index = Some(next_index);
        (s.sentences.len(), next_index)
    };
    in_flight.lock().remove(&sentence.id);
    ui.emit(Event::Playing { sentence_id: sentence.id });
    ui.emit(Event::SentenceChanged {
        sentence_id: sentence.id,
        index: s_index,
        total,
        text: sentence.text.clone(),
        progress: if total == 0 { 0.0 } else { (s_index as f32 / total as f32) * 100.0 },
    });
}

#[allow(clippy::too_many_arguments)]
fn refill_lookahead(
    shared: &Arc<Mutex<SharedState>>,
    cache: &Arc<AudioCache>,
    engine: &Arc<dyn Engine>,
    queue: &Arc<LookaheadQueue>,
    in_flight: &Arc<Mutex<HashSet<u64>>>,
    ui: &Arc<dyn UiPort>,
    depth: usize,
    timeout_secs: u64,
) {
    let (sentences, current_index, voice, speed, playing) = {
        let s = shared.lock();
        (s.sentences.clone(), s.current_index, s.voice.clone(), s.speed, s.state == ControllerState::Playing)
    };
    if !playing {
        return;
    }

    let start = current_index.map(|i| i + 1).unwrap_or(0);
    let cached_count = sentences.iter().skip(start).take(depth).filter(|s| cache.get(&s.text, &voice, speed).is_some()).count();
    ui.emit(Event::BufferStatus { queue_depth: queue.len(), cached_count });

    let room = depth.saturating_sub(queue.len());
    if room == 0 {
        return;
    }

    let already = in_flight.lock().clone();
    let candidates = next_fill_candidates(&sentences, current_index, &already, room);
    for candidate in candidates {
        in_flight.lock().insert(candidate.id);
        queue.push(candidate);
    }

    while let Some(sentence) = queue.pop() {
        if cache.get(&sentence.text, &voice, speed).is_some() {
            continue;
        }
        let ctx = Context::with_timeout(Duration::from_secs(timeout_secs));
        match engine.synthesize(&ctx, &sentence.text, &voice, speed) {
            Ok(audio) => {
                let _ = cache.put(&sentence.text, &voice, speed, Arc::new(audio), Durability::Durable);
            }
            Err(e) => {
                warn!("lookahead synthesis failed for sentence {}: {e}", sentence.id);
            }
        }
    }
}

fn spawn_cleanup_thread(cache: Arc<AudioCache>, shutdown: Arc<AtomicBool>, interval_secs: u64, ttl_secs: u64) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let interval = Duration::from_secs(interval_secs.max(1));
        let mut elapsed = Duration::ZERO;
        while !shutdown.load(Ordering::Acquire) {
            std::thread::sleep(MONITOR_TICK);
            elapsed += MONITOR_TICK;
            if elapsed >= interval {
                elapsed = Duration::ZERO;
                cache.run_cleanup_sweep(ttl_secs);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineInfo;
    use crate::error::ErrorKind;
    use crate::port::InMemoryUiPort;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Synthesizes instantly, recording every call; `fail_first_n` calls
    /// return a retryable `Timeout` before the rest succeed, so the retry
    /// policy in `obtain_audio` has something to exercise.
    struct FakeEngine {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    impl FakeEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail_first_n: 0 })
        }

        fn failing_first(n: usize) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail_first_n: n })
        }
    }

    impl Engine for FakeEngine {
        fn synthesize(&self, _ctx: &Context, text: &str, _voice: &str, _speed: Speed) -> Result<AudioData, TtsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_n {
                return Err(TtsError::new(ErrorKind::Timeout, "fake timeout").with_component("fake-engine"));
            }
            Ok(AudioData::from_pcm_bytes(vec![0u8; (text.len().max(1)) * 2]))
        }

        fn validate(&self) -> Result<(), TtsError> {
            Ok(())
        }

        fn info(&self) -> EngineInfo {
            EngineInfo { name: "fake", requires_network: false, sample_rate: 22_050 }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FakePhase {
        Idle,
        Playing,
        Paused,
    }

    struct FakePlayerState {
        phase: FakePhase,
        started_at: Option<Instant>,
        clip_duration: Duration,
    }

    /// Millisecond-scale stand-in for a real clip's playback time. Kept
    /// comfortably longer than the handful of microseconds a test needs
    /// to run its own assertions right after `play()` returns, but still
    /// short enough that tests which deliberately wait for the monitor
    /// thread to notice completion (ticking every `MONITOR_TICK`) stay
    /// fast.
    const FAKE_CLIP_DURATION: Duration = Duration::from_millis(60);

    /// Records play/pause/resume/stop calls and simulates a clip
    /// finishing `FAKE_CLIP_DURATION` after `play()`, without opening any
    /// audio device.
    struct FakePlayer {
        state: Mutex<FakePlayerState>,
    }

    impl FakePlayer {
        fn new() -> Arc<Self> {
            Arc::new(Self { state: Mutex::new(FakePlayerState { phase: FakePhase::Idle, started_at: None, clip_duration: Duration::ZERO }) })
        }
    }

    impl Player for FakePlayer {
        fn play(&self, _audio: Arc<AudioData>) -> Result<(), TtsError> {
            let mut s = self.state.lock();
            s.phase = FakePhase::Playing;
            s.started_at = Some(Instant::now());
            s.clip_duration = FAKE_CLIP_DURATION;
            Ok(())
        }

        fn pause(&self) -> Result<(), TtsError> {
            self.state.lock().phase = FakePhase::Paused;
            Ok(())
        }

        fn resume(&self) -> Result<(), TtsError> {
            let mut s = self.state.lock();
            s.phase = FakePhase::Playing;
            s.started_at = Some(Instant::now());
            Ok(())
        }

        fn stop(&self) -> Result<(), TtsError> {
            let mut s = self.state.lock();
            s.phase = FakePhase::Idle;
            s.started_at = None;
            Ok(())
        }

        fn set_volume(&self, _volume: f32) {}

        fn get_position(&self) -> Duration {
            self.state.lock().started_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
        }

        fn get_current_duration(&self) -> Duration {
            self.state.lock().clip_duration
        }

        fn has_finished(&self) -> bool {
            let s = self.state.lock();
            s.phase == FakePhase::Playing && s.started_at.map(|t| t.elapsed() >= s.clip_duration).unwrap_or(false)
        }

        fn is_playing(&self) -> bool {
            self.state.lock().phase == FakePhase::Playing
        }

        fn is_paused(&self) -> bool {
            self.state.lock().phase == FakePhase::Paused
        }

        fn close(&self) -> Result<(), TtsError> {
            self.stop()
        }
    }

    fn test_config(cache_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.cache.dir = cache_dir.to_path_buf();
        config.lookahead.depth = 2;
        config.engine.subprocess_timeout_secs = 5;
        config
    }

    fn new_controller(engine: Arc<dyn Engine>, player: Arc<dyn Player>) -> (Controller, Arc<InMemoryUiPort>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ui = Arc::new(InMemoryUiPort::new());
        let controller = Controller::new_with_player(test_config(dir.path()), engine, Arc::clone(&ui) as Arc<dyn UiPort>, player).unwrap();
        (controller, ui, dir)
    }

    #[test]
    fn start_validates_the_engine_and_reaches_ready() {
        let (controller, ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        assert_eq!(controller.get_state(), ControllerState::Ready);
        assert!(ui.events().contains(&Event::TtsReady));
    }

    #[test]
    fn process_document_populates_sentences_and_stays_in_processing() {
        let (controller, _ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("First sentence. Second sentence.").unwrap();
        assert_eq!(controller.get_state(), ControllerState::Processing);
        assert_eq!(controller.shared.lock().sentences.len(), 2);
    }

    #[test]
    fn reprocessing_the_same_document_preserves_current_index() {
        let (controller, _ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        let doc = "First sentence. Second sentence.";
        controller.process_document(doc).unwrap();
        controller.play().unwrap();
        assert_eq!(controller.shared.lock().current_index, Some(0));

        // Re-feed the identical text, as a file-watcher reload would:
        // `Playing -> Processing` is itself a legal transition, and
        // current_index should survive since the document is unchanged.
        controller.process_document(doc).unwrap();
        assert_eq!(controller.shared.lock().current_index, Some(0));
    }

    #[test]
    fn reprocessing_a_different_document_resets_current_index_and_lookahead() {
        let (controller, _ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("First sentence. Second sentence.").unwrap();
        controller.play().unwrap();
        assert_eq!(controller.shared.lock().current_index, Some(0));
        controller.in_flight.lock().insert(999);

        controller.process_document("A totally different document here.").unwrap();
        assert_eq!(controller.shared.lock().current_index, None);
        assert!(controller.in_flight.lock().is_empty());
    }

    #[test]
    fn play_pause_resume_round_trip() {
        let (controller, ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("Only sentence here.").unwrap();
        controller.play().unwrap();
        assert_eq!(controller.get_state(), ControllerState::Playing);

        controller.pause().unwrap();
        assert_eq!(controller.get_state(), ControllerState::Paused);
        assert!(ui.events().contains(&Event::Paused));

        controller.resume().unwrap();
        assert_eq!(controller.get_state(), ControllerState::Playing);
        assert!(ui.events().contains(&Event::Resumed));
    }

    #[test]
    fn navigation_clears_stale_lookahead_state() {
        let (controller, _ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("One. Two. Three. Four.").unwrap();
        controller.play().unwrap();
        controller.queue.push(Sentence::new(99, "stale".to_string(), 99, 0..1));
        controller.in_flight.lock().insert(99);

        controller.jump_to(2).unwrap();
        assert_eq!(controller.shared.lock().current_index, Some(2));
        assert!(controller.queue.is_empty());
        assert!(controller.in_flight.lock().is_empty());
    }

    #[test]
    fn out_of_range_navigation_emits_a_boundary_event_and_keeps_position() {
        let (controller, ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("Only sentence here.").unwrap();
        controller.play().unwrap();

        controller.next_sentence().unwrap();
        assert_eq!(controller.shared.lock().current_index, Some(0));
        assert!(matches!(ui.last(), Some(Event::NavigationBoundary { at_start: false })));
    }

    #[test]
    fn a_retryable_failure_is_retried_and_eventually_succeeds() {
        let engine = FakeEngine::failing_first(1);
        let (controller, _ui, _dir) = new_controller(engine, FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("Only sentence here.").unwrap();
        controller.play().unwrap();
        assert_eq!(controller.get_state(), ControllerState::Playing);
    }

    #[test]
    fn dispatch_routes_play_to_resume_when_paused() {
        let (controller, ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("Only sentence here.").unwrap();
        controller.dispatch(Command::Play).unwrap();
        assert_eq!(controller.get_state(), ControllerState::Playing);

        controller.dispatch(Command::Pause).unwrap();
        assert_eq!(controller.get_state(), ControllerState::Paused);

        controller.dispatch(Command::Play).unwrap();
        assert_eq!(controller.get_state(), ControllerState::Playing);
        assert!(ui.events().contains(&Event::Resumed));
    }

    #[test]
    fn stop_returns_to_idle_and_clears_position() {
        let (controller, ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("Only sentence here.").unwrap();
        controller.play().unwrap();

        controller.stop().unwrap();
        assert_eq!(controller.get_state(), ControllerState::Idle);
        assert_eq!(controller.shared.lock().current_index, None);
        assert!(ui.events().contains(&Event::Stopped));
    }

    #[test]
    fn monitor_thread_advances_past_a_finished_sentence() {
        let (controller, ui, _dir) = new_controller(FakeEngine::new(), FakePlayer::new());
        controller.start().unwrap();
        controller.process_document("First one. Second one.").unwrap();
        controller.play().unwrap();
        assert_eq!(controller.shared.lock().current_index, Some(0));

        // The fake clip "finishes" after FAKE_CLIP_DURATION; give the
        // monitor thread a few ticks past that to notice and advance.
        std::thread::sleep(FAKE_CLIP_DURATION + MONITOR_TICK * 4);
        assert_eq!(controller.shared.lock().current_index, Some(1));
        assert!(ui.events().iter().any(|e| matches!(e, Event::SentenceChanged { index: 1, .. })));
    }
}
