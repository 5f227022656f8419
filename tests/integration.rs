//! Cross-module integration tests: scenarios that span the parser, cache,
//! subprocess, and engine boundaries together rather than one module in
//! isolation. `Controller`/`AudioPlayer` scenarios that require opening a
//! real audio device are deliberately not exercised here, the same way the
//! teacher's own test suite never instantiates a real `OutputStream` — see
//! each module's own `#[cfg(test)]` block for the state-machine and
//! navigation invariants that don't need one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use readspeak_core::cache::{AudioCache, Durability};
use readspeak_core::cancellation::Context;
use readspeak_core::config::CacheConfig;
use readspeak_core::controller::scheduler::{next_fill_candidates, RetryPolicy};
use readspeak_core::engine::piper::PiperEngine;
use readspeak_core::engine::Engine;
use readspeak_core::model::{AudioData, Priority, Sentence, Speed};
use readspeak_core::parser::{parse_document, CodeBlockMode};
use readspeak_core::queue::LookaheadQueue;
use readspeak_core::subprocess::SubprocessManager;

fn fixture_engine_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fixture-engine"))
}

fn piper_engine() -> PiperEngine {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("voice.onnx");
    std::fs::write(&model, b"stub").unwrap();
    std::fs::write(dir.path().join("voice.onnx.json"), b"{}").unwrap();
    // Leak the tempdir so the model/config files outlive this function;
    // the fixture binary never reads them, only the adapter's own
    // validate() does, which these tests don't call.
    std::mem::forget(dir);
    PiperEngine::new(Arc::new(SubprocessManager::new()), fixture_engine_bin(), model, None)
}

fn cache_config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig {
        dir: dir.to_path_buf(),
        l1_capacity_bytes: 1024 * 1024,
        l2_capacity_bytes: 10 * 1024 * 1024,
        session_capacity_bytes: 1024 * 1024,
        compression_level: 3,
        l2_ttl_secs: 7 * 24 * 3600,
        session_ttl_secs: 3600,
        cleanup_interval_secs: 3600,
    }
}

/// Cold miss synthesizes through the engine; a warm hit returns the exact
/// same bytes without needing the engine again.
#[test]
fn cold_miss_synthesizes_warm_hit_reads_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AudioCache::open(&cache_config(dir.path())).unwrap();
    let engine = piper_engine();
    let ctx = Context::with_timeout(Duration::from_secs(5));
    let speed = Speed::default();

    assert!(cache.get("Once upon a time.", "default", speed).is_none());

    let audio = engine.synthesize(&ctx, "Once upon a time.", "default", speed).unwrap();
    let audio = Arc::new(audio);
    cache.put("Once upon a time.", "default", speed, Arc::clone(&audio), Durability::Durable).unwrap();

    let hit = cache.get("Once upon a time.", "default", speed).unwrap();
    assert_eq!(hit.bytes(), audio.bytes());
    assert!(!hit.is_empty());
}

/// A document mixing an abbreviation, a code block, and a list is parsed
/// into the exact expected sentence boundaries, and each resulting
/// sentence gets its own distinct, stable cache key.
#[test]
fn abbreviations_and_code_blocks_survive_the_full_pipeline_with_distinct_cache_keys() {
    let doc = "Dr. Lin explained the fix.\n\n```rust\nfn broken() {}\n```\n\n- Apply the patch.\n- Restart the service.\n";
    let sentences = parse_document(doc, CodeBlockMode::Skip);
    let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["Dr. Lin explained the fix.", "Apply the patch.", "Restart the service."]);

    let speed = Speed::default();
    let dir = tempfile::tempdir().unwrap();
    let cache = AudioCache::open(&cache_config(dir.path())).unwrap();
    let mut keys = std::collections::HashSet::new();
    for sentence in &sentences {
        let audio = Arc::new(AudioData::from_pcm_bytes(sentence.text.as_bytes().to_vec()));
        cache.put(&sentence.text, "default", speed, audio, Durability::Durable).unwrap();
        let key = readspeak_core::cache::derive_cache_key(&sentence.text, "default", speed);
        assert!(keys.insert(key), "cache key collided for {:?}", sentence.text);
        assert!(cache.get(&sentence.text, "default", speed).is_some());
    }
}

/// Every plain-text character that survives markdown stripping reappears,
/// in order, across the concatenation of the parsed sentences -- parsing
/// only removes markdown syntax and whitespace, never reorders or drops
/// the text itself.
#[test]
fn concatenated_sentences_retain_every_plain_text_character_in_order() {
    let doc = "First sentence here. Second sentence follows!\n\nA third one starts a new paragraph.";
    let sentences = parse_document(doc, CodeBlockMode::Skip);
    let concatenated: String = sentences.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");

    let significant = |s: &str| -> String { s.chars().filter(|c| !c.is_whitespace()).collect() };
    assert_eq!(significant(&concatenated), significant(doc));
}

/// A synthesis call that exceeds its deadline surfaces as `Timeout`, which
/// the scheduler's retry policy classifies as retryable; a call given
/// enough time to finish the same work succeeds.
#[test]
fn timeout_is_retryable_and_a_longer_deadline_succeeds() {
    let engine = piper_engine();
    let short_ctx = Context::with_timeout(Duration::from_millis(50));
    let slow_text = "this call will be made to sleep past the deadline";

    // The fixture binary doesn't support a sleep flag through the piper
    // adapter's argument shape, so drive the timeout directly through the
    // subprocess manager the same way the engine adapters do internally.
    let mgr = SubprocessManager::new();
    let err = mgr
        .execute_with_input(&short_ctx, slow_text, &fixture_engine_bin(), &["--sleep-ms", "500"])
        .unwrap_err();
    assert!(err.is_retryable());
    let policy = RetryPolicy::default();
    assert!(policy.should_retry(0));

    let long_ctx = Context::with_timeout(Duration::from_secs(5));
    let ok = mgr.execute_with_input(&long_ctx, slow_text, &fixture_engine_bin(), &["--sleep-ms", "20"]);
    assert!(ok.is_ok());

    // The piper adapter itself still works end to end for a fast call.
    let audio = engine.synthesize(&Context::with_timeout(Duration::from_secs(5)), "fast call", "default", Speed::default()).unwrap();
    assert!(!audio.is_empty());
}

/// Jumping to a sentence clears the lookahead queue and in-flight set the
/// way `Controller::navigate_to` does, so stale prefetch work for
/// sentences the reader skipped past never gets synthesized.
#[test]
fn navigation_clears_stale_lookahead_state() {
    let sentences: Vec<Sentence> = (0..6)
        .map(|i| Sentence::new(i, format!("Sentence {i}."), i as usize, 0..1).with_priority(Priority::Normal))
        .collect();

    let queue = LookaheadQueue::new(4);
    let mut in_flight = std::collections::HashSet::new();

    // Fill the lookahead window as if playback were at sentence 0.
    let fill = next_fill_candidates(&sentences, Some(0), &in_flight, 2);
    for s in &fill {
        in_flight.insert(s.id);
        queue.push(s.clone());
    }
    assert_eq!(queue.len(), 2);
    assert_eq!(in_flight.len(), 2);

    // The reader jumps straight to sentence 4: the stale window for
    // sentences 1-2 is dropped.
    queue.clear();
    in_flight.clear();
    assert!(queue.is_empty());
    assert!(in_flight.is_empty());

    // Refilling from the new position only queues what comes after it.
    let refill = next_fill_candidates(&sentences, Some(4), &in_flight, 2);
    assert_eq!(refill.iter().map(|s| s.id).collect::<Vec<_>>(), vec![5]);
}

/// Many concurrent engine calls each get back exactly their own text's
/// deterministic audio, never another call's bytes -- the stdin-race fix
/// in `SubprocessManager` holds under real concurrent engine use, not
/// just the raw subprocess manager tests.
#[test]
fn concurrent_engine_calls_do_not_cross_contaminate_audio() {
    let engine = Arc::new(piper_engine());
    let mut handles = Vec::new();
    for i in 0..12 {
        let engine = Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            let text = format!("sentence number {i}");
            let ctx = Context::with_timeout(Duration::from_secs(5));
            let audio = engine.synthesize(&ctx, &text, "default", Speed::default()).unwrap();
            (text, audio)
        }));
    }

    for h in handles {
        let (text, audio) = h.join().unwrap();
        let expected = engine.synthesize(&Context::with_timeout(Duration::from_secs(5)), &text, "default", Speed::default()).unwrap();
        assert_eq!(audio.bytes(), expected.bytes(), "audio for {text:?} did not match its own deterministic output");
    }
}
