//! Piper adapter: invokes a local Piper binary per call, text on stdin,
//! raw PCM on stdout. Grounded on the subprocess invocation shape used for
//! Piper elsewhere in the corpus (`--model`, `--output-raw`), generalized
//! here to go through the shared `SubprocessManager` instead of a direct
//! `std::process::Command` so the stdin-race fix and timeout handling are
//! shared with the cloud adapter.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::cancellation::Context;
use crate::engine::{Engine, EngineInfo};
use crate::error::{ErrorKind, TtsError};
use crate::model::{AudioData, Speed};
use crate::subprocess::SubprocessManager;

pub struct PiperEngine {
    manager: Arc<SubprocessManager>,
    binary: PathBuf,
    model: PathBuf,
    config: Option<PathBuf>,
}

impl PiperEngine {
    pub fn new(manager: Arc<SubprocessManager>, binary: PathBuf, model: PathBuf, config: Option<PathBuf>) -> Self {
        Self { manager, binary, model, config }
    }
}

impl Engine for PiperEngine {
    fn synthesize(&self, ctx: &Context, text: &str, _voice: &str, speed: Speed) -> Result<AudioData, TtsError> {
        if text.trim().is_empty() {
            return Ok(AudioData::from_pcm_bytes(Vec::new()));
        }

        let model_str = self.model.to_string_lossy().into_owned();
        let mut args: Vec<String> = vec!["--model".to_string(), model_str, "--output-raw".to_string()];
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.to_string_lossy().into_owned());
        }
        let length_scale = speed.piper_length_scale();
        if (length_scale - 1.0).abs() > f32::EPSILON {
            args.push("--length-scale".to_string());
            args.push(format!("{length_scale:.4}"));
        }

        let binary_str = self.binary.to_string_lossy().into_owned();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(binary = %binary_str, "invoking piper");
        let bytes = self.manager.execute_with_input(ctx, text, &binary_str, &arg_refs)?;
        Ok(AudioData::from_pcm_bytes(bytes))
    }

    fn validate(&self) -> Result<(), TtsError> {
        if !self.binary.exists() {
            return Err(TtsError::new(ErrorKind::Dependency, format!("piper binary not found: {}", self.binary.display()))
                .with_component("engine.piper"));
        }
        if self.model.extension().and_then(|e| e.to_str()) != Some("onnx") {
            return Err(TtsError::new(ErrorKind::Model, format!("model is not a .onnx file: {}", self.model.display()))
                .with_component("engine.piper"));
        }
        if !self.model.exists() {
            return Err(TtsError::new(ErrorKind::Model, format!("model file missing: {}", self.model.display()))
                .with_component("engine.piper"));
        }
        // The sidecar JSON config is advisory, not required: a voice model
        // without one is still valid, so a missing sidecar never fails
        // validation.
        Ok(())
    }

    fn info(&self) -> EngineInfo {
        EngineInfo { name: "piper", requires_network: false, sample_rate: 22_050 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fixture_bin() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_fixture-engine"))
    }

    #[test]
    fn empty_text_produces_empty_audio_without_spawning() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"stub").unwrap();
        std::fs::write(dir.path().join("voice.onnx.json"), b"{}").unwrap();

        let engine = PiperEngine::new(Arc::new(SubprocessManager::new()), fixture_bin(), model, None);
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let audio = engine.synthesize(&ctx, "   ", "default", Speed::default()).unwrap();
        assert!(audio.is_empty());
    }

    #[test]
    fn synthesize_returns_padded_even_length_pcm() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"stub").unwrap();
        std::fs::write(dir.path().join("voice.onnx.json"), b"{}").unwrap();

        let engine = PiperEngine::new(Arc::new(SubprocessManager::new()), fixture_bin(), model, None);
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let audio = engine.synthesize(&ctx, "hi", "default", Speed::default()).unwrap();
        assert_eq!(audio.bytes().len() % 2, 0);
        assert!(!audio.is_empty());
    }

    #[test]
    fn validate_rejects_missing_model() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("missing.onnx");
        let engine = PiperEngine::new(Arc::new(SubprocessManager::new()), fixture_bin(), model, None);
        let err = engine.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Model);
    }

    #[test]
    fn validate_succeeds_without_a_sidecar_config() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"stub").unwrap();
        // deliberately no voice.onnx.json written alongside it
        let engine = PiperEngine::new(Arc::new(SubprocessManager::new()), fixture_bin(), model, None);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_binary() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"stub").unwrap();
        std::fs::write(dir.path().join("voice.onnx.json"), b"{}").unwrap();
        let engine = PiperEngine::new(Arc::new(SubprocessManager::new()), PathBuf::from("/no/such/piper"), model, None);
        let err = engine.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Dependency);
    }
}
