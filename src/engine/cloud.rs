//! Cloud adapter: chains two subprocesses per sentence — a TTS binary that
//! turns text into compressed audio (MP3), and a transcoder that decodes
//! and resamples it to the same raw PCM wire format Piper emits. The
//! intermediate MP3 is staged through a temp file (rather than piped
//! directly) because the transcoder binary expects a seekable input; the
//! temp file is always cleaned up via `tempfile::NamedTempFile`'s `Drop`,
//! success or failure.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::Builder as TempFileBuilder;
use tracing::debug;

use crate::cancellation::Context;
use crate::engine::{Engine, EngineInfo};
use crate::error::{ErrorKind, TtsError};
use crate::model::{AudioData, Speed};
use crate::subprocess::SubprocessManager;

/// Matches Piper's own output rate: both engines must hand the controller
/// the same PCM wire format regardless of which one produced it.
const CLOUD_SAMPLE_RATE: u32 = 22_050;

pub struct CloudEngine {
    manager: Arc<SubprocessManager>,
    tts_binary: PathBuf,
    transcoder_binary: PathBuf,
    language: String,
}

impl CloudEngine {
    pub fn new(manager: Arc<SubprocessManager>, tts_binary: PathBuf, transcoder_binary: PathBuf, language: String) -> Self {
        Self { manager, tts_binary, transcoder_binary, language }
    }
}

impl Engine for CloudEngine {
    fn synthesize(&self, ctx: &Context, text: &str, voice: &str, speed: Speed) -> Result<AudioData, TtsError> {
        if text.trim().is_empty() {
            return Ok(AudioData::from_pcm_bytes(Vec::new()));
        }

        let (rate, slow) = speed.cloud_speaking_rate();
        let mut tts_args = vec![
            "--language".to_string(),
            self.language.clone(),
            "--voice".to_string(),
            voice.to_string(),
            "--speaking-rate".to_string(),
            format!("{rate:.2}"),
        ];
        if slow {
            tts_args.push("--slow".to_string());
        }

        let tts_binary = self.tts_binary.to_string_lossy().into_owned();
        let tts_arg_refs: Vec<&str> = tts_args.iter().map(String::as_str).collect();
        debug!(binary = %tts_binary, "invoking cloud tts");
        let mp3_bytes = self.manager.execute_with_input(ctx, text, &tts_binary, &tts_arg_refs)?;

        let mut mp3_file = TempFileBuilder::new()
            .suffix(".mp3")
            .tempfile()
            .map_err(|e| TtsError::new(ErrorKind::Dependency, format!("failed to create temp mp3 file: {e}")).with_component("engine.cloud"))?;
        {
            use std::io::Write;
            mp3_file
                .write_all(&mp3_bytes)
                .map_err(|e| TtsError::new(ErrorKind::Dependency, format!("failed to write temp mp3 file: {e}")).with_component("engine.cloud"))?;
        }
        let mp3_path = mp3_file.path().to_string_lossy().into_owned();

        let mut transcode_args = vec![
            "-i".to_string(),
            mp3_path,
            "-ar".to_string(),
            CLOUD_SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
        ];
        if (rate - 1.0).abs() > f32::EPSILON {
            transcode_args.push("-filter:a".to_string());
            transcode_args.push(format!("atempo={rate:.2}"));
        }
        transcode_args.push("-".to_string());

        let transcoder_binary = self.transcoder_binary.to_string_lossy().into_owned();
        let transcode_arg_refs: Vec<&str> = transcode_args.iter().map(String::as_str).collect();
        debug!(binary = %transcoder_binary, "invoking cloud transcoder");
        let pcm_bytes = self.manager.execute_with_input(ctx, "", &transcoder_binary, &transcode_arg_refs)?;

        // `mp3_file` is dropped here, removing the temp file regardless of
        // the outcome above.
        Ok(AudioData::from_pcm_bytes(pcm_bytes))
    }

    fn validate(&self) -> Result<(), TtsError> {
        if self.tts_binary.is_absolute() && !self.tts_binary.exists() {
            return Err(TtsError::new(ErrorKind::Dependency, format!("cloud tts binary not found: {}", self.tts_binary.display()))
                .with_component("engine.cloud"));
        }
        if self.transcoder_binary.is_absolute() && !self.transcoder_binary.exists() {
            return Err(TtsError::new(
                ErrorKind::Dependency,
                format!("cloud transcoder binary not found: {}", self.transcoder_binary.display()),
            )
            .with_component("engine.cloud"));
        }
        if self.language.trim().is_empty() {
            return Err(TtsError::new(ErrorKind::InvalidInput, "cloud language must not be empty").with_component("engine.cloud"));
        }
        Ok(())
    }

    fn info(&self) -> EngineInfo {
        EngineInfo { name: "cloud", requires_network: true, sample_rate: CLOUD_SAMPLE_RATE }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fixture_bin() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_fixture-engine"))
    }

    #[test]
    fn empty_text_produces_empty_audio_without_spawning() {
        let engine = CloudEngine::new(Arc::new(SubprocessManager::new()), fixture_bin(), fixture_bin(), "en-US".to_string());
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let audio = engine.synthesize(&ctx, "", "default", Speed::default()).unwrap();
        assert!(audio.is_empty());
    }

    #[test]
    fn validate_rejects_empty_language() {
        let engine = CloudEngine::new(Arc::new(SubprocessManager::new()), fixture_bin(), fixture_bin(), "".to_string());
        let err = engine.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn validate_rejects_missing_absolute_binary() {
        let engine = CloudEngine::new(
            Arc::new(SubprocessManager::new()),
            PathBuf::from("/no/such/cloud-tts"),
            fixture_bin(),
            "en-US".to_string(),
        );
        let err = engine.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Dependency);
    }
}
