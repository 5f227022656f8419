//! Synthesis engine adapters (§4.2). An `Engine` turns sentence text into
//! PCM; both shipped adapters are subprocess-based, never linking a TTS
//! library directly, so the engine binary and any network credentials stay
//! fully outside the process.

pub mod cloud;
pub mod piper;

use std::sync::Arc;

use crate::cancellation::Context;
use crate::config::Config;
use crate::error::{ErrorKind, TtsError};
use crate::model::{AudioData, Speed};
use crate::subprocess::SubprocessManager;

/// Static facts about an engine, surfaced to the UI adapter's
/// `VoiceChanged` event and used by the controller to size timeouts.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub name: &'static str,
    pub requires_network: bool,
    pub sample_rate: u32,
}

/// Object-safe synthesis boundary (§4.2). Implementors must not block
/// past `ctx`'s deadline and must treat empty text as a no-op producing
/// empty audio rather than invoking a subprocess.
pub trait Engine: Send + Sync {
    fn synthesize(&self, ctx: &Context, text: &str, voice: &str, speed: Speed) -> Result<AudioData, TtsError>;

    /// Checks the engine's own configuration (binary path, model files,
    /// credentials) without synthesizing anything.
    fn validate(&self) -> Result<(), TtsError>;

    fn info(&self) -> EngineInfo;

    /// Releases any held resources. The shipped adapters are stateless
    /// per call and treat this as a no-op, but a persistent-process
    /// adapter would shut its child down here.
    fn close(&self, _ctx: &Context) -> Result<(), TtsError> {
        Ok(())
    }
}

/// Builds the configured engine adapter, resolving `config.engine.selection`
/// against the known tokens (`piper`, and `cloud`/`gtts`/`google` as
/// synonyms for the cloud adapter). An empty selection (the default,
/// "not configured") and an unrecognized token are distinguished so a UI
/// adapter can tell "nothing set up yet" from "typo in the config file"
/// apart, per §7's stable error kinds.
pub fn build_from_config(config: &Config, manager: Arc<SubprocessManager>) -> Result<Arc<dyn Engine>, TtsError> {
    let selection = config.engine.selection.trim();
    if selection.is_empty() {
        return Err(TtsError::new(ErrorKind::NoEngineConfigured, "no engine configured; valid choices are piper, gtts (alias google)")
            .with_component("engine"));
    }

    match selection {
        "piper" => {
            let binary = config
                .engine
                .piper_binary
                .clone()
                .ok_or_else(|| TtsError::new(ErrorKind::NoEngineConfigured, "engine.piper_binary not set").with_component("engine"))?;
            let model = config
                .engine
                .piper_model
                .clone()
                .ok_or_else(|| TtsError::new(ErrorKind::NoEngineConfigured, "engine.piper_model not set").with_component("engine"))?;
            Ok(Arc::new(piper::PiperEngine::new(manager, binary, model, config.engine.piper_config.clone())))
        }
        "cloud" | "gtts" | "google" => {
            let tts_binary = config.engine.cloud_tts_binary.clone().ok_or_else(|| {
                TtsError::new(ErrorKind::NoEngineConfigured, "engine.cloud_tts_binary not set").with_component("engine")
            })?;
            let transcoder = config.engine.cloud_transcoder_binary.clone().ok_or_else(|| {
                TtsError::new(ErrorKind::NoEngineConfigured, "engine.cloud_transcoder_binary not set").with_component("engine")
            })?;
            Ok(Arc::new(cloud::CloudEngine::new(manager, tts_binary, transcoder, config.engine.cloud_language.clone())))
        }
        other => Err(TtsError::new(ErrorKind::InvalidEngine, format!("unrecognized engine selection: {other:?}")).with_component("engine")),
    }
}
