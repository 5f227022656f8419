//! Configuration for the TTS subsystem.
//!
//! All tunables named across §4 are centralized here and loaded from TOML.
//! Any missing or invalid entries fall back to sensible defaults so the
//! subsystem can still start — mirroring the teacher reader's
//! `load_config`, which never fails the process over a bad config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::parser::CodeBlockMode;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub lookahead: LookaheadConfig,
    pub player: PlayerConfig,
    pub parser: ParserConfig,
    #[serde(default = "default_speed")]
    pub default_speed: f32,
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            cache: CacheConfig::default(),
            lookahead: LookaheadConfig::default(),
            player: PlayerConfig::default(),
            parser: ParserConfig::default(),
            default_speed: default_speed(),
            default_volume: default_volume(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `piper`, `gtts` (alias `google`), or empty for "not configured".
    pub selection: String,
    pub piper_binary: Option<PathBuf>,
    pub piper_model: Option<PathBuf>,
    pub piper_config: Option<PathBuf>,
    pub cloud_tts_binary: Option<PathBuf>,
    pub cloud_transcoder_binary: Option<PathBuf>,
    pub cloud_language: String,
    #[serde(default = "default_subprocess_timeout_secs")]
    pub subprocess_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selection: String::new(),
            piper_binary: None,
            piper_model: None,
            piper_config: None,
            cloud_tts_binary: None,
            cloud_transcoder_binary: None,
            cloud_language: "en-US".to_string(),
            subprocess_timeout_secs: default_subprocess_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity_bytes: u64,
    #[serde(default = "default_l2_capacity")]
    pub l2_capacity_bytes: u64,
    #[serde(default = "default_session_capacity")]
    pub session_capacity_bytes: u64,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default = "default_l2_ttl_secs")]
    pub l2_ttl_secs: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".cache/tts"),
            l1_capacity_bytes: default_l1_capacity(),
            l2_capacity_bytes: default_l2_capacity(),
            session_capacity_bytes: default_session_capacity(),
            compression_level: default_compression_level(),
            l2_ttl_secs: default_l2_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LookaheadConfig {
    #[serde(default = "default_lookahead")]
    pub depth: usize,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self { depth: default_lookahead() }
    }
}

/// Sample rate decided in §9: the output context opens at the engine's
/// native rate rather than resampling.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// How the parser handles fenced/indented code blocks in a document
/// (§4.6): skipped by default, or replaced with a spoken placeholder.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    pub code_block_mode: CodeBlockMode,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { code_block_mode: CodeBlockMode::default() }
    }
}

fn default_speed() -> f32 {
    1.0
}
fn default_volume() -> f32 {
    1.0
}
fn default_subprocess_timeout_secs() -> u64 {
    5
}
fn default_l1_capacity() -> u64 {
    100 * 1024 * 1024
}
fn default_l2_capacity() -> u64 {
    1024 * 1024 * 1024
}
fn default_session_capacity() -> u64 {
    50 * 1024 * 1024
}
fn default_compression_level() -> i32 {
    3
}
fn default_l2_ttl_secs() -> u64 {
    7 * 24 * 3600
}
fn default_session_ttl_secs() -> u64 {
    24 * 3600
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_lookahead() -> usize {
    2
}
fn default_sample_rate() -> u32 {
    22_050
}
fn default_channels() -> u16 {
    1
}
fn default_buffer_size() -> usize {
    4096
}

impl Config {
    /// Load configuration from the given path, falling back to defaults
    /// on any read or parse error.
    pub fn load_or_default(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => return Self::default(),
        };
        toml::from_str(&contents).unwrap_or_default()
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
