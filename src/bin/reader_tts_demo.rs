//! Thin CLI demo: reads a markdown file, speaks it sentence by sentence
//! with whichever engine the config points at, and prints each emitted
//! event. Not part of the core surface — a manual smoke-test harness.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use readspeak_core::{Config, Controller, ControllerState, InMemoryUiPort};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("tts.toml"));
    let doc_path = args.next().ok_or_else(|| anyhow::anyhow!("usage: reader-tts-demo <config.toml> <document.md>"))?;

    let config = Config::load_or_default(&config_path);
    let source = std::fs::read_to_string(&doc_path)?;

    let manager = Arc::new(readspeak_core::subprocess::SubprocessManager::new());
    let engine = readspeak_core::engine::build_from_config(&config, manager)?;
    let ui = Arc::new(InMemoryUiPort::new());
    let controller = Controller::new(config, engine, ui.clone())?;

    controller.start()?;
    controller.process_document(&source)?;
    controller.play()?;

    loop {
        std::thread::sleep(Duration::from_millis(200));
        for event in ui.events() {
            println!("{event:?}");
        }
        if controller.get_state() == ControllerState::Idle {
            break;
        }
    }

    Ok(())
}
