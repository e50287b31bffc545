use std::process::ExitCode;

use rfpdesk_core::config::{AppConfig, LoadOptions};
use tracing::Level;

/// Logs go to stderr; stdout carries the command payload.
fn init_logging() {
    let level = AppConfig::load(LoadOptions::default())
        .ok()
        .and_then(|config| config.logging.level.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> ExitCode {
    init_logging();
    rfpdesk_cli::run()
}
