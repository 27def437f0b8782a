use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trackref_registry::Registry;
use trackref_source::{SourceConfig, TrackerConfig};

pub const DEFAULT_ISSUES_PATH: &str = ".trackref/issues.jsonl";
pub const DEFAULT_CONFIG_PATH: &str = "trackref.toml";
pub const LOG_ENV: &str = "TRACKREF_LOG";

/// Logs go to stderr so stdout stays parseable. The default level is warn.
pub fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_env(LOG_ENV).ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// An explicit `--config` must exist; otherwise `trackref.toml` in the
/// working directory is used when present.
pub fn load_config_or_exit(config_arg: Option<&str>) -> TrackerConfig {
    let path = match config_arg {
        Some(path) => Path::new(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
        None => return TrackerConfig::default(),
    };
    TrackerConfig::load(path).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    })
}

pub fn open_registry_or_exit(config: &TrackerConfig) -> Arc<Registry> {
    config.open_registry().unwrap_or_else(|e| {
        eprintln!("error: failed to open {}: {e}", describe_source(&config.source));
        std::process::exit(1);
    })
}

pub fn describe_source(source: &SourceConfig) -> String {
    match source {
        SourceConfig::Snapshot { path } => format!("snapshot {}", path.display()),
        SourceConfig::Offline => "offline source".to_string(),
    }
}

pub fn print_json(payload: &impl Serialize) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render JSON: {e}");
            std::process::exit(1);
        }
    }
}
