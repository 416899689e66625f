use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_VAR: &str = "CODEX_HARNESS_OBSERVABILITY";
const LEVEL_VAR: &str = "CODEX_HARNESS_LOG_LEVEL";
const JSON_PATH_VAR: &str = "CODEX_HARNESS_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "codex-harness.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Logging settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    enabled: bool,
    level: Option<String>,
    json_path: Option<PathBuf>,
}

impl Settings {
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_VAR)
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        Self {
            enabled,
            level: lookup(LEVEL_VAR).filter(|level| !level.trim().is_empty()),
            json_path: lookup(JSON_PATH_VAR)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = EnvFilter::try_new(level)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs a global `tracing` subscriber once per process.
///
/// Library code only emits events; call this from a binary or test that wants
/// to see them. An already installed subscriber is left in place.
///
/// Environment variables:
/// - `CODEX_HARNESS_OBSERVABILITY`: enable/disable flag (default enabled).
/// - `CODEX_HARNESS_LOG_LEVEL`: filter directive such as `codex_harness=debug`.
/// - `CODEX_HARNESS_JSON_LOG_PATH`: write JSON lines to this file instead of
///   the compact console format on stderr.
/// - `RUST_LOG`: fallback filter when no level is given (default `warn`).
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = Settings::resolve(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        if let Some(path) = &settings.json_path {
            let (dir, file_name) = split_log_path(path);
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
