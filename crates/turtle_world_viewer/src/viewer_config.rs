use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::prelude::Resource;
use turtle_world::{PollPolicy, DEFAULT_FACE_OPACITY, DEFAULT_MAX_POLL_ATTEMPTS};

pub(super) const ENV_CONFIG_FILE: &str = "TURTLE_WORLD_VIEWER_CONFIG";
pub(super) const ENV_SERVER_URL: &str = "TURTLE_WORLD_VIEWER_SERVER_URL";
pub(super) const ENV_POLL_INTERVAL_MS: &str = "TURTLE_WORLD_VIEWER_POLL_INTERVAL_MS";
pub(super) const ENV_MAX_POLL_ATTEMPTS: &str = "TURTLE_WORLD_VIEWER_MAX_POLL_ATTEMPTS";
pub(super) const ENV_REQUEST_TIMEOUT_MS: &str = "TURTLE_WORLD_VIEWER_REQUEST_TIMEOUT_MS";
pub(super) const ENV_TEXTURE_ROOT: &str = "TURTLE_WORLD_VIEWER_TEXTURE_ROOT";
pub(super) const ENV_MODEL_PATH: &str = "TURTLE_WORLD_VIEWER_MODEL_PATH";
pub(super) const ENV_FACE_OPACITY: &str = "TURTLE_WORLD_VIEWER_FACE_OPACITY";
pub(super) const ENV_OFFLINE_SNAPSHOT: &str = "TURTLE_WORLD_VIEWER_OFFLINE_SNAPSHOT";
pub(super) const ENV_HEADLESS: &str = "TURTLE_WORLD_VIEWER_HEADLESS";
pub(super) const ENV_HEADLESS_COMMAND: &str = "TURTLE_WORLD_VIEWER_HEADLESS_COMMAND";

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_TEXTURE_ROOT: &str = "textures/block";
const DEFAULT_MODEL_PATH: &str = "models/turtle.glb#Scene0";

#[derive(Clone, Debug, PartialEq, Resource)]
pub(super) struct ViewerConfig {
    pub server_url: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_ms: u64,
    pub texture_root: String,
    pub model_path: String,
    pub face_opacity: f32,
    pub offline_snapshot: Option<PathBuf>,
    pub headless: bool,
    pub headless_command: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            texture_root: DEFAULT_TEXTURE_ROOT.to_string(),
            model_path: DEFAULT_MODEL_PATH.to_string(),
            face_opacity: DEFAULT_FACE_OPACITY,
            offline_snapshot: None,
            headless: false,
            headless_command: None,
        }
    }
}

impl ViewerConfig {
    pub(super) fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }

    pub(super) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ViewerConfigError {
    ReadConfigFile { path: String, message: String },
    ParseConfigFile { path: String, message: String },
}

impl fmt::Display for ViewerConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerConfigError::ReadConfigFile { path, message } => {
                write!(f, "read config file failed ({path}): {message}")
            }
            ViewerConfigError::ParseConfigFile { path, message } => {
                write!(f, "parse config file failed ({path}): {message}")
            }
        }
    }
}

impl Error for ViewerConfigError {}

/// Environment first, then the TOML file named by `TURTLE_WORLD_VIEWER_CONFIG`
/// on top. A broken file is reported and the environment alone is used.
pub(super) fn resolve_viewer_config() -> (ViewerConfig, Option<ViewerConfigError>) {
    let cli_server_url = std::env::args().nth(1);
    let env_lookup = |key: &str| {
        std::env::var(key)
            .ok()
            .or_else(|| (key == ENV_SERVER_URL).then(|| cli_server_url.clone()).flatten())
    };

    let Some(path) = std::env::var(ENV_CONFIG_FILE).ok() else {
        return (load_viewer_config_from(env_lookup), None);
    };
    match read_config_table(Path::new(&path)) {
        Ok(table) => (
            load_viewer_config_from(|key| {
                table
                    .get(key)
                    .and_then(toml_value_to_string)
                    .or_else(|| env_lookup(key))
            }),
            None,
        ),
        Err(err) => (load_viewer_config_from(env_lookup), Some(err)),
    }
}

fn read_config_table(path: &Path) -> Result<toml::Table, ViewerConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ViewerConfigError::ReadConfigFile {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let value: toml::Value =
        toml::from_str(&content).map_err(|err| ViewerConfigError::ParseConfigFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
    match value {
        toml::Value::Table(table) => Ok(table),
        _ => Err(ViewerConfigError::ParseConfigFile {
            path: path.display().to_string(),
            message: "root is not a TOML table".to_string(),
        }),
    }
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Float(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

pub(super) fn load_viewer_config_from<F>(lookup: F) -> ViewerConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ViewerConfig::default();
    if let Some(value) = parse_non_empty(&lookup, ENV_SERVER_URL) {
        config.server_url = value;
    }
    if let Some(value) = parse_u64(&lookup, ENV_POLL_INTERVAL_MS) {
        config.poll_interval_ms = value;
    }
    if let Some(value) = parse_u64(&lookup, ENV_MAX_POLL_ATTEMPTS) {
        if value > 0 {
            config.max_poll_attempts = u32::try_from(value).unwrap_or(u32::MAX);
        }
    }
    if let Some(value) = parse_u64(&lookup, ENV_REQUEST_TIMEOUT_MS) {
        if value > 0 {
            config.request_timeout_ms = value;
        }
    }
    if let Some(value) = parse_non_empty(&lookup, ENV_TEXTURE_ROOT) {
        config.texture_root = value;
    }
    if let Some(value) = parse_non_empty(&lookup, ENV_MODEL_PATH) {
        config.model_path = value;
    }
    if let Some(value) = parse_f32(&lookup, ENV_FACE_OPACITY) {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            config.face_opacity = value;
        }
    }
    config.offline_snapshot = parse_non_empty(&lookup, ENV_OFFLINE_SNAPSHOT).map(PathBuf::from);
    config.headless = lookup(ENV_HEADLESS).is_some_and(|raw| parse_bool_value(&raw) != Some(false));
    config.headless_command = parse_non_empty(&lookup, ENV_HEADLESS_COMMAND)
        .map(|endpoint| {
            if endpoint.starts_with('/') {
                endpoint
            } else {
                format!("/{endpoint}")
            }
        });
    config
}

fn parse_non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|raw| raw.trim().parse::<u64>().ok())
}

fn parse_f32<F>(lookup: &F, key: &str) -> Option<f32>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|raw| raw.trim().parse::<f32>().ok())
}

fn parse_bool_value(raw: &str) -> Option<bool> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
