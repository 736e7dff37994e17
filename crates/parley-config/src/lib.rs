//! Layered TOML and environment configuration for Parley.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use parley_api::PollConfig;
use parley_types::{ConfigError, GenerationConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The default Gemini API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// The default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// The default cap on an upload request body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// The default whole-request timeout for remote model calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default idle time after which a session is discarded, in seconds.
pub const DEFAULT_SESSION_MAX_IDLE_SECS: u64 = 24 * 60 * 60;

/// Default TCP connect timeout for remote API calls, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Minimum length of the cookie signing secret.
pub const MIN_SECRET_KEY_BYTES: usize = 32;

/// Where session state is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    File,
}

impl std::str::FromStr for SessionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(ConfigError::InvalidValue {
                key: "session.backend".into(),
                message: format!("expected \"memory\" or \"file\", got \"{other}\""),
            }),
        }
    }
}

/// Resolved configuration for a Parley server.
#[derive(Clone)]
pub struct ParleyConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub generation: GenerationConfig,
    pub bind: SocketAddr,
    pub secret_key: String,
    pub max_upload_bytes: usize,
    pub session_backend: SessionBackend,
    pub session_max_idle: Duration,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub poll: PollConfig,
}

impl fmt::Debug for ParleyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParleyConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("generation", &self.generation)
            .field("bind", &self.bind)
            .field("secret_key", &"<redacted>")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("session_backend", &self.session_backend)
            .field("session_max_idle", &self.session_max_idle)
            .field("data_dir", &self.data_dir)
            .field("upload_dir", &self.upload_dir)
            .field("poll", &self.poll)
            .finish()
    }
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: Option<String>,
    pub secret_key: Option<String>,
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    pub backend: Option<SessionBackend>,
    pub data_dir: Option<PathBuf>,
    pub max_idle_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    pub dir: Option<PathBuf>,
    pub poll_max_attempts: Option<u32>,
    pub poll_initial_delay_ms: Option<u64>,
    pub poll_max_delay_ms: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub model: Option<String>,
    pub session_backend: Option<SessionBackend>,
}

impl ParleyConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (`--config`, else ~/.parley/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let path = overrides
            .config_path
            .clone()
            .unwrap_or_else(|| config_dir.join("config.toml"));
        let settings = load_settings_file(&path)?;
        Self::resolve(settings, overrides, config_dir, |key| std::env::var(key).ok())
    }

    /// Resolve a config from parsed settings and an environment lookup.
    pub fn resolve(
        settings: SettingsFile,
        overrides: CliOverrides,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Resolve API key: env > config file
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("GOOGLE_API_KEY"))
            .or(settings.api.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set GEMINI_API_KEY or add [api] api_key to config.toml)".into(),
            })?;

        // Resolve cookie signing secret: env > config file
        let secret_key = env("PARLEY_SECRET_KEY")
            .or_else(|| env("SECRET_KEY"))
            .or(settings.server.secret_key)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "secret_key (set PARLEY_SECRET_KEY or add [server] secret_key to config.toml)"
                    .into(),
            })?;
        if secret_key.len() < MIN_SECRET_KEY_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "secret_key".into(),
                message: format!("must be at least {MIN_SECRET_KEY_BYTES} bytes"),
            });
        }

        let model = overrides
            .model
            .or_else(|| env("PARLEY_MODEL"))
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_base_url = env("PARLEY_API_BASE_URL")
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let connect_timeout = positive_secs(
            "api.connect_timeout_secs",
            settings.api.connect_timeout_secs,
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let request_timeout = positive_secs(
            "api.request_timeout_secs",
            settings.api.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            temperature: settings.generation.temperature.unwrap_or(defaults.temperature),
            top_p: settings.generation.top_p.unwrap_or(defaults.top_p),
            max_output_tokens: settings
                .generation
                .max_output_tokens
                .unwrap_or(defaults.max_output_tokens),
        };
        validate_generation(&generation)?;

        let bind_str = overrides
            .bind
            .or_else(|| env("PARLEY_BIND"))
            .or(settings.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "server.bind".into(),
                message: format!("{bind_str}: {e}"),
            })?;

        let max_upload_bytes = settings
            .server
            .max_upload_bytes
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.max_upload_bytes".into(),
                message: "must be greater than zero".into(),
            });
        }

        let session_backend = match overrides.session_backend {
            Some(backend) => backend,
            None => match env("PARLEY_SESSION_BACKEND") {
                Some(value) => value.parse()?,
                None => settings.session.backend.unwrap_or_default(),
            },
        };

        let session_max_idle = positive_secs(
            "session.max_idle_secs",
            settings.session.max_idle_secs,
            DEFAULT_SESSION_MAX_IDLE_SECS,
        )?;

        let data_dir = settings.session.data_dir.unwrap_or_else(|| config_dir.clone());
        let upload_dir = settings
            .upload
            .dir
            .unwrap_or_else(|| config_dir.join("uploads"));

        let poll_defaults = PollConfig::default();
        let poll = PollConfig {
            max_attempts: settings
                .upload
                .poll_max_attempts
                .unwrap_or(poll_defaults.max_attempts),
            initial_delay_ms: settings
                .upload
                .poll_initial_delay_ms
                .unwrap_or(poll_defaults.initial_delay_ms),
            max_delay_ms: settings
                .upload
                .poll_max_delay_ms
                .unwrap_or(poll_defaults.max_delay_ms),
            backoff_factor: poll_defaults.backoff_factor,
        };
        if poll.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "upload.poll_max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(ParleyConfig {
            api_key,
            model,
            api_base_url,
            connect_timeout,
            request_timeout,
            generation,
            bind,
            secret_key,
            max_upload_bytes,
            session_backend,
            session_max_idle,
            data_dir,
            upload_dir,
            poll,
        })
    }
}

fn positive_secs(key: &str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn validate_generation(config: &GenerationConfig) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::InvalidValue {
            key: "generation.temperature".into(),
            message: format!("{} is outside 0.0..=2.0", config.temperature),
        });
    }
    if !(0.0..=1.0).contains(&config.top_p) {
        return Err(ConfigError::InvalidValue {
            key: "generation.top_p".into(),
            message: format!("{} is outside 0.0..=1.0", config.top_p),
        });
    }
    if config.max_output_tokens == 0 {
        return Err(ConfigError::InvalidValue {
            key: "generation.max_output_tokens".into(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(())
}

/// Get the Parley config directory path (~/.parley/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Load and parse a TOML settings file. A missing file yields defaults.
fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        Err(e) => {
            tracing::debug!("No config file at {}: {}", path.display(), e);
            Ok(SettingsFile::default())
        }
    }
}
