use anyhow::{Context, Result, bail};
use repo_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [endpoint]
//                    base_url = "wss://example.test"
//
//   env var:         REPOCHAT_ENDPOINT__BASE_URL=wss://example.test
//
//   (single underscore stays within field names: REPOCHAT_SESSION__CONNECT_TIMEOUT_SECS)

pub const DEVELOPMENT_ENDPOINT: &str = "ws://localhost:8000";
pub const PRODUCTION_ENDPOINT: &str = "wss://ttg-backend-734884490004.asia-south1.run.app";

const ENV_PREFIX: &str = "REPOCHAT_";

/// Named backend presets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Backend on localhost:8000
    Development,
    /// Hosted backend
    Production,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub endpoint: EndpointFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Where the backend lives (`[endpoint]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointFileConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EndpointFileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Connection timing (`[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
        }
    }
}

fn default_base_url() -> String {
    DEVELOPMENT_ENDPOINT.to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_keepalive_interval_secs() -> u64 {
    240
}

/// Build a figment that layers: defaults → profile defaults → config.toml → REPOCHAT_* env vars.
///
/// The CLI profile takes priority over a profile named in config.toml or the
/// environment.
///
/// Env vars use double-underscore for nesting into sections:
///   `REPOCHAT_PROFILE=production`  →  `profile = "production"`
///   `REPOCHAT_SESSION__KEEPALIVE_INTERVAL_SECS=60`  →  `session.keepalive_interval_secs = 60`
pub fn load_config(config_dir: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    // Pass 1: peek at profile from config.toml/env (CLI overrides both)
    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: profile defaults slot in between struct defaults and config.toml
    let profile_layer = profile_to_file_config(profile.as_ref());

    let figment = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_layer))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    match cli_profile {
        Some(p) => figment.merge(Serialized::default("profile", p)),
        None => figment,
    }
}

/// Convert a profile into a `FileConfig` carrying that profile's endpoint.
/// Everything else stays at struct defaults so explicit values from
/// config.toml / env still win.
fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    match profile {
        Some(Profile::Development) => FileConfig {
            profile: Some(Profile::Development),
            endpoint: EndpointFileConfig {
                base_url: DEVELOPMENT_ENDPOINT.to_string(),
            },
            session: Default::default(),
        },
        Some(Profile::Production) => FileConfig {
            profile: Some(Profile::Production),
            endpoint: EndpointFileConfig {
                base_url: PRODUCTION_ENDPOINT.to_string(),
            },
            session: Default::default(),
        },
        None => FileConfig::default(),
    }
}

// =============================================================================
// Runtime config (validated, handed to the session library)
// =============================================================================

/// Resolved configuration for one run of the client.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// What figment produced, kept for `repochat config`
    pub file: FileConfig,
    pub session: SessionConfig,
}

impl ChatConfig {
    pub fn load(dir: &ConfigDir, cli_profile: Option<&Profile>) -> Result<Self> {
        let file: FileConfig = load_config(dir.path(), cli_profile)
            .extract()
            .with_context(|| {
                format!(
                    "Failed to load configuration from {}",
                    dir.config_toml_path().display()
                )
            })?;
        Self::from_file(file)
    }

    pub fn from_file(file: FileConfig) -> Result<Self> {
        let base_url = file.endpoint.base_url.trim();
        if !(base_url.starts_with("ws://") || base_url.starts_with("wss://")) {
            bail!("endpoint.base_url must be a ws:// or wss:// URL, got {base_url:?}");
        }
        if file.session.connect_timeout_secs == 0 {
            bail!("session.connect_timeout_secs must be greater than zero");
        }
        if file.session.keepalive_interval_secs == 0 {
            bail!("session.keepalive_interval_secs must be greater than zero");
        }

        let session = SessionConfig {
            base_endpoint: base_url.to_string(),
            connect_timeout: Duration::from_secs(file.session.connect_timeout_secs),
            keepalive_interval: Duration::from_secs(file.session.keepalive_interval_secs),
        };
        debug!(endpoint = %session.base_endpoint, "Resolved session config");

        Ok(Self { file, session })
    }

    /// The resolved configuration rendered as config.toml.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.file).context("Failed to render configuration")
    }
}

// =============================================================================
// Directory layout (not tunable via figment, derived from --config-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ConfigDir {
    path: PathBuf,
}

impl ConfigDir {
    /// Defaults to `~/.repochat`. The directory does not need to exist.
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let path = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".repochat"),
        };
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }
}
