use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "parley.json",
    "config/parley.toml",
    "config/parley.json",
    "../parley.toml",
    "../config/parley.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub typing: TypingConfig,
    pub delivery: DeliveryConfig,
    pub events: EventsConfig,
    pub loopback: LoopbackConfig,
}

impl AppConfig {
    /// Reject values the chat core cannot run with.
    ///
    /// ```
    /// use parley_config::AppConfig;
    ///
    /// let mut config = AppConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.events.broadcast_capacity = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.session.user_id.trim().is_empty(),
            "session.user_id cannot be empty"
        );
        ensure!(
            !self.session.display_name.trim().is_empty(),
            "session.display_name cannot be empty"
        );
        ensure!(self.typing.expiry_ms > 0, "typing.expiry_ms must be positive");
        ensure!(
            self.delivery.max_content_length > 0,
            "delivery.max_content_length must be positive"
        );
        ensure!(
            self.events.broadcast_capacity > 0,
            "events.broadcast_capacity must be positive"
        );
        Ok(())
    }
}

/// The local user the session starts as
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: "me".to_string(),
            display_name: "Me".to_string(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingConfig {
    /// Default throttle window; 0 disables throttling
    pub throttle_ms: u64,
    /// Inactivity timeout after which a typing flag clears
    pub expiry_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 2_000,
            expiry_ms: 2_000,
        }
    }
}

impl TypingConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub max_content_length: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_content_length: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    pub broadcast_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
        }
    }
}

/// Settings for the in-process loopback transport.
///
/// ```
/// use parley_config::LoopbackConfig;
///
/// let loopback = LoopbackConfig::default();
/// assert_eq!(loopback.ack_delay_ms, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopbackConfig {
    pub ack_delay_ms: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self { ack_delay_ms: 50 }
    }
}

impl LoopbackConfig {
    pub fn ack_delay(&self) -> Duration {
        Duration::from_millis(self.ack_delay_ms)
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.session.user_id.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("session.user_id", defaults.session.user_id.clone())
        .context("invalid default for session.user_id")?
        .set_default("session.display_name", defaults.session.display_name.clone())
        .context("invalid default for session.display_name")?
        .set_default("typing.throttle_ms", clamp_i64(defaults.typing.throttle_ms))
        .context("invalid default for typing.throttle_ms")?
        .set_default("typing.expiry_ms", clamp_i64(defaults.typing.expiry_ms))
        .context("invalid default for typing.expiry_ms")?
        .set_default(
            "delivery.max_content_length",
            clamp_i64(defaults.delivery.max_content_length as u64),
        )
        .context("invalid default for delivery.max_content_length")?
        .set_default(
            "events.broadcast_capacity",
            clamp_i64(defaults.events.broadcast_capacity as u64),
        )
        .context("invalid default for events.broadcast_capacity")?
        .set_default("loopback.ack_delay_ms", clamp_i64(defaults.loopback.ack_delay_ms))
        .context("invalid default for loopback.ack_delay_ms")?;

    let environment_overrides = config::Environment::with_prefix("PARLEY").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;
    config.validate().context("invalid configuration")?;

    debug!(?config, "loaded chat configuration");
    Ok(config)
}
