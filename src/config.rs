//! Runtime configuration for the auction service.
//!
//! All behaviour is tuned through a hierarchical, multi-source configuration
//! backed by the `config` crate. Priority (lowest → highest):
//! 1. Compile-time defaults (serde `default` attributes).
//! 2. An optional TOML/YAML/JSON file passed at start-up.
//! 3. Environment variables with the `AUCTION` prefix:
//!
//!     AUCTION__SWEEP__INTERVAL=30s   # double underscore = path separator
//!
//! The bid policy deliberately has **no default**: deployments disagree on
//! whether a bidder may raise their own standing bid and on the cooldown
//! length, so `policy.mode` must be set explicitly or `init` fails.
//!
//! The frozen [`ServiceConfig`] is published through [`get()`] after
//! [`init`] has run once.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::policy::BidPolicy;
use crate::settlement::SettlerConfig;

static SERVICE_CONFIG: OnceCell<Arc<ServiceConfig>> = OnceCell::new();

pub type ConfigHandle = Arc<ServiceConfig>;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(90);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub sweep: SweepSection,
    /// Required: see the module docs.
    pub policy: PolicySection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub events: EventsSection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepSection {
    /// How often the settlement sweep runs, as a humantime string.
    #[serde(default = "defaults::sweep_interval")]
    pub interval: String,
    /// Drop non-winning bids once a lot settles.
    #[serde(default)]
    pub purge_on_settle: bool,
}

/// The named bid-policy presets. Picking one is a deployment decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PolicySection {
    /// Price, liveness and balance checks only.
    Open,
    /// Additionally forbids raising one's own standing bid.
    Strict,
    /// `strict` plus one accepted bid per lot per cooldown window.
    RateLimited {
        #[serde(default = "defaults::cooldown")]
        cooldown: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "defaults::max_commit_retries")]
    pub max_commit_retries: u32,
    /// Bound of the per-bidder bidding-history ring.
    #[serde(default = "defaults::history_capacity")]
    pub history_capacity: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsSection {
    /// Broadcast ring-buffer size for the notification channel.
    #[serde(default = "defaults::event_capacity")]
    pub capacity: usize,
}

mod defaults {
    pub(super) fn sweep_interval() -> String {
        "60s".into()
    }
    pub(super) fn cooldown() -> String {
        "90s".into()
    }
    pub(super) fn max_commit_retries() -> u32 {
        3
    }
    pub(super) fn history_capacity() -> usize {
        10
    }
    pub(super) fn event_capacity() -> usize {
        1024
    }
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            interval: defaults::sweep_interval(),
            purge_on_settle: false,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_commit_retries: defaults::max_commit_retries(),
            history_capacity: defaults::history_capacity(),
        }
    }
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: defaults::event_capacity(),
        }
    }
}

/// Initialise the configuration singleton.
///
/// `config_path` is an optional explicit configuration file; with `None`,
/// `auction.{toml,yaml,json}` in the working directory are tried. Fails on
/// IO problems, malformed values, a missing `policy.mode`, or being called
/// twice.
pub fn init(config_path: Option<impl AsRef<Path>>) -> Result<ConfigHandle, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path.as_ref()).required(true));
    } else {
        for ext in ["toml", "yaml", "json"] {
            let file_name = format!("auction.{ext}");
            if Path::new(&file_name).exists() {
                builder = builder.add_source(File::with_name(&file_name).required(false));
                break;
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("AUCTION")
            .separator("__")
            .try_parsing(true),
    );

    let config: ServiceConfig = builder.build()?.try_deserialize()?;
    config
        .validate()
        .map_err(|e| ConfigError::Message(e.to_string()))?;

    let arc = Arc::new(config);
    SERVICE_CONFIG
        .set(arc.clone())
        .map_err(|_| ConfigError::Message("configuration already initialised".into()))?;
    Ok(arc)
}

/// The frozen [`ServiceConfig`]. Panics if [`init`] has not run.
pub fn get() -> &'static ServiceConfig {
    SERVICE_CONFIG
        .get()
        .expect("configuration accessed before initialisation")
}

impl ServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        humantime::parse_duration(&self.sweep.interval)
            .map_err(|e| anyhow::anyhow!("sweep.interval: {e}"))?;
        if let PolicySection::RateLimited { cooldown } = &self.policy {
            humantime::parse_duration(cooldown)
                .map_err(|e| anyhow::anyhow!("policy.cooldown: {e}"))?;
        }
        if self.engine.history_capacity == 0 {
            anyhow::bail!("engine.history_capacity must be at least 1");
        }
        if self.events.capacity == 0 {
            anyhow::bail!("events.capacity must be at least 1");
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        humantime::parse_duration(&self.sweep.interval).unwrap_or(DEFAULT_SWEEP_INTERVAL)
    }

    pub fn bid_policy(&self) -> BidPolicy {
        match &self.policy {
            PolicySection::Open => BidPolicy::open(),
            PolicySection::Strict => BidPolicy::strict(),
            PolicySection::RateLimited { cooldown } => BidPolicy::rate_limited(
                humantime::parse_duration(cooldown).unwrap_or(DEFAULT_COOLDOWN),
            ),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_commit_retries: self.engine.max_commit_retries,
            history_capacity: self.engine.history_capacity,
        }
    }

    pub fn settler_config(&self) -> SettlerConfig {
        SettlerConfig {
            purge_on_settle: self.sweep.purge_on_settle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<ServiceConfig, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn policy_mode_is_mandatory() {
        let err = from_toml("[sweep]\ninterval = \"60s\"\n").unwrap_err();
        assert!(err.to_string().contains("policy"));
    }

    #[test]
    fn rate_limited_policy_parses_with_default_cooldown() {
        let cfg = from_toml("[policy]\nmode = \"rate_limited\"\n").unwrap();
        cfg.validate().unwrap();
        assert!(matches!(
            cfg.policy,
            PolicySection::RateLimited { ref cooldown } if cooldown == "90s"
        ));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn bad_durations_fail_validation() {
        let cfg = from_toml("[policy]\nmode = \"open\"\n[sweep]\ninterval = \"soon\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}
