use mensa_core::policy::ConfirmPolicy;
use mensa_provider::ProviderSettings;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderSettings,
    pub market: MarketRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketRules {
    /// How long a claim may stay pending before the sweep expires it.
    pub pending_timeout_minutes: u64,
    pub sweep_interval_minutes: u64,
    pub sync_interval_minutes: u64,
    #[serde(default)]
    pub confirm_policy: ConfirmPolicy,
    #[serde(default = "default_grace")]
    pub shutdown_grace_seconds: u64,
}

fn default_grace() -> u64 {
    10
}

impl Config {
    /// Reads configuration once at startup; a missing or unparseable value
    /// is fatal before any loop starts. Layering: config/default, an
    /// optional RUN_MODE file, an optional local file, then MENSA__
    /// environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("MENSA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
