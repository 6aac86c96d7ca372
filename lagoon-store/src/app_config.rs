use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent means the in-memory store; set to run against Postgres.
    pub database: Option<DatabaseConfig>,
    pub processor: ProcessorConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessorConfig {
    /// Base URL of the card-payment processor. Absent means the in-process
    /// mock gateway (local development only).
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Commission applied when an occurrence carries no operator override.
    #[serde(default = "default_commission_percent")]
    pub default_commission_percent: f64,
    /// Operator decision window before a pending booking is auto-declined.
    #[serde(default = "default_confirmation_deadline_hours")]
    pub confirmation_deadline_hours: u64,
    /// How long before the occurrence start the deferred capture fires.
    #[serde(default = "default_capture_lead_hours")]
    pub capture_lead_hours: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_commission_percent() -> f64 {
    11.0
}

fn default_confirmation_deadline_hours() -> u64 {
    24
}

fn default_capture_lead_hours() -> u64 {
    48
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            default_commission_percent: default_commission_percent(),
            confirmation_deadline_hours: default_confirmation_deadline_hours(),
            capture_lead_hours: default_capture_lead_hours(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `LAGOON__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("LAGOON").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
