use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default TOML file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "promql2influxql.toml";

/// Environment variable prefix, nested keys are separated by `__`
pub const ENV_PREFIX: &str = "PROMQL2INFLUXQL__";

pub const DEFAULT_QUERY_MAX_SAMPLES: usize = 50_000_000;
pub const DEFAULT_VALUE_FIELD_KEY: &str = "value";

/// Connection settings for the InfluxDB 1.x HTTP API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InfluxDbConfig {
    /// Base URL, e.g. `http://localhost:8086`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database used when a command does not name one
    pub database: String,
    /// Transport-level timeout for a single HTTP request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:8086"),
            username: None,
            password: None,
            database: String::from("prometheus"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Query execution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Deadline for a single query execution
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Log translations and store responses at info level
    pub verbose: bool,
    /// Upper bound on the number of points one result may hold
    pub max_samples: usize,
    /// Field holding sample values when a command does not override it
    pub value_field_key: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            verbose: false,
            max_samples: DEFAULT_QUERY_MAX_SAMPLES,
            value_field_key: String::from(DEFAULT_VALUE_FIELD_KEY),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromQLConfig {
    /// Accept the `@` modifier on selectors
    pub enable_at_modifier: bool,
    /// Accept negative `offset` values on selectors
    pub enable_negative_offset: bool,
}

impl Default for PromQLConfig {
    fn default() -> Self {
        Self {
            enable_at_modifier: true,
            enable_negative_offset: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub influxdb: InfluxDbConfig,
    pub query: QueryConfig,
    pub promql: PromQLConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Same as [`Configuration::load`] with an explicit TOML file
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
