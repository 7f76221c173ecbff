use orbio_core::{OrbioError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity written into the lease key. Generated when absent, so two
    /// coordinators sharing one config file stay distinguishable.
    #[serde(default)]
    pub master_id: Option<String>,

    #[serde(default)]
    pub redis: RedisConfig,

    /// Storage node URLs. Order matters: liveness and round-robin
    /// placement follow it.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("ORBIO"))
            .build()
            .map_err(|e| OrbioError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| OrbioError::Config(e.to_string()))?;

        if config.nodes.is_empty() {
            return Err(OrbioError::Config(
                "at least one storage node url must be configured".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn master_id(&self) -> String {
        self.master_id
            .clone()
            .unwrap_or_else(|| format!("master-{}", ulid::Ulid::new()))
    }
}
