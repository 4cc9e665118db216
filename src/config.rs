// src/config.rs
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_cache_ttl")]
    pub curriculum_cache_ttl_secs: u64,
    pub notification_webhook_url: Option<String>,
    #[serde(default = "default_queue_size")]
    pub notification_queue_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_queue_size() -> usize {
    256
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Settings for tests that never touch a real database.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: jwt_secret.to_string(),
            bind_addr: default_bind_addr(),
            database_max_connections: default_max_connections(),
            curriculum_cache_ttl_secs: default_cache_ttl(),
            notification_webhook_url: None,
            notification_queue_size: default_queue_size(),
        }
    }
}
