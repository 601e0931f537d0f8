use std::time::Duration;

use anyhow::{Context, Result};

use teachat_types::UserId;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub ws_url: String,
    pub user_id: UserId,
    pub username: String,
    pub send_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = var("TEACHAT_API_URL").unwrap_or_else(|| "http://localhost:8000/api".into());
        let ws_url = var("TEACHAT_WS_URL").unwrap_or_else(|| "ws://localhost:8000/ws".into());

        let user_id: UserId = var("TEACHAT_USER_ID")
            .context("TEACHAT_USER_ID is not set")?
            .parse()
            .context("TEACHAT_USER_ID must be an integer")?;
        let username = var("TEACHAT_USERNAME").context("TEACHAT_USERNAME is not set")?;

        let send_timeout_secs: u64 = var("TEACHAT_SEND_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".into())
            .parse()
            .context("TEACHAT_SEND_TIMEOUT_SECS must be a whole number of seconds")?;

        Ok(Self {
            api_url,
            ws_url,
            user_id,
            username,
            send_timeout: Duration::from_secs(send_timeout_secs),
        })
    }
}
