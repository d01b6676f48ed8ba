use anyhow::{Context, Result};
use std::time::Duration;

use crate::types::UserId;

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    /// Advisory only. Every admin endpoint re-checks on the backend.
    pub admin_ids: Vec<UserId>,

    pub timer_tick_ms: u64,
    pub expiry_refresh_delay_ms: u64,
    pub splash_delay_ms: u64,
    pub sold_display_limit: usize,
    pub request_timeout_secs: u64,

    pub invoice_currency: String,
    pub minor_units_per_star: u64,

    pub tg_user_id: Option<UserId>,
    pub tg_username: Option<String>,
    pub tg_first_name: Option<String>,
    pub tg_init_data: Option<String>,
    pub bot_token: Option<String>,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            admin_ids: Vec::new(),
            timer_tick_ms: 1000,
            expiry_refresh_delay_ms: 2000,
            splash_delay_ms: 2000,
            sold_display_limit: 50,
            request_timeout_secs: 10,
            invoice_currency: "XTR".to_string(),
            minor_units_per_star: 100,
            tg_user_id: None,
            tg_username: None,
            tg_first_name: None,
            tg_init_data: None,
            bot_token: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            backend_url: env_or("BACKEND_URL", &defaults.backend_url),
            admin_ids: parse_id_list(&env_or("ADMIN_IDS", ""))?,

            timer_tick_ms: parsed_env_or("TIMER_TICK_MS", defaults.timer_tick_ms)?,
            expiry_refresh_delay_ms: parsed_env_or(
                "EXPIRY_REFRESH_DELAY_MS",
                defaults.expiry_refresh_delay_ms,
            )?,
            splash_delay_ms: parsed_env_or("SPLASH_DELAY_MS", defaults.splash_delay_ms)?,
            sold_display_limit: parsed_env_or("SOLD_DISPLAY_LIMIT", defaults.sold_display_limit)?,
            request_timeout_secs: parsed_env_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,

            invoice_currency: env_or("INVOICE_CURRENCY", &defaults.invoice_currency),
            minor_units_per_star: parsed_env_or(
                "MINOR_UNITS_PER_STAR",
                defaults.minor_units_per_star,
            )?,

            tg_user_id: opt_env("TG_USER_ID")
                .map(|raw| raw.parse().with_context(|| format!("invalid TG_USER_ID: {raw}")))
                .transpose()?,
            tg_username: opt_env("TG_USERNAME"),
            tg_first_name: opt_env("TG_FIRST_NAME"),
            tg_init_data: opt_env("TG_INIT_DATA"),
            bot_token: opt_env("TELEGRAM_BOT_TOKEN"),

            log_level: env_or("LOG_LEVEL", &defaults.log_level),
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms.max(1))
    }

    pub fn expiry_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.expiry_refresh_delay_ms)
    }

    pub fn splash_delay(&self) -> Duration {
        Duration::from_millis(self.splash_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn opt_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match opt_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("invalid admin id: {s}")))
        .collect()
}
