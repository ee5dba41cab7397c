//! read pipeline configuration from a file, the environment or a secret

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;

use crate::errors::Error;
use crate::retry::{JitterStrategy, MAX_RETRY_BUDGET, RetryPlan};

pub enum ConfigLocation {
    File(String),
    Env,
    Secret,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt, so a request is sent at most
    /// `max_retries + 1` times. The default of 3 means 4 attempts in total.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_upgrade_url")]
    pub upgrade_url: String,
    #[serde(default = "default_csrf_cookie_name")]
    pub csrf_cookie_name: String,
    #[serde(default = "default_csrf_header_name")]
    pub csrf_header_name: String,
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u8 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1_000
}

fn default_jitter() -> String {
    "none".to_string()
}

fn default_refresh_path() -> String {
    "/api/auth/refresh".to_string()
}

fn default_login_url() -> String {
    "/login".to_string()
}

fn default_upgrade_url() -> String {
    "/billing/upgrade".to_string()
}

fn default_csrf_cookie_name() -> String {
    "csrftoken".to_string()
}

fn default_csrf_header_name() -> String {
    "X-CSRFToken".to_string()
}

fn default_session_cookie_name() -> String {
    "session".to_string()
}

fn default_user_agent() -> String {
    format!("resilient-request/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    /// Configuration with every default applied, pointed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            jitter: default_jitter(),
            refresh_path: default_refresh_path(),
            login_url: default_login_url(),
            upgrade_url: default_upgrade_url(),
            csrf_cookie_name: default_csrf_cookie_name(),
            csrf_header_name: default_csrf_header_name(),
            session_cookie_name: default_session_cookie_name(),
            session_token: None,
            user_agent: default_user_agent(),
        }
    }

    pub async fn load(loc: ConfigLocation) -> Result<Self, Error> {
        let config = match loc {
            ConfigLocation::File(path) => Self::from_file(path)?,
            ConfigLocation::Env => Self::from_env()?,
            ConfigLocation::Secret => Self::from_secret().await?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("PIPELINE_BASE_URL")
            .map_err(|_| Error::Config("Missing PIPELINE_BASE_URL env var".to_string()))?;
        let mut config = Config::new(base_url);
        if let Some(secs) = env_parsed::<u64>("PIPELINE_TIMEOUT_SECS")? {
            config.timeout_secs = secs;
        }
        if let Some(retries) = env_parsed::<u8>("PIPELINE_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(unit) = env_parsed::<u64>("PIPELINE_BACKOFF_UNIT_MS")? {
            config.backoff_unit_ms = unit;
        }
        if let Ok(jitter) = std::env::var("PIPELINE_JITTER") {
            config.jitter = jitter;
        }
        if let Ok(path) = std::env::var("PIPELINE_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Ok(url) = std::env::var("PIPELINE_LOGIN_URL") {
            config.login_url = url;
        }
        if let Ok(url) = std::env::var("PIPELINE_UPGRADE_URL") {
            config.upgrade_url = url;
        }
        if let Ok(name) = std::env::var("PIPELINE_CSRF_COOKIE") {
            config.csrf_cookie_name = name;
        }
        if let Ok(name) = std::env::var("PIPELINE_CSRF_HEADER") {
            config.csrf_header_name = name;
        }
        if let Ok(name) = std::env::var("PIPELINE_SESSION_COOKIE") {
            config.session_cookie_name = name;
        }
        config.session_token = std::env::var("PIPELINE_SESSION_TOKEN").ok();
        Ok(config)
    }

    async fn from_secret() -> Result<Self, Error> {
        let secret_arn = std::env::var("PIPELINE_CONFIG_SECRET_ARN")
            .map_err(|_| Error::Config("Missing PIPELINE_CONFIG_SECRET_ARN env var".to_string()))?;
        let client = aws_sdk_secretsmanager::Client::new(
            &aws_config::load_defaults(BehaviorVersion::latest()).await,
        );
        let resp = client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Config(format!("Failed to get secret: {}", e)))?;
        let secret = match resp.secret_string() {
            Some(s) => Ok(s),
            None => Err(Error::Config(
                "Failed to get secret string, returned None".to_string(),
            )),
        }?;
        let config: Config = serde_json::from_str(secret)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be > 0".into()));
        }
        if self.max_retries > MAX_RETRY_BUDGET {
            return Err(Error::Config(format!(
                "max_retries must be <= {}, got {}",
                MAX_RETRY_BUDGET, self.max_retries
            )));
        }
        if self.csrf_header_name.trim().is_empty() {
            return Err(Error::Config("csrf_header_name must not be empty".into()));
        }
        self.jitter.parse::<JitterStrategy>()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_plan(&self) -> Result<RetryPlan, Error> {
        Ok(RetryPlan::new(
            self.max_retries,
            Duration::from_millis(self.backoff_unit_ms),
            2.0,
            self.jitter.parse()?,
        ))
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, Error> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {}: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
