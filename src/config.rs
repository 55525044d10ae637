use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// `None` runs the service on the in-memory store with the demo catalogue.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub public_rps: u32,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            database_max_connections: get_env_parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 50)?,
        })
    }
}

/// Client-side proctoring knobs used by the session driver and integrity monitor.
#[derive(Debug, Clone)]
pub struct ProctoringConfig {
    pub tick_interval: Duration,
    pub fullscreen_check_interval: Duration,
    pub face_poll_interval: Duration,
    pub max_face_strikes: u32,
}

impl Default for ProctoringConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            fullscreen_check_interval: Duration::from_secs(8),
            face_poll_interval: Duration::from_secs(3),
            max_face_strikes: 3,
        }
    }
}

impl ProctoringConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let max_face_strikes: u32 =
            get_env_parse_or("PROCTOR_MAX_FACE_STRIKES", defaults.max_face_strikes)?;
        if max_face_strikes == 0 {
            return Err(Error::Config(
                "PROCTOR_MAX_FACE_STRIKES must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            tick_interval: defaults.tick_interval,
            fullscreen_check_interval: get_env_secs_or(
                "PROCTOR_FULLSCREEN_CHECK_SECS",
                defaults.fullscreen_check_interval,
            )?,
            face_poll_interval: get_env_secs_or(
                "PROCTOR_FACE_POLL_SECS",
                defaults.face_poll_interval,
            )?,
            max_face_strikes,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Interval knobs feed `tokio::time::interval`, which needs a non-zero period.
fn get_env_secs_or(name: &str, default: Duration) -> Result<Duration> {
    let secs: u64 = get_env_parse_or(name, default.as_secs())?;
    if secs == 0 {
        return Err(Error::Config(format!("{} must be at least 1", name)));
    }
    Ok(Duration::from_secs(secs))
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
