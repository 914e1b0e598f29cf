//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Humans per game
    pub players_per_game: usize,
    /// Robots added to every game
    pub robots_per_game: usize,
    pub matchmaker_poll: Duration,
    pub respawn_delay: Duration,
    pub robot_move_delay: Duration,

    /// Max client packets per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let players_per_game: usize = parse_or(&lookup, "PLAYERS_PER_GAME", 2)?;
        if players_per_game == 0 {
            return Err(ConfigError::Invalid("PLAYERS_PER_GAME"));
        }

        let input_rate_limit: u32 = parse_or(&lookup, "INPUT_RATE_LIMIT", 30)?;
        if input_rate_limit == 0 {
            return Err(ConfigError::Invalid("INPUT_RATE_LIMIT"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            players_per_game,
            robots_per_game: parse_or(&lookup, "ROBOTS_PER_GAME", 2)?,
            matchmaker_poll: Duration::from_millis(parse_or(&lookup, "MATCHMAKER_POLL_MS", 2000)?),
            respawn_delay: Duration::from_millis(parse_or(&lookup, "RESPAWN_DELAY_MS", 10_000)?),
            robot_move_delay: Duration::from_millis(parse_or(
                &lookup,
                "ROBOT_MOVE_DELAY_MS",
                2000,
            )?),

            input_rate_limit,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
