//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::{RobotId, DEFAULT_TILE_SCAN_COST};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: String,
    /// Secret for HS256 token verification
    pub jwt_secret: String,

    /// Allowed client origin for CORS
    pub client_origin: String,

    /// Fuel per scanned cell, fixed per deployment
    pub tile_scan_cost: f64,
    /// Max action submissions per user and second
    pub action_rate_limit: u32,
    /// Robots played by the in-process dummy bots, empty disables them
    pub dummy_bot_robot_ids: Vec<RobotId>,
    /// Game settings used until overrides are loaded
    pub game: GameDefaults,
}

/// Fallback values of the runtime game settings
#[derive(Clone, Debug, PartialEq)]
pub struct GameDefaults {
    pub timeout_wait_for_players: Duration,
    pub timeout_wait_for_action: Duration,
    pub timeout_game_end: Duration,
    pub threshold_idle_turns: u32,
    pub target_position_in_gameinfo: bool,
    pub enable_full_map_scan: bool,
    pub robot_sight_on_move: u32,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            timeout_wait_for_players: Duration::from_secs(30),
            timeout_wait_for_action: Duration::from_secs(5),
            timeout_game_end: Duration::from_secs(10),
            threshold_idle_turns: 3,
            target_position_in_gameinfo: false,
            enable_full_map_scan: false,
            robot_sight_on_move: 0,
        }
    }
}

impl GameDefaults {
    fn from_env() -> Result<Self, ConfigError> {
        let fallback = Self::default();
        Ok(Self {
            timeout_wait_for_players: millis_or(
                "TIMEOUT_WAIT_FOR_PLAYERS_MS",
                fallback.timeout_wait_for_players,
            )?,
            timeout_wait_for_action: millis_or(
                "TIMEOUT_WAIT_FOR_ACTION_MS",
                fallback.timeout_wait_for_action,
            )?,
            timeout_game_end: millis_or("TIMEOUT_GAME_END_MS", fallback.timeout_game_end)?,
            threshold_idle_turns: parse_or("THRESHOLD_IDLE_TURNS", fallback.threshold_idle_turns)?,
            target_position_in_gameinfo: parse_or(
                "TARGET_POSITION_IN_GAMEINFO",
                fallback.target_position_in_gameinfo,
            )?,
            enable_full_map_scan: parse_or("ENABLE_FULL_MAP_SCAN", fallback.enable_full_map_scan)?,
            robot_sight_on_move: parse_or("ROBOT_SIGHT_ON_MOVE", fallback.robot_sight_on_move)?,
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            supabase_url: env::var("SUPABASE_URL")
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .map_err(|_| ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,

            client_origin: env::var("CLIENT_ORIGIN")
                .map_err(|_| ConfigError::Missing("CLIENT_ORIGIN"))?,

            tile_scan_cost: parse_or("TILE_SCAN_COST", DEFAULT_TILE_SCAN_COST)?,
            action_rate_limit: parse_or("ACTION_RATE_LIMIT", 5)?,
            dummy_bot_robot_ids: parse_list("DUMMY_BOT_ROBOT_IDS")?,
            game: GameDefaults::from_env()?,
        })
    }
}

/// Optional variable, parsed when present
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Optional comma separated list, empty when unset
fn parse_list<T: FromStr>(name: &'static str) -> Result<Vec<T>, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.parse().map_err(|_| ConfigError::Invalid(name)))
        .collect()
}

fn millis_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let default_ms = default.as_millis() as u64;
    parse_or(name, default_ms).map(Duration::from_millis)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_skips_blanks_and_rejects_garbage() {
        env::set_var("ROBORUSH_TEST_IDS_OK", " 3, ,7,");
        env::set_var("ROBORUSH_TEST_IDS_BAD", "3,x");

        let ids: Vec<RobotId> = parse_list("ROBORUSH_TEST_IDS_OK").unwrap();
        assert_eq!(ids, vec![3, 7]);
        assert!(matches!(
            parse_list::<RobotId>("ROBORUSH_TEST_IDS_BAD"),
            Err(ConfigError::Invalid("ROBORUSH_TEST_IDS_BAD"))
        ));
        assert!(parse_list::<RobotId>("ROBORUSH_TEST_IDS_UNSET").unwrap().is_empty());
    }
}
