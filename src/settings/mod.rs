//! Runtime game settings
//!
//! Defaults come from the process configuration, overrides from the
//! `settings` table. Values are read on every use so a refresh takes effect
//! from the next phase on.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GameDefaults;

/// Known setting keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingKey {
    TimeoutWaitForPlayers,
    TimeoutWaitForAction,
    TimeoutGameEnd,
    ThresholdIdleTurnsForEndingGame,
    TargetPositionInGameinfo,
    EnableFullMapScan,
    DistanceRobotSightOnMove,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::TimeoutWaitForPlayers,
        SettingKey::TimeoutWaitForAction,
        SettingKey::TimeoutGameEnd,
        SettingKey::ThresholdIdleTurnsForEndingGame,
        SettingKey::TargetPositionInGameinfo,
        SettingKey::EnableFullMapScan,
        SettingKey::DistanceRobotSightOnMove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::TimeoutWaitForPlayers => "TIMEOUT_WAIT_FOR_PLAYERS",
            SettingKey::TimeoutWaitForAction => "TIMEOUT_WAIT_FOR_ACTION",
            SettingKey::TimeoutGameEnd => "TIMEOUT_GAME_END",
            SettingKey::ThresholdIdleTurnsForEndingGame => "THRESHOLD_IDLE_TURNS_FOR_ENDING_GAME",
            SettingKey::TargetPositionInGameinfo => "TARGET_POSITION_IN_GAMEINFO",
            SettingKey::EnableFullMapScan => "ENABLE_FULL_MAP_SCAN",
            SettingKey::DistanceRobotSightOnMove => "DISTANCE_ROBOT_SIGHT_ON_MOVE",
        }
    }

    fn kind(self) -> SettingKind {
        match self {
            SettingKey::TimeoutWaitForPlayers
            | SettingKey::TimeoutWaitForAction
            | SettingKey::TimeoutGameEnd => SettingKind::Duration,
            SettingKey::ThresholdIdleTurnsForEndingGame | SettingKey::DistanceRobotSightOnMove => {
                SettingKind::Int
            }
            SettingKey::TargetPositionInGameinfo | SettingKey::EnableFullMapScan => {
                SettingKind::Boolean
            }
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKind {
    Duration,
    Int,
    Boolean,
}

/// A typed setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    Duration(Duration),
    Int(i64),
    Boolean(bool),
}

impl SettingValue {
    /// Parse the stored string form. Durations are milliseconds.
    fn parse(kind: SettingKind, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match kind {
            SettingKind::Duration => raw
                .parse::<u64>()
                .ok()
                .map(|ms| SettingValue::Duration(Duration::from_millis(ms))),
            SettingKind::Int => raw.parse::<i64>().ok().map(SettingValue::Int),
            SettingKind::Boolean => raw.parse::<bool>().ok().map(SettingValue::Boolean),
        }
    }
}

/// Settings errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown setting key: {0}")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for setting {key}")]
    InvalidValue { key: SettingKey, value: String },
}

/// Current values of all game settings
pub struct SettingsStore {
    values: RwLock<HashMap<SettingKey, SettingValue>>,
}

impl SettingsStore {
    pub fn new(defaults: &GameDefaults) -> Self {
        let values = HashMap::from([
            (
                SettingKey::TimeoutWaitForPlayers,
                SettingValue::Duration(defaults.timeout_wait_for_players),
            ),
            (
                SettingKey::TimeoutWaitForAction,
                SettingValue::Duration(defaults.timeout_wait_for_action),
            ),
            (
                SettingKey::TimeoutGameEnd,
                SettingValue::Duration(defaults.timeout_game_end),
            ),
            (
                SettingKey::ThresholdIdleTurnsForEndingGame,
                SettingValue::Int(i64::from(defaults.threshold_idle_turns)),
            ),
            (
                SettingKey::TargetPositionInGameinfo,
                SettingValue::Boolean(defaults.target_position_in_gameinfo),
            ),
            (
                SettingKey::EnableFullMapScan,
                SettingValue::Boolean(defaults.enable_full_map_scan),
            ),
            (
                SettingKey::DistanceRobotSightOnMove,
                SettingValue::Int(i64::from(defaults.robot_sight_on_move)),
            ),
        ]);

        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: SettingKey) -> Option<SettingValue> {
        self.values.read().get(&key).copied()
    }

    /// Duration setting, zero if the key holds something else
    pub fn duration(&self, key: SettingKey) -> Duration {
        match self.get(key) {
            Some(SettingValue::Duration(value)) => value,
            _ => Duration::ZERO,
        }
    }

    pub fn int(&self, key: SettingKey) -> i64 {
        match self.get(key) {
            Some(SettingValue::Int(value)) => value,
            _ => 0,
        }
    }

    pub fn boolean(&self, key: SettingKey) -> bool {
        matches!(self.get(key), Some(SettingValue::Boolean(true)))
    }

    /// Parse and store a raw key/value pair
    pub fn apply(&self, key: &str, value: &str) -> Result<SettingKey, SettingsError> {
        let key: SettingKey = key.parse()?;
        let parsed = SettingValue::parse(key.kind(), value).ok_or_else(|| {
            SettingsError::InvalidValue {
                key,
                value: value.to_string(),
            }
        })?;

        self.values.write().insert(key, parsed);
        Ok(key)
    }

    /// Apply a batch of overrides. Bad entries are skipped and logged.
    pub fn apply_all<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;
        for (key, value) in entries {
            match self.apply(&key, &value) {
                Ok(_) => applied += 1,
                Err(e) => warn!(error = %e, "Ignoring setting"),
            }
        }
        info!(applied, "Settings refreshed");
        applied
    }
}
