//! Rule violations raised by the game core

use crate::store::StoreError;

/// A rejected game operation
///
/// Every variant is a rejection of a single request. None of them mutate
/// state and none are retried inside the core.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Operation attempted in the wrong phase
    #[error("{0}")]
    GameState(String),

    #[error("{0}")]
    PositionOutOfMap(String),

    #[error("{0}")]
    PositionNotAllowed(String),

    #[error("{0}")]
    InsufficientFuel(String),

    #[error("{0}")]
    WrongTileType(String),

    #[error("{0}")]
    ActionDeniedByConfig(String),

    /// Used by the transport when the caller has no active robot
    #[error("{0}")]
    RobotNotActive(String),

    /// A collaborator (map selection, robot lookup) failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GameError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::GameState(_) => "game_state",
            GameError::PositionOutOfMap(_) => "position_out_of_map",
            GameError::PositionNotAllowed(_) => "position_not_allowed",
            GameError::InsufficientFuel(_) => "insufficient_fuel",
            GameError::WrongTileType(_) => "wrong_tile_type",
            GameError::ActionDeniedByConfig(_) => "action_denied_by_config",
            GameError::RobotNotActive(_) => "robot_not_active",
            GameError::Store(_) => "store",
        }
    }
}
