//! WebSocket protocol message definitions
//! These are the wire types for the push channel

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{ActiveRobot, GameState, Position, PublicRobot, RobotId, Tile};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages pushed from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { user_id: Uuid, server_time: u64 },

    /// Game phase changed
    GameState { state: GameState },

    /// Turn counter advanced or was reset
    Turn { turn: u32 },

    /// Public robot view, sent to everyone
    RobotUpdate { robot: PublicRobot },

    /// Full robot state, only sent to its owner
    RobotData { robot: ActiveRobot },

    /// Positions a robot has discovered, only sent to its owner
    KnownPositions {
        robot_id: RobotId,
        positions: Vec<Position>,
    },

    /// Tiles of the map known to all robots together
    MapTiles { tiles: Vec<Tile> },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}
