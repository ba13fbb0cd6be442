//! Game simulation modules

pub mod action;
pub mod bots;
pub mod error;
pub mod game_loop;
pub mod handler;
pub mod map;
pub mod robot;
pub mod state;

pub use action::RobotAction;
pub use bots::DummyBots;
pub use error::GameError;
pub use game_loop::GameLoop;
pub use handler::{GameHandler, HeightRange, PublicGameInfo};
pub use map::{Map, MapError, Position, Size, Tile, TileType, DEFAULT_TILE_SCAN_COST};
pub use robot::{ActiveRobot, Color, PublicRobot, RobotId, RobotInfo, UserRef};
pub use state::GameState;
