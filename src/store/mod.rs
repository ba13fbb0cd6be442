//! Collaborators of the game core and their Supabase implementations

pub mod maps;
pub mod played_games;
pub mod robots;
pub mod settings;
pub mod supabase;

use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::game::{Map, MapError, RobotId, RobotInfo};

pub use maps::SupabaseMapSource;
pub use played_games::SupabaseGameRecorder;
pub use robots::SupabaseRobotDirectory;
pub use settings::SupabaseSettingsSource;
pub use supabase::{SupabaseClient, SupabaseError};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Supabase(#[from] SupabaseError),

    #[error("No active map available")]
    NoActiveMap,

    #[error("Map {id} is invalid: {source}")]
    InvalidMap {
        id: i64,
        #[source]
        source: MapError,
    },
}

/// Selection of the map for the next round
pub trait MapSource: Send + Sync {
    /// Random pick among the active maps
    fn next_challenge_map(&self) -> BoxFuture<'_, Result<Map, StoreError>>;
}

/// Lookup of persistent robots
pub trait RobotDirectory: Send + Sync {
    fn robot(&self, robot_id: RobotId) -> BoxFuture<'_, Result<Option<RobotInfo>, StoreError>>;

    fn robot_for_user(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<RobotInfo>, StoreError>>;
}

/// Outcome of a finished round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedGame {
    pub winner: Option<RobotId>,
    pub turns: u32,
}

/// Record of finished rounds
pub trait GameRecorder: Send + Sync {
    fn record_game(&self, game: PlayedGame) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Persistent overrides of the game settings
pub trait SettingsSource: Send + Sync {
    /// Raw key/value pairs, parsed by the settings store
    fn load_settings(&self) -> BoxFuture<'_, Result<Vec<(String, String)>, StoreError>>;
}

/// All collaborators the game handler talks to
#[derive(Clone)]
pub struct Stores {
    pub maps: Arc<dyn MapSource>,
    pub robots: Arc<dyn RobotDirectory>,
    pub games: Arc<dyn GameRecorder>,
    pub settings: Arc<dyn SettingsSource>,
}

impl Stores {
    /// Every collaborator backed by the same Supabase project
    pub fn supabase(client: SupabaseClient) -> Self {
        Self {
            maps: Arc::new(SupabaseMapSource::new(client.clone())),
            robots: Arc::new(SupabaseRobotDirectory::new(client.clone())),
            games: Arc::new(SupabaseGameRecorder::new(client.clone())),
            settings: Arc::new(SupabaseSettingsSource::new(client)),
        }
    }
}
