//! Played game history

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::info;

use super::supabase::SupabaseClient;
use super::{GameRecorder, PlayedGame, StoreError};
use crate::game::RobotId;

/// New row for the `played_games` table
#[derive(Debug, Clone, Serialize)]
pub struct NewPlayedGame {
    pub winner_robot_id: Option<RobotId>,
    pub turns_to_win: u32,
    pub played_at: DateTime<Utc>,
}

impl From<PlayedGame> for NewPlayedGame {
    fn from(game: PlayedGame) -> Self {
        Self {
            winner_robot_id: game.winner,
            turns_to_win: game.turns,
            played_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct SupabaseGameRecorder {
    client: SupabaseClient,
}

impl SupabaseGameRecorder {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn insert(&self, game: PlayedGame) -> Result<(), StoreError> {
        let row = NewPlayedGame::from(game);
        self.client.insert("played_games", &row).await?;
        info!(winner = ?row.winner_robot_id, turns = row.turns_to_win, "Recorded played game");
        Ok(())
    }
}

impl GameRecorder for SupabaseGameRecorder {
    fn record_game(&self, game: PlayedGame) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.insert(game))
    }
}
