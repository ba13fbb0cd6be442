//! Background task driving the game through its phases

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::handler::GameHandler;
use super::state::GameState;
use super::GameError;
use crate::settings::SettingKey;

/// Pause between iterations so the loop never spins
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Extra pause after a failed iteration before the phase is retried
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct GameLoop {
    game: Arc<GameHandler>,
}

impl GameLoop {
    pub fn new(game: Arc<GameHandler>) -> Self {
        Self { game }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until the process exits
    pub async fn run(self) {
        info!("Game loop started");
        if let Err(e) = self.game.state().set_state(GameState::Prepare) {
            error!(error = %e, "Could not enter the first round");
        }

        loop {
            self.iteration().await;
            sleep(IDLE_SLEEP).await;
        }
    }

    /// Perform the work of the current phase. Never fails, errors are logged.
    pub async fn iteration(&self) {
        let phase = self.game.state().current_state();
        if let Err(e) = self.run_phase(phase).await {
            error!(state = %phase, error = %e, "Game loop iteration failed");
            sleep(RETRY_DELAY).await;
        }
    }

    async fn run_phase(&self, phase: GameState) -> Result<(), GameError> {
        let state = self.game.state();
        let settings = self.game.settings();

        match phase {
            GameState::Prepare => {
                self.game.refresh_settings().await;
                self.game.prepare_new_game().await?;
                state.set_state(GameState::WaitForPlayers)?;
            }
            GameState::WaitForPlayers => {
                sleep(settings.duration(SettingKey::TimeoutWaitForPlayers)).await;
                if self.game.has_active_robots() {
                    state.set_state(GameState::WaitForAction)?;
                }
            }
            GameState::WaitForAction => {
                debug!("Waiting for robot actions");
                sleep(settings.duration(SettingKey::TimeoutWaitForAction)).await;
                state.set_state(GameState::Action)?;
            }
            GameState::Action => {
                self.game.check_for_idle_round();
                if self.game.is_game_idle() {
                    info!("No robot activity, ending the round");
                    self.game.ending_round(None).await;
                    state.set_state(GameState::Ended)?;
                    return Ok(());
                }

                self.game.execute_all_robot_actions()?;
                match self.game.robot_on_target() {
                    Some(winner) => {
                        self.game.ending_round(Some(winner)).await;
                        state.set_state(GameState::Ended)?;
                    }
                    None => state.set_state(GameState::WaitForAction)?,
                }
            }
            GameState::Ended => {
                sleep(settings.duration(SettingKey::TimeoutGameEnd)).await;
                state.set_state(GameState::Prepare)?;
            }
        }

        Ok(())
    }
}
