//! Game phase state machine

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ws::Broadcaster;

use super::GameError;

/// Game phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    /// Loading the next map
    Prepare,
    /// Robots may register
    WaitForPlayers,
    /// Robots may submit their next action
    WaitForAction,
    /// Pending actions are executed
    Action,
    /// Round is over
    Ended,
}

impl GameState {
    /// The only states a transition into `self` may start from
    pub fn valid_predecessors(self) -> &'static [GameState] {
        match self {
            GameState::Prepare => &[GameState::Ended],
            GameState::WaitForPlayers => &[GameState::Prepare],
            GameState::WaitForAction => &[GameState::WaitForPlayers, GameState::Action],
            GameState::Action => &[GameState::WaitForAction],
            GameState::Ended => &[GameState::Action],
        }
    }

    pub fn can_follow(self, current: GameState) -> bool {
        self.valid_predecessors().contains(&current)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameState::Prepare => "PREPARE",
            GameState::WaitForPlayers => "WAIT_FOR_PLAYERS",
            GameState::WaitForAction => "WAIT_FOR_ACTION",
            GameState::Action => "ACTION",
            GameState::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// Current phase and the moment it was entered
#[derive(Debug, Clone, Copy)]
pub struct PhaseRecord {
    pub state: GameState,
    pub since: DateTime<Utc>,
}

/// Read guard on the current phase.
///
/// While held, no transition can happen, so a request can check the phase
/// and act on it without racing the game loop.
pub type PhaseGuard<'a> = RwLockReadGuard<'a, PhaseRecord>;

/// Process-wide phase with a strict transition table
pub struct GameStateMachine {
    current: RwLock<PhaseRecord>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl GameStateMachine {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            current: RwLock::new(PhaseRecord {
                state: GameState::Ended,
                since: Utc::now(),
            }),
            broadcaster,
        }
    }

    /// Move to `target` if the current state is a legal predecessor
    pub fn set_state(&self, target: GameState) -> Result<(), GameError> {
        {
            let mut current = self.current.write();
            if !target.can_follow(current.state) {
                let allowed: Vec<String> = target
                    .valid_predecessors()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                return Err(GameError::GameState(format!(
                    "Gamestate {} can't be initiated from current state {}. Allowed predecessors of {} are: {}",
                    target,
                    current.state,
                    target,
                    allowed.join(",")
                )));
            }

            debug!(from = %current.state, to = %target, "Game state change");
            *current = PhaseRecord {
                state: target,
                since: Utc::now(),
            };
        }

        self.broadcaster.game_state_update(target);
        Ok(())
    }

    pub fn current_state(&self) -> GameState {
        self.current.read().state
    }

    pub fn is_in_state(&self, state: GameState) -> bool {
        self.current_state() == state
    }

    /// When the current phase was entered
    pub fn state_since(&self) -> DateTime<Utc> {
        self.current.read().since
    }

    /// Hold the phase steady for a read-then-act sequence
    pub fn lock_phase(&self) -> PhaseGuard<'_> {
        self.current.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingBroadcaster, Sent};

    const ALL: [GameState; 5] = [
        GameState::Prepare,
        GameState::WaitForPlayers,
        GameState::WaitForAction,
        GameState::Action,
        GameState::Ended,
    ];

    /// Drive a fresh machine into `state` along the legal cycle
    fn machine_in(state: GameState) -> GameStateMachine {
        let machine = GameStateMachine::new(Arc::new(RecordingBroadcaster::default()));
        let path: &[GameState] = match state {
            GameState::Ended => &[],
            GameState::Prepare => &[GameState::Prepare],
            GameState::WaitForPlayers => &[GameState::Prepare, GameState::WaitForPlayers],
            GameState::WaitForAction => &[
                GameState::Prepare,
                GameState::WaitForPlayers,
                GameState::WaitForAction,
            ],
            GameState::Action => &[
                GameState::Prepare,
                GameState::WaitForPlayers,
                GameState::WaitForAction,
                GameState::Action,
            ],
        };
        for step in path {
            machine.set_state(*step).unwrap();
        }
        machine
    }

    #[test]
    fn starts_ended() {
        let machine = GameStateMachine::new(Arc::new(RecordingBroadcaster::default()));
        assert_eq!(machine.current_state(), GameState::Ended);
        assert!(machine.is_in_state(GameState::Ended));
    }

    #[test]
    fn transitions_follow_predecessor_table() {
        for from in ALL {
            for to in ALL {
                let machine = machine_in(from);
                let result = machine.set_state(to);
                if to.valid_predecessors().contains(&from) {
                    assert!(result.is_ok(), "{from} -> {to} should be allowed");
                    assert_eq!(machine.current_state(), to);
                } else {
                    assert!(
                        matches!(result, Err(GameError::GameState(_))),
                        "{from} -> {to} should be rejected"
                    );
                    assert_eq!(machine.current_state(), from);
                }
            }
        }
    }

    #[test]
    fn transition_is_broadcast_and_timestamped() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let machine = GameStateMachine::new(broadcaster.clone());
        let before = machine.state_since();

        machine.set_state(GameState::Prepare).unwrap();

        assert!(machine.state_since() >= before);
        assert_eq!(broadcaster.sent(), vec![Sent::GameState(GameState::Prepare)]);
    }

    #[test]
    fn rejected_transition_is_not_broadcast() {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let machine = GameStateMachine::new(broadcaster.clone());

        assert!(machine.set_state(GameState::Action).is_err());
        assert!(broadcaster.sent().is_empty());
    }

    #[test]
    fn game_state_serializes_screaming() {
        let json = serde_json::to_string(&GameState::WaitForAction).unwrap();
        assert_eq!(json, "\"WAIT_FOR_ACTION\"");
    }
}
