//! Active robots and the registry of the running round

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::action::{ActionResult, GameWorld, RobotAction};
use super::map::Position;
use super::{GameError, GameState};

/// Stable robot id as stored by the robot directory
pub type RobotId = i64;

/// Robot colour for client rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Owning user of a robot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// Persistent identity of a robot, resolved outside the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotInfo {
    pub id: RobotId,
    pub name: String,
    pub owner: UserRef,
    pub color: Color,
}

/// Public view of a robot, visible to every observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRobot {
    pub id: RobotId,
    pub name: String,
    pub color: Color,
    pub position: Position,
}

/// A robot participating in the current round
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRobot {
    pub id: RobotId,
    pub name: String,
    #[serde(skip)]
    pub owner: UserRef,
    pub color: Color,
    pub fuel: u32,
    /// Fixed at registration, independent of later fuel changes
    max_fuel: u32,
    pub position: Position,
    pub next_action: Option<RobotAction>,
    pub last_result: Option<ActionResult>,
    /// Tiles observed so far this round, only ever grows
    pub known_positions: HashSet<Position>,
}

impl ActiveRobot {
    pub fn new(info: RobotInfo, max_fuel: u32, position: Position) -> Self {
        Self {
            id: info.id,
            name: info.name,
            owner: info.owner,
            color: info.color,
            fuel: max_fuel,
            max_fuel,
            position,
            next_action: None,
            last_result: None,
            known_positions: HashSet::new(),
        }
    }

    pub fn max_fuel(&self) -> u32 {
        self.max_fuel
    }

    pub fn has_sufficient_fuel(&self, cost: u32) -> bool {
        self.fuel >= cost
    }

    pub fn use_fuel(&mut self, cost: u32) {
        self.fuel = self.fuel.saturating_sub(cost);
    }

    /// Add fuel, capped at the tank size
    pub fn add_fuel(&mut self, amount: u32) {
        self.fuel = self.fuel.saturating_add(amount).min(self.max_fuel);
    }

    pub fn public(&self) -> PublicRobot {
        PublicRobot {
            id: self.id,
            name: self.name.clone(),
            color: self.color,
            position: self.position,
        }
    }
}

impl PartialEq for ActiveRobot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActiveRobot {}

impl Hash for ActiveRobot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The robots of the current round.
///
/// Guarded by a single coarse lock in the game handler. Every mutating
/// operation takes the phase it was called in and rejects the wrong one.
pub struct RobotRegistry {
    robots: Vec<ActiveRobot>,
    initial_max_fuel: u32,
    rng: ChaCha8Rng,
}

impl RobotRegistry {
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    pub fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            robots: Vec::new(),
            initial_max_fuel: 0,
            rng,
        }
    }

    /// Tank size handed to robots registered from now on
    pub fn set_max_fuel(&mut self, max_fuel: u32) {
        self.initial_max_fuel = max_fuel;
    }

    /// Add a robot to the round.
    ///
    /// Returns `None` without error if the robot is already registered.
    pub fn register_for_game(
        &mut self,
        phase: GameState,
        info: RobotInfo,
        start_position: Position,
    ) -> Result<Option<ActiveRobot>, GameError> {
        if phase != GameState::WaitForPlayers {
            return Err(GameError::GameState(
                "Robot registration is only possible during 'Wait for players' stage!".to_string(),
            ));
        }

        if self.robots.iter().any(|r| r.id == info.id) {
            debug!(robot_id = info.id, "Robot already registered");
            return Ok(None);
        }

        if self.is_occupied(&start_position) {
            warn!(
                robot_id = info.id,
                position = %start_position,
                "Start position is occupied"
            );
            return Err(GameError::PositionNotAllowed(format!(
                "Start position {} is already occupied.",
                start_position
            )));
        }

        let robot = ActiveRobot::new(info, self.initial_max_fuel, start_position);
        info!(robot_id = robot.id, position = %start_position, "Registered robot");
        self.robots.push(robot.clone());
        Ok(Some(robot))
    }

    pub fn clear_all(&mut self) {
        self.robots.clear();
    }

    /// Validate and store the next action of a robot.
    ///
    /// Returns `None` if the robot is not active. A failed check leaves the
    /// robot untouched.
    pub fn set_pending_action(
        &mut self,
        phase: GameState,
        robot_id: RobotId,
        action: RobotAction,
        world: &dyn GameWorld,
    ) -> Result<Option<ActiveRobot>, GameError> {
        if phase != GameState::WaitForAction {
            return Err(GameError::GameState(
                "Sending the next robot action is only allowed during 'Wait for action' stage!"
                    .to_string(),
            ));
        }

        let Some(robot) = self.robots.iter_mut().find(|r| r.id == robot_id) else {
            return Ok(None);
        };

        action.check(robot, world)?;
        robot.next_action = Some(action);
        debug!(robot_id, action = %action, "Robot will act next");
        Ok(Some(robot.clone()))
    }

    /// Execute every pending action, store its result and clear it.
    ///
    /// Robots without a pending action keep their previous result.
    pub fn execute_all(&mut self, phase: GameState, world: &dyn GameWorld) -> Result<(), GameError> {
        if phase != GameState::Action {
            return Err(GameError::GameState(
                "Actions are only allowed to be executed during 'Action' stage".to_string(),
            ));
        }

        for robot in &mut self.robots {
            let Some(action) = robot.next_action.take() else {
                continue;
            };

            match action.execute(robot, world) {
                Ok(result) => robot.last_result = Some(result),
                Err(e) => {
                    warn!(robot_id = robot.id, action = %action, error = %e, "Robot action failed");
                }
            }
        }

        Ok(())
    }

    pub fn count_pending(&self) -> usize {
        self.robots.iter().filter(|r| r.next_action.is_some()).count()
    }

    /// True unless some robot wants to do more than wait
    pub fn is_everyone_idle(&self) -> bool {
        !self.robots.iter().any(|r| {
            matches!(r.next_action, Some(action) if action != RobotAction::Wait)
        })
    }

    /// Pick a random candidate no robot currently stands on
    pub fn free_position(&mut self, candidates: &[Position]) -> Option<Position> {
        let free: Vec<Position> = candidates
            .iter()
            .filter(|p| !self.is_occupied(p))
            .copied()
            .collect();
        free.choose(&mut self.rng).copied()
    }

    pub fn is_occupied(&self, position: &Position) -> bool {
        self.robots.iter().any(|r| r.position == *position)
    }

    /// Where every robot will stand once the pending actions ran.
    ///
    /// A snapshot, not resolved iteratively: two robots may swap tiles.
    pub fn positions_after_pending_moves(&self) -> HashSet<Position> {
        self.robots
            .iter()
            .map(|r| match r.next_action {
                Some(RobotAction::Move { direction }) => r.position.step(direction),
                _ => r.position,
            })
            .collect()
    }

    pub fn is_free_after_pending_moves(&self, position: &Position) -> bool {
        !self.positions_after_pending_moves().contains(position)
    }

    pub fn robots(&self) -> &[ActiveRobot] {
        &self.robots
    }

    pub fn robot(&self, robot_id: RobotId) -> Option<&ActiveRobot> {
        self.robots.iter().find(|r| r.id == robot_id)
    }

    pub fn robot_mut(&mut self, robot_id: RobotId) -> Option<&mut ActiveRobot> {
        self.robots.iter_mut().find(|r| r.id == robot_id)
    }

    /// First registered robot standing on `position`
    pub fn robot_at(&self, position: &Position) -> Option<&ActiveRobot> {
        self.robots.iter().find(|r| r.position == *position)
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    /// Union of the positions every robot has seen
    pub fn known_positions(&self) -> HashSet<Position> {
        self.robots
            .iter()
            .flat_map(|r| r.known_positions.iter().copied())
            .collect()
    }
}

impl Default for RobotRegistry {
    fn default() -> Self {
        Self::new()
    }
}
