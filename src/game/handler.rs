//! Game facade
//!
//! The single mediator between transport, game loop and the game core.
//! Locks are always taken in the order phase, map, robots, and are never
//! held across an `.await`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::action::{ActionResult, GameWorld, RobotAction};
use super::map::{LoadedMap, Map, MapHandler, Position, ScanArea, Size, Tile};
use super::robot::{ActiveRobot, RobotId, RobotInfo, RobotRegistry};
use super::state::{GameState, GameStateMachine};
use super::GameError;
use crate::settings::{SettingKey, SettingsStore};
use crate::store::{PlayedGame, Stores};
use crate::util::time::Timer;
use crate::ws::Broadcaster;

/// Rule switches that apply to a whole turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnRules {
    /// Radius revealed around a robot after it moved or registered
    pub sight_distance: u32,
    pub full_map_scan_allowed: bool,
}

/// The world as seen by actions while the handler holds the locks
pub struct TurnContext<'a> {
    map: &'a LoadedMap,
    /// Occupancy once all pending moves ran
    planned_positions: HashSet<Position>,
    rules: TurnRules,
    broadcaster: &'a dyn Broadcaster,
}

impl<'a> TurnContext<'a> {
    pub fn new(
        map: &'a LoadedMap,
        planned_positions: HashSet<Position>,
        rules: TurnRules,
        broadcaster: &'a dyn Broadcaster,
    ) -> Self {
        Self {
            map,
            planned_positions,
            rules,
            broadcaster,
        }
    }
}

impl GameWorld for TurnContext<'_> {
    fn check_position_for_move(&self, position: &Position) -> Result<(), GameError> {
        if !self.map.is_position_valid(position) {
            return Err(GameError::PositionOutOfMap(format!(
                "Position {} is not in map bounds.",
                position
            )));
        }
        if self.planned_positions.contains(position) {
            return Err(GameError::PositionNotAllowed(format!(
                "Position {} is already occupied.",
                position
            )));
        }
        Ok(())
    }

    fn fuel_cost(&self, from: &Position, to: &Position) -> Result<u32, GameError> {
        self.map.fuel_cost(from, to)
    }

    fn tile_at(&self, position: &Position) -> Result<Tile, GameError> {
        self.map.tile_at(position).copied()
    }

    fn tiles_in_radius(&self, center: &Position, distance: u32) -> ScanArea {
        self.map.tiles_in_radius(center, distance)
    }

    fn tiles_in_sight(&self, position: &Position) -> Vec<Tile> {
        self.map
            .tiles_in_radius(position, self.rules.sight_distance)
            .tiles
    }

    fn all_tiles(&self) -> Vec<Tile> {
        self.map.map().tiles().to_vec()
    }

    fn is_solar_charge_possible(&self) -> bool {
        self.map.is_solar_charge_possible()
    }

    fn solar_charge_rate(&self) -> f64 {
        self.map.solar_charge_rate()
    }

    fn is_full_map_scan_allowed(&self) -> bool {
        self.rules.full_map_scan_allowed
    }

    fn send_robot_update(&self, robot: &ActiveRobot) {
        self.broadcaster.robot_public_update(robot);
        self.broadcaster.robot_private_update(robot);
        self.broadcaster.known_positions_update(robot);
    }
}

/// Configured phase durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameTimeouts {
    pub wait_for_players: u64,
    pub wait_for_action: u64,
    pub game_end: u64,
}

/// Part of the public game info that only changes with the map or settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapInfo {
    pub map_id: i64,
    pub map_name: String,
    pub map_size: Size,
    pub target_position: Option<Position>,
    pub solar_charge_possible: bool,
    pub full_map_scan_possible: bool,
    pub game_timeouts_in_millis: GameTimeouts,
}

/// Snapshot of the game shown to every visitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicGameInfo {
    pub current_state: GameState,
    pub state_since: DateTime<Utc>,
    pub current_turn: u32,
    pub name_of_winning_robot: Option<String>,
    #[serde(flatten)]
    pub map: MapInfo,
}

/// Lowest and highest tile of the loaded map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeightRange {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Default)]
struct RoundStats {
    turn: u32,
    idle_turns: u32,
    winner: Option<String>,
}

pub struct GameHandler {
    state: GameStateMachine,
    maps: MapHandler,
    robots: Mutex<RobotRegistry>,
    round: Mutex<RoundStats>,
    info_cache: Mutex<Option<MapInfo>>,
    settings: Arc<SettingsStore>,
    stores: Stores,
    broadcaster: Arc<dyn Broadcaster>,
}

impl GameHandler {
    pub fn new(
        settings: Arc<SettingsStore>,
        stores: Stores,
        broadcaster: Arc<dyn Broadcaster>,
        tile_scan_cost: f64,
    ) -> Self {
        Self {
            state: GameStateMachine::new(broadcaster.clone()),
            maps: MapHandler::new(tile_scan_cost),
            robots: Mutex::new(RobotRegistry::new()),
            round: Mutex::new(RoundStats::default()),
            info_cache: Mutex::new(None),
            settings,
            stores,
            broadcaster,
        }
    }

    pub fn state(&self) -> &GameStateMachine {
        &self.state
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    fn turn_rules(&self) -> TurnRules {
        let sight = self.settings.int(SettingKey::DistanceRobotSightOnMove);
        TurnRules {
            sight_distance: u32::try_from(sight.max(0)).unwrap_or(u32::MAX),
            full_map_scan_allowed: self.settings.boolean(SettingKey::EnableFullMapScan),
        }
    }

    /// Submit the next action of a robot.
    ///
    /// An unknown or inactive robot yields `Ok(None)` and nothing is sent.
    pub fn next_action_for_robot(
        &self,
        robot_id: RobotId,
        action: RobotAction,
    ) -> Result<Option<ActiveRobot>, GameError> {
        let rules = self.turn_rules();
        let robot = {
            let phase = self.state.lock_phase();
            let map = self.maps.read();
            let mut robots = self.robots.lock();
            let world = TurnContext::new(
                &map,
                robots.positions_after_pending_moves(),
                rules,
                self.broadcaster.as_ref(),
            );
            robots.set_pending_action(phase.state, robot_id, action, &world)?
        };

        if let Some(robot) = &robot {
            self.broadcaster.robot_private_update(robot);
        }
        Ok(robot)
    }

    /// Run every pending action and advance the turn
    pub fn execute_all_robot_actions(&self) -> Result<(), GameError> {
        let rules = self.turn_rules();
        let known_tiles = {
            let phase = self.state.lock_phase();
            let map = self.maps.read();
            let mut robots = self.robots.lock();
            let world = TurnContext::new(
                &map,
                robots.positions_after_pending_moves(),
                rules,
                self.broadcaster.as_ref(),
            );
            robots.execute_all(phase.state, &world)?;
            self.known_tiles(&map, &robots)
        };

        let turn = {
            let mut round = self.round.lock();
            round.turn += 1;
            round.turn
        };
        debug!(turn, "Executed robot actions");

        self.broadcaster.turn_update(turn);
        self.broadcaster.map_tile_update(known_tiles);
        Ok(())
    }

    /// Register a robot by id on a free start tile.
    ///
    /// Unknown and already registered robots yield `Ok(None)`.
    pub async fn register_robot_for_next_game(
        &self,
        robot_id: RobotId,
    ) -> Result<Option<ActiveRobot>, GameError> {
        if !self.state.is_in_state(GameState::WaitForPlayers) {
            return Err(registration_closed());
        }

        let Some(info) = self.stores.robots.robot(robot_id).await? else {
            debug!(robot_id, "Unknown robot, registration ignored");
            return Ok(None);
        };

        let Some((robot, known_tiles)) = self.place_robot(info)? else {
            return Ok(None);
        };

        self.broadcaster.robot_public_update(&robot);
        self.broadcaster.robot_private_update(&robot);
        self.broadcaster.known_positions_update(&robot);
        self.broadcaster.map_tile_update(known_tiles);
        Ok(Some(robot))
    }

    /// Put a robot on a free start tile and reveal its surroundings
    fn place_robot(&self, info: RobotInfo) -> Result<Option<(ActiveRobot, Vec<Tile>)>, GameError> {
        let rules = self.turn_rules();
        let phase = self.state.lock_phase();
        if phase.state != GameState::WaitForPlayers {
            return Err(registration_closed());
        }
        let map = self.maps.read();
        let mut robots = self.robots.lock();
        if robots.robot(info.id).is_some() {
            return Ok(None);
        }

        let start = robots.free_position(map.start_positions()).ok_or_else(|| {
            GameError::PositionNotAllowed(
                "Could not place robot at an empty start position.".to_string(),
            )
        })?;
        let Some(registered) = robots.register_for_game(phase.state, info, start)? else {
            return Ok(None);
        };

        let sight = map.tiles_in_radius(&start, rules.sight_distance).tiles;
        let Some(robot) = robots.robot_mut(registered.id) else {
            return Ok(None);
        };
        robot.known_positions.extend(sight.iter().map(|t| t.position));
        robot.last_result = Some(ActionResult::Tiles { tiles: sight });
        let robot = robot.clone();

        let known_tiles = self.known_tiles(&map, &robots);
        Ok(Some((robot, known_tiles)))
    }

    /// Load the next map and reset the round
    pub async fn prepare_new_game(&self) -> Result<(), GameError> {
        info!("Select new map");
        let timer = Timer::new();
        let map = self.stores.maps.next_challenge_map().await?;
        let map_name = map.name.clone();

        self.load_round(map)?;
        self.invalidate_info_cache();

        self.broadcaster.turn_update(0);
        self.broadcaster.map_tile_update(self.current_known_map());
        info!(map_name = %map_name, elapsed_ms = timer.elapsed_ms(), "Prepared new game");
        Ok(())
    }

    fn load_round(&self, map: Map) -> Result<(), GameError> {
        let phase = self.state.lock_phase();
        if phase.state != GameState::Prepare {
            return Err(GameError::GameState(
                "A new game can only be prepared during 'Prepare' stage".to_string(),
            ));
        }

        let max_fuel = map.max_robot_fuel;
        self.maps.load_map(map);

        let mut robots = self.robots.lock();
        robots.set_max_fuel(max_fuel);
        robots.clear_all();
        *self.round.lock() = RoundStats::default();
        Ok(())
    }

    /// Reload setting overrides. A failed load keeps the current values.
    pub async fn refresh_settings(&self) {
        match self.stores.settings.load_settings().await {
            Ok(entries) => {
                self.apply_settings(entries);
            }
            Err(e) => warn!(error = %e, "Failed to load settings, keeping current values"),
        }
    }

    /// Apply raw setting overrides and drop the cached game info
    pub fn apply_settings<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let applied = self.settings.apply_all(entries);
        self.invalidate_info_cache();
        applied
    }

    /// Close the round, remember the winner and record the game
    pub async fn ending_round(&self, winner: Option<RobotId>) {
        let winner = winner.and_then(|id| self.active_robot(id));
        let turns = {
            let mut round = self.round.lock();
            round.winner = winner.as_ref().map(|r| r.owner.username.clone());
            round.turn
        };
        self.invalidate_info_cache();

        match &winner {
            Some(robot) => info!(robot_id = robot.id, turns, "Robot reached the target"),
            None => info!(turns, "Round ended without a winner"),
        }

        let game = PlayedGame {
            winner: winner.map(|r| r.id),
            turns,
        };
        if let Err(e) = self.stores.games.record_game(game).await {
            error!(error = %e, "Failed to record played game");
        }
    }

    /// Count the round as idle when no robot wants more than waiting
    pub fn check_for_idle_round(&self) {
        let idle = self.robots.lock().is_everyone_idle();
        let mut round = self.round.lock();
        if idle {
            round.idle_turns += 1;
        } else {
            round.idle_turns = 0;
        }
    }

    pub fn is_game_idle(&self) -> bool {
        let threshold = self.settings.int(SettingKey::ThresholdIdleTurnsForEndingGame);
        i64::from(self.round.lock().idle_turns) >= threshold
    }

    pub fn public_game_info(&self) -> PublicGameInfo {
        let map = {
            let mut cache = self.info_cache.lock();
            cache.get_or_insert_with(|| self.build_map_info()).clone()
        };
        let phase = *self.state.lock_phase();
        let round = self.round.lock();

        PublicGameInfo {
            current_state: phase.state,
            state_since: phase.since,
            current_turn: round.turn,
            name_of_winning_robot: round.winner.clone(),
            map,
        }
    }

    fn build_map_info(&self) -> MapInfo {
        let map = self.maps.read();
        let show_target = self.settings.boolean(SettingKey::TargetPositionInGameinfo);
        let millis = |key| self.settings.duration(key).as_millis() as u64;

        MapInfo {
            map_id: map.map().id,
            map_name: map.map().name.clone(),
            map_size: map.size(),
            target_position: show_target.then(|| map.target_position()),
            solar_charge_possible: map.is_solar_charge_possible(),
            full_map_scan_possible: self.settings.boolean(SettingKey::EnableFullMapScan),
            game_timeouts_in_millis: GameTimeouts {
                wait_for_players: millis(SettingKey::TimeoutWaitForPlayers),
                wait_for_action: millis(SettingKey::TimeoutWaitForAction),
                game_end: millis(SettingKey::TimeoutGameEnd),
            },
        }
    }

    fn invalidate_info_cache(&self) {
        self.info_cache.lock().take();
    }

    /// Everything any robot has seen, plus the target when it is public
    pub fn global_known_positions(&self) -> HashSet<Position> {
        let map = self.maps.read();
        let robots = self.robots.lock();
        self.known_positions_with(&map, &robots)
    }

    /// Tiles of the globally known positions
    pub fn current_known_map(&self) -> Vec<Tile> {
        let map = self.maps.read();
        let robots = self.robots.lock();
        self.known_tiles(&map, &robots)
    }

    fn known_positions_with(&self, map: &LoadedMap, robots: &RobotRegistry) -> HashSet<Position> {
        let mut positions = robots.known_positions();
        let target = map.target_position();
        if self.settings.boolean(SettingKey::TargetPositionInGameinfo) && map.is_position_valid(&target)
        {
            positions.insert(target);
        }
        positions
    }

    fn known_tiles(&self, map: &LoadedMap, robots: &RobotRegistry) -> Vec<Tile> {
        self.known_positions_with(map, robots)
            .iter()
            .filter_map(|p| map.tile_at(p).ok().copied())
            .collect()
    }

    pub fn map_height_metadata(&self) -> Option<HeightRange> {
        self.maps
            .height_range()
            .map(|(min, max)| HeightRange { min, max })
    }

    pub fn target_position(&self) -> Position {
        self.maps.target_position()
    }

    /// Whether a robot could move onto `position` given the pending moves
    pub fn check_position_for_move(&self, position: &Position) -> Result<(), GameError> {
        let map = self.maps.read();
        let planned = self.robots.lock().positions_after_pending_moves();
        TurnContext::new(&map, planned, TurnRules::default(), self.broadcaster.as_ref())
            .check_position_for_move(position)
    }

    pub fn fuel_cost_for_move(&self, from: &Position, to: &Position) -> Result<u32, GameError> {
        self.maps.fuel_cost(from, to)
    }

    pub fn active_robots(&self) -> Vec<ActiveRobot> {
        self.robots.lock().robots().to_vec()
    }

    pub fn active_robot(&self, robot_id: RobotId) -> Option<ActiveRobot> {
        self.robots.lock().robot(robot_id).cloned()
    }

    /// The robot a user plays with in the current round
    pub fn active_robot_for_user(&self, user_id: Uuid) -> Option<ActiveRobot> {
        self.robots
            .lock()
            .robots()
            .iter()
            .find(|r| r.owner.id == user_id)
            .cloned()
    }

    pub fn known_positions_for_robot(&self, robot_id: RobotId) -> Option<HashSet<Position>> {
        self.robots
            .lock()
            .robot(robot_id)
            .map(|r| r.known_positions.clone())
    }

    pub fn has_active_robots(&self) -> bool {
        !self.robots.lock().is_empty()
    }

    /// First registered robot standing on the target
    pub fn robot_on_target(&self) -> Option<RobotId> {
        let map = self.maps.read();
        let target = map.target_position();
        self.robots.lock().robot_at(&target).map(|r| r.id)
    }

    pub fn current_turn(&self) -> u32 {
        self.round.lock().turn
    }
}

fn registration_closed() -> GameError {
    GameError::GameState(
        "Robot registration is only possible during 'Wait for players' stage!".to_string(),
    )
}
