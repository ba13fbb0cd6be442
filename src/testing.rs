//! Shared fixtures for unit tests

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::game::{
    ActiveRobot, Color, GameState, Map, Position, RobotId, RobotInfo, Size, Tile, TileType,
    UserRef,
};
use crate::store::{
    GameRecorder, MapSource, PlayedGame, RobotDirectory, SettingsSource, StoreError, Stores,
};
use crate::ws::Broadcaster;

/// Builds valid maps: flat `Default` tiles, start at the top left corner,
/// target at the bottom right one
pub struct MapBuilder {
    size: Size,
    tiles: HashMap<Position, Tile>,
    max_fuel: u32,
    solar_charge_rate: f64,
}

impl MapBuilder {
    pub fn new(width: i32, height: i32) -> Self {
        let mut tiles = HashMap::new();
        for y in 0..height {
            for x in 0..width {
                let position = Position::new(x, y);
                tiles.insert(position, Tile::new(position, 0, TileType::Default));
            }
        }
        let builder = Self {
            size: Size::new(width, height),
            tiles,
            max_fuel: 300,
            solar_charge_rate: 0.0,
        };
        builder
            .tile(0, 0, 0, TileType::Start)
            .tile(width - 1, height - 1, 0, TileType::Target)
    }

    pub fn tile(mut self, x: i32, y: i32, height: i32, tile_type: TileType) -> Self {
        let position = Position::new(x, y);
        self.tiles
            .insert(position, Tile::new(position, height, tile_type));
        self
    }

    pub fn max_fuel(mut self, max_fuel: u32) -> Self {
        self.max_fuel = max_fuel;
        self
    }

    pub fn solar_charge_rate(mut self, rate: f64) -> Self {
        self.solar_charge_rate = rate;
        self
    }

    pub fn build(self) -> Map {
        let mut tiles: Vec<Tile> = self.tiles.into_values().collect();
        tiles.sort_by_key(|t| (t.position.y, t.position.x));
        Map::new(
            1,
            "test",
            self.size,
            tiles,
            self.max_fuel,
            self.solar_charge_rate,
        )
        .expect("test map must be valid")
    }
}

/// 2x2 map: flat start, fuel and target on a plateau of height 100
pub fn scenario_map() -> Map {
    MapBuilder::new(2, 2)
        .tile(0, 0, 0, TileType::Start)
        .tile(1, 0, 100, TileType::Fuel)
        .tile(0, 1, 100, TileType::Default)
        .tile(1, 1, 100, TileType::Target)
        .max_fuel(200)
        .build()
}

/// Deterministic robot identity, the owner id is derived from the robot id
pub fn robot_info(id: RobotId) -> RobotInfo {
    RobotInfo {
        id,
        name: format!("robot-{id}"),
        owner: UserRef {
            id: Uuid::from_u128(id as u128),
            username: format!("user-{id}"),
        },
        color: Color { r: 10, g: 20, b: 30 },
    }
}

/// A broadcast observed by the recording broadcaster
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    RobotPublic(RobotId),
    RobotPrivate(RobotId),
    GameState(GameState),
    Turn(u32),
    KnownPositions(RobotId),
    MapTiles(Vec<Position>),
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingBroadcaster {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().push(sent);
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn robot_public_update(&self, robot: &ActiveRobot) {
        self.push(Sent::RobotPublic(robot.id));
    }

    fn robot_private_update(&self, robot: &ActiveRobot) {
        self.push(Sent::RobotPrivate(robot.id));
    }

    fn game_state_update(&self, state: GameState) {
        self.push(Sent::GameState(state));
    }

    fn turn_update(&self, turn: u32) {
        self.push(Sent::Turn(turn));
    }

    fn known_positions_update(&self, robot: &ActiveRobot) {
        self.push(Sent::KnownPositions(robot.id));
    }

    fn map_tile_update(&self, tiles: Vec<Tile>) {
        let mut positions: Vec<Position> = tiles.into_iter().map(|t| t.position).collect();
        positions.sort_by_key(|p| (p.y, p.x));
        self.push(Sent::MapTiles(positions));
    }
}

/// In-memory collaborators with inspectable state
#[derive(Default)]
pub struct MemoryStore {
    pub maps: Mutex<Vec<Map>>,
    pub robots: Mutex<HashMap<RobotId, RobotInfo>>,
    pub games: Mutex<Vec<PlayedGame>>,
    pub settings: Mutex<Vec<(String, String)>>,
    pub fail_maps: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_map(map: Map) -> Arc<Self> {
        let store = Self::default();
        store.maps.lock().push(map);
        Arc::new(store)
    }

    pub fn add_robot(&self, id: RobotId) -> RobotInfo {
        let info = robot_info(id);
        self.robots.lock().insert(id, info.clone());
        info
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            maps: self.clone(),
            robots: self.clone(),
            games: self.clone(),
            settings: self.clone(),
        }
    }
}

impl MapSource for MemoryStore {
    /// Always the first stored map
    fn next_challenge_map(&self) -> BoxFuture<'_, Result<Map, StoreError>> {
        let result = if *self.fail_maps.lock() {
            Err(StoreError::NoActiveMap)
        } else {
            self.maps.lock().first().cloned().ok_or(StoreError::NoActiveMap)
        };
        Box::pin(async move { result })
    }
}

impl RobotDirectory for MemoryStore {
    fn robot(&self, robot_id: RobotId) -> BoxFuture<'_, Result<Option<RobotInfo>, StoreError>> {
        let found = self.robots.lock().get(&robot_id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn robot_for_user(&self, user_id: Uuid) -> BoxFuture<'_, Result<Option<RobotInfo>, StoreError>> {
        let found = self
            .robots
            .lock()
            .values()
            .find(|r| r.owner.id == user_id)
            .cloned();
        Box::pin(async move { Ok(found) })
    }
}

impl GameRecorder for MemoryStore {
    fn record_game(&self, game: PlayedGame) -> BoxFuture<'_, Result<(), StoreError>> {
        self.games.lock().push(game);
        Box::pin(async { Ok(()) })
    }
}

impl SettingsSource for MemoryStore {
    fn load_settings(&self) -> BoxFuture<'_, Result<Vec<(String, String)>, StoreError>> {
        let settings = self.settings.lock().clone();
        Box::pin(async move { Ok(settings) })
    }
}
