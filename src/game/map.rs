//! Map engine: terrain grid, movement cost and visibility queries

use std::collections::HashSet;
use std::fmt;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::GameError;

/// Base fuel cost of every move, uphill adds the height delta on top
pub const STATIC_FUEL_COST: u32 = 1;

/// Default fuel cost per scanned cell
pub const DEFAULT_TILE_SCAN_COST: f64 = 0.1;

/// Grid coordinate (x = column, y = row, north is y - 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance
    pub fn distance_to(&self, other: &Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The neighbouring position in the given direction
    pub fn step(&self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }
}

/// Map dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, position: &Position) -> bool {
        (0..self.width).contains(&position.x) && (0..self.height).contains(&position.y)
    }

    pub fn area(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }
}

/// Terrain type of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileType {
    #[default]
    Default,
    Start,
    Target,
    Fuel,
}

/// A single map cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub position: Position,
    /// Elevation, never negative
    pub height: i32,
    #[serde(rename = "type")]
    pub tile_type: TileType,
}

impl Tile {
    pub const fn new(position: Position, height: i32, tile_type: TileType) -> Self {
        Self {
            position,
            height,
            tile_type,
        }
    }
}

/// Violations of the map invariants
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("Map size {width}x{height} is empty")]
    EmptyMap { width: i32, height: i32 },

    #[error("Map has {actual} tiles, expected {expected}")]
    TileCount { expected: usize, actual: usize },

    #[error("Tile {0} lies outside of the map")]
    TileOutOfBounds(Position),

    #[error("Tile {0} is defined twice")]
    DuplicateTile(Position),

    #[error("Tile {0} has a negative height")]
    NegativeHeight(Position),

    #[error("Map needs exactly one target tile, found {0}")]
    TargetCount(usize),

    #[error("Map has no start tile")]
    NoStartPosition,
}

/// A complete challenge map as delivered by the map selection
#[derive(Debug, Clone, Serialize)]
pub struct Map {
    pub id: i64,
    pub name: String,
    pub size: Size,
    pub max_robot_fuel: u32,
    /// Fraction of the max fuel regained per solar charge, 0 disables it
    pub solar_charge_rate: f64,
    tiles: Vec<Tile>,
    #[serde(skip)]
    start_positions: Vec<Position>,
    #[serde(skip)]
    target_position: Position,
}

impl Map {
    /// Build a map, checking that the tiles densely cover the grid with
    /// exactly one target and at least one start tile
    pub fn new(
        id: i64,
        name: impl Into<String>,
        size: Size,
        tiles: Vec<Tile>,
        max_robot_fuel: u32,
        solar_charge_rate: f64,
    ) -> Result<Self, MapError> {
        if size.width <= 0 || size.height <= 0 {
            return Err(MapError::EmptyMap {
                width: size.width,
                height: size.height,
            });
        }
        if tiles.len() != size.area() {
            return Err(MapError::TileCount {
                expected: size.area(),
                actual: tiles.len(),
            });
        }

        let mut seen = HashSet::with_capacity(tiles.len());
        let mut start_positions = Vec::new();
        let mut targets = Vec::new();
        for tile in &tiles {
            if !size.contains(&tile.position) {
                return Err(MapError::TileOutOfBounds(tile.position));
            }
            if !seen.insert(tile.position) {
                return Err(MapError::DuplicateTile(tile.position));
            }
            if tile.height < 0 {
                return Err(MapError::NegativeHeight(tile.position));
            }
            match tile.tile_type {
                TileType::Start => start_positions.push(tile.position),
                TileType::Target => targets.push(tile.position),
                TileType::Default | TileType::Fuel => {}
            }
        }

        if targets.len() != 1 {
            return Err(MapError::TargetCount(targets.len()));
        }
        if start_positions.is_empty() {
            return Err(MapError::NoStartPosition);
        }

        Ok(Self {
            id,
            name: name.into(),
            size,
            max_robot_fuel,
            solar_charge_rate,
            tiles,
            start_positions,
            target_position: targets[0],
        })
    }

    /// Stand-in before the first PREPARE: no tiles, every position invalid
    fn placeholder() -> Self {
        Self {
            id: 0,
            name: "init".to_string(),
            size: Size::new(0, 0),
            max_robot_fuel: 0,
            solar_charge_rate: 0.0,
            tiles: Vec::new(),
            start_positions: Vec::new(),
            target_position: Position::new(0, 0),
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn start_positions(&self) -> &[Position] {
        &self.start_positions
    }

    pub fn target_position(&self) -> Position {
        self.target_position
    }
}

/// Tiles found by an area scan together with the fuel the scan costs
#[derive(Debug, Clone, PartialEq)]
pub struct ScanArea {
    pub tiles: Vec<Tile>,
    pub fuel_cost: u32,
}

/// The currently loaded map with an O(1) grid index
#[derive(Debug)]
pub struct LoadedMap {
    map: Map,
    /// Indexed as `grid[y][x]`
    grid: Vec<Vec<Tile>>,
    tile_scan_cost: f64,
}

impl LoadedMap {
    fn new(map: Map, tile_scan_cost: f64) -> Self {
        let width = map.size.width.max(0) as usize;
        let height = map.size.height.max(0) as usize;
        let mut grid = vec![vec![Tile::new(Position::new(0, 0), 0, TileType::Default); width]; height];
        for tile in map.tiles() {
            grid[tile.position.y as usize][tile.position.x as usize] = *tile;
        }

        Self {
            map,
            grid,
            tile_scan_cost,
        }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn size(&self) -> Size {
        self.map.size
    }

    pub fn is_position_valid(&self, position: &Position) -> bool {
        self.map.size.contains(position)
    }

    /// Tile lookup, out-of-bounds positions are rejected
    pub fn tile_at(&self, position: &Position) -> Result<&Tile, GameError> {
        if !self.is_position_valid(position) {
            return Err(GameError::PositionOutOfMap(format!(
                "Position {} is not in map bounds.",
                position
            )));
        }
        Ok(&self.grid[position.y as usize][position.x as usize])
    }

    /// Fuel needed to move between two tiles. Rolling downhill costs nothing extra.
    pub fn fuel_cost(&self, from: &Position, to: &Position) -> Result<u32, GameError> {
        let from_height = self.tile_at(from)?.height;
        let to_height = self.tile_at(to)?.height;
        Ok(STATIC_FUEL_COST + (to_height - from_height).max(0) as u32)
    }

    /// All valid tiles within Manhattan `distance` of `center`.
    ///
    /// The cost is charged for the whole bounding square, including cells
    /// outside the map or outside the diamond, which are never returned.
    pub fn tiles_in_radius(&self, center: &Position, distance: u32) -> ScanArea {
        // f64 keeps huge radii finite, the cast saturates at u32::MAX
        let side = 2.0 * f64::from(distance) + 1.0;
        let fuel_cost = (side * side * self.tile_scan_cost).ceil() as u32;

        // Only the part of the square that overlaps the grid can yield tiles
        let reach = i64::from(distance);
        let size = self.map.size;
        let min_x = (i64::from(center.x) - reach).max(0);
        let max_x = (i64::from(center.x) + reach).min(i64::from(size.width) - 1);
        let min_y = (i64::from(center.y) - reach).max(0);
        let max_y = (i64::from(center.y) + reach).min(i64::from(size.height) - 1);

        let mut tiles = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let tile = &self.grid[y as usize][x as usize];
                if tile.position.distance_to(center) <= distance {
                    tiles.push(*tile);
                }
            }
        }

        ScanArea { tiles, fuel_cost }
    }

    pub fn start_positions(&self) -> &[Position] {
        self.map.start_positions()
    }

    pub fn target_position(&self) -> Position {
        self.map.target_position()
    }

    pub fn max_fuel_capacity(&self) -> u32 {
        self.map.max_robot_fuel
    }

    pub fn is_solar_charge_possible(&self) -> bool {
        self.map.solar_charge_rate > 0.0
    }

    pub fn solar_charge_rate(&self) -> f64 {
        self.map.solar_charge_rate
    }

    /// Lowest and highest tile of the map
    pub fn height_range(&self) -> Option<(i32, i32)> {
        let min = self.map.tiles().iter().map(|t| t.height).min()?;
        let max = self.map.tiles().iter().map(|t| t.height).max()?;
        Some((min, max))
    }
}

/// Owner of the loaded map. Replaced wholesale at PREPARE, read-only otherwise.
pub struct MapHandler {
    current: RwLock<LoadedMap>,
    tile_scan_cost: f64,
}

impl MapHandler {
    pub fn new(tile_scan_cost: f64) -> Self {
        Self {
            current: RwLock::new(LoadedMap::new(Map::placeholder(), tile_scan_cost)),
            tile_scan_cost,
        }
    }

    /// Replace the active map and rebuild the grid index
    pub fn load_map(&self, map: Map) {
        let loaded = LoadedMap::new(map, self.tile_scan_cost);
        info!(
            map_id = loaded.map.id,
            map_name = %loaded.map.name,
            width = loaded.map.size.width,
            height = loaded.map.size.height,
            "Map loaded"
        );
        *self.current.write() = loaded;
    }

    /// Shared read access for multi-query operations
    pub fn read(&self) -> RwLockReadGuard<'_, LoadedMap> {
        self.current.read()
    }

    pub fn is_position_valid(&self, position: &Position) -> bool {
        self.read().is_position_valid(position)
    }

    pub fn fuel_cost(&self, from: &Position, to: &Position) -> Result<u32, GameError> {
        self.read().fuel_cost(from, to)
    }

    pub fn tiles_in_radius(&self, center: &Position, distance: u32) -> ScanArea {
        self.read().tiles_in_radius(center, distance)
    }

    pub fn start_positions(&self) -> Vec<Position> {
        self.read().start_positions().to_vec()
    }

    pub fn target_position(&self) -> Position {
        self.read().target_position()
    }

    pub fn max_fuel_capacity(&self) -> u32 {
        self.read().max_fuel_capacity()
    }

    pub fn is_solar_charge_possible(&self) -> bool {
        self.read().is_solar_charge_possible()
    }

    pub fn solar_charge_rate(&self) -> f64 {
        self.read().solar_charge_rate()
    }

    pub fn height_range(&self) -> Option<(i32, i32)> {
        self.read().height_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MapBuilder;

    fn handler_with(map: Map) -> MapHandler {
        let handler = MapHandler::new(DEFAULT_TILE_SCAN_COST);
        handler.load_map(map);
        handler
    }

    #[test]
    fn fuel_cost_adds_only_uphill_delta() {
        let map = MapBuilder::new(2, 1)
            .tile(0, 0, 3, TileType::Start)
            .tile(1, 0, 10, TileType::Target)
            .build();
        let handler = handler_with(map);
        let low = Position::new(0, 0);
        let high = Position::new(1, 0);

        assert_eq!(handler.fuel_cost(&low, &high).unwrap(), STATIC_FUEL_COST + 7);
        assert_eq!(handler.fuel_cost(&high, &low).unwrap(), STATIC_FUEL_COST);
        assert!(
            handler.fuel_cost(&low, &high).unwrap() + handler.fuel_cost(&high, &low).unwrap()
                >= 2 * STATIC_FUEL_COST
        );
    }

    #[test]
    fn fuel_cost_flat_is_static() {
        let handler = handler_with(MapBuilder::new(3, 3).build());
        let cost = handler
            .fuel_cost(&Position::new(1, 1), &Position::new(1, 2))
            .unwrap();
        assert_eq!(cost, STATIC_FUEL_COST);
    }

    #[test]
    fn fuel_cost_out_of_bounds_is_rejected() {
        let handler = handler_with(MapBuilder::new(2, 2).build());
        let result = handler.fuel_cost(&Position::new(0, 0), &Position::new(-1, 0));
        assert!(matches!(result, Err(GameError::PositionOutOfMap(_))));
    }

    #[test]
    fn tiles_in_radius_returns_diamond() {
        let handler = handler_with(MapBuilder::new(5, 5).build());
        let area = handler.tiles_in_radius(&Position::new(2, 2), 1);

        let mut positions: Vec<Position> = area.tiles.iter().map(|t| t.position).collect();
        positions.sort_by_key(|p| (p.y, p.x));
        assert_eq!(
            positions,
            vec![
                Position::new(2, 1),
                Position::new(1, 2),
                Position::new(2, 2),
                Position::new(3, 2),
                Position::new(2, 3),
            ]
        );
        // 3x3 square at 0.1 per cell
        assert_eq!(area.fuel_cost, 1);
    }

    #[test]
    fn tiles_in_radius_charges_cells_outside_the_map() {
        let handler = handler_with(MapBuilder::new(5, 5).build());
        let corner = handler.tiles_in_radius(&Position::new(0, 0), 2);
        let center = handler.tiles_in_radius(&Position::new(2, 2), 2);

        assert_eq!(corner.tiles.len(), 6);
        assert_eq!(center.tiles.len(), 13);
        // ceil(25 * 0.1) regardless of how many cells were valid
        assert_eq!(corner.fuel_cost, 3);
        assert_eq!(center.fuel_cost, 3);
    }

    #[test]
    fn tiles_in_radius_uses_configured_scan_cost() {
        let handler = MapHandler::new(0.15);
        handler.load_map(MapBuilder::new(5, 5).build());

        assert_eq!(handler.tiles_in_radius(&Position::new(2, 2), 0).fuel_cost, 1);
        assert_eq!(handler.tiles_in_radius(&Position::new(2, 2), 1).fuel_cost, 2);
        assert_eq!(handler.tiles_in_radius(&Position::new(2, 2), 2).fuel_cost, 4);
    }

    #[test]
    fn tiles_in_radius_zero_is_the_center_only() {
        let handler = handler_with(MapBuilder::new(3, 3).build());
        let area = handler.tiles_in_radius(&Position::new(1, 1), 0);
        assert_eq!(area.tiles.len(), 1);
        assert_eq!(area.tiles[0].position, Position::new(1, 1));
    }

    #[test]
    fn tiles_in_radius_saturates_huge_scan_costs() {
        let handler = handler_with(MapBuilder::new(3, 3).build());

        let area = handler.tiles_in_radius(&Position::new(1, 1), 1 << 31);
        assert_eq!(area.tiles.len(), 9);
        assert_eq!(area.fuel_cost, u32::MAX);

        let area = handler.tiles_in_radius(&Position::new(1, 1), u32::MAX);
        assert_eq!(area.tiles.len(), 9);
        assert_eq!(area.fuel_cost, u32::MAX);
    }

    #[test]
    fn position_validity_follows_bounds() {
        let handler = handler_with(MapBuilder::new(3, 2).build());
        assert!(handler.is_position_valid(&Position::new(0, 0)));
        assert!(handler.is_position_valid(&Position::new(2, 1)));
        assert!(!handler.is_position_valid(&Position::new(3, 1)));
        assert!(!handler.is_position_valid(&Position::new(0, 2)));
        assert!(!handler.is_position_valid(&Position::new(-1, 0)));
    }

    #[test]
    fn nothing_is_valid_before_the_first_load() {
        let handler = MapHandler::new(DEFAULT_TILE_SCAN_COST);
        assert!(!handler.is_position_valid(&Position::new(0, 0)));
        assert!(handler.tiles_in_radius(&Position::new(0, 0), 1).tiles.is_empty());
        assert!(handler.start_positions().is_empty());
    }

    #[test]
    fn load_map_replaces_previous_map() {
        let handler = handler_with(MapBuilder::new(2, 2).max_fuel(100).build());
        handler.load_map(
            MapBuilder::new(4, 4)
                .max_fuel(250)
                .solar_charge_rate(0.2)
                .build(),
        );

        assert!(handler.is_position_valid(&Position::new(3, 3)));
        assert_eq!(handler.max_fuel_capacity(), 250);
        assert!(handler.is_solar_charge_possible());
        assert_eq!(handler.solar_charge_rate(), 0.2);
        assert_eq!(handler.target_position(), Position::new(3, 3));
    }

    #[test]
    fn height_range_spans_all_tiles() {
        let map = MapBuilder::new(2, 2)
            .tile(0, 1, 7, TileType::Default)
            .tile(1, 0, 2, TileType::Fuel)
            .build();
        let handler = handler_with(map);
        assert_eq!(handler.height_range(), Some((0, 7)));
    }

    #[test]
    fn map_rejects_missing_target() {
        let tiles = vec![
            Tile::new(Position::new(0, 0), 0, TileType::Start),
            Tile::new(Position::new(1, 0), 0, TileType::Default),
        ];
        let result = Map::new(1, "broken", Size::new(2, 1), tiles, 100, 0.0);
        assert_eq!(result.unwrap_err(), MapError::TargetCount(0));
    }

    #[test]
    fn map_rejects_duplicate_and_missing_tiles() {
        let tiles = vec![
            Tile::new(Position::new(0, 0), 0, TileType::Start),
            Tile::new(Position::new(0, 0), 0, TileType::Target),
        ];
        let result = Map::new(1, "broken", Size::new(2, 1), tiles, 100, 0.0);
        assert_eq!(result.unwrap_err(), MapError::DuplicateTile(Position::new(0, 0)));

        let tiles = vec![Tile::new(Position::new(0, 0), 0, TileType::Start)];
        let result = Map::new(1, "broken", Size::new(2, 1), tiles, 100, 0.0);
        assert!(matches!(result, Err(MapError::TileCount { expected: 2, actual: 1 })));
    }

    #[test]
    fn map_rejects_missing_start() {
        let tiles = vec![
            Tile::new(Position::new(0, 0), 0, TileType::Default),
            Tile::new(Position::new(1, 0), 0, TileType::Target),
        ];
        let result = Map::new(1, "broken", Size::new(2, 1), tiles, 100, 0.0);
        assert_eq!(result.unwrap_err(), MapError::NoStartPosition);
    }

    #[test]
    fn direction_steps() {
        let origin = Position::new(1, 1);
        assert_eq!(origin.step(Direction::North), Position::new(1, 0));
        assert_eq!(origin.step(Direction::South), Position::new(1, 2));
        assert_eq!(origin.step(Direction::East), Position::new(2, 1));
        assert_eq!(origin.step(Direction::West), Position::new(0, 1));
    }
}
