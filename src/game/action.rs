//! Player actions: validation and execution against the game world

use std::fmt;

use serde::{Deserialize, Serialize};

use super::map::{Direction, Position, ScanArea, Tile, TileType};
use super::robot::ActiveRobot;
use super::GameError;

/// World queries and side effects an action needs.
///
/// Implemented per turn by the game handler so actions never touch the
/// shared locks themselves.
pub trait GameWorld {
    /// Rejects targets outside the map or occupied once pending moves ran
    fn check_position_for_move(&self, position: &Position) -> Result<(), GameError>;

    fn fuel_cost(&self, from: &Position, to: &Position) -> Result<u32, GameError>;

    fn tile_at(&self, position: &Position) -> Result<Tile, GameError>;

    fn tiles_in_radius(&self, center: &Position, distance: u32) -> ScanArea;

    /// Tiles revealed for free around a robot after it moved
    fn tiles_in_sight(&self, position: &Position) -> Vec<Tile>;

    fn all_tiles(&self) -> Vec<Tile>;

    fn is_solar_charge_possible(&self) -> bool;

    fn solar_charge_rate(&self) -> f64;

    fn is_full_map_scan_allowed(&self) -> bool;

    /// Push the robot's new public and private state to observers
    fn send_robot_update(&self, robot: &ActiveRobot);
}

/// A command submitted by a player for the next turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotAction {
    Move { direction: Direction },
    Scan { distance: u32 },
    Wait,
    Refuel,
    SolarCharge,
    FullMapScan,
}

/// Outcome of an executed action, kept for client display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionResult {
    /// Tiles revealed by a move or a scan
    Tiles { tiles: Vec<Tile> },
    /// Position the robot stayed on
    Stayed { position: Position },
    /// Fuel after refuelling or charging
    Fuel { fuel: u32 },
}

impl RobotAction {
    /// Validate against the current world without touching the robot
    pub fn check(&self, robot: &ActiveRobot, world: &dyn GameWorld) -> Result<(), GameError> {
        match *self {
            RobotAction::Move { direction } => check_move(robot, direction, world).map(|_| ()),
            RobotAction::Scan { distance } => check_scan(robot, distance, world).map(|_| ()),
            RobotAction::Wait => Ok(()),
            RobotAction::Refuel => check_refuel(robot, world),
            RobotAction::SolarCharge => check_solar_charge(world),
            RobotAction::FullMapScan => check_full_map_scan(world),
        }
    }

    /// Apply the action. Re-validates, so a stale check cannot corrupt the robot.
    pub fn execute(
        &self,
        robot: &mut ActiveRobot,
        world: &dyn GameWorld,
    ) -> Result<ActionResult, GameError> {
        match *self {
            RobotAction::Move { direction } => execute_move(robot, direction, world),
            RobotAction::Scan { distance } => execute_scan(robot, distance, world),
            RobotAction::Wait => Ok(ActionResult::Stayed {
                position: robot.position,
            }),
            RobotAction::Refuel => {
                check_refuel(robot, world)?;
                robot.fuel = robot.max_fuel();
                Ok(ActionResult::Fuel { fuel: robot.fuel })
            }
            RobotAction::SolarCharge => {
                check_solar_charge(world)?;
                let charge = (f64::from(robot.max_fuel()) * world.solar_charge_rate()).floor();
                robot.add_fuel(charge.max(0.0) as u32);
                Ok(ActionResult::Fuel { fuel: robot.fuel })
            }
            RobotAction::FullMapScan => {
                check_full_map_scan(world)?;
                let tiles = world.all_tiles();
                robot.known_positions.extend(tiles.iter().map(|t| t.position));
                world.send_robot_update(robot);
                Ok(ActionResult::Tiles { tiles })
            }
        }
    }
}

impl fmt::Display for RobotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotAction::Move { direction } => write!(f, "move {:?}", direction),
            RobotAction::Scan { distance } => write!(f, "scan {}", distance),
            RobotAction::Wait => f.write_str("wait"),
            RobotAction::Refuel => f.write_str("refuel"),
            RobotAction::SolarCharge => f.write_str("solar_charge"),
            RobotAction::FullMapScan => f.write_str("full_map_scan"),
        }
    }
}

fn insufficient_fuel(cost: u32, robot: &ActiveRobot) -> GameError {
    GameError::InsufficientFuel(format!(
        "Not enough fuel: action needs {} but robot has {}.",
        cost, robot.fuel
    ))
}

/// Returns the target and its fuel cost
fn check_move(
    robot: &ActiveRobot,
    direction: Direction,
    world: &dyn GameWorld,
) -> Result<(Position, u32), GameError> {
    let target = robot.position.step(direction);
    world.check_position_for_move(&target)?;

    let cost = world.fuel_cost(&robot.position, &target)?;
    if !robot.has_sufficient_fuel(cost) {
        return Err(insufficient_fuel(cost, robot));
    }
    Ok((target, cost))
}

fn execute_move(
    robot: &mut ActiveRobot,
    direction: Direction,
    world: &dyn GameWorld,
) -> Result<ActionResult, GameError> {
    // Occupancy was settled at submission, re-checking it here would
    // count the robot's own planned target against it.
    let target = robot.position.step(direction);
    let cost = world.fuel_cost(&robot.position, &target)?;
    if !robot.has_sufficient_fuel(cost) {
        return Err(insufficient_fuel(cost, robot));
    }

    robot.use_fuel(cost);
    robot.position = target;
    robot.known_positions.insert(target);
    let tiles = world.tiles_in_sight(&target);
    robot.known_positions.extend(tiles.iter().map(|t| t.position));
    world.send_robot_update(robot);

    Ok(ActionResult::Tiles { tiles })
}

fn check_scan(
    robot: &ActiveRobot,
    distance: u32,
    world: &dyn GameWorld,
) -> Result<ScanArea, GameError> {
    let area = world.tiles_in_radius(&robot.position, distance);
    if !robot.has_sufficient_fuel(area.fuel_cost) {
        return Err(insufficient_fuel(area.fuel_cost, robot));
    }
    Ok(area)
}

fn execute_scan(
    robot: &mut ActiveRobot,
    distance: u32,
    world: &dyn GameWorld,
) -> Result<ActionResult, GameError> {
    let area = check_scan(robot, distance, world)?;

    robot.use_fuel(area.fuel_cost);
    robot.known_positions.extend(area.tiles.iter().map(|t| t.position));
    world.send_robot_update(robot);

    Ok(ActionResult::Tiles { tiles: area.tiles })
}

fn check_refuel(robot: &ActiveRobot, world: &dyn GameWorld) -> Result<(), GameError> {
    let tile = world.tile_at(&robot.position)?;
    if tile.tile_type != TileType::Fuel {
        return Err(GameError::WrongTileType(format!(
            "Robot is not on a fuel tile at {}.",
            robot.position
        )));
    }
    Ok(())
}

fn check_solar_charge(world: &dyn GameWorld) -> Result<(), GameError> {
    if !world.is_solar_charge_possible() {
        return Err(GameError::ActionDeniedByConfig(
            "Solar charging is not possible on this map.".to_string(),
        ));
    }
    Ok(())
}

fn check_full_map_scan(world: &dyn GameWorld) -> Result<(), GameError> {
    if !world.is_full_map_scan_allowed() {
        return Err(GameError::ActionDeniedByConfig(
            "Full map scan is disabled.".to_string(),
        ));
    }
    Ok(())
}
