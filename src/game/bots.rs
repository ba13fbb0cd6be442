//! In-process dummy bots for test rounds
//!
//! Each bot plays one robot through the same facade calls a remote player
//! uses. They tick once a second and react to the current phase.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::action::RobotAction;
use super::handler::GameHandler;
use super::map::{Direction, Position};
use super::robot::{ActiveRobot, RobotId};
use super::state::GameState;
use super::GameError;

const BOT_TICK: Duration = Duration::from_secs(1);

/// Bots only join rounds with fewer active robots than this
const PARTICIPATE_BELOW: usize = 5;

/// Submission attempts per tick
const MAX_TRIES: usize = 10;

/// Tiles a wanderer avoids stepping back onto
const MEMORY: usize = 3;

/// Clockwise, so turning is `heading + 1`
const HEADINGS: [Direction; 4] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Random moves, avoiding the last few tiles
    Wanderer,
    /// Keeps its heading and turns clockwise at the border
    WallHugger,
    /// Registers and never acts
    Chiller,
    /// Greedy step towards the target, cheapest among equally close ones
    Seeker,
    /// Follows the cheapest fuel path to the target
    Pathfinder,
}

impl Strategy {
    /// Assignment order for configured bot robots
    pub const ROTATION: [Strategy; 5] = [
        Strategy::WallHugger,
        Strategy::Wanderer,
        Strategy::Chiller,
        Strategy::Seeker,
        Strategy::Pathfinder,
    ];

    fn charges_when_stuck(self) -> bool {
        matches!(self, Strategy::Seeker | Strategy::Pathfinder)
    }
}

pub struct Bot {
    robot_id: RobotId,
    strategy: Strategy,
    participating: bool,
    recent: VecDeque<Position>,
    heading: usize,
    rng: ChaCha8Rng,
}

impl Bot {
    pub fn new(robot_id: RobotId, strategy: Strategy, mut rng: ChaCha8Rng) -> Self {
        let heading = rng.gen_range(0..HEADINGS.len());
        Self {
            robot_id,
            strategy,
            participating: false,
            recent: VecDeque::with_capacity(MEMORY + 1),
            heading,
            rng,
        }
    }

    /// Do whatever the phase allows. Rejections are logged, never fatal.
    pub async fn act(&mut self, game: &GameHandler, phase: GameState) {
        let result = match phase {
            GameState::WaitForPlayers => self.participate(game).await,
            GameState::WaitForAction => match game.active_robot(self.robot_id) {
                Some(robot) if robot.next_action.is_none() && robot.fuel > 0 => {
                    self.plan(game, &robot)
                }
                _ => Ok(()),
            },
            GameState::Ended => {
                self.reset();
                Ok(())
            }
            GameState::Prepare | GameState::Action => Ok(()),
        };

        if let Err(e) = result {
            warn!(
                robot_id = self.robot_id,
                strategy = ?self.strategy,
                error = %e,
                "Dummy bot could not act"
            );
        }
    }

    async fn participate(&mut self, game: &GameHandler) -> Result<(), GameError> {
        if self.participating || game.active_robots().len() >= PARTICIPATE_BELOW {
            return Ok(());
        }
        game.register_robot_for_next_game(self.robot_id).await?;
        self.participating = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.participating = false;
        self.recent.clear();
        self.heading = self.rng.gen_range(0..HEADINGS.len());
    }

    fn plan(&mut self, game: &GameHandler, robot: &ActiveRobot) -> Result<(), GameError> {
        for _ in 0..MAX_TRIES {
            let Some(action) = self.choose(game, robot) else {
                return Ok(());
            };

            match game.next_action_for_robot(robot.id, action) {
                Ok(_) => {
                    self.remember(robot.position);
                    return Ok(());
                }
                Err(GameError::PositionOutOfMap(_)) => {
                    if self.strategy == Strategy::WallHugger {
                        self.heading = (self.heading + 1) % HEADINGS.len();
                    }
                }
                Err(GameError::InsufficientFuel(_)) if self.strategy.charges_when_stuck() => {
                    return match game.next_action_for_robot(robot.id, RobotAction::SolarCharge) {
                        Ok(_) | Err(GameError::ActionDeniedByConfig(_)) => Ok(()),
                        Err(e) => Err(e),
                    };
                }
                Err(GameError::PositionNotAllowed(_)) | Err(GameError::InsufficientFuel(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn choose(&mut self, game: &GameHandler, robot: &ActiveRobot) -> Option<RobotAction> {
        let direction = match self.strategy {
            Strategy::Chiller => return None,
            Strategy::Wanderer => {
                let fresh: Vec<Direction> = HEADINGS
                    .iter()
                    .copied()
                    .filter(|d| !self.recent.contains(&robot.position.step(*d)))
                    .collect();
                let pool = if fresh.is_empty() { &HEADINGS[..] } else { &fresh[..] };
                *pool.choose(&mut self.rng)?
            }
            Strategy::WallHugger => HEADINGS[self.heading],
            Strategy::Seeker => seek(game, robot),
            Strategy::Pathfinder => {
                cheapest_first_step(game, robot).unwrap_or_else(|| seek(game, robot))
            }
        };
        Some(RobotAction::Move { direction })
    }

    fn remember(&mut self, position: Position) {
        self.recent.push_front(position);
        self.recent.truncate(MEMORY);
    }
}

/// Closest reachable neighbour of the target, or a blind step towards it
fn seek(game: &GameHandler, robot: &ActiveRobot) -> Direction {
    let target = game.target_position();
    HEADINGS
        .iter()
        .copied()
        .filter_map(|direction| {
            let next = robot.position.step(direction);
            game.check_position_for_move(&next).ok()?;
            let cost = game.fuel_cost_for_move(&robot.position, &next).ok()?;
            (cost <= robot.fuel).then_some((next.distance_to(&target), cost, direction))
        })
        .min_by_key(|&(distance, cost, _)| (distance, cost))
        .map(|(_, _, direction)| direction)
        .unwrap_or_else(|| toward(robot.position, target))
}

fn toward(from: Position, to: Position) -> Direction {
    if to.x > from.x {
        Direction::East
    } else if to.x < from.x {
        Direction::West
    } else if to.y > from.y {
        Direction::South
    } else {
        Direction::North
    }
}

/// A* over fuel cost. Manhattan distance is admissible since every move
/// costs at least one.
fn cheapest_first_step(game: &GameHandler, robot: &ActiveRobot) -> Option<Direction> {
    let start = robot.position;
    let target = game.target_position();

    let mut open = BinaryHeap::new();
    let mut best: HashMap<Position, u64> = HashMap::from([(start, 0)]);
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    open.push(Reverse((u64::from(start.distance_to(&target)), 0u64, start.x, start.y)));

    while let Some(Reverse((_, cost, x, y))) = open.pop() {
        let current = Position::new(x, y);
        if current == target {
            return first_step(&came_from, start, target).map(|step| toward(start, step));
        }
        if best.get(&current).is_some_and(|&known| cost > known) {
            continue;
        }

        for direction in HEADINGS {
            let next = current.step(direction);
            if game.check_position_for_move(&next).is_err() {
                continue;
            }
            let Ok(step_cost) = game.fuel_cost_for_move(&current, &next) else {
                continue;
            };
            if step_cost > robot.fuel {
                continue;
            }

            let tentative = cost + u64::from(step_cost);
            if best.get(&next).map_or(true, |&known| tentative < known) {
                best.insert(next, tentative);
                came_from.insert(next, current);
                let estimate = tentative + u64::from(next.distance_to(&target));
                open.push(Reverse((estimate, tentative, next.x, next.y)));
            }
        }
    }
    None
}

fn first_step(
    came_from: &HashMap<Position, Position>,
    start: Position,
    target: Position,
) -> Option<Position> {
    let mut step = target;
    while let Some(&parent) = came_from.get(&step) {
        if parent == start {
            return Some(step);
        }
        step = parent;
    }
    None
}

/// The configured bots, ticking in the background
pub struct DummyBots {
    game: Arc<GameHandler>,
    bots: Vec<Bot>,
}

impl DummyBots {
    /// One bot per robot id, strategies assigned in `Strategy::ROTATION` order
    pub fn new(game: Arc<GameHandler>, robot_ids: &[RobotId]) -> Self {
        let bots = robot_ids
            .iter()
            .zip(Strategy::ROTATION.iter().cycle())
            .map(|(&robot_id, &strategy)| Bot::new(robot_id, strategy, ChaCha8Rng::from_entropy()))
            .collect();
        Self { game, bots }
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(bots = self.bots.len(), "Dummy bots started");
            let mut interval = tokio::time::interval(BOT_TICK);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    pub async fn tick(&mut self) {
        let phase = self.game.state().current_state();
        for bot in &mut self.bots {
            bot.act(&self.game, phase).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameDefaults;
    use crate::game::map::{TileType, DEFAULT_TILE_SCAN_COST};
    use crate::game::Map;
    use crate::settings::SettingsStore;
    use crate::testing::{MapBuilder, MemoryStore, RecordingBroadcaster};

    /// Prepared round waiting for players, with the given robots known
    async fn open_round(map: Map, robot_ids: &[RobotId]) -> Arc<GameHandler> {
        let store = MemoryStore::with_map(map);
        for &id in robot_ids {
            store.add_robot(id);
        }
        let game = Arc::new(GameHandler::new(
            Arc::new(SettingsStore::new(&GameDefaults::default())),
            store.stores(),
            Arc::new(RecordingBroadcaster::default()),
            DEFAULT_TILE_SCAN_COST,
        ));
        game.state().set_state(GameState::Prepare).unwrap();
        game.prepare_new_game().await.unwrap();
        game.state().set_state(GameState::WaitForPlayers).unwrap();
        game
    }

    fn bot(robot_id: RobotId, strategy: Strategy) -> Bot {
        Bot::new(robot_id, strategy, ChaCha8Rng::seed_from_u64(robot_id as u64))
    }

    /// Register the bot, open the action phase and let it plan once
    async fn planned_action(game: &GameHandler, bot: &mut Bot) -> Option<RobotAction> {
        bot.act(game, GameState::WaitForPlayers).await;
        game.state().set_state(GameState::WaitForAction).unwrap();
        bot.act(game, GameState::WaitForAction).await;
        game.active_robot(bot.robot_id).and_then(|r| r.next_action)
    }

    fn ridge_map() -> Map {
        MapBuilder::new(3, 3)
            .tile(1, 0, 50, TileType::Default)
            .tile(2, 0, 0, TileType::Target)
            .tile(2, 2, 0, TileType::Default)
            .build()
    }

    #[tokio::test]
    async fn bots_register_once_while_waiting_for_players() {
        let map = MapBuilder::new(3, 3)
            .tile(1, 0, 0, TileType::Start)
            .tile(2, 0, 0, TileType::Start)
            .build();
        let game = open_round(map, &[1, 2, 3]).await;
        let mut bots = DummyBots::new(game.clone(), &[1, 2, 3]);
        assert_eq!(bots.bots[0].strategy, Strategy::WallHugger);
        assert_eq!(bots.bots[2].strategy, Strategy::Chiller);

        bots.tick().await;
        assert_eq!(game.active_robots().len(), 3);
        assert!(bots.bots.iter().all(|b| b.participating));

        bots.tick().await;
        assert_eq!(game.active_robots().len(), 3);
    }

    #[tokio::test]
    async fn bots_stay_out_of_a_busy_round() {
        let mut map = MapBuilder::new(6, 2);
        for x in 0..6 {
            map = map.tile(x, 0, 0, TileType::Start);
        }
        let game = open_round(map.build(), &[1, 2, 3, 4, 5, 6]).await;
        for id in 1..=5 {
            game.register_robot_for_next_game(id).await.unwrap();
        }

        let mut late = bot(6, Strategy::Wanderer);
        late.act(&game, GameState::WaitForPlayers).await;

        assert!(!late.participating);
        assert!(game.active_robot(6).is_none());
    }

    #[tokio::test]
    async fn chiller_never_submits() {
        let game = open_round(MapBuilder::new(3, 3).build(), &[1]).await;
        let mut chiller = bot(1, Strategy::Chiller);

        assert_eq!(planned_action(&game, &mut chiller).await, None);
        assert!(game.active_robot(1).is_some());
    }

    #[tokio::test]
    async fn wall_hugger_turns_away_from_the_border() {
        let game = open_round(MapBuilder::new(3, 3).build(), &[1]).await;
        let mut hugger = bot(1, Strategy::WallHugger);

        let action = planned_action(&game, &mut hugger).await;

        assert!(matches!(
            action,
            Some(RobotAction::Move {
                direction: Direction::East | Direction::South
            })
        ));
    }

    #[tokio::test]
    async fn wanderer_remembers_where_it_came_from() {
        let game = open_round(MapBuilder::new(3, 3).build(), &[1]).await;
        let mut wanderer = bot(1, Strategy::Wanderer);

        let action = planned_action(&game, &mut wanderer).await;

        assert!(matches!(
            action,
            Some(RobotAction::Move {
                direction: Direction::East | Direction::South
            })
        ));
        assert_eq!(wanderer.recent, VecDeque::from([Position::new(0, 0)]));
    }

    #[tokio::test]
    async fn seeker_takes_the_closest_step() {
        let game = open_round(MapBuilder::new(4, 1).build(), &[1]).await;
        let mut seeker = bot(1, Strategy::Seeker);

        assert_eq!(
            planned_action(&game, &mut seeker).await,
            Some(RobotAction::Move {
                direction: Direction::East
            })
        );
    }

    #[tokio::test]
    async fn seeker_charges_when_no_step_is_affordable() {
        let map = MapBuilder::new(2, 1)
            .tile(1, 0, 500, TileType::Target)
            .max_fuel(100)
            .solar_charge_rate(0.1)
            .build();
        let game = open_round(map, &[1]).await;
        let mut seeker = bot(1, Strategy::Seeker);

        assert_eq!(
            planned_action(&game, &mut seeker).await,
            Some(RobotAction::SolarCharge)
        );
    }

    #[tokio::test]
    async fn seeker_climbs_the_ridge() {
        let game = open_round(ridge_map(), &[1]).await;
        let mut seeker = bot(1, Strategy::Seeker);

        assert_eq!(
            planned_action(&game, &mut seeker).await,
            Some(RobotAction::Move {
                direction: Direction::East
            })
        );
    }

    #[tokio::test]
    async fn pathfinder_walks_around_the_ridge() {
        let game = open_round(ridge_map(), &[1]).await;
        let mut pathfinder = bot(1, Strategy::Pathfinder);

        assert_eq!(
            planned_action(&game, &mut pathfinder).await,
            Some(RobotAction::Move {
                direction: Direction::South
            })
        );
    }

    #[tokio::test]
    async fn ended_round_resets_the_bot() {
        let game = open_round(MapBuilder::new(3, 3).build(), &[1]).await;
        let mut wanderer = bot(1, Strategy::Wanderer);
        planned_action(&game, &mut wanderer).await;

        wanderer.act(&game, GameState::Ended).await;

        assert!(!wanderer.participating);
        assert!(wanderer.recent.is_empty());
    }
}
