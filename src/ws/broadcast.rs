//! Fan-out of game events to connected clients

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::game::{ActiveRobot, GameState, Tile};
use crate::ws::protocol::ServerMsg;

/// Capacity of every push channel, slow clients skip what they missed
const CHANNEL_CAPACITY: usize = 256;

/// Push-only sink for game events. Fire and forget.
pub trait Broadcaster: Send + Sync {
    /// Public robot view to every observer
    fn robot_public_update(&self, robot: &ActiveRobot);

    /// Full robot state to its owner only
    fn robot_private_update(&self, robot: &ActiveRobot);

    fn game_state_update(&self, state: GameState);

    fn turn_update(&self, turn: u32);

    /// Discovered positions to the robot's owner
    fn known_positions_update(&self, robot: &ActiveRobot);

    /// Globally known tiles to every observer
    fn map_tile_update(&self, tiles: Vec<Tile>);
}

/// Broadcaster over tokio broadcast channels.
///
/// One public channel for everyone plus one channel per connected user for
/// private robot state.
pub struct ChannelBroadcaster {
    public: broadcast::Sender<ServerMsg>,
    users: DashMap<Uuid, broadcast::Sender<ServerMsg>>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        let (public, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            public,
            users: DashMap::new(),
        }
    }

    pub fn subscribe_public(&self) -> broadcast::Receiver<ServerMsg> {
        self.public.subscribe()
    }

    /// Private channel of a user, created on first subscription
    pub fn subscribe_user(&self, user_id: Uuid) -> broadcast::Receiver<ServerMsg> {
        self.users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the private channel once the user's last connection is gone
    pub fn release_user(&self, user_id: Uuid) {
        self.users
            .remove_if(&user_id, |_, sender| sender.receiver_count() == 0);
    }

    fn send_public(&self, msg: ServerMsg) {
        // No receivers is not an error, nobody is watching
        if self.public.send(msg).is_err() {
            trace!("No public subscribers");
        }
    }

    fn send_to_user(&self, user_id: Uuid, msg: ServerMsg) {
        if let Some(sender) = self.users.get(&user_id) {
            let _ = sender.send(msg);
        }
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn robot_public_update(&self, robot: &ActiveRobot) {
        self.send_public(ServerMsg::RobotUpdate {
            robot: robot.public(),
        });
    }

    fn robot_private_update(&self, robot: &ActiveRobot) {
        self.send_to_user(
            robot.owner.id,
            ServerMsg::RobotData {
                robot: robot.clone(),
            },
        );
    }

    fn game_state_update(&self, state: GameState) {
        self.send_public(ServerMsg::GameState { state });
    }

    fn turn_update(&self, turn: u32) {
        self.send_public(ServerMsg::Turn { turn });
    }

    fn known_positions_update(&self, robot: &ActiveRobot) {
        self.send_to_user(
            robot.owner.id,
            ServerMsg::KnownPositions {
                robot_id: robot.id,
                positions: robot.known_positions.iter().copied().collect(),
            },
        );
    }

    fn map_tile_update(&self, tiles: Vec<Tile>) {
        self.send_public(ServerMsg::MapTiles { tiles });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Position;
    use crate::testing::robot_info;

    #[tokio::test]
    async fn private_updates_reach_only_the_owner() {
        let broadcaster = ChannelBroadcaster::new();
        let robot = ActiveRobot::new(robot_info(1), 10, Position::new(0, 0));
        let mut owner = broadcaster.subscribe_user(robot.owner.id);
        let mut stranger = broadcaster.subscribe_user(Uuid::new_v4());

        broadcaster.robot_private_update(&robot);

        match owner.recv().await.unwrap() {
            ServerMsg::RobotData { robot: sent } => assert_eq!(sent.id, 1),
            other => panic!("unexpected message {other:?}"),
        }
        assert!(stranger.try_recv().is_err());
    }

    #[tokio::test]
    async fn public_updates_reach_every_subscriber() {
        let broadcaster = ChannelBroadcaster::new();
        let mut first = broadcaster.subscribe_public();
        let mut second = broadcaster.subscribe_public();

        broadcaster.turn_update(3);

        assert!(matches!(first.recv().await.unwrap(), ServerMsg::Turn { turn: 3 }));
        assert!(matches!(second.recv().await.unwrap(), ServerMsg::Turn { turn: 3 }));
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        let broadcaster = ChannelBroadcaster::new();
        broadcaster.game_state_update(GameState::Prepare);
        broadcaster.map_tile_update(Vec::new());
    }

    #[test]
    fn released_user_channel_is_dropped() {
        let broadcaster = ChannelBroadcaster::new();
        let user = Uuid::new_v4();
        let receiver = broadcaster.subscribe_user(user);
        broadcaster.release_user(user);
        assert!(broadcaster.users.contains_key(&user));

        drop(receiver);
        broadcaster.release_user(user);
        assert!(!broadcaster.users.contains_key(&user));
    }
}
