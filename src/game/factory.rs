//! Game construction for freshly matched players

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::matchmaking::queue::QueuedPlayer;
use crate::scheduler::TaskSink;
use crate::ws::protocol::TeamColor;

use super::player::Controller;
use super::session::{GameRules, GameSession};
use super::world::{MapInfo, PathTrimmer};

/// Builds a populated game from a list of matched players
pub trait GameFactory: Send + Sync {
    fn create_game(&self, name: String, players: Vec<QueuedPlayer>) -> GameSession;
}

/// Humans, then robots, then one flag per team
pub struct StandardGameFactory {
    pub map: Arc<MapInfo>,
    pub trimmer: Arc<dyn PathTrimmer>,
    pub tasks: Arc<dyn TaskSink>,
    pub rules: GameRules,
    pub robots_per_game: usize,
    pub robot_move_delay: Duration,
}

impl GameFactory for StandardGameFactory {
    fn create_game(&self, name: String, players: Vec<QueuedPlayer>) -> GameSession {
        let mut game = GameSession::new(
            Uuid::new_v4(),
            name,
            self.map.clone(),
            self.trimmer.clone(),
            self.tasks.clone(),
            self.rules,
            rand::random::<u64>(),
        );

        for player in players {
            let controller = Controller::Human {
                outbound: player.outbound,
            };
            if let Err(e) = game.add_player(player.player_id, player.name, controller) {
                warn!(player_id = player.player_id, error = %e, "Could not seat player");
            }
        }

        for n in 1..=self.robots_per_game {
            let id = -(n as i32);
            let controller = Controller::Robot {
                move_delay: self.robot_move_delay,
            };
            if let Err(e) = game.add_player(id, format!("Robot{n}"), controller) {
                warn!(player_id = id, error = %e, "Could not seat robot");
            }
        }

        game.add_flag(TeamColor::Red);
        game.add_flag(TeamColor::Blue);
        game
    }
}
