//! Per-player authoritative state

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::scheduler::{Task, TaskSink};
use crate::ws::protocol::TeamColor;

use super::combat::{CombatSystem, DamageResult};
use super::physics::{Coordinate, PhysicsSystem, FULL_HIT_POINTS};
use super::{FlagId, GameId, PlayerId};

/// Lifecycle of a snowman within a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Not playing (not ready yet, or the game is over)
    None,
    Stopped,
    Moving,
    /// Waiting for respawn
    Dead,
}

/// Who drives a snowman
#[derive(Debug, Clone)]
pub enum Controller {
    /// A connected client; packets go out through `outbound`
    Human { outbound: mpsc::Sender<Bytes> },
    /// Server-driven snowman wandering every `move_delay`. Has no endpoint.
    Robot { move_delay: Duration },
}

impl Controller {
    pub fn outbound(&self) -> Option<&mpsc::Sender<Bytes>> {
        match self {
            Self::Human { outbound } => Some(outbound),
            Self::Robot { .. } => None,
        }
    }

    pub fn is_robot(&self) -> bool {
        matches!(self, Self::Robot { .. })
    }

    /// Queue whatever this controller does next. Humans act on their own;
    /// robots wander, and back off while they cannot act.
    pub fn schedule_next_action(
        &self,
        tasks: &dyn TaskSink,
        game_id: GameId,
        player_id: PlayerId,
        can_act: bool,
    ) {
        if let Self::Robot { move_delay } = self {
            let delay = if can_act { *move_delay } else { *move_delay * 4 };
            tasks.schedule(delay, Task::RobotMove { game_id, player_id });
        }
    }
}

/// Player state in a game (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: PlayerId,
    pub name: String,
    pub team: TeamColor,
    pub state: PlayerState,

    // Dead reckoning
    pub start_x: f32,
    pub start_y: f32,
    pub dest_x: f32,
    pub dest_y: f32,
    /// Server time (ms) of the last accepted command
    pub timestamp: u64,

    pub hit_points: i32,
    pub held_flag: Option<FlagId>,
    pub game: Option<GameId>,
    pub controller: Controller,
}

impl PlayerSession {
    pub fn new(id: PlayerId, name: String, team: TeamColor, controller: Controller) -> Self {
        Self {
            id,
            name,
            team,
            state: PlayerState::None,
            start_x: 0.0,
            start_y: 0.0,
            dest_x: 0.0,
            dest_y: 0.0,
            timestamp: 0,
            hit_points: FULL_HIT_POINTS,
            held_flag: None,
            game: None,
            controller,
        }
    }

    /// Dead and idle snowmen ignore movement, attack and flag commands
    pub fn is_active(&self) -> bool {
        matches!(self.state, PlayerState::Stopped | PlayerState::Moving)
    }

    pub fn is_ready(&self) -> bool {
        self.state != PlayerState::None
    }

    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.start_x, self.start_y)
    }

    pub fn destination(&self) -> Coordinate {
        Coordinate::new(self.dest_x, self.dest_y)
    }

    /// Projected position at server time `time`
    pub fn position_at(&self, time: u64) -> Coordinate {
        PhysicsSystem::position_at(
            self.state == PlayerState::Moving,
            self.position(),
            self.destination(),
            self.timestamp,
            self.hit_points,
            time,
        )
    }

    /// Server time for a new command; never earlier than the last one
    pub fn command_time(&self, now: u64) -> u64 {
        now.max(self.timestamp)
    }

    /// Put the snowman at `point` without touching its state
    pub fn place(&mut self, point: Coordinate) {
        self.start_x = point.x;
        self.start_y = point.y;
        self.dest_x = point.x;
        self.dest_y = point.y;
    }

    /// Halt the snowman at `point`
    pub fn stop_at(&mut self, point: Coordinate) {
        self.place(point);
        self.state = PlayerState::Stopped;
    }

    pub fn begin_move(&mut self, now: u64, from: Coordinate, to: Coordinate) {
        self.timestamp = now;
        self.start_x = from.x;
        self.start_y = from.y;
        self.dest_x = to.x;
        self.dest_y = to.y;
        self.state = PlayerState::Moving;
    }

    /// Mark the snowman ready to play. Only leaves `None`.
    pub fn set_ready(&mut self) -> bool {
        if self.state == PlayerState::None {
            self.state = PlayerState::Stopped;
            true
        } else {
            false
        }
    }

    /// Take damage. Dies on the transition to zero hit points.
    pub fn hit(&mut self, amount: i32) -> DamageResult {
        let result = CombatSystem::apply_damage(self.hit_points, amount);
        self.hit_points = result.hit_points;
        if result.killed {
            self.state = PlayerState::Dead;
        }
        result
    }

    /// Full strength at `spawn`, stopped
    pub fn revive_at(&mut self, spawn: Coordinate) {
        self.hit_points = FULL_HIT_POINTS;
        self.stop_at(spawn);
    }

    /// Drop back to idle when the game is over
    pub fn reset(&mut self) {
        self.state = PlayerState::None;
        self.held_flag = None;
        self.game = None;
    }
}
