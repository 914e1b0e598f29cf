//! Matchmaker - groups waiting players into games

use std::time::Duration;

use tracing::{debug, info};

use crate::game::{GameFactory, GameSession, PlayerId};
use crate::scheduler::{Task, TaskSink};

use super::queue::{QueuedPlayer, WaitingQueue};

/// Pulls players off the waiting queue until it has enough for a game.
/// Runs as a self-rescheduling task.
pub struct Matchmaker {
    players_per_game: usize,
    poll_interval: Duration,
    /// Players taken from the queue but not yet placed in a game
    holding: Vec<QueuedPlayer>,
    game_count: u64,
}

impl Matchmaker {
    pub fn new(players_per_game: usize, poll_interval: Duration) -> Self {
        Self {
            players_per_game,
            poll_interval,
            holding: Vec::with_capacity(players_per_game),
            game_count: 0,
        }
    }

    /// One matchmaking cycle. Returns the new game once enough connected
    /// players are held.
    pub fn poll(
        &mut self,
        queue: &mut WaitingQueue,
        factory: &dyn GameFactory,
    ) -> Option<GameSession> {
        if self.holding.is_empty() && queue.is_empty() {
            return None;
        }

        self.holding.retain(|p| {
            let connected = p.is_connected();
            if !connected {
                debug!(player_id = p.player_id, "Dropping disconnected player from holding list");
            }
            connected
        });

        while self.holding.len() < self.players_per_game {
            let Some(player) = queue.pop_front() else {
                break;
            };
            if !player.is_connected() {
                debug!(player_id = player.player_id, "Skipping disconnected player");
                continue;
            }
            if self.holding.iter().any(|p| p.player_id == player.player_id) {
                continue;
            }
            self.holding.push(player);
        }

        if self.holding.len() < self.players_per_game {
            debug!(
                holding = self.holding.len(),
                needed = self.players_per_game,
                "Not enough players yet"
            );
            return None;
        }

        self.game_count += 1;
        let name = format!("Game{}", self.game_count);
        let players = std::mem::take(&mut self.holding);

        for player in &players {
            debug!(
                player_id = player.player_id,
                waited_ms = player.wait_time().as_millis() as u64,
                "Player matched"
            );
        }
        info!(game = %name, player_count = players.len(), "Created new game");

        Some(factory.create_game(name, players))
    }

    /// Poll, then queue the next cycle
    pub fn run_cycle(
        &mut self,
        queue: &mut WaitingQueue,
        factory: &dyn GameFactory,
        tasks: &dyn TaskSink,
    ) -> Option<GameSession> {
        let game = self.poll(queue, factory);
        tasks.schedule(self.poll_interval, Task::MatchmakerPoll);
        game
    }

    /// Drop a disconnected player from the holding list
    pub fn forget(&mut self, player_id: PlayerId) -> bool {
        let before = self.holding.len();
        self.holding.retain(|p| p.player_id != player_id);
        self.holding.len() != before
    }

    #[cfg(test)]
    pub fn holding_len(&self) -> usize {
        self.holding.len()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
