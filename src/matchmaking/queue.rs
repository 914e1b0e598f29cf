//! Waiting queue for players without a game

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::game::PlayerId;

/// Player in the waiting queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub player_id: PlayerId,
    pub name: String,
    /// Outbound packet channel of the player's connection
    pub outbound: mpsc::Sender<Bytes>,
    pub queued_at: Instant,
}

impl QueuedPlayer {
    pub fn new(player_id: PlayerId, name: String, outbound: mpsc::Sender<Bytes>) -> Self {
        Self {
            player_id,
            name,
            outbound,
            queued_at: Instant::now(),
        }
    }

    /// How long this player has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }

    /// False once the connection's writer has gone away
    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// FIFO of players waiting for a game. Never re-ordered.
#[derive(Default)]
pub struct WaitingQueue {
    queue: VecDeque<QueuedPlayer>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player at the back (rejoining moves it to the back)
    pub fn enqueue(&mut self, player: QueuedPlayer) {
        self.queue.retain(|p| p.player_id != player.player_id);
        self.queue.push_back(player);
    }

    /// Remove a player, e.g. on disconnect
    pub fn remove(&mut self, player_id: PlayerId) -> Option<QueuedPlayer> {
        let pos = self.queue.iter().position(|p| p.player_id == player_id)?;
        self.queue.remove(pos)
    }

    pub fn pop_front(&mut self) -> Option<QueuedPlayer> {
        self.queue.pop_front()
    }

    #[cfg(test)]
    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.queue.iter().any(|p| p.player_id == player_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
