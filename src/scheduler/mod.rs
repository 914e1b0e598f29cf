//! Deferred task execution
//!
//! Tasks carry only identifiers. The target of a task may be gone by the
//! time it fires (game ended, player left); the executor resolves ids at
//! firing time and treats a missing target as a no-op.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::{GameId, PlayerId};

/// A unit of deferred work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Bring a dead snowman back into play
    Respawn { game_id: GameId, player_id: PlayerId },
    /// Let a robot pick its next move
    RobotMove { game_id: GameId, player_id: PlayerId },
    /// Run one matchmaking cycle
    MatchmakerPoll,
}

/// Anything that accepts tasks to run after a delay
pub trait TaskSink: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Tokio-backed scheduler. Each task gets its own timer; fired tasks are
/// delivered in order of expiry on the receiver returned by [`Scheduler::new`].
#[derive(Clone)]
pub struct Scheduler {
    runtime: Handle,
    fired_tx: mpsc::UnboundedSender<Task>,
}

impl Scheduler {
    pub fn new(runtime: Handle) -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (Self { runtime, fired_tx }, fired_rx)
    }
}

impl TaskSink for Scheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let fired_tx = self.fired_tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if fired_tx.send(task).is_err() {
                debug!(?task, "Task fired after executor shut down");
            }
        });
    }
}
