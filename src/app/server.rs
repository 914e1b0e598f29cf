//! Top-level game server: owns the waiting queue, the matchmaker and the
//! registry of running games, and routes commands and fired tasks to them.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::game::{Controller, GameFactory, GameId, GameRegistry, GameSession, PlayerId};
use crate::matchmaking::{Matchmaker, QueuedPlayer, WaitingQueue};
use crate::scheduler::{Task, TaskSink};
use crate::util::time::unix_millis;
use crate::ws::protocol::ClientMsg;

pub struct GameServer {
    registry: GameRegistry,
    // Lock order: queue, then matchmaker. Never taken while a game is locked.
    queue: Mutex<WaitingQueue>,
    matchmaker: Mutex<Matchmaker>,
    /// Which game each seated human is playing in
    player_games: DashMap<PlayerId, GameId>,
    factory: Arc<dyn GameFactory>,
    tasks: Arc<dyn TaskSink>,
    next_player_id: AtomicI32,
}

impl GameServer {
    pub fn new(
        factory: Arc<dyn GameFactory>,
        tasks: Arc<dyn TaskSink>,
        matchmaker: Matchmaker,
    ) -> Self {
        Self {
            registry: GameRegistry::new(),
            queue: Mutex::new(WaitingQueue::new()),
            matchmaker: Mutex::new(matchmaker),
            player_games: DashMap::new(),
            factory,
            tasks,
            next_player_id: AtomicI32::new(1),
        }
    }

    /// Kick off the matchmaking cycle
    pub fn start(&self) {
        let interval = self.matchmaker.lock().poll_interval();
        self.tasks.schedule(interval, Task::MatchmakerPoll);
    }

    /// Register a new connection and put it in the waiting queue
    pub fn connect(&self, name: String, outbound: mpsc::Sender<Bytes>) -> PlayerId {
        let player_id = self.allocate_player_id();

        let mut queue = self.queue.lock();
        queue.enqueue(QueuedPlayer::new(player_id, name, outbound));
        info!(player_id, queue_size = queue.len(), "Player joined waiting queue");

        player_id
    }

    /// Apply one decoded command from a connected player
    pub fn dispatch(&self, player_id: PlayerId, msg: ClientMsg) {
        let Some(game_id) = self.game_of(player_id) else {
            debug!(player_id, "Command from player without a game");
            return;
        };
        let Some(game) = self.registry.get(&game_id) else {
            return;
        };

        let ended = {
            let mut game = game.lock();
            game.handle(player_id, unix_millis(), msg);
            game.is_ended()
        };

        if ended {
            self.retire_game(game_id);
        }
    }

    /// Forget a closed connection wherever it is
    pub fn disconnect(&self, player_id: PlayerId) {
        self.queue.lock().remove(player_id);
        self.matchmaker.lock().forget(player_id);

        if let Some((_, game_id)) = self.player_games.remove(&player_id) {
            if let Some(game) = self.registry.get(&game_id) {
                let ended = {
                    let mut game = game.lock();
                    game.remove_player(player_id, unix_millis());
                    game.is_ended()
                };
                if ended {
                    self.retire_game(game_id);
                }
            }
        }

        info!(player_id, "Player disconnected");
    }

    /// Run a fired task. Targets that no longer exist are skipped.
    pub fn execute(&self, task: Task) {
        match task {
            Task::MatchmakerPoll => self.run_matchmaker(),
            Task::Respawn { game_id, player_id } => {
                self.with_game(game_id, |game| game.respawn_player(player_id, unix_millis()))
            }
            Task::RobotMove { game_id, player_id } => {
                self.with_game(game_id, |game| game.robot_tick(player_id, unix_millis()))
            }
        }
    }

    /// Drain fired tasks until the scheduler goes away
    pub async fn run_tasks(self: Arc<Self>, mut fired: mpsc::UnboundedReceiver<Task>) {
        while let Some(task) = fired.recv().await {
            self.execute(task);
        }
        debug!("Task executor stopped");
    }

    pub fn game_of(&self, player_id: PlayerId) -> Option<GameId> {
        self.player_games.get(&player_id).map(|g| *g)
    }

    pub fn active_games(&self) -> usize {
        self.registry.active_games()
    }

    pub fn active_players(&self) -> usize {
        self.registry.total_players()
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Next human id. Wraps back to 1 so humans never take robot ids.
    fn allocate_player_id(&self) -> PlayerId {
        let next = |id: PlayerId| Some(id.checked_add(1).unwrap_or(1));
        match self
            .next_player_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, next)
        {
            Ok(id) | Err(id) => id,
        }
    }

    fn with_game(&self, game_id: GameId, f: impl FnOnce(&mut GameSession)) {
        let Some(game) = self.registry.get(&game_id) else {
            debug!(%game_id, "Task for retired game");
            return;
        };
        f(&mut *game.lock());
    }

    fn run_matchmaker(&self) {
        let game = {
            let mut queue = self.queue.lock();
            let mut matchmaker = self.matchmaker.lock();
            matchmaker.run_cycle(&mut queue, self.factory.as_ref(), self.tasks.as_ref())
        };

        if let Some(game) = game {
            self.launch(game);
        }
    }

    /// Register a new game and announce it to its players
    fn launch(&self, game: GameSession) {
        let game_id = game.id();
        let humans: Vec<PlayerId> = game
            .player_ids()
            .into_iter()
            .filter(|id| game.player(*id).is_some_and(|p| !p.controller.is_robot()))
            .collect();

        let shared = self.registry.insert(game);
        for id in &humans {
            self.player_games.insert(*id, game_id);
        }

        let ended = {
            let mut game = shared.lock();

            // Players that left between matching and now
            for id in humans {
                let gone = game
                    .player(id)
                    .and_then(|p| p.controller.outbound())
                    .is_some_and(|tx| tx.is_closed());
                if gone {
                    self.player_games.remove(&id);
                    game.remove_player(id, unix_millis());
                }
            }

            game.send_map_info();
            game.is_ended()
        };

        if ended {
            self.retire_game(game_id);
        }
    }

    /// Drop a finished game and send its connected humans back to the queue
    pub(crate) fn retire_game(&self, game_id: GameId) {
        let Some(game) = self.registry.remove(&game_id) else {
            return;
        };
        let players = game.lock().drain_players();

        let mut requeue = Vec::new();
        for player in players {
            self.player_games.remove_if(&player.id, |_, g| *g == game_id);
            if let Controller::Human { outbound } = player.controller {
                if !outbound.is_closed() {
                    requeue.push(QueuedPlayer::new(player.id, player.name, outbound));
                }
            }
        }

        let mut queue = self.queue.lock();
        let requeued = requeue.len();
        for player in requeue {
            queue.enqueue(player);
        }

        info!(%game_id, requeued, "Game retired");
    }
}
