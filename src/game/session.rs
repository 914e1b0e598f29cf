//! Game session state, roster management and broadcasting

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::scheduler::TaskSink;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, EndState, MobKind, ServerMsg, TeamColor};

use super::flag::Flag;
use super::player::{Controller, PlayerSession};
use super::world::{MapInfo, PathTrimmer};
use super::{FlagId, GameId, PlayerId};

/// Horizontal spacing between teammates at their spawn point
const SPAWN_SPACING: f32 = 3.0;

/// Game phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// Waiting for every player to signal ready
    Waiting,
    InProgress,
    /// Terminal
    Ended,
}

/// Timing rules for a game
#[derive(Debug, Clone, Copy)]
pub struct GameRules {
    pub respawn_delay: Duration,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            respawn_delay: Duration::from_secs(10),
        }
    }
}

/// Roster errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Player {0} already joined this game")]
    AlreadyJoined(PlayerId),

    #[error("Game has already ended")]
    GameEnded,
}

/// One match: its players, flags and outbound fan-out
pub struct GameSession {
    pub(super) id: GameId,
    pub(super) name: String,
    pub(super) phase: GamePhase,
    pub(super) players: HashMap<PlayerId, PlayerSession>,
    pub(super) flags: HashMap<FlagId, Flag>,
    pub(super) map: Arc<MapInfo>,
    pub(super) trimmer: Arc<dyn PathTrimmer>,
    pub(super) tasks: Arc<dyn TaskSink>,
    pub(super) rules: GameRules,
    pub(super) rng: ChaCha8Rng,
}

impl GameSession {
    pub fn new(
        id: GameId,
        name: String,
        map: Arc<MapInfo>,
        trimmer: Arc<dyn PathTrimmer>,
        tasks: Arc<dyn TaskSink>,
        rules: GameRules,
        seed: u64,
    ) -> Self {
        Self {
            id,
            name,
            phase: GamePhase::Waiting,
            players: HashMap::new(),
            flags: HashMap::new(),
            map,
            trimmer,
            tasks,
            rules,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    #[cfg(test)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == GamePhase::Ended
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerSession> {
        self.players.get(&id)
    }

    #[cfg(test)]
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerSession> {
        self.players.get_mut(&id)
    }

    #[cfg(test)]
    pub fn flag(&self, id: FlagId) -> Option<&Flag> {
        self.flags.get(&id)
    }

    #[cfg(test)]
    pub fn flag_mut(&mut self, id: FlagId) -> Option<&mut Flag> {
        self.flags.get_mut(&id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[cfg(test)]
    pub fn flag_ids(&self) -> Vec<FlagId> {
        let mut ids: Vec<FlagId> = self.flags.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn human_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| !p.controller.is_robot())
            .count()
    }

    /// Add a player, balancing teams. Returns the assigned team.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        name: String,
        controller: Controller,
    ) -> Result<TeamColor, SessionError> {
        if self.phase == GamePhase::Ended {
            return Err(SessionError::GameEnded);
        }
        if self.players.contains_key(&id) {
            return Err(SessionError::AlreadyJoined(id));
        }

        let red = self
            .players
            .values()
            .filter(|p| p.team == TeamColor::Red)
            .count();
        let blue = self.players.len() - red;
        let (team, slot) = if red <= blue {
            (TeamColor::Red, red)
        } else {
            (TeamColor::Blue, blue)
        };

        let mut spawn = self.map.respawn_position(team);
        spawn.x += slot as f32 * SPAWN_SPACING;

        let mut player = PlayerSession::new(id, name, team, controller);
        player.place(spawn);
        player.game = Some(self.id);
        if player.controller.is_robot() {
            player.set_ready();
        }

        info!(
            game = %self.name,
            player_id = id,
            name = %player.name,
            team = ?team,
            "Player joined game"
        );

        self.players.insert(id, player);
        Ok(team)
    }

    /// Place a team's flag at its base
    pub fn add_flag(&mut self, team: TeamColor) -> FlagId {
        let id = self.flags.len() as FlagId + 1;
        let flag = Flag::new(id, team, self.map.base_position(team), self.map.goal_radius);
        self.flags.insert(id, flag);
        id
    }

    /// Remove a player, dropping any flag it carried where it stood
    pub fn remove_player(&mut self, id: PlayerId, now: u64) -> Option<PlayerSession> {
        let mut player = self.players.remove(&id)?;

        if let Some(flag_id) = player.held_flag.take() {
            let at = player.position_at(now);
            if let Some(flag) = self.flags.get_mut(&flag_id) {
                flag.drop_at(at);
            }
        }
        player.game = None;

        info!(game = %self.name, player_id = id, "Player left game");
        self.send(None, &ServerMsg::RemoveMob { id });

        if self.phase != GamePhase::Ended && self.human_count() == 0 {
            self.end_game(EndState::Abandoned);
        } else if self.phase == GamePhase::Waiting {
            self.start_game_if_ready();
        }

        Some(player)
    }

    /// Tell each client its id and team, then announce every entity
    pub fn send_map_info(&self) {
        for player in self.players.values() {
            self.send_to(
                player.id,
                &ServerMsg::NewGame {
                    player_id: player.id,
                    team: player.team,
                },
            );
        }

        for id in self.player_ids() {
            if let Some(player) = self.players.get(&id) {
                self.send(
                    None,
                    &ServerMsg::AddMob {
                        id,
                        kind: MobKind::Snowman,
                        team: player.team,
                        x: player.start_x,
                        y: player.start_y,
                    },
                );
            }
        }

        let mut flags: Vec<&Flag> = self.flags.values().collect();
        flags.sort_unstable_by_key(|flag| flag.id);
        for flag in flags {
            self.send(
                None,
                &ServerMsg::AddMob {
                    id: flag.id,
                    kind: MobKind::Flag,
                    team: flag.team,
                    x: flag.position.x,
                    y: flag.position.y,
                },
            );
        }
    }

    pub fn ready(&mut self, id: PlayerId) {
        let Some(player) = self.players.get_mut(&id) else {
            debug!(game = %self.name, player_id = id, "Ready from unknown player");
            return;
        };

        if player.set_ready() {
            debug!(game = %self.name, player_id = id, "Player ready");
            self.start_game_if_ready();
        }
    }

    /// Start once every registered player has signalled ready
    pub fn start_game_if_ready(&mut self) -> bool {
        if self.phase != GamePhase::Waiting || self.players.is_empty() {
            return false;
        }
        if !self.players.values().all(PlayerSession::is_ready) {
            return false;
        }

        self.phase = GamePhase::InProgress;
        self.send(None, &ServerMsg::StartGame);

        for player in self.players.values() {
            player.controller.schedule_next_action(
                self.tasks.as_ref(),
                self.id,
                player.id,
                player.is_active(),
            );
        }

        info!(game = %self.name, players = self.players.len(), "Game started");
        true
    }

    /// Announce the result and release per-match state. Idempotent.
    pub fn end_game(&mut self, end_state: EndState) {
        if self.phase == GamePhase::Ended {
            return;
        }

        self.send(None, &ServerMsg::EndGame { end_state });
        self.phase = GamePhase::Ended;

        for player in self.players.values_mut() {
            player.reset();
        }
        for flag in self.flags.values_mut() {
            flag.return_home();
        }

        info!(game = %self.name, end_state = ?end_state, "Game ended");
    }

    /// Hand the roster back once the game is retired
    pub fn drain_players(&mut self) -> Vec<PlayerSession> {
        self.players.drain().map(|(_, p)| p).collect()
    }

    /// Route one decoded client command
    pub fn handle(&mut self, player_id: PlayerId, now: u64, msg: ClientMsg) {
        match msg {
            ClientMsg::Ready => self.ready(player_id),
            _ if self.phase != GamePhase::InProgress => {
                debug!(
                    game = %self.name,
                    player_id,
                    phase = ?self.phase,
                    "Ignoring command outside of play"
                );
            }
            ClientMsg::MoveMe { x, y, end_x, end_y } => {
                self.move_player(player_id, now, x, y, end_x, end_y)
            }
            ClientMsg::Attack { target_id, x, y } => self.attack(player_id, now, target_id, x, y),
            ClientMsg::GetFlag { flag_id, x, y } => self.get_flag(player_id, now, flag_id, x, y),
            ClientMsg::StopMe { x, y } => self.stop_player(player_id, now, x, y),
            ClientMsg::Score { x, y } => self.score(player_id, now, x, y),
        }
    }

    /// Broadcast to every human in the game, optionally skipping the sender
    pub fn send(&self, exclude: Option<PlayerId>, msg: &ServerMsg) {
        let bytes = msg.encode(unix_millis());
        for player in self.players.values() {
            if Some(player.id) == exclude {
                continue;
            }
            if let Some(outbound) = player.controller.outbound() {
                match outbound.try_send(bytes.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(player_id = player.id, "Outbound queue full, dropping packet");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(player_id = player.id, "Outbound channel closed");
                    }
                }
            }
        }
    }

    pub fn send_to(&self, player_id: PlayerId, msg: &ServerMsg) {
        let Some(outbound) = self
            .players
            .get(&player_id)
            .and_then(|p| p.controller.outbound())
        else {
            return;
        };

        if outbound.try_send(msg.encode(unix_millis())).is_err() {
            debug!(player_id, "Failed to deliver packet");
        }
    }
}

/// A game shared between the transport and the scheduler. The mutex
/// serializes every command and task that touches it.
pub type SharedGame = Arc<Mutex<GameSession>>;

/// Registry of all active games
pub struct GameRegistry {
    games: DashMap<GameId, SharedGame>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    pub fn get(&self, id: &GameId) -> Option<SharedGame> {
        self.games.get(id).map(|g| g.value().clone())
    }

    pub fn insert(&self, game: GameSession) -> SharedGame {
        let id = game.id();
        let shared = Arc::new(Mutex::new(game));
        self.games.insert(id, shared.clone());
        shared
    }

    pub fn remove(&self, id: &GameId) -> Option<SharedGame> {
        self.games.remove(id).map(|(_, g)| g)
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    pub fn total_players(&self) -> usize {
        let games: Vec<SharedGame> = self.games.iter().map(|g| g.value().clone()).collect();
        games.iter().map(|g| g.lock().human_count()).sum()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
