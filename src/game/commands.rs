//! Command handlers for snowmen in play
//!
//! Every handler validates the client's claimed position against the
//! server's dead-reckoned one before touching state. Rejections are logged
//! and corrected, never returned as errors.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::scheduler::Task;
use crate::ws::protocol::{EndState, ServerMsg};

use super::combat::{CombatSystem, SNOWBALL_DAMAGE};
use super::physics::{Coordinate, PhysicsSystem, POSITION_TOLERANCE_SQD};
use super::player::PlayerState;
use super::session::{GamePhase, GameSession};
use super::{FlagId, PlayerId};

/// Side of the square a robot picks its next waypoint from
const ROBOT_WANDER: f32 = 10.0;

impl GameSession {
    /// MOVEME: start walking from the reported point toward `end`
    pub fn move_player(
        &mut self,
        player_id: PlayerId,
        now: u64,
        start_x: f32,
        start_y: f32,
        end_x: f32,
        end_y: f32,
    ) {
        let Some(player) = self.players.get_mut(&player_id) else {
            debug!(game = %self.name, player_id, "Move from unknown player");
            return;
        };
        if !player.is_active() {
            return;
        }

        let now = player.command_time(now);
        let expected = player.position_at(now);
        let reported = Coordinate::new(start_x, start_y);

        let msg = if PhysicsSystem::within_tolerance(expected, reported, POSITION_TOLERANCE_SQD) {
            let trimmed = self
                .trimmer
                .trim_path(reported, Coordinate::new(end_x, end_y));
            player.begin_move(now, reported, trimmed);

            ServerMsg::MoveMob {
                id: player_id,
                x: reported.x,
                y: reported.y,
                dest_x: trimmed.x,
                dest_y: trimmed.y,
            }
        } else {
            warn!(
                game = %self.name,
                player_id,
                expected_x = expected.x,
                expected_y = expected.y,
                reported_x = start_x,
                reported_y = start_y,
                "Move failed start position check"
            );
            player.stop_at(expected);
            player.timestamp = now;

            ServerMsg::StopMob {
                id: player_id,
                x: expected.x,
                y: expected.y,
            }
        };

        self.send(None, &msg);
    }

    /// STOPME: the client reached its destination
    pub fn stop_player(&mut self, player_id: PlayerId, now: u64, x: f32, y: f32) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if !player.is_active() {
            return;
        }

        let now = player.command_time(now);
        let expected = player.position_at(now);
        let reported = Coordinate::new(x, y);

        let at = if PhysicsSystem::within_tolerance(expected, reported, POSITION_TOLERANCE_SQD) {
            reported
        } else {
            warn!(game = %self.name, player_id, "Stop failed position check");
            expected
        };
        player.stop_at(at);
        player.timestamp = now;

        self.send(
            None,
            &ServerMsg::StopMob {
                id: player_id,
                x: at.x,
                y: at.y,
            },
        );
    }

    /// ATTACK: throw a snowball at `target_id` from (x, y)
    pub fn attack(&mut self, attacker_id: PlayerId, now: u64, target_id: PlayerId, x: f32, y: f32) {
        if attacker_id == target_id {
            warn!(game = %self.name, player_id = attacker_id, "Attack on self ignored");
            return;
        }

        let Some(attacker) = self.players.get(&attacker_id) else {
            return;
        };
        if !attacker.is_active() {
            return;
        }

        let now = attacker.command_time(now);
        let expected = attacker.position_at(now);
        let reported = Coordinate::new(x, y);
        if !PhysicsSystem::within_tolerance(expected, reported, POSITION_TOLERANCE_SQD) {
            warn!(
                game = %self.name,
                player_id = attacker_id,
                "Attack failed attack position check"
            );
            return;
        }
        let attacker_hp = attacker.hit_points;

        let target_expected = match self.players.get(&target_id) {
            Some(target) if target.is_active() => target.position_at(now),
            Some(_) => {
                warn!(game = %self.name, player_id = attacker_id, target_id, "Attack on inactive target");
                return;
            }
            None => {
                warn!(game = %self.name, player_id = attacker_id, target_id, "Attack on unknown target");
                return;
            }
        };

        let in_range =
            CombatSystem::in_range(expected.distance_squared(target_expected), attacker_hp);

        // Throwing stops the attacker where it stands
        if let Some(attacker) = self.players.get_mut(&attacker_id) {
            attacker.stop_at(reported);
            attacker.timestamp = now;
        }

        let damage = if in_range {
            if let Some(target) = self.players.get_mut(&target_id) {
                target.timestamp = target.command_time(now);
                target.stop_at(target_expected);
            }
            self.hit_player(target_id, SNOWBALL_DAMAGE, target_expected)
        } else {
            debug!(game = %self.name, player_id = attacker_id, target_id, "Attack out of range");
            0
        };

        self.send(
            None,
            &ServerMsg::Attacked {
                attacker_id,
                target_id,
                damage,
            },
        );
    }

    /// Apply damage to a snowman. Returns the damage actually dealt.
    ///
    /// On the killing hit any carried flag is dropped at `at` and a single
    /// respawn is scheduled.
    pub fn hit_player(&mut self, target_id: PlayerId, amount: i32, at: Coordinate) -> i32 {
        let Some(target) = self.players.get_mut(&target_id) else {
            return 0;
        };

        let result = target.hit(amount);
        if result.killed {
            if let Some(flag_id) = target.held_flag.take() {
                if let Some(flag) = self.flags.get_mut(&flag_id) {
                    flag.drop_at(at);
                }
            }

            self.tasks.schedule(
                self.rules.respawn_delay,
                Task::Respawn {
                    game_id: self.id,
                    player_id: target_id,
                },
            );
            info!(game = %self.name, player_id = target_id, "Player knocked out");
        }

        result.applied
    }

    /// GETFLAG: pick up an enemy flag standing at (x, y)
    pub fn get_flag(&mut self, player_id: PlayerId, now: u64, flag_id: FlagId, x: f32, y: f32) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if !player.is_active() {
            return;
        }

        let Some(flag) = self.flags.get_mut(&flag_id) else {
            warn!(game = %self.name, player_id, flag_id, "Unknown flag");
            return;
        };
        if flag.team == player.team || flag.is_held() || player.held_flag.is_some() {
            warn!(game = %self.name, player_id, flag_id, "Flag not available");
            return;
        }

        let now = player.command_time(now);
        let expected = player.position_at(now);
        let reported = Coordinate::new(x, y);
        if !PhysicsSystem::within_tolerance(expected, reported, POSITION_TOLERANCE_SQD) {
            warn!(game = %self.name, player_id, "Get flag failed attach position check");
            return;
        }
        if !flag.in_reach(reported) {
            warn!(game = %self.name, player_id, flag_id, "Get flag failed radius check");
            return;
        }

        player.stop_at(reported);
        player.timestamp = now;
        player.held_flag = Some(flag_id);
        flag.held_by = Some(player_id);

        info!(game = %self.name, player_id, flag_id, "Flag taken");
        self.send(
            None,
            &ServerMsg::AttachObj {
                holder_id: player_id,
                object_id: flag_id,
            },
        );
    }

    /// SCORE: bring the carried flag home. Ends the game.
    pub fn score(&mut self, player_id: PlayerId, now: u64, x: f32, y: f32) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if !player.is_active() {
            return;
        }
        let Some(flag) = player
            .held_flag
            .and_then(|id| self.flags.get(&id))
            .filter(|flag| flag.team == player.team.opponent())
        else {
            warn!(game = %self.name, player_id, "Score without an enemy flag");
            return;
        };

        let now = player.command_time(now);
        let expected = player.position_at(now);
        let reported = Coordinate::new(x, y);
        if !PhysicsSystem::within_tolerance(expected, reported, POSITION_TOLERANCE_SQD) {
            warn!(game = %self.name, player_id, "Score failed position check");
            return;
        }

        let base = self.map.base_position(player.team);
        if reported.distance_squared(base) >= flag.goal_radius * flag.goal_radius {
            warn!(game = %self.name, player_id, "Score outside home base");
            return;
        }

        player.stop_at(reported);
        player.timestamp = now;
        let team = player.team;

        info!(game = %self.name, player_id, team = ?team, "Flag captured");
        self.end_game(EndState::win_for(team));
    }

    /// Bring a knocked out snowman back at its team spawn
    pub fn respawn_player(&mut self, player_id: PlayerId, now: u64) {
        if self.phase == GamePhase::Ended {
            debug!(game = %self.name, player_id, "Respawn after game end");
            return;
        }

        let spawn = match self.players.get_mut(&player_id) {
            Some(player) if player.state == PlayerState::Dead => {
                let spawn = self.map.respawn_position(player.team);
                player.revive_at(spawn);
                player.timestamp = player.command_time(now);
                spawn
            }
            _ => {
                debug!(game = %self.name, player_id, "Stale respawn");
                return;
            }
        };

        self.send(
            None,
            &ServerMsg::Respawn {
                id: player_id,
                x: spawn.x,
                y: spawn.y,
            },
        );
    }

    /// Let a robot wander to a nearby point, then queue its next turn
    pub fn robot_tick(&mut self, player_id: PlayerId, now: u64) {
        if self.phase == GamePhase::Ended {
            return;
        }
        let Some(robot) = self.players.get(&player_id) else {
            return;
        };

        let can_act = self.phase == GamePhase::InProgress && robot.is_active();
        if can_act {
            let now = robot.command_time(now);
            let here = robot.position_at(now);
            let dx = ROBOT_WANDER * (self.rng.gen::<f32>() - 0.5);
            let dy = ROBOT_WANDER * (self.rng.gen::<f32>() - 0.5);
            self.move_player(player_id, now, here.x, here.y, here.x + dx, here.y + dy);
        }

        if let Some(robot) = self.players.get(&player_id) {
            robot
                .controller
                .schedule_next_action(self.tasks.as_ref(), self.id, player_id, can_act);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::game::physics::FULL_HIT_POINTS;
    use crate::game::testing::{drain, human, robot, TestGame, ROBOT_DELAY};
    use crate::game::MapInfo;
    use crate::ws::protocol::{ClientMsg, TeamColor};

    const RED_FLAG: FlagId = 1;
    const BLUE_FLAG: FlagId = 2;

    struct Started {
        t: TestGame,
        rx1: mpsc::Receiver<Bytes>,
        rx2: mpsc::Receiver<Bytes>,
    }

    /// Red player 1 and blue player 2, both flags placed, game in progress
    fn started(mut t: TestGame) -> Started {
        let (a, mut rx1) = human();
        let (b, mut rx2) = human();
        t.game.add_player(1, "alice".into(), a).unwrap();
        t.game.add_player(2, "bob".into(), b).unwrap();
        assert_eq!(t.game.add_flag(TeamColor::Red), RED_FLAG);
        assert_eq!(t.game.add_flag(TeamColor::Blue), BLUE_FLAG);
        t.game.handle(1, 0, ClientMsg::Ready);
        t.game.handle(2, 0, ClientMsg::Ready);
        assert_eq!(t.game.phase(), GamePhase::InProgress);
        drain(&mut rx1);
        drain(&mut rx2);
        Started { t, rx1, rx2 }
    }

    fn place(t: &mut TestGame, id: PlayerId, x: f32, y: f32, at: u64) {
        let player = t.game.player_mut(id).unwrap();
        player.stop_at(Coordinate::new(x, y));
        player.timestamp = at;
    }

    #[tokio::test]
    async fn scenario_a_move_within_tolerance_is_accepted() {
        let Started { mut t, mut rx2, .. } = started(TestGame::new());
        place(&mut t, 1, 5.0, 10.0, 500);

        t.game.handle(
            1,
            1_000,
            ClientMsg::MoveMe {
                x: 5.35,
                y: 9.65,
                end_x: 20.0,
                end_y: 15.0,
            },
        );

        let player = t.game.player(1).unwrap();
        assert_eq!(player.state, PlayerState::Moving);
        assert_eq!(player.timestamp, 1_000);
        assert_eq!(player.position(), Coordinate::new(5.35, 9.65));
        assert_eq!(player.destination(), Coordinate::new(20.0, 15.0));
        assert_eq!(
            drain(&mut rx2),
            vec![ServerMsg::MoveMob {
                id: 1,
                x: 5.35,
                y: 9.65,
                dest_x: 20.0,
                dest_y: 15.0
            }]
        );
    }

    #[tokio::test]
    async fn scenario_b_move_outside_tolerance_snaps_back() {
        let Started { mut t, mut rx1, .. } = started(TestGame::new());
        place(&mut t, 1, 5.0, 10.0, 500);

        t.game.handle(
            1,
            1_000,
            ClientMsg::MoveMe {
                x: 6.41,
                y: 8.59,
                end_x: 20.0,
                end_y: 15.0,
            },
        );

        let player = t.game.player(1).unwrap();
        assert_eq!(player.state, PlayerState::Stopped);
        assert_eq!(player.timestamp, 1_000);
        assert_eq!(player.position(), Coordinate::new(5.0, 10.0));
        assert_eq!(
            drain(&mut rx1),
            vec![ServerMsg::StopMob {
                id: 1,
                x: 5.0,
                y: 10.0
            }]
        );
    }

    #[tokio::test]
    async fn scenario_c_moving_player_redirects_from_expected_point() {
        let Started { mut t, mut rx2, .. } =
            started(TestGame::with_trimmer(Arc::new(MapInfo::default())));
        t.game.player_mut(1).unwrap().begin_move(
            1_000,
            Coordinate::new(0.0, 0.0),
            Coordinate::new(100.0, 100.0),
        );

        let expected = t.game.player(1).unwrap().position_at(2_000);
        assert!((expected.x - 3.535_534).abs() < 1e-3);
        assert!((expected.y - 3.535_534).abs() < 1e-3);

        t.game.handle(
            1,
            2_000,
            ClientMsg::MoveMe {
                x: expected.x,
                y: expected.y,
                end_x: 100.0,
                end_y: 100.0,
            },
        );

        let player = t.game.player(1).unwrap();
        assert_eq!(player.state, PlayerState::Moving);
        assert_eq!(player.timestamp, 2_000);
        assert_eq!(
            drain(&mut rx2),
            vec![ServerMsg::MoveMob {
                id: 1,
                x: expected.x,
                y: expected.y,
                dest_x: 100.0,
                dest_y: 100.0
            }]
        );
    }

    #[tokio::test]
    async fn scenario_d_killing_hit_drops_flag_and_schedules_one_respawn() {
        let Started { mut t, mut rx1, .. } = started(TestGame::new());
        place(&mut t, 1, 0.0, 0.0, 0);
        place(&mut t, 2, 3.0, 0.0, 0);
        {
            let target = t.game.player_mut(2).unwrap();
            target.hit_points = 10;
            target.held_flag = Some(RED_FLAG);
        }
        t.game.flag_mut(RED_FLAG).unwrap().held_by = Some(2);

        t.game.handle(
            1,
            5_000,
            ClientMsg::Attack {
                target_id: 2,
                x: 0.0,
                y: 0.0,
            },
        );

        let target = t.game.player(2).unwrap();
        assert_eq!(target.hit_points, 0);
        assert_eq!(target.state, PlayerState::Dead);
        assert_eq!(target.held_flag, None);

        let flag = t.game.flag(RED_FLAG).unwrap();
        assert!(!flag.is_held());
        assert_eq!(flag.position, Coordinate::new(3.0, 0.0));

        assert_eq!(
            t.tasks.scheduled(),
            vec![(
                Duration::from_secs(10),
                Task::Respawn {
                    game_id: t.game.id(),
                    player_id: 2
                }
            )]
        );
        assert_eq!(
            drain(&mut rx1),
            vec![ServerMsg::Attacked {
                attacker_id: 1,
                target_id: 2,
                damage: 10
            }]
        );

        // a dead target cannot be hit again
        t.game.handle(
            1,
            5_100,
            ClientMsg::Attack {
                target_id: 2,
                x: 0.0,
                y: 0.0,
            },
        );
        assert_eq!(t.tasks.scheduled().len(), 1);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(t.game.hit_player(2, 10, Coordinate::default()), 0);
        assert_eq!(t.tasks.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn scenario_e_second_flag_is_refused() {
        let Started { mut t, mut rx1, mut rx2 } = started(TestGame::new());
        let spare = t.game.add_flag(TeamColor::Blue);
        let spot = t.game.flag(spare).unwrap().position;
        place(&mut t, 1, spot.x, spot.y, 0);

        t.game.player_mut(1).unwrap().held_flag = Some(BLUE_FLAG);
        t.game.flag_mut(BLUE_FLAG).unwrap().held_by = Some(1);

        t.game.handle(
            1,
            1_000,
            ClientMsg::GetFlag {
                flag_id: spare,
                x: spot.x,
                y: spot.y,
            },
        );

        assert_eq!(t.game.flag(spare).unwrap().held_by, None);
        assert_eq!(t.game.flag(BLUE_FLAG).unwrap().held_by, Some(1));
        assert_eq!(t.game.player(1).unwrap().held_flag, Some(BLUE_FLAG));
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut rx2).is_empty());
    }

    /// Nobody holds anything and nobody was told anything
    fn assert_no_pickup(s: &mut Started) {
        for flag_id in [RED_FLAG, BLUE_FLAG] {
            assert_eq!(s.t.game.flag(flag_id).unwrap().held_by, None);
        }
        for player_id in [1, 2] {
            assert_eq!(s.t.game.player(player_id).unwrap().held_flag, None);
        }
        assert!(drain(&mut s.rx1).is_empty());
        assert!(drain(&mut s.rx2).is_empty());
    }

    #[tokio::test]
    async fn flag_held_by_a_teammate_is_refused() {
        let Started { mut t, mut rx1, mut rx2 } = started(TestGame::new());
        let (c, mut rx3) = human();
        assert_eq!(t.game.add_player(3, "carol".into(), c), Ok(TeamColor::Red));
        t.game.player_mut(3).unwrap().set_ready();

        let blue_home = t.game.flag(BLUE_FLAG).unwrap().position;
        place(&mut t, 1, blue_home.x, blue_home.y, 0);
        place(&mut t, 3, blue_home.x, blue_home.y, 0);

        let grab = ClientMsg::GetFlag {
            flag_id: BLUE_FLAG,
            x: blue_home.x,
            y: blue_home.y,
        };
        t.game.handle(1, 100, grab.clone());
        drain(&mut rx1);
        drain(&mut rx2);
        drain(&mut rx3);

        t.game.handle(3, 200, grab);

        assert_eq!(t.game.flag(BLUE_FLAG).unwrap().held_by, Some(1));
        assert_eq!(t.game.player(1).unwrap().held_flag, Some(BLUE_FLAG));
        assert_eq!(t.game.player(3).unwrap().held_flag, None);
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut rx2).is_empty());
        assert!(drain(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn own_flag_cannot_be_taken() {
        let mut s = started(TestGame::new());
        let blue_home = s.t.game.flag(BLUE_FLAG).unwrap().position;
        place(&mut s.t, 2, blue_home.x, blue_home.y, 0);

        s.t.game.handle(
            2,
            100,
            ClientMsg::GetFlag {
                flag_id: BLUE_FLAG,
                x: blue_home.x,
                y: blue_home.y,
            },
        );

        assert_no_pickup(&mut s);
    }

    #[tokio::test]
    async fn flag_grab_from_wrong_position_is_refused() {
        let mut s = started(TestGame::new());
        let blue_home = s.t.game.flag(BLUE_FLAG).unwrap().position;
        place(&mut s.t, 1, blue_home.x, blue_home.y, 0);

        s.t.game.handle(
            1,
            100,
            ClientMsg::GetFlag {
                flag_id: BLUE_FLAG,
                x: blue_home.x + 2.0,
                y: blue_home.y,
            },
        );

        assert_no_pickup(&mut s);
        assert_eq!(s.t.game.player(1).unwrap().timestamp, 0);
    }

    #[tokio::test]
    async fn flag_at_goal_radius_is_out_of_reach() {
        let mut s = started(TestGame::new());
        let blue_home = s.t.game.flag(BLUE_FLAG).unwrap().position;
        let edge = Coordinate::new(blue_home.x + MapInfo::default().goal_radius, blue_home.y);
        place(&mut s.t, 1, edge.x, edge.y, 0);

        s.t.game.handle(
            1,
            100,
            ClientMsg::GetFlag {
                flag_id: BLUE_FLAG,
                x: edge.x,
                y: edge.y,
            },
        );

        assert_no_pickup(&mut s);
    }

    #[tokio::test]
    async fn unknown_flag_is_ignored() {
        let mut s = started(TestGame::new());
        let blue_home = s.t.game.flag(BLUE_FLAG).unwrap().position;
        place(&mut s.t, 1, blue_home.x, blue_home.y, 0);

        s.t.game.handle(
            1,
            100,
            ClientMsg::GetFlag {
                flag_id: 99,
                x: blue_home.x,
                y: blue_home.y,
            },
        );

        assert_no_pickup(&mut s);
    }

    #[tokio::test]
    async fn idle_and_dead_players_ignore_commands() {
        for state in [PlayerState::Dead, PlayerState::None] {
            let Started { mut t, mut rx1, mut rx2 } = started(TestGame::new());
            place(&mut t, 1, 0.0, 0.0, 100);
            place(&mut t, 2, 2.0, 0.0, 100);
            let blue_home = t.game.flag(BLUE_FLAG).unwrap().position;
            t.game.player_mut(1).unwrap().state = state;

            t.game.handle(
                1,
                1_000,
                ClientMsg::MoveMe {
                    x: 0.0,
                    y: 0.0,
                    end_x: 10.0,
                    end_y: 10.0,
                },
            );
            t.game.handle(
                1,
                1_000,
                ClientMsg::Attack {
                    target_id: 2,
                    x: 0.0,
                    y: 0.0,
                },
            );
            t.game.handle(
                1,
                1_000,
                ClientMsg::GetFlag {
                    flag_id: BLUE_FLAG,
                    x: 0.0,
                    y: 0.0,
                },
            );
            t.game.handle(1, 1_000, ClientMsg::StopMe { x: 0.0, y: 0.0 });

            let player = t.game.player(1).unwrap();
            assert_eq!(player.state, state);
            assert_eq!(player.timestamp, 100);
            assert_eq!(player.position(), Coordinate::new(0.0, 0.0));
            assert_eq!(player.destination(), Coordinate::new(0.0, 0.0));
            assert_eq!(player.held_flag, None);
            assert_eq!(t.game.player(2).unwrap().hit_points, FULL_HIT_POINTS);
            assert_eq!(t.game.flag(BLUE_FLAG).unwrap().position, blue_home);
            assert!(drain(&mut rx1).is_empty());
            assert!(drain(&mut rx2).is_empty());
        }
    }

    #[tokio::test]
    async fn out_of_range_attack_deals_no_damage() {
        let Started { mut t, mut rx2, .. } = started(TestGame::new());
        place(&mut t, 1, 0.0, 0.0, 0);
        place(&mut t, 2, 50.0, 0.0, 0);
        t.game.player_mut(1).unwrap().begin_move(
            0,
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 100.0),
        );
        let at = t.game.player(1).unwrap().position_at(100);

        t.game.handle(
            1,
            100,
            ClientMsg::Attack {
                target_id: 2,
                x: at.x,
                y: at.y,
            },
        );

        assert_eq!(t.game.player(2).unwrap().hit_points, FULL_HIT_POINTS);
        let attacker = t.game.player(1).unwrap();
        assert_eq!(attacker.state, PlayerState::Stopped);
        assert_eq!(attacker.position(), at);
        assert_eq!(
            drain(&mut rx2),
            vec![ServerMsg::Attacked {
                attacker_id: 1,
                target_id: 2,
                damage: 0
            }]
        );
    }

    #[tokio::test]
    async fn attack_from_wrong_position_is_ignored() {
        let Started { mut t, mut rx2, .. } = started(TestGame::new());
        place(&mut t, 1, 0.0, 0.0, 0);
        place(&mut t, 2, 3.0, 0.0, 0);

        t.game.handle(
            1,
            100,
            ClientMsg::Attack {
                target_id: 2,
                x: 2.5,
                y: 0.0,
            },
        );

        assert_eq!(t.game.player(2).unwrap().hit_points, FULL_HIT_POINTS);
        assert_eq!(t.game.player(1).unwrap().position(), Coordinate::new(0.0, 0.0));
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn stale_timestamps_are_clamped() {
        let Started { mut t, .. } = started(TestGame::new());
        place(&mut t, 1, 0.0, 0.0, 5_000);

        t.game.handle(
            1,
            4_000,
            ClientMsg::MoveMe {
                x: 0.0,
                y: 0.0,
                end_x: 10.0,
                end_y: 0.0,
            },
        );
        assert_eq!(t.game.player(1).unwrap().timestamp, 5_000);
    }

    #[tokio::test]
    async fn stop_corrects_bad_positions() {
        let Started { mut t, mut rx1, .. } = started(TestGame::new());
        place(&mut t, 1, 0.0, 0.0, 0);

        t.game.handle(1, 10, ClientMsg::StopMe { x: 0.4, y: 0.0 });
        t.game.handle(1, 20, ClientMsg::StopMe { x: 9.0, y: 0.0 });

        assert_eq!(
            drain(&mut rx1),
            vec![
                ServerMsg::StopMob {
                    id: 1,
                    x: 0.4,
                    y: 0.0
                },
                ServerMsg::StopMob {
                    id: 1,
                    x: 0.4,
                    y: 0.0
                },
            ]
        );
    }

    #[tokio::test]
    async fn capture_and_score_wins_the_game() {
        let Started { mut t, mut rx2, .. } = started(TestGame::new());
        let blue_home = t.game.flag(BLUE_FLAG).unwrap().position;
        place(&mut t, 1, blue_home.x, blue_home.y, 0);

        t.game.handle(
            1,
            100,
            ClientMsg::GetFlag {
                flag_id: BLUE_FLAG,
                x: blue_home.x,
                y: blue_home.y,
            },
        );
        assert_eq!(t.game.player(1).unwrap().held_flag, Some(BLUE_FLAG));
        assert_eq!(t.game.flag(BLUE_FLAG).unwrap().held_by, Some(1));

        let red_base = MapInfo::default().red_base;
        place(&mut t, 1, red_base.x, red_base.y, 200);
        t.game.handle(
            1,
            300,
            ClientMsg::Score {
                x: red_base.x,
                y: red_base.y,
            },
        );

        assert!(t.game.is_ended());
        assert_eq!(
            drain(&mut rx2),
            vec![
                ServerMsg::AttachObj {
                    holder_id: 1,
                    object_id: BLUE_FLAG
                },
                ServerMsg::EndGame {
                    end_state: EndState::RedWins
                },
            ]
        );
        assert_eq!(t.game.flag(BLUE_FLAG).unwrap().position, blue_home);
        assert_eq!(t.game.player(1).unwrap().state, PlayerState::None);
    }

    #[tokio::test]
    async fn score_away_from_base_is_refused() {
        let Started { mut t, .. } = started(TestGame::new());
        place(&mut t, 1, 0.0, 0.0, 0);
        t.game.player_mut(1).unwrap().held_flag = Some(BLUE_FLAG);
        t.game.flag_mut(BLUE_FLAG).unwrap().held_by = Some(1);

        t.game.handle(1, 100, ClientMsg::Score { x: 0.0, y: 0.0 });
        assert_eq!(t.game.phase(), GamePhase::InProgress);
    }

    #[tokio::test]
    async fn respawn_revives_only_the_dead() {
        let Started { mut t, mut rx1, .. } = started(TestGame::new());
        t.game.respawn_player(2, 1_000);
        assert!(drain(&mut rx1).is_empty());

        t.game.hit_player(2, FULL_HIT_POINTS, Coordinate::default());
        t.game.respawn_player(2, 1_000);

        let spawn = MapInfo::default().blue_spawn;
        let player = t.game.player(2).unwrap();
        assert_eq!(player.state, PlayerState::Stopped);
        assert_eq!(player.hit_points, FULL_HIT_POINTS);
        assert_eq!(player.position(), spawn);
        assert_eq!(
            drain(&mut rx1),
            vec![ServerMsg::Respawn {
                id: 2,
                x: spawn.x,
                y: spawn.y
            }]
        );
    }

    #[tokio::test]
    async fn respawn_after_game_end_is_a_no_op() {
        let Started { mut t, .. } = started(TestGame::new());
        t.game.hit_player(2, FULL_HIT_POINTS, Coordinate::default());
        t.game.end_game(EndState::Abandoned);

        t.game.respawn_player(2, 1_000);
        assert_ne!(t.game.player(2).unwrap().hit_points, FULL_HIT_POINTS);
    }

    #[tokio::test]
    async fn robots_wander_and_reschedule() {
        let mut t = TestGame::new();
        let (a, mut rx) = human();
        t.game.add_player(1, "alice".into(), a).unwrap();
        t.game.add_player(-1, "Robot1".into(), robot()).unwrap();
        t.game.handle(1, 0, ClientMsg::Ready);
        t.tasks.take();
        drain(&mut rx);

        let start = t.game.player(-1).unwrap().position();
        t.game.robot_tick(-1, 1_000);

        let robot = t.game.player(-1).unwrap();
        assert_eq!(robot.state, PlayerState::Moving);
        let dest = robot.destination();
        assert!((dest.x - start.x).abs() <= ROBOT_WANDER / 2.0);
        assert!((dest.y - start.y).abs() <= ROBOT_WANDER / 2.0);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMsg::MoveMob { id: -1, .. }]
        ));

        let game_id = t.game.id();
        assert_eq!(
            t.tasks.take(),
            vec![(
                ROBOT_DELAY,
                Task::RobotMove {
                    game_id,
                    player_id: -1
                }
            )]
        );

        t.game.hit_player(-1, FULL_HIT_POINTS, Coordinate::default());
        t.tasks.take();
        t.game.robot_tick(-1, 2_000);
        assert_eq!(
            t.tasks.take(),
            vec![(
                ROBOT_DELAY * 4,
                Task::RobotMove {
                    game_id,
                    player_id: -1
                }
            )]
        );

        t.game.end_game(EndState::Abandoned);
        t.game.robot_tick(-1, 3_000);
        assert!(t.tasks.take().is_empty());
    }
}
