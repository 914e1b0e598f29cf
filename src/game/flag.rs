//! Team flags

use crate::ws::protocol::TeamColor;

use super::physics::Coordinate;
use super::{FlagId, PlayerId};

/// A team flag. Only the owning game session mutates it.
#[derive(Debug, Clone)]
pub struct Flag {
    pub id: FlagId,
    pub team: TeamColor,
    /// Resting position; stale while the flag is carried
    pub position: Coordinate,
    pub held_by: Option<PlayerId>,
    pub goal_radius: f32,
    /// Where the flag starts each game
    pub home: Coordinate,
}

impl Flag {
    pub fn new(id: FlagId, team: TeamColor, position: Coordinate, goal_radius: f32) -> Self {
        Self {
            id,
            team,
            position,
            held_by: None,
            goal_radius,
            home: position,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held_by.is_some()
    }

    /// Whether `point` is close enough to pick the flag up
    pub fn in_reach(&self, point: Coordinate) -> bool {
        point.distance_squared(self.position) < self.goal_radius * self.goal_radius
    }

    pub fn drop_at(&mut self, position: Coordinate) {
        self.held_by = None;
        self.position = position;
    }

    pub fn return_home(&mut self) {
        self.held_by = None;
        self.position = self.home;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reach_is_strictly_inside_goal_radius() {
        let flag = Flag::new(1, TeamColor::Red, Coordinate::new(10.0, 10.0), 5.0);
        assert!(flag.in_reach(Coordinate::new(13.0, 13.0)));
        assert!(!flag.in_reach(Coordinate::new(15.0, 10.0)));
    }

    #[test]
    fn dropped_flag_can_go_home() {
        let mut flag = Flag::new(2, TeamColor::Blue, Coordinate::new(1.0, 2.0), 5.0);
        flag.held_by = Some(7);
        flag.drop_at(Coordinate::new(40.0, -3.0));
        assert!(!flag.is_held());
        assert_eq!(flag.position, Coordinate::new(40.0, -3.0));

        flag.return_home();
        assert_eq!(flag.position, Coordinate::new(1.0, 2.0));
    }
}
