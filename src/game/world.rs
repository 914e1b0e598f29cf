//! Static world data: team spawns, bases, walls and obstacles

use crate::ws::protocol::TeamColor;

use super::physics::Coordinate;

/// Distance kept between a trimmed destination and the obstacle it hit
pub const STOP_MARGIN: f32 = 0.5;

/// Collision service used to cut a requested path short at the first
/// obstacle along it
pub trait PathTrimmer: Send + Sync {
    fn trim_path(&self, start: Coordinate, end: Coordinate) -> Coordinate;
}

/// Round obstacle (snow fort, tree)
#[derive(Debug, Clone, Copy)]
pub struct Obstacle {
    pub center: Coordinate,
    pub radius: f32,
}

/// Map layout for one arena
#[derive(Debug, Clone)]
pub struct MapInfo {
    pub name: String,
    /// Lower-left corner of the walled arena
    pub min: Coordinate,
    /// Upper-right corner of the walled arena
    pub max: Coordinate,
    pub red_spawn: Coordinate,
    pub blue_spawn: Coordinate,
    /// Where the red flag starts and where red scores
    pub red_base: Coordinate,
    /// Where the blue flag starts and where blue scores
    pub blue_base: Coordinate,
    /// Pickup and scoring radius around flags and bases
    pub goal_radius: f32,
    pub obstacles: Vec<Obstacle>,
}

impl MapInfo {
    pub fn respawn_position(&self, team: TeamColor) -> Coordinate {
        match team {
            TeamColor::Red => self.red_spawn,
            TeamColor::Blue => self.blue_spawn,
        }
    }

    pub fn base_position(&self, team: TeamColor) -> Coordinate {
        match team {
            TeamColor::Red => self.red_base,
            TeamColor::Blue => self.blue_base,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, point: Coordinate) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Earliest fraction of the segment at which it leaves the arena
    fn wall_hit(&self, start: Coordinate, dx: f32, dy: f32, end: Coordinate) -> Option<f32> {
        let mut hit: Option<f32> = None;
        let mut consider = |t: f32| {
            let t = t.clamp(0.0, 1.0);
            hit = Some(hit.map_or(t, |h| h.min(t)));
        };

        if dx != 0.0 {
            if end.x < self.min.x {
                consider((self.min.x - start.x) / dx);
            } else if end.x > self.max.x {
                consider((self.max.x - start.x) / dx);
            }
        }
        if dy != 0.0 {
            if end.y < self.min.y {
                consider((self.min.y - start.y) / dy);
            } else if end.y > self.max.y {
                consider((self.max.y - start.y) / dy);
            }
        }

        hit
    }

    /// Earliest fraction of the segment at which it enters an obstacle.
    /// Obstacles the start point is already inside are ignored so a snowman
    /// can always walk out.
    fn obstacle_hit(&self, start: Coordinate, dx: f32, dy: f32) -> Option<f32> {
        let a = dx * dx + dy * dy;
        self.obstacles
            .iter()
            .filter_map(|obstacle| {
                let fx = start.x - obstacle.center.x;
                let fy = start.y - obstacle.center.y;
                let c = fx * fx + fy * fy - obstacle.radius * obstacle.radius;
                if c <= 0.0 {
                    return None;
                }
                let b = 2.0 * (fx * dx + fy * dy);
                let discriminant = b * b - 4.0 * a * c;
                if discriminant < 0.0 {
                    return None;
                }
                let t = (-b - discriminant.sqrt()) / (2.0 * a);
                (0.0..=1.0).contains(&t).then_some(t)
            })
            .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))))
    }
}

impl PathTrimmer for MapInfo {
    fn trim_path(&self, start: Coordinate, end: Coordinate) -> Coordinate {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            return end;
        }

        let hit = match (self.wall_hit(start, dx, dy, end), self.obstacle_hit(start, dx, dy)) {
            (Some(w), Some(o)) => Some(w.min(o)),
            (w, o) => w.or(o),
        };

        match hit {
            Some(t) => {
                let t = (t - STOP_MARGIN / length).max(0.0);
                Coordinate::new(start.x + dx * t, start.y + dy * t)
            }
            None => end,
        }
    }
}

impl Default for MapInfo {
    fn default() -> Self {
        Self {
            name: "Snow Valley".to_string(),
            min: Coordinate::new(-200.0, -200.0),
            max: Coordinate::new(200.0, 200.0),
            red_spawn: Coordinate::new(-150.0, -140.0),
            blue_spawn: Coordinate::new(150.0, 140.0),
            red_base: Coordinate::new(-170.0, -170.0),
            blue_base: Coordinate::new(170.0, 170.0),
            goal_radius: 5.0,
            obstacles: vec![
                Obstacle {
                    center: Coordinate::new(-60.0, 60.0),
                    radius: 15.0,
                },
                Obstacle {
                    center: Coordinate::new(60.0, -60.0),
                    radius: 15.0,
                },
                Obstacle {
                    center: Coordinate::new(-120.0, 20.0),
                    radius: 8.0,
                },
                Obstacle {
                    center: Coordinate::new(120.0, -20.0),
                    radius: 8.0,
                },
            ],
        }
    }
}
