//! Snowman movement model and dead reckoning

/// Magnitude of the movement force a snowman pushes with
pub const MOVEMENT_FORCE: f32 = 500.0;

/// Converts force / mass into world units per millisecond
pub const SPEED_SCALE: f32 = 0.000_01;

/// Hit points of a fully built snowman
pub const FULL_HIT_POINTS: i32 = 100;

/// Mass of a snowman at full strength
pub const MIN_MASS: f32 = 1.0;

/// Mass of a snowman at zero hit points
pub const MAX_MASS: f32 = 3.0;

/// Maximum squared distance between a client reported position and the
/// server's expected position
pub const POSITION_TOLERANCE_SQD: f32 = 1.0;

/// A point on the ground plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    pub x: f32,
    pub y: f32,
}

impl Coordinate {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(self, other: Coordinate) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Maps hit points onto the physical properties of a snowman
pub struct HpConverter;

impl HpConverter {
    /// Mass grows as hit points fall, so damaged snowmen are slower
    pub fn mass(hit_points: i32) -> f32 {
        let strength = hit_points.clamp(0, FULL_HIT_POINTS) as f32 / FULL_HIT_POINTS as f32;
        MAX_MASS - (MAX_MASS - MIN_MASS) * strength
    }

    /// Movement speed in world units per millisecond
    pub fn speed_per_ms(hit_points: i32) -> f32 {
        (MOVEMENT_FORCE / Self::mass(hit_points)) * SPEED_SCALE
    }
}

/// Physics system for projecting snowman positions
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Project where a snowman is at `time`.
    ///
    /// A stopped snowman is at `start`. A moving one has travelled
    /// `speed * (time - timestamp)` along the straight line toward `dest`,
    /// and never overshoots it.
    pub fn position_at(
        moving: bool,
        start: Coordinate,
        dest: Coordinate,
        timestamp: u64,
        hit_points: i32,
        time: u64,
    ) -> Coordinate {
        if !moving {
            return start;
        }

        let dt = time.saturating_sub(timestamp) as f32;
        let distance_traveled = HpConverter::speed_per_ms(hit_points) * dt;

        let dx = dest.x - start.x;
        let dy = dest.y - start.y;
        let target_distance = (dx * dx + dy * dy).sqrt();

        if target_distance <= distance_traveled {
            return dest;
        }

        // Solve realDX / realDY = dx / dy with realDX^2 + realDY^2 = d^2.
        // An axis with no displacement contributes nothing.
        let d_sqd = distance_traveled * distance_traveled;
        let mut real_dx = if dx == 0.0 {
            0.0
        } else {
            (d_sqd / ((dy * dy) / (dx * dx) + 1.0)).sqrt()
        };
        let mut real_dy = if dy == 0.0 {
            0.0
        } else {
            (d_sqd / ((dx * dx) / (dy * dy) + 1.0)).sqrt()
        };

        if dx < 0.0 {
            real_dx = -real_dx;
        }
        if dy < 0.0 {
            real_dy = -real_dy;
        }

        Coordinate::new(start.x + real_dx, start.y + real_dy)
    }

    /// Anti-cheat tolerance check on squared distance
    pub fn within_tolerance(expected: Coordinate, given: Coordinate, tolerance_sqd: f32) -> bool {
        expected.distance_squared(given) < tolerance_sqd
    }
}
