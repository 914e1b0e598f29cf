//! Combat system - snowball damage and throwing range

use super::physics::FULL_HIT_POINTS;

/// Damage dealt by one snowball
pub const SNOWBALL_DAMAGE: i32 = 10;

/// Throwing range of a snowman at zero hit points
pub const MIN_ATTACK_RANGE: f32 = 5.0;

/// Throwing range of a snowman at full strength
pub const MAX_ATTACK_RANGE: f32 = 15.0;

/// Result of applying damage to a snowman
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageResult {
    pub hit_points: i32,
    /// Damage actually applied after clamping
    pub applied: i32,
    /// True only on the transition from alive to dead
    pub killed: bool,
}

/// Combat system for resolving snowball hits
pub struct CombatSystem;

impl CombatSystem {
    /// Throwing range, larger snowmen throw further
    pub fn attack_range(hit_points: i32) -> f32 {
        let strength = hit_points.clamp(0, FULL_HIT_POINTS) as f32 / FULL_HIT_POINTS as f32;
        MIN_ATTACK_RANGE + (MAX_ATTACK_RANGE - MIN_ATTACK_RANGE) * strength
    }

    /// Squared-distance range check between attacker and target
    pub fn in_range(distance_sqd: f32, hit_points: i32) -> bool {
        let range = Self::attack_range(hit_points);
        distance_sqd < range * range
    }

    /// Apply damage, clamping hit points at zero
    pub fn apply_damage(current: i32, damage: i32) -> DamageResult {
        if current <= 0 {
            return DamageResult {
                hit_points: current.max(0),
                applied: 0,
                killed: false,
            };
        }

        let hit_points = (current - damage.max(0)).max(0);
        DamageResult {
            hit_points,
            applied: current - hit_points,
            killed: hit_points == 0,
        }
    }
}
