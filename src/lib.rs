//! Umbra - a tile-based action game core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (geometry, visibility sweep, collisions, world state)
//! - `settings`: Data-driven tuning loaded from JSON

pub mod settings;
pub mod sim;

pub use settings::Settings;

use sim::Vector;

/// Game configuration constants
pub mod consts {
    /// Default simulation rate (ticks per second)
    pub const TICK_RATE: f64 = 20.0;

    /// Vectors shorter than this are snapped to exact zero
    pub const GEOMETRY_EPSILON: f64 = 1e-12;
    /// Relative cross-product magnitude under which two directions are parallel
    pub const PARALLEL_EPSILON: f64 = 1e-9;
    /// Endpoint angles closer than this (radians) are swept as one angle
    pub const ANGLE_GROUP_EPSILON: f64 = 1e-9;
    /// Symmetric perturbation separating close and open events at one angle
    pub const SWEEP_NUDGE: f64 = 1e-12;
    /// Relative sine under which three polygon vertices count as colinear
    pub const COLINEAR_EPSILON: f64 = 1e-9;
    /// Distance under which two polygon vertices are merged
    pub const VERTEX_MERGE_EPSILON: f64 = 1e-7;
    /// Fraction of a segment's length used to nudge points inward for depth tests
    pub const DEPTH_NUDGE: f64 = 0.01;

    /// Chords approximating the view-range circle
    pub const VIEW_RING_SEGMENTS: usize = 64;

    /// Hard cap on single-direction steps during contact resolution
    pub const MAX_CONTACT_STEPS: u32 = 10_000;
    /// Default bisections used to settle a body against a rigid obstacle
    pub const CONTACT_ACCURACY: u32 = 10;

    /// Mover defaults
    pub const MOVER_MASS: f64 = 1.0;
    pub const MOVER_FRICTION: f64 = 0.01;
    pub const MOVER_FORCE: f64 = 1000.0;
    pub const MOVER_VIEW_RANGE: f64 = 5000.0;
    /// Mover radius as a fraction of the grid cell
    pub const MOVER_RADIUS_RATIO: f64 = 0.2;

    /// Obstacle defaults
    pub const BOUNCY_RECT_BOUNCE: f64 = 90_000.0;
    pub const BOUNCY_CIRCLE_BOUNCE: f64 = 60_000.0;
    pub const DRIFTING_RECT_BOUNCE: f64 = 60_000.0;
    pub const DRIFTING_CIRCLE_BOUNCE: f64 = 150_000.0;
    pub const DRIFTING_FRICTION: f64 = 0.1;
    pub const DOOR_BOUNCE: f64 = 300_000.0;

    /// Chance that an uncertain panel leaves its cell empty on a re-roll
    pub const UNCERTAIN_EMPTY_CHANCE: f64 = 0.8;

    /// Chance that a timer panel arms a bomb when it drops out of sight
    pub const TIMER_ARM_CHANCE: f64 = 0.2;
    /// Seconds from arming to blast
    pub const TIMER_BLAST_SECONDS: f64 = 8.0;
    /// Bombs that may be armed at once across the level
    pub const MAX_ARMED_TIMERS: usize = 3;
}

/// Normalize angle to (-π, π]
#[inline]
pub fn normalize_angle(mut angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    if !angle.is_finite() {
        return 0.0;
    }
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f64, theta: f64) -> Vector {
    Vector::from_polar(r, theta)
}

/// Convert cartesian (x, y) to polar (r, theta)
#[inline]
pub fn cartesian_to_polar(pos: Vector) -> (f64, f64) {
    pos.to_polar()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_normalize_angle_half_open_range() {
        assert!((normalize_angle(PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert_eq!(normalize_angle(f64::NAN), 0.0);
    }

    #[test]
    fn test_polar_round_trip() {
        let v = polar_to_cartesian(2.0, PI / 3.0);
        let (r, theta) = cartesian_to_polar(v);
        assert!((r - 2.0).abs() < 1e-12);
        assert!((theta - PI / 3.0).abs() < 1e-12);
    }
}
