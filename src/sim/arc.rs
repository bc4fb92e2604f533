//! Arc metadata for curved occluders and arc-shaped polygon edges
//!
//! An arc is a piece of a circle:
//! - center, radius: the circle
//! - theta_start, theta_end: angular extent, swept counter-clockwise from start to end

use serde::{Deserialize, Serialize};

use super::Vector;
use crate::{normalize_angle, polar_to_cartesian};

/// A circular arc in polar space around `center`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcSpan {
    pub center: Vector,
    pub radius: f64,
    /// Start angle (radians, normalized to (-π, π])
    pub theta_start: f64,
    /// End angle (radians, normalized to (-π, π])
    pub theta_end: f64,
}

impl ArcSpan {
    pub fn new(center: Vector, radius: f64, theta_start: f64, theta_end: f64) -> Self {
        Self {
            center,
            radius,
            theta_start: normalize_angle(theta_start),
            theta_end: normalize_angle(theta_end),
        }
    }

    /// Whole circle, starting and ending at angle 0
    pub fn full(center: Vector, radius: f64) -> Self {
        Self {
            center,
            radius,
            theta_start: 0.0,
            theta_end: 0.0,
        }
    }

    /// The shorter arc joining two points on the circle, oriented counter-clockwise
    pub fn between(center: Vector, radius: f64, a: Vector, b: Vector) -> Self {
        let ra = a - center;
        let rb = b - center;
        if ra.cross(rb) >= 0.0 {
            Self::new(center, radius, ra.angle(), rb.angle())
        } else {
            Self::new(center, radius, rb.angle(), ra.angle())
        }
    }

    /// Angular span of the arc (handles wraparound; a closed arc spans τ)
    pub fn angular_span(&self) -> f64 {
        let mut span = self.theta_end - self.theta_start;
        if span <= 0.0 {
            span += std::f64::consts::TAU;
        }
        span
    }

    /// Check if an angle is within the arc's angular extent
    pub fn contains_angle(&self, theta: f64) -> bool {
        let theta = normalize_angle(theta);
        let start = self.theta_start;
        let end = self.theta_end;

        if start == end {
            // Full circle
            true
        } else if start <= end {
            // No wraparound
            theta >= start && theta <= end
        } else {
            // Wraparound case (e.g., start=170°, end=-170°)
            theta >= start || theta <= end
        }
    }

    /// Point on the arc at the given angle (around the arc center)
    pub fn point_at(&self, theta: f64) -> Vector {
        self.center + polar_to_cartesian(self.radius, theta)
    }

    /// Midpoint of the arc
    pub fn midpoint(&self) -> Vector {
        self.point_at(self.theta_start + self.angular_span() / 2.0)
    }

    /// Sample points along the arc, start to end inclusive (for rendering)
    pub fn sample(&self, num_points: usize) -> Vec<Vector> {
        let span = self.angular_span();

        (0..num_points)
            .map(|i| {
                let t = i as f64 / (num_points.saturating_sub(1)).max(1) as f64;
                self.point_at(self.theta_start + t * span)
            })
            .collect()
    }
}
