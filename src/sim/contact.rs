//! Contact response against obstacles
//!
//! Rigid obstacles push a body back along its last displacement until it is
//! clear, then bisect toward the surface so the body ends up resting against
//! it. Bouncy obstacles instead apply a repulsive force that grows as the
//! body gets closer.

use super::collision::collides;
use super::shape::{Placed, Shape};
use super::state::Entity;
use super::Vector;
use crate::consts::MAX_CONTACT_STEPS;

/// Result of settling a body against a rigid obstacle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactOutcome {
    /// The shapes did not overlap
    Clear,
    /// Moved back out; `normal` points from the obstacle toward the body
    Resolved { normal: Vector, steps: u32 },
    /// Could not back out; the body is left where it was this frame
    Aborted,
}

/// Back the body out of a rigid obstacle and cancel the velocity driving into it
pub fn resolve_rigid(body: &mut Entity, obstacle: &Placed, accuracy: u32) -> ContactOutcome {
    let shape = body.shape;
    let hits = |pos: Vector| collides(&Placed::new(pos, shape), obstacle);
    if !hits(body.pos) {
        return ContactOutcome::Clear;
    }

    let dpos = body.displacement;
    if dpos.is_zero() {
        log::warn!(
            "Entity {:?} overlaps a {} without having moved; leaving it in place",
            body.id,
            obstacle.shape.name()
        );
        return ContactOutcome::Aborted;
    }

    let mut pos = body.pos;
    let mut steps = 0;
    while hits(pos) {
        if steps >= MAX_CONTACT_STEPS {
            log::warn!(
                "Entity {:?} still inside a {} after {} steps back; giving up",
                body.id,
                obstacle.shape.name(),
                steps
            );
            return ContactOutcome::Aborted;
        }
        pos -= dpos;
        steps += 1;
    }

    // `pos` is clear and `pos + step * 2` is not
    let mut step = dpos;
    for _ in 0..accuracy {
        step = step * 0.5;
        if !hits(pos + step) {
            pos += step;
        }
    }
    body.pos = pos;

    let mut normal = (pos - obstacle.closest_point(pos)).normalize_or_zero();
    if normal.is_zero() {
        normal = (-dpos).normalize_or_zero();
    }
    let into = body.vel.dot(normal);
    if into < 0.0 {
        body.vel -= normal * into;
    }
    ContactOutcome::Resolved { normal, steps }
}

/// Repulsion of magnitude `bounce / distance` pushing `body` away from `obstacle`
pub fn bounce_force(body: Vector, obstacle: &Placed, bounce: f64) -> Vector {
    let rel = body - obstacle.pos;
    match obstacle.shape {
        Shape::Rect { width, height } => {
            // Push straight off the long sides, radially off the rounded ends
            let (long, short) = if width > height {
                (rel.x(), rel.y())
            } else {
                (rel.y(), rel.x())
            };
            let l = (width - height).abs() / 2.0;
            let axis = |along: f64, across: f64| {
                if width > height {
                    Vector::new(along, across)
                } else {
                    Vector::new(across, along)
                }
            };
            if long.abs() <= l {
                if short == 0.0 {
                    return Vector::ZERO;
                }
                axis(0.0, short.signum() * bounce / short.abs())
            } else {
                let from_end = rel - axis(long.signum() * l, 0.0);
                radial(from_end, bounce)
            }
        }
        Shape::Annulus { inner, outer } => {
            let center_line = (inner + outer) / 2.0;
            let off = rel.length() - center_line;
            if off == 0.0 || rel.is_zero() {
                return Vector::ZERO;
            }
            rel.normalize_or_zero() * (off.signum() * bounce / off.abs())
        }
        Shape::Circle { .. } | Shape::Triangle { .. } | Shape::Hexagon { .. } => {
            radial(rel, bounce)
        }
    }
}

fn radial(rel: Vector, bounce: f64) -> Vector {
    let d = rel.length();
    if d == 0.0 {
        return Vector::ZERO;
    }
    rel.normalize_or_zero() * (bounce / d)
}
