//! Occluding segments and the observer-relative predicates the sweep needs
//!
//! Segments are immutable values. Anything that depends on an observer
//! (endpoint angles, which endpoint opens the sweep) is computed on demand
//! by [`Segment::observe`] and returned as a [`SegmentFrame`].

use serde::{Deserialize, Serialize};

use super::arc::ArcSpan;
use super::state::EntityId;
use super::Vector;
use crate::consts::{DEPTH_NUDGE, PARALLEL_EPSILON};
use crate::normalize_angle;

/// How long a segment lives in the occluder pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    /// Static geometry, rebuilt only when the pool is invalidated
    Permanent,
    /// Rebuilt when the owning entity changes
    OnChange,
    /// Regenerated every tick (silhouettes that depend on the observer)
    EveryTick,
}

/// Result of intersecting two segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intersection {
    Point(Vector),
    None,
    /// Both lie on one line and overlap
    Collinear,
}

/// Relative depth of two segments as seen from a reference point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthOrder {
    InFront,
    Behind,
    /// Orientation alone cannot decide (crossing or tangent segments)
    Indeterminate,
}

/// Per-observer annotation of one endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointFrame {
    /// Angle of the endpoint around the observer, in (-π, π]
    pub angle: f64,
    /// True if the sweep enters the segment at this endpoint
    pub opens: bool,
}

/// Per-observer annotation of a segment, valid for one observer and one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentFrame {
    pub endpoints: [EndpointFrame; 2],
}

impl SegmentFrame {
    /// Angle at which the sweep enters the segment
    pub fn open_angle(&self) -> f64 {
        if self.endpoints[0].opens {
            self.endpoints[0].angle
        } else {
            self.endpoints[1].angle
        }
    }

    /// Angular width of the segment as seen by the observer
    pub fn span(&self) -> f64 {
        normalize_angle(self.endpoints[1].angle - self.endpoints[0].angle).abs()
    }
}

/// A wall, a full line, or the chord of a curved occluder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub p1: Vector,
    pub p2: Vector,
    /// False for a full line through p1 and p2
    pub finite: bool,
    /// Curved occluder this segment is the chord of
    pub arc: Option<ArcSpan>,
    pub collection: Collection,
    pub owner: Option<EntityId>,
}

impl Segment {
    /// A straight, finite wall
    pub fn wall(p1: Vector, p2: Vector) -> Self {
        Self {
            p1,
            p2,
            finite: true,
            arc: None,
            collection: Collection::Permanent,
            owner: None,
        }
    }

    /// An infinite line through two points
    pub fn line(p1: Vector, p2: Vector) -> Self {
        Self {
            finite: false,
            ..Self::wall(p1, p2)
        }
    }

    /// The chord of a curved occluder
    pub fn chord(p1: Vector, p2: Vector, arc: ArcSpan) -> Self {
        Self {
            arc: Some(arc),
            collection: Collection::EveryTick,
            ..Self::wall(p1, p2)
        }
    }

    pub fn with_owner(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn in_collection(mut self, collection: Collection) -> Self {
        self.collection = collection;
        self
    }

    #[inline]
    pub fn direction(&self) -> Vector {
        self.p2 - self.p1
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.direction().length()
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.direction().is_zero()
    }

    /// Intersect with another segment. With `allow_infinite` both are
    /// treated as lines; a non-finite segment is always a line.
    pub fn intersect(&self, other: &Segment, allow_infinite: bool) -> Intersection {
        let d1 = self.direction();
        let d2 = other.direction();
        if d1.is_zero() || d2.is_zero() {
            return Intersection::None;
        }

        let self_bounded = self.finite && !allow_infinite;
        let other_bounded = other.finite && !allow_infinite;
        let offset = other.p1 - self.p1;
        let denom = d1.cross(d2);

        if denom.abs() <= PARALLEL_EPSILON * d1.length() * d2.length() {
            // Parallel: only colinear pairs can touch
            if offset.cross(d1).abs() > PARALLEL_EPSILON * d1.length() * offset.length() {
                return Intersection::None;
            }
            if !self_bounded || !other_bounded {
                return Intersection::Collinear;
            }
            let len2 = d1.length_squared();
            let t1 = offset.dot(d1) / len2;
            let t2 = (other.p2 - self.p1).dot(d1) / len2;
            let lo = t1.min(t2).max(0.0);
            let hi = t1.max(t2).min(1.0);
            return if lo <= hi {
                Intersection::Collinear
            } else {
                Intersection::None
            };
        }

        let t = offset.cross(d2) / denom;
        let u = offset.cross(d1) / denom;
        let within = |s: f64| (-PARALLEL_EPSILON..=1.0 + PARALLEL_EPSILON).contains(&s);
        if (self_bounded && !within(t)) || (other_bounded && !within(u)) {
            return Intersection::None;
        }
        Intersection::Point(self.p1 + d1 * t)
    }

    /// +1 if the point is left of p1→p2, -1 if right, 0 if on the line
    pub fn side_of(&self, point: Vector) -> i8 {
        let d = self.direction();
        let rel = point - self.p1;
        let c = d.cross(rel);
        if c.abs() <= PARALLEL_EPSILON * d.length() * rel.length() {
            0
        } else if c > 0.0 {
            1
        } else {
            -1
        }
    }

    /// Annotate the endpoints for one observer. Zero-length segments,
    /// segments through the observer and edge-on segments yield `None`.
    pub fn observe(&self, observer: Vector) -> Option<SegmentFrame> {
        let r1 = self.p1 - observer;
        let r2 = self.p2 - observer;
        if self.is_degenerate() || r1.is_zero() || r2.is_zero() {
            return None;
        }
        if r1.cross(r2).abs() <= PARALLEL_EPSILON * r1.length() * r2.length() {
            return None;
        }

        let a1 = r1.angle();
        let a2 = r2.angle();
        let delta = normalize_angle(a2 - a1);
        Some(SegmentFrame {
            endpoints: [
                EndpointFrame {
                    angle: a1,
                    opens: delta > 0.0,
                },
                EndpointFrame {
                    angle: a2,
                    opens: delta <= 0.0,
                },
            ],
        })
    }

    /// Orientation-only depth test: is `self` in front of `other` when
    /// looking from `reference`?
    pub fn depth_against(&self, other: &Segment, reference: Vector) -> DepthOrder {
        let a1 = self.side_of(other.p1.lerp(other.p2, DEPTH_NUDGE));
        let a2 = self.side_of(other.p2.lerp(other.p1, DEPTH_NUDGE));
        let a3 = self.side_of(reference);
        if a1 == a2 && a1 != 0 && a3 != 0 {
            // `other` lies wholly on one side of our line
            return if a1 != a3 {
                DepthOrder::InFront
            } else {
                DepthOrder::Behind
            };
        }

        let b1 = other.side_of(self.p1.lerp(self.p2, DEPTH_NUDGE));
        let b2 = other.side_of(self.p2.lerp(self.p1, DEPTH_NUDGE));
        let b3 = other.side_of(reference);
        if b1 == b2 && b1 != 0 && b3 != 0 {
            return if b1 == b3 {
                DepthOrder::InFront
            } else {
                DepthOrder::Behind
            };
        }

        DepthOrder::Indeterminate
    }

    /// Where the ray from `observer` at `angle` meets this occluder: the
    /// supporting line for straight segments, the nearest forward crossing of
    /// the circle for arcs.
    pub fn ray_hit(&self, observer: Vector, angle: f64) -> Option<Vector> {
        let dir = Vector::from_polar(1.0, angle);

        if let Some(arc) = self.arc {
            let oc = observer - arc.center;
            let b = oc.dot(dir);
            let c = oc.length_squared() - arc.radius * arc.radius;
            let mut disc = b * b - c;
            // Rays grazing the silhouette land a hair outside the circle
            if disc < 0.0 && disc > -1e-9 * arc.radius * arc.radius {
                disc = 0.0;
            }
            if disc >= 0.0 {
                let sq = disc.sqrt();
                let near = -b - sq;
                let far = -b + sq;
                let t = if near > 0.0 { near } else { far };
                if t > 0.0 {
                    return Some(observer + dir * t);
                }
            }
        }

        let d = self.direction();
        let denom = dir.cross(d);
        if denom.abs() <= PARALLEL_EPSILON * d.length() {
            return None;
        }
        let t = (self.p1 - observer).cross(d) / denom;
        if t < 0.0 {
            return None;
        }
        Some(observer + dir * t)
    }

    /// Distance along the ray to [`Segment::ray_hit`]
    pub fn ray_distance(&self, observer: Vector, angle: f64) -> Option<f64> {
        self.ray_hit(observer, angle).map(|p| p.distance(observer))
    }

    /// The part of this segment inside the disc, if any
    pub fn clip_to_disc(&self, center: Vector, radius: f64) -> Option<Segment> {
        let d = self.direction();
        let a = d.length_squared();
        if a == 0.0 {
            return None;
        }
        let f = self.p1 - center;
        let b = f.dot(d);
        let c = f.length_squared() - radius * radius;
        let disc = b * b - a * c;
        if disc <= 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        let t0 = (-b - sq) / a;
        let t1 = (-b + sq) / a;
        let (lo, hi) = if self.finite {
            (t0.max(0.0), t1.min(1.0))
        } else {
            (t0, t1)
        };
        if hi - lo <= PARALLEL_EPSILON {
            return None;
        }
        if self.finite && lo == 0.0 && hi == 1.0 {
            return Some(*self);
        }
        Some(Segment {
            p1: self.p1 + d * lo,
            p2: self.p1 + d * hi,
            finite: true,
            ..*self
        })
    }

    /// Orientation-free key used to drop geometrically identical segments
    pub fn dedup_key(&self) -> (i64, i64, i64, i64) {
        const QUANTUM: f64 = 1e-7;
        let q = |v: Vector| ((v.x() / QUANTUM).round() as i64, (v.y() / QUANTUM).round() as i64);
        let a = q(self.p1);
        let b = q(self.p2);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        (lo.0, lo.1, hi.0, hi.1)
    }
}
