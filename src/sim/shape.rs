//! Collision shapes
//!
//! Shapes are described in local coordinates around an entity's position.
//! [`Placed`] pairs a shape with a world position; every geometric query the
//! collision engine and the occluder builder need lives on it.

use serde::{Deserialize, Serialize};

use super::Vector;

/// Which way a right triangle's hypotenuse faces, as a pair of unit signs
///
/// The right-angle corner sits in the opposite quadrant of the bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i8; 2]", into = "[i8; 2]")]
pub struct Quadrant {
    sx: i8,
    sy: i8,
}

impl Quadrant {
    /// Only the signs matter; zero counts as positive
    pub fn new(sx: i8, sy: i8) -> Self {
        let sign = |s: i8| if s < 0 { -1 } else { 1 };
        Self {
            sx: sign(sx),
            sy: sign(sy),
        }
    }

    #[inline]
    pub fn sx(self) -> f64 {
        self.sx as f64
    }

    #[inline]
    pub fn sy(self) -> f64 {
        self.sy as f64
    }

    pub fn opposite(self) -> Self {
        Self {
            sx: -self.sx,
            sy: -self.sy,
        }
    }
}

impl Default for Quadrant {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl From<[i8; 2]> for Quadrant {
    fn from(s: [i8; 2]) -> Self {
        Self::new(s[0], s[1])
    }
}

impl From<Quadrant> for [i8; 2] {
    fn from(q: Quadrant) -> Self {
        [q.sx, q.sy]
    }
}

/// A convex primitive (or, for the hexagon, a union of them)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Rect { width: f64, height: f64 },
    Circle { radius: f64 },
    /// Ring between two concentric circles
    Annulus { inner: f64, outer: f64 },
    /// Right triangle filling half of a `width` x `height` box
    Triangle {
        width: f64,
        height: f64,
        quadrant: Quadrant,
    },
    /// Flat-topped regular hexagon (width 2r, height √3·r)
    Hexagon { radius: f64 },
}

impl Shape {
    /// Dispatch order: lower rank is always the first argument
    pub fn rank(&self) -> u8 {
        match self {
            Shape::Rect { .. } => 1,
            Shape::Circle { .. } => 2,
            Shape::Annulus { .. } => 3,
            Shape::Triangle { .. } => 4,
            Shape::Hexagon { .. } => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Rect { .. } => "rect",
            Shape::Circle { .. } => "circle",
            Shape::Annulus { .. } => "annulus",
            Shape::Triangle { .. } => "triangle",
            Shape::Hexagon { .. } => "hexagon",
        }
    }

    /// A shape of the named kind filling a `size` x `size` cell
    pub fn from_kind(kind: &str, size: f64) -> Option<Shape> {
        let shape = match kind {
            "rect" => Shape::Rect {
                width: size,
                height: size,
            },
            "circle" => Shape::Circle { radius: size / 2.0 },
            "annulus" => Shape::Annulus {
                inner: size / 4.0,
                outer: size / 2.0,
            },
            "triangle" => Shape::Triangle {
                width: size,
                height: size,
                quadrant: Quadrant::default(),
            },
            "hexagon" => Shape::Hexagon { radius: size / 2.0 },
            other => {
                log::error!("Unknown shape kind '{}'", other);
                return None;
            }
        };
        Some(shape)
    }

    /// Finite, non-negative parameters (and inner <= outer for rings)
    pub fn is_valid(&self) -> bool {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        match *self {
            Shape::Rect { width, height } | Shape::Triangle { width, height, .. } => {
                ok(width) && ok(height)
            }
            Shape::Circle { radius } | Shape::Hexagon { radius } => ok(radius),
            Shape::Annulus { inner, outer } => ok(inner) && ok(outer) && inner <= outer,
        }
    }

    /// Half extents of the axis-aligned bounding box
    pub fn half_extents(&self) -> Vector {
        match *self {
            Shape::Rect { width, height } | Shape::Triangle { width, height, .. } => {
                Vector::new(width / 2.0, height / 2.0)
            }
            Shape::Circle { radius } => Vector::new(radius, radius),
            Shape::Annulus { outer, .. } => Vector::new(outer, outer),
            Shape::Hexagon { radius } => Vector::new(radius, radius * 3.0_f64.sqrt() / 2.0),
        }
    }

    /// True for shapes whose outline is made of straight edges
    pub fn is_polygon(&self) -> bool {
        matches!(
            self,
            Shape::Rect { .. } | Shape::Triangle { .. } | Shape::Hexagon { .. }
        )
    }
}

/// A shape at a world position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placed {
    pub pos: Vector,
    pub shape: Shape,
}

impl Placed {
    pub fn new(pos: Vector, shape: Shape) -> Self {
        Self { pos, shape }
    }

    /// (min, max) corners of the bounding box
    pub fn bounds(&self) -> (Vector, Vector) {
        let half = self.shape.half_extents();
        (self.pos - half, self.pos + half)
    }

    /// Outline vertices in counter-clockwise order; empty for round shapes
    pub fn vertices(&self) -> Vec<Vector> {
        let p = self.pos;
        match self.shape {
            Shape::Rect { width, height } => {
                let (hw, hh) = (width / 2.0, height / 2.0);
                vec![
                    p + Vector::new(-hw, -hh),
                    p + Vector::new(hw, -hh),
                    p + Vector::new(hw, hh),
                    p + Vector::new(-hw, hh),
                ]
            }
            Shape::Triangle {
                width,
                height,
                quadrant,
            } => {
                let (hw, hh) = (quadrant.sx() * width / 2.0, quadrant.sy() * height / 2.0);
                let corner = p + Vector::new(-hw, -hh);
                let a = p + Vector::new(hw, -hh);
                let b = p + Vector::new(-hw, hh);
                if (a - corner).cross(b - corner) >= 0.0 {
                    vec![corner, a, b]
                } else {
                    vec![corner, b, a]
                }
            }
            Shape::Hexagon { radius } => (0..6)
                .map(|i| p + Vector::from_polar(radius, i as f64 * std::f64::consts::FRAC_PI_3))
                .collect(),
            Shape::Circle { .. } | Shape::Annulus { .. } => Vec::new(),
        }
    }

    /// Unnormalised outward normal of a triangle's hypotenuse
    pub fn hypotenuse_normal(&self) -> Option<Vector> {
        match self.shape {
            Shape::Triangle {
                width,
                height,
                quadrant,
            } => Some(Vector::new(quadrant.sx() * height, quadrant.sy() * width)),
            _ => None,
        }
    }

    /// The four corner triangles and the central rectangle of a hexagon
    pub fn hexagon_parts(&self) -> Option<[Placed; 5]> {
        let Shape::Hexagon { radius: r } = self.shape else {
            return None;
        };
        let h = 3.0_f64.sqrt() * r;
        let tri = |sx: i8, sy: i8| {
            Placed::new(
                self.pos + Vector::new(sx as f64 * 3.0 * r / 4.0, sy as f64 * h / 4.0),
                Shape::Triangle {
                    width: r / 2.0,
                    height: h / 2.0,
                    quadrant: Quadrant::new(sx, sy),
                },
            )
        };
        Some([
            tri(1, 1),
            tri(-1, 1),
            tri(-1, -1),
            tri(1, -1),
            Placed::new(
                self.pos,
                Shape::Rect {
                    width: r,
                    height: h,
                },
            ),
        ])
    }

    /// Point containment, boundary included
    pub fn contains_point(&self, point: Vector) -> bool {
        let rel = point - self.pos;
        match self.shape {
            Shape::Rect { width, height } => {
                rel.x().abs() <= width / 2.0 && rel.y().abs() <= height / 2.0
            }
            Shape::Circle { radius } => rel.length_squared() <= radius * radius,
            Shape::Annulus { inner, outer } => {
                let d2 = rel.length_squared();
                d2 >= inner * inner && d2 <= outer * outer
            }
            Shape::Triangle { width, height, .. } => {
                let in_box = rel.x().abs() <= width / 2.0 && rel.y().abs() <= height / 2.0;
                in_box && self.hypotenuse_normal().is_some_and(|n| rel.dot(n) <= 0.0)
            }
            Shape::Hexagon { .. } => self
                .hexagon_parts()
                .is_some_and(|parts| parts.iter().any(|part| part.contains_point(point))),
        }
    }

    /// Nearest point of the solid region to `point` (the point itself if inside)
    pub fn closest_point(&self, point: Vector) -> Vector {
        let rel = point - self.pos;
        match self.shape {
            Shape::Rect { .. } => {
                let half = self.shape.half_extents();
                self.pos + rel.clamp(-half, half)
            }
            Shape::Circle { radius } => {
                if rel.length() <= radius {
                    point
                } else {
                    self.pos + rel.normalize_or_zero() * radius
                }
            }
            Shape::Annulus { inner, outer } => {
                let d = rel.length();
                if d < inner {
                    // The hole is empty; the nearest solid point is on the inner ring
                    let dir = if rel.is_zero() { Vector::X } else { rel.normalize_or_zero() };
                    self.pos + dir * inner
                } else if d > outer {
                    self.pos + rel.normalize_or_zero() * outer
                } else {
                    point
                }
            }
            Shape::Triangle { .. } => {
                if self.contains_point(point) {
                    return point;
                }
                closest_on_outline(&self.vertices(), point)
            }
            Shape::Hexagon { .. } => match self.hexagon_parts() {
                Some(parts) => parts
                    .iter()
                    .map(|part| part.closest_point(point))
                    .min_by(|a, b| a.distance(point).total_cmp(&b.distance(point)))
                    .unwrap_or(self.pos),
                None => self.pos,
            },
        }
    }
}

/// Nearest point on the closed polyline through `vertices`
pub fn closest_on_outline(vertices: &[Vector], point: Vector) -> Vector {
    let n = vertices.len();
    let mut best = match vertices.first() {
        Some(&v) => v,
        None => return point,
    };
    let mut best_d2 = f64::INFINITY;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let ab = b - a;
        let len2 = ab.length_squared();
        let t = if len2 == 0.0 {
            0.0
        } else {
            ((point - a).dot(ab) / len2).clamp(0.0, 1.0)
        };
        let candidate = a + ab * t;
        let d2 = (point - candidate).length_squared();
        if d2 < best_d2 {
            best_d2 = d2;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector {
        Vector::new(x, y)
    }

    #[test]
    fn test_rank_order() {
        let shapes = [
            Shape::Rect {
                width: 1.0,
                height: 1.0,
            },
            Shape::Circle { radius: 1.0 },
            Shape::Annulus {
                inner: 0.5,
                outer: 1.0,
            },
            Shape::Triangle {
                width: 1.0,
                height: 1.0,
                quadrant: Quadrant::default(),
            },
            Shape::Hexagon { radius: 1.0 },
        ];
        let ranks: Vec<u8> = shapes.iter().map(Shape::rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_from_kind() {
        assert_eq!(
            Shape::from_kind("circle", 40.0),
            Some(Shape::Circle { radius: 20.0 })
        );
        assert!(Shape::from_kind("pentagon", 40.0).is_none());
    }

    #[test]
    fn test_validity() {
        assert!(!Shape::Circle { radius: f64::NAN }.is_valid());
        assert!(!Shape::Rect {
            width: -1.0,
            height: 1.0
        }
        .is_valid());
        assert!(!Shape::Annulus {
            inner: 2.0,
            outer: 1.0
        }
        .is_valid());
        assert!(Shape::Hexagon { radius: 0.0 }.is_valid());
    }

    #[test]
    fn test_hexagon_extents() {
        let hex = Shape::Hexagon { radius: 2.0 };
        let half = hex.half_extents();
        assert!((half.x() - 2.0).abs() < 1e-12);
        assert!((half.y() - 3.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_solid_half() {
        let tri = Placed::new(
            Vector::ZERO,
            Shape::Triangle {
                width: 2.0,
                height: 2.0,
                quadrant: Quadrant::new(1, 1),
            },
        );
        // Right-angle corner at (-1, -1); hypotenuse through the center
        assert!(tri.contains_point(v(-0.9, -0.9)));
        assert!(tri.contains_point(Vector::ZERO));
        assert!(!tri.contains_point(v(0.5, 0.5)));

        let verts = tri.vertices();
        assert_eq!(verts.len(), 3);
        assert!(verts[0].same(v(-1.0, -1.0)));
        let area2 = (verts[1] - verts[0]).cross(verts[2] - verts[0]);
        assert!(area2 > 0.0);
    }

    #[test]
    fn test_hexagon_parts_cover_hexagon() {
        let hex = Placed::new(v(3.0, -1.0), Shape::Hexagon { radius: 2.0 });
        let verts = hex.vertices();
        assert_eq!(verts.len(), 6);
        for vert in verts {
            let inside = vert.lerp(hex.pos, 1e-6);
            assert!(hex.contains_point(inside), "vertex {vert:?} not covered");
        }
        assert!(hex.contains_point(hex.pos));
        // Just outside the slanted edge near the top-right corner
        assert!(!hex.contains_point(v(3.0 + 1.9, -1.0 + 1.0)));
    }

    #[test]
    fn test_closest_point() {
        let rect = Placed::new(
            Vector::ZERO,
            Shape::Rect {
                width: 2.0,
                height: 2.0,
            },
        );
        assert!(rect.closest_point(v(3.0, 0.5)).same(v(1.0, 0.5)));

        let ring = Placed::new(
            Vector::ZERO,
            Shape::Annulus {
                inner: 2.0,
                outer: 3.0,
            },
        );
        assert!(ring.closest_point(v(1.0, 0.0)).same(v(2.0, 0.0)));
        assert!(ring.closest_point(v(5.0, 0.0)).same(v(3.0, 0.0)));

        let tri = Placed::new(
            Vector::ZERO,
            Shape::Triangle {
                width: 2.0,
                height: 2.0,
                quadrant: Quadrant::new(1, 1),
            },
        );
        assert!(tri.closest_point(v(1.0, 1.0)).near(Vector::ZERO, 1e-12));
    }

    #[test]
    fn test_quadrant_serde_as_pair() {
        let json = serde_json::to_string(&Quadrant::new(-1, 1)).unwrap();
        assert_eq!(json, "[-1,1]");
        let q: Quadrant = serde_json::from_str("[0,-5]").unwrap();
        assert_eq!(q, Quadrant::new(1, -1));
    }
}
