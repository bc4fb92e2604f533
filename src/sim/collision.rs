//! Overlap tests between placed shapes
//!
//! `collides` orders the pair by [`Shape::rank`] and calls exactly one
//! function per unordered pair, so the answer never depends on argument
//! order. A bounding-box test runs first and is the whole answer for two
//! rectangles.

use super::shape::{Placed, Shape};
use super::Vector;

/// Do the two placed shapes overlap (touching counts)?
pub fn collides(a: &Placed, b: &Placed) -> bool {
    for p in [a, b] {
        if !p.shape.is_valid() {
            log::warn!("Ignoring malformed {} at {:?}: {:?}", p.shape.name(), p.pos, p.shape);
            return false;
        }
    }
    if !bounds_overlap(a, b) {
        return false;
    }

    let (a, b) = if a.shape.rank() <= b.shape.rank() {
        (a, b)
    } else {
        (b, a)
    };

    match (a.shape, b.shape) {
        (_, Shape::Hexagon { .. }) => hexagon_any(a, b),
        (Shape::Rect { .. }, Shape::Rect { .. }) => true,
        (Shape::Rect { .. }, Shape::Circle { radius }) => polygon_circle(a, b.pos, radius),
        (Shape::Rect { .. }, Shape::Annulus { inner, outer }) => {
            polygon_annulus(a, b.pos, inner, outer)
        }
        (Shape::Rect { .. }, Shape::Triangle { .. }) => rect_triangle(a, b),
        (Shape::Circle { radius: r1 }, Shape::Circle { radius: r2 }) => {
            let reach = r1 + r2;
            (a.pos - b.pos).length_squared() <= reach * reach
        }
        (Shape::Circle { radius }, Shape::Annulus { inner, outer }) => {
            let d = a.pos.distance(b.pos);
            d - radius <= outer && d + radius >= inner
        }
        (Shape::Circle { radius }, Shape::Triangle { .. }) => polygon_circle(b, a.pos, radius),
        (
            Shape::Annulus {
                inner: i1,
                outer: o1,
            },
            Shape::Annulus {
                inner: i2,
                outer: o2,
            },
        ) => {
            let d = a.pos.distance(b.pos);
            // Neither ring may sit wholly inside the other's hole
            d <= o1 + o2 && d + o1 >= i2 && d + o2 >= i1
        }
        (Shape::Annulus { inner, outer }, Shape::Triangle { .. }) => {
            polygon_annulus(b, a.pos, inner, outer)
        }
        (Shape::Triangle { .. }, Shape::Triangle { .. }) => triangle_triangle(a, b),
        // Canonical ordering leaves only the pairs above
        _ => unreachable_pair(a, b),
    }
}

fn unreachable_pair(a: &Placed, b: &Placed) -> bool {
    log::error!(
        "No collision routine for {} vs {}",
        a.shape.name(),
        b.shape.name()
    );
    false
}

/// Bounding boxes overlap (closed intervals)
pub fn bounds_overlap(a: &Placed, b: &Placed) -> bool {
    let ha = a.shape.half_extents();
    let hb = b.shape.half_extents();
    let d = a.pos - b.pos;
    d.x().abs() <= ha.x() + hb.x() && d.y().abs() <= ha.y() + hb.y()
}

/// Hexagons are the union of their parts
fn hexagon_any(other: &Placed, hex: &Placed) -> bool {
    hex.hexagon_parts()
        .is_some_and(|parts| parts.iter().any(|part| collides(other, part)))
}

/// Rect or triangle against a disc
fn polygon_circle(poly: &Placed, center: Vector, radius: f64) -> bool {
    if poly.contains_point(center) {
        return true;
    }
    let nearest = poly.closest_point(center);
    (center - nearest).length_squared() <= radius * radius
}

/// Rect or triangle against a ring, classified by where the polygon's
/// reference point falls
fn polygon_annulus(poly: &Placed, center: Vector, inner: f64, outer: f64) -> bool {
    let d2 = (poly.pos - center).length_squared();
    if d2 < inner * inner {
        // Convex polygon in the hole touches the ring only if a vertex reaches it
        poly.vertices()
            .iter()
            .any(|&v| (v - center).length_squared() >= inner * inner)
    } else if d2 > outer * outer {
        polygon_circle(poly, center, outer)
    } else {
        true
    }
}

/// Separating axis on the hypotenuse normal; x and y are covered by the
/// bounding-box test
fn rect_triangle(rect: &Placed, tri: &Placed) -> bool {
    let (Shape::Rect { width, height }, Some(n)) = (rect.shape, tri.hypotenuse_normal()) else {
        return false;
    };
    let reach = n.x().abs() * width / 2.0 + n.y().abs() * height / 2.0;
    (rect.pos - tri.pos).dot(n) - reach <= 0.0
}

fn triangle_triangle(a: &Placed, b: &Placed) -> bool {
    let va = a.vertices();
    let vb = b.vertices();
    [a.hypotenuse_normal(), b.hypotenuse_normal()]
        .into_iter()
        .flatten()
        .all(|axis| {
            let (a_min, a_max) = project(&va, axis);
            let (b_min, b_max) = project(&vb, axis);
            a_min <= b_max && b_min <= a_max
        })
}

fn project(vertices: &[Vector], axis: Vector) -> (f64, f64) {
    vertices
        .iter()
        .map(|v| v.dot(axis))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}
