//! Occluder pools feeding the visibility sweep
//!
//! Segments are grouped by how often they change:
//! - `permanent`: edges of immovable opaque polygons, rebuilt only after
//!   [`OccluderPools::invalidate`]
//! - `on_change`: edges of movable opaque polygons, rebuilt per entity when
//!   it moves
//! - ephemeral: silhouettes of round occluders, generated per observer in
//!   [`OccluderPools::gather`]

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;

use super::arc::ArcSpan;
use super::segment::{Collection, Segment};
use super::shape::{Placed, Shape};
use super::state::{Entity, EntityId};
use super::Vector;

/// Chords used for the inner wall of a ring seen from inside its hole
const INNER_RING_SEGMENTS: usize = 32;

#[derive(Debug, Clone)]
pub struct OccluderPools {
    permanent: Vec<Segment>,
    permanent_dirty: bool,
    on_change: BTreeMap<EntityId, Vec<Segment>>,
}

impl Default for OccluderPools {
    fn default() -> Self {
        Self {
            permanent: Vec::new(),
            permanent_dirty: true,
            on_change: BTreeMap::new(),
        }
    }
}

impl OccluderPools {
    /// Mark the permanent pool stale (a wall appeared or vanished)
    pub fn invalidate(&mut self) {
        self.permanent_dirty = true;
    }

    pub fn permanent(&self) -> &[Segment] {
        &self.permanent
    }

    pub fn tracks(&self, id: EntityId) -> bool {
        self.on_change.contains_key(&id)
    }

    /// Drop everything cached for an entity that left the world
    pub fn forget(&mut self, id: EntityId) {
        self.on_change.remove(&id);
    }

    /// Rebuild the permanent pool if it was invalidated
    pub fn rebuild_permanent(&mut self, entities: &[Entity]) -> bool {
        if !self.permanent_dirty {
            return false;
        }
        let mut edges = Vec::new();
        for e in entities {
            if e.flags.opaque && !e.flags.movable {
                edges.extend(
                    shape_edges(&e.placed())
                        .into_iter()
                        .map(|s| s.with_owner(e.id).in_collection(Collection::Permanent)),
                );
            }
        }
        self.permanent = drop_shared_edges(edges);
        self.permanent_dirty = false;
        log::debug!("Rebuilt permanent occluders: {} segments", self.permanent.len());
        true
    }

    /// Rebuild the segments of one movable occluder
    pub fn rebuild_on_change(&mut self, entity: &Entity) {
        if !(entity.flags.opaque && entity.flags.movable) || !entity.shape.is_polygon() {
            self.on_change.remove(&entity.id);
            return;
        }
        let segments = shape_edges(&entity.placed())
            .into_iter()
            .map(|s| s.with_owner(entity.id).in_collection(Collection::OnChange))
            .collect();
        self.on_change.insert(entity.id, segments);
    }

    /// Everything one observer has to sweep: the cached pools plus fresh
    /// silhouettes of round occluders within reach
    pub fn gather(&self, observer: Vector, view_range: f64, entities: &[Entity], out: &mut Vec<Segment>) {
        out.clear();
        out.extend_from_slice(&self.permanent);
        for segments in self.on_change.values() {
            out.extend_from_slice(segments);
        }
        for e in entities {
            if !e.flags.opaque || e.shape.is_polygon() {
                continue;
            }
            let reach = view_range + e.shape.half_extents().x();
            if e.pos.distance(observer) > reach {
                continue;
            }
            out.extend(
                silhouette_segments(observer, &e.placed())
                    .into_iter()
                    .map(|s| s.with_owner(e.id)),
            );
        }
    }
}

/// Straight outline edges of a polygonal shape
pub fn shape_edges(placed: &Placed) -> Vec<Segment> {
    let vertices = placed.vertices();
    let n = vertices.len();
    (0..n)
        .map(|i| Segment::wall(vertices[i], vertices[(i + 1) % n]))
        .collect()
}

/// Edges shared by two adjacent solids lie inside the wall mass
fn drop_shared_edges(edges: Vec<Segment>) -> Vec<Segment> {
    let mut counts: HashMap<(i64, i64, i64, i64), usize> = HashMap::new();
    for s in &edges {
        *counts.entry(s.dedup_key()).or_insert(0) += 1;
    }
    edges
        .into_iter()
        .filter(|s| counts.get(&s.dedup_key()).copied().unwrap_or(0) < 2)
        .collect()
}

/// Observer-dependent outline of a round occluder
pub fn silhouette_segments(observer: Vector, placed: &Placed) -> Vec<Segment> {
    match placed.shape {
        Shape::Circle { radius } => circle_silhouette(observer, placed.pos, radius)
            .into_iter()
            .collect(),
        Shape::Annulus { inner, outer } => {
            let d = observer.distance(placed.pos);
            if d > outer {
                circle_silhouette(observer, placed.pos, outer)
                    .into_iter()
                    .collect()
            } else if d < inner {
                inner_ring(placed.pos, inner)
            } else {
                // Standing inside the solid band: nothing to cast
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Chord between the two tangent points, tagged with the near arc.
/// `None` when the observer is on or inside the circle.
pub fn circle_silhouette(observer: Vector, center: Vector, radius: f64) -> Option<Segment> {
    let rel = observer - center;
    let d = rel.length();
    if radius <= 0.0 || d <= radius {
        return None;
    }
    let alpha = (radius / d).acos();
    let theta = rel.angle();
    let t1 = center + Vector::from_polar(radius, theta + alpha);
    let t2 = center + Vector::from_polar(radius, theta - alpha);
    let arc = ArcSpan::between(center, radius, t1, t2);
    Some(Segment::chord(t1, t2, arc))
}

fn inner_ring(center: Vector, radius: f64) -> Vec<Segment> {
    let step = TAU / INNER_RING_SEGMENTS as f64;
    (0..INNER_RING_SEGMENTS)
        .map(|k| {
            let a = k as f64 * step;
            let b = a + step;
            let arc = ArcSpan::new(center, radius, a, b);
            Segment::chord(arc.point_at(a), arc.point_at(b), arc)
        })
        .collect()
}
