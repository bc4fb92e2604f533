//! Shadow casting: the region visible from a point
//!
//! Angular plane sweep around the observer. Every occluder endpoint becomes
//! an open or close event; the open set is kept ordered nearest to farthest
//! and each time its head changes, the previous nearest segment is clipped
//! to the angular interval it owned and emitted as a boundary edge.
//!
//! The view range is a ring of straight chords appended to the occluders,
//! so the sweep always has something open. Occluders are clipped to the
//! disc inscribed in that ring first, which keeps every wall in front of
//! the ring.

use std::collections::HashSet;
use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use super::arc::ArcSpan;
use super::segment::{Collection, DepthOrder, Intersection, Segment};
use super::state::EntityId;
use super::Vector;
use crate::consts::*;

/// Who is looking, from where, how far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    pub position: Vector,
    pub view_range: f64,
    /// Chords approximating the view circle
    pub ring_segments: usize,
}

impl Observer {
    pub fn new(position: Vector, view_range: f64) -> Self {
        Self {
            position,
            view_range,
            ring_segments: VIEW_RING_SEGMENTS,
        }
    }

    pub fn with_ring_segments(mut self, ring_segments: usize) -> Self {
        self.ring_segments = ring_segments;
        self
    }
}

/// Geometry of a boundary edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EdgeShape {
    Straight,
    /// Visible part of a curved occluder or of the view circle
    Arc(ArcSpan),
}

/// What a boundary edge lies on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSource {
    pub owner: Option<EntityId>,
    pub collection: Collection,
    pub shape: EdgeShape,
}

/// Counter-clockwise visible region. `edges[i]` describes the edge from
/// `vertices[i]` to `vertices[i + 1]`; radial shadow edges carry `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisibilityPolygon {
    pub observer: Vector,
    pub vertices: Vec<Vector>,
    pub edges: Vec<Option<EdgeSource>>,
}

impl VisibilityPolygon {
    pub fn empty(observer: Vector) -> Self {
        Self {
            observer,
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Shoelace area
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.vertices[i].cross(self.vertices[j]);
        }
        area.abs() / 2.0
    }

    /// Ray-casting point-in-polygon test
    pub fn contains_point(&self, point: Vector) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let (px, py) = (point.x(), point.y());
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.vertices[i].x(), self.vertices[i].y());
            let (xj, yj) = (self.vertices[j].x(), self.vertices[j].y());
            if (yi > py) != (yj > py) {
                let intersect_x = (xj - xi) * (py - yi) / (yj - yi) + xi;
                if px < intersect_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Boundary edges as segments, in ring order
    pub fn boundary(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment::wall(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Does the closed outline cross or touch our boundary, or lie inside it?
    pub fn intersects_polygon(&self, outline: &[Vector]) -> bool {
        let n = outline.len();
        if n == 0 || self.vertices.len() < 3 {
            return false;
        }
        let crosses = self.boundary().any(|edge| {
            (0..n).any(|i| {
                let other = Segment::wall(outline[i], outline[(i + 1) % n]);
                !matches!(edge.intersect(&other, false), Intersection::None)
            })
        });
        crosses || self.contains_point(outline[0])
    }

    /// True if edge `i` runs along the limit of the observer's view range
    pub fn is_view_limit(&self, i: usize) -> bool {
        matches!(
            self.edges.get(i),
            Some(Some(EdgeSource {
                shape: EdgeShape::Arc(arc),
                ..
            })) if arc.center.same(self.observer)
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Event {
    /// Grouped angle
    angle: f64,
    /// Sort key: grouped angle nudged so closes sort before opens
    key: f64,
    opens: bool,
    segment: usize,
    /// Angle just inside the segment, used to break depth ties
    tie_angle: f64,
}

/// Buffers reused across sweeps
#[derive(Debug, Clone, Default)]
pub struct SweepScratch {
    segments: Vec<Segment>,
    seen: HashSet<(i64, i64, i64, i64)>,
    events: Vec<Event>,
    skip: HashSet<usize>,
    open: Vec<usize>,
    vertices: Vec<Vector>,
    edges: Vec<Option<EdgeSource>>,
}

impl SweepScratch {
    fn clear(&mut self) {
        self.segments.clear();
        self.seen.clear();
        self.events.clear();
        self.skip.clear();
        self.open.clear();
        self.vertices.clear();
        self.edges.clear();
    }
}

/// Angles at -π (or rounding noise above it) join the group at +π
fn fold_angle(angle: f64) -> f64 {
    if angle <= -PI + ANGLE_GROUP_EPSILON {
        PI
    } else {
        angle
    }
}

/// Compute the visible region around `observer`
pub fn compute_visibility(
    observer: &Observer,
    occluders: &[Segment],
    scratch: &mut SweepScratch,
) -> VisibilityPolygon {
    scratch.clear();
    let origin = observer.position;
    let range = observer.view_range;
    if !(range.is_finite() && range > 0.0) {
        log::warn!("Observer at {:?} has invalid view range {}", origin, range);
        return VisibilityPolygon::empty(origin);
    }
    let ring_count = observer.ring_segments.max(3);
    let inscribed = range * (PI / ring_count as f64).cos();

    for s in occluders {
        if !scratch.seen.insert(s.dedup_key()) {
            continue;
        }
        if let Some(clipped) = s.clip_to_disc(origin, inscribed) {
            scratch.segments.push(clipped);
        }
    }

    let ring_start = scratch.segments.len();
    let step = TAU / ring_count as f64;
    let ring_point = |k: usize| origin + Vector::from_polar(range, k as f64 * step);
    for k in 0..ring_count {
        scratch.segments.push(
            Segment::wall(ring_point(k), ring_point((k + 1) % ring_count))
                .in_collection(Collection::EveryTick),
        );
    }

    collect_events(origin, scratch);

    let mut begin = 0.0;
    for pass in 0..2 {
        for k in 0..scratch.events.len() {
            let event = scratch.events[k];
            let before = scratch.open.first().copied();
            if event.opens {
                insert_open(scratch, origin, event);
            } else {
                scratch.open.retain(|&s| s != event.segment);
            }
            let after = scratch.open.first().copied();
            if before == after {
                continue;
            }
            if pass == 1 {
                if let Some(previous) = before {
                    emit(scratch, observer, previous, ring_start, begin, event.angle);
                }
            }
            begin = event.angle;
        }
    }

    let mut vertices = std::mem::take(&mut scratch.vertices);
    let mut edges = std::mem::take(&mut scratch.edges);
    collapse(&mut vertices, &mut edges);
    log::trace!(
        "Visibility from {:?}: {} segments, {} vertices",
        origin,
        scratch.segments.len(),
        vertices.len()
    );
    VisibilityPolygon {
        observer: origin,
        vertices,
        edges,
    }
}

fn collect_events(origin: Vector, scratch: &mut SweepScratch) {
    for (i, s) in scratch.segments.iter().enumerate() {
        let Some(frame) = s.observe(origin) else {
            continue;
        };
        let tie_angle = frame.open_angle() + (frame.span() / 2.0).min(1e-4);
        for ep in frame.endpoints {
            scratch.events.push(Event {
                angle: fold_angle(ep.angle),
                key: 0.0,
                opens: ep.opens,
                segment: i,
                tie_angle,
            });
        }
    }

    // Chain nearby angles onto one representative
    scratch.events.sort_by(|a, b| a.angle.total_cmp(&b.angle));
    let mut representative = 0.0;
    let mut last = f64::NEG_INFINITY;
    for event in scratch.events.iter_mut() {
        if event.angle - last > ANGLE_GROUP_EPSILON {
            representative = event.angle;
        }
        last = event.angle;
        event.angle = representative;
        event.key = representative + if event.opens { SWEEP_NUDGE } else { -SWEEP_NUDGE };
    }

    // A segment whose endpoints share a group would stay open all the way round
    scratch.events.sort_by_key(|e| e.segment);
    for pair in scratch.events.chunks(2) {
        if let [a, b] = pair {
            if a.angle == b.angle {
                scratch.skip.insert(a.segment);
            }
        }
    }
    let skip = &scratch.skip;
    scratch.events.retain(|e| !skip.contains(&e.segment));

    scratch
        .events
        .sort_by(|a, b| a.key.total_cmp(&b.key).then(a.segment.cmp(&b.segment)));
}

/// Place a newly opened segment before the first open segment it hides
fn insert_open(scratch: &mut SweepScratch, origin: Vector, event: Event) {
    scratch.open.retain(|&s| s != event.segment);
    let segments = &scratch.segments;
    let new = &segments[event.segment];
    let at = scratch
        .open
        .iter()
        .position(|&other| is_in_front(new, &segments[other], origin, event.tie_angle))
        .unwrap_or(scratch.open.len());
    scratch.open.insert(at, event.segment);
}

fn is_in_front(new: &Segment, other: &Segment, origin: Vector, tie_angle: f64) -> bool {
    match new.depth_against(other, origin) {
        DepthOrder::InFront => true,
        DepthOrder::Behind => false,
        DepthOrder::Indeterminate => {
            match (new.ray_distance(origin, tie_angle), other.ray_distance(origin, tie_angle)) {
                // Equal distance means no change in depth
                (Some(a), Some(b)) => a < b * (1.0 - PARALLEL_EPSILON),
                _ => false,
            }
        }
    }
}

/// Clip segment `index` to the interval [begin, end] and append it
fn emit(
    scratch: &mut SweepScratch,
    observer: &Observer,
    index: usize,
    ring_start: usize,
    begin: f64,
    end: f64,
) {
    let origin = observer.position;
    let s = scratch.segments[index];
    let p1 = hit_or_endpoint(&s, origin, begin);
    let p2 = hit_or_endpoint(&s, origin, end);

    let shape = if index >= ring_start {
        EdgeShape::Arc(ArcSpan::new(origin, observer.view_range, begin, end))
    } else if let Some(arc) = s.arc {
        EdgeShape::Arc(ArcSpan::between(arc.center, arc.radius, p1, p2))
    } else {
        EdgeShape::Straight
    };
    scratch.vertices.push(p1);
    scratch.edges.push(Some(EdgeSource {
        owner: s.owner,
        collection: s.collection,
        shape,
    }));
    scratch.vertices.push(p2);
    scratch.edges.push(None);
}

fn hit_or_endpoint(s: &Segment, origin: Vector, angle: f64) -> Vector {
    s.ray_hit(origin, angle).unwrap_or_else(|| {
        log::debug!("Ray at {} missed {:?}; using nearest endpoint", angle, s);
        let off = |p: Vector| crate::normalize_angle((p - origin).angle() - angle).abs();
        if off(s.p1) <= off(s.p2) { s.p1 } else { s.p2 }
    })
}

/// Remove coincident and colinear vertices until nothing changes
fn collapse(vertices: &mut Vec<Vector>, edges: &mut Vec<Option<EdgeSource>>) {
    loop {
        let mut changed = false;
        let mut i = 0;
        while i < vertices.len() && vertices.len() >= 3 {
            let n = vertices.len();
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;

            if vertices[i].near(vertices[prev], VERTEX_MERGE_EPSILON) {
                // Zero-length edge prev -> i disappears
                edges[prev] = edges[i];
                vertices.remove(i);
                edges.remove(i);
                changed = true;
                continue;
            }
            if vertices[i].near(vertices[next], VERTEX_MERGE_EPSILON) {
                i += 1;
                continue;
            }

            let a = vertices[i] - vertices[prev];
            let b = vertices[next] - vertices[i];
            if a.cross(b).abs() <= COLINEAR_EPSILON * a.length() * b.length() {
                // Straight run or zero-width spike
                edges[prev] = edges[prev].or(edges[i]);
                vertices.remove(i);
                edges.remove(i);
                changed = true;
                continue;
            }
            i += 1;
        }
        if !changed {
            break;
        }
    }
}
