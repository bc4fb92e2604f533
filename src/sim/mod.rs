//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod arc;
pub mod collision;
pub mod contact;
pub mod level;
pub mod occluder;
pub mod segment;
pub mod shape;
pub mod state;
pub mod tick;
pub mod vector;
pub mod visibility;

pub use arc::ArcSpan;
pub use collision::collides;
pub use contact::{ContactOutcome, bounce_force, resolve_rigid};
pub use level::{DEMO_LEVEL, LevelData, LevelError, build_world, load_level, load_level_file};
pub use occluder::OccluderPools;
pub use segment::{Collection, DepthOrder, Intersection, Segment};
pub use shape::{Placed, Quadrant, Shape};
pub use state::{
    Behavior, Command, ContactEvent, Entity, EntityId, Flags, Mover, MoverColor, Panel, PanelKind,
    World,
};
pub use tick::{FixedScheduler, TickInput, tick};
pub use vector::Vector;
pub use visibility::{EdgeShape, EdgeSource, Observer, VisibilityPolygon, compute_visibility};
