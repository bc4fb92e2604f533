//! World state and entity records
//!
//! Entities are plain data plus a [`Behavior`] tag. The [`World`] owns them
//! (sorted by id for deterministic iteration); engines borrow. Structural
//! changes during a tick go through [`World::defer`] and land at the tick
//! boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::BitOr;

use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::contact::ContactOutcome;
use super::occluder::OccluderPools;
use super::segment::Segment;
use super::shape::{Placed, Shape};
use super::visibility::{SweepScratch, VisibilityPolygon};
use super::Vector;
use crate::consts::*;
use crate::settings::Settings;

/// Stable entity handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Physical traits shared by every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    /// Integrated every tick
    pub movable: bool,
    /// Other bodies pass through it
    pub passable: bool,
    /// Blocks sight
    pub opaque: bool,
}

/// Additive RGB colour, one bit per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoverColor(u8);

impl MoverColor {
    pub const BLACK: Self = Self(0);
    pub const BLUE: Self = Self(0b001);
    pub const GREEN: Self = Self(0b010);
    pub const RED: Self = Self(0b100);
    pub const WHITE: Self = Self(0b111);

    /// Every colour except black, in bit order
    pub const MIXES: [Self; 7] = [
        Self(0b001),
        Self(0b010),
        Self(0b011),
        Self(0b100),
        Self(0b101),
        Self(0b110),
        Self(0b111),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name.to_lowercase().as_str() {
            "black" | "none" => Self::BLACK,
            "red" => Self::RED,
            "green" => Self::GREEN,
            "blue" => Self::BLUE,
            "yellow" => Self::RED | Self::GREEN,
            "magenta" => Self::RED | Self::BLUE,
            "cyan" => Self::GREEN | Self::BLUE,
            "white" => Self::WHITE,
            _ => return None,
        };
        Some(color)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0b000 => "black",
            0b001 => "blue",
            0b010 => "green",
            0b011 => "cyan",
            0b100 => "red",
            0b101 => "magenta",
            0b110 => "yellow",
            _ => "white",
        }
    }

    /// True if every channel of `other` is lit in `self`
    pub fn covers(self, other: Self) -> bool {
        other.0 & !self.0 == 0
    }

    /// Colours combine like light
    pub fn mix<I: IntoIterator<Item = MoverColor>>(colors: I) -> Self {
        colors.into_iter().fold(Self::BLACK, |acc, c| acc | c)
    }
}

impl BitOr for MoverColor {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self((self.0 | rhs.0) & 0b111)
    }
}

/// A key and the unit direction it pushes toward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: String,
    pub direction: Vector,
}

impl KeyBinding {
    pub fn new(key: &str, x: f64, y: f64) -> Self {
        Self {
            key: key.to_string(),
            direction: Vector::new(x, y),
        }
    }
}

/// Up, left, down, right keys for the n-th mover of a level (rows grow downward)
pub fn default_bindings(index: usize) -> Vec<KeyBinding> {
    let keys = match index {
        0 => ["KeyW", "KeyA", "KeyS", "KeyD"],
        1 => ["KeyT", "KeyF", "KeyG", "KeyH"],
        2 => ["KeyI", "KeyJ", "KeyK", "KeyL"],
        _ => return Vec::new(),
    };
    bindings_from_keys(&keys)
}

/// Bind four keys to up, left, down, right
pub fn bindings_from_keys(keys: &[&str; 4]) -> Vec<KeyBinding> {
    vec![
        KeyBinding::new(keys[0], 0.0, -1.0),
        KeyBinding::new(keys[1], -1.0, 0.0),
        KeyBinding::new(keys[2], 0.0, 1.0),
        KeyBinding::new(keys[3], 1.0, 0.0),
    ]
}

/// A player-driven observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub color: MoverColor,
    pub view_range: f64,
    pub moving_force: f64,
    pub bindings: Vec<KeyBinding>,
    /// Inactive movers ignore input but still see
    pub active: bool,
}

impl Mover {
    pub fn new(color: MoverColor, bindings: Vec<KeyBinding>) -> Self {
        Self {
            color,
            view_range: MOVER_VIEW_RANGE,
            moving_force: MOVER_FORCE,
            bindings,
            active: true,
        }
    }

    /// Constant-magnitude force toward the sum of held directions
    pub fn drive_force(&self, pressed: &BTreeSet<String>) -> Vector {
        if !self.active {
            return Vector::ZERO;
        }
        let direction = self
            .bindings
            .iter()
            .filter(|b| pressed.contains(&b.key))
            .fold(Vector::ZERO, |acc, b| acc + b.direction);
        direction.normalize_or_zero() * self.moving_force
    }
}

/// Panel variants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PanelKind {
    /// Shows which movers see it
    Positive,
    /// Re-rolls a wall in its cell whenever it drops out of sight after being seen
    Uncertain { wall: Option<EntityId> },
    /// Toggles each time a mover steps onto it
    Button {
        color: MoverColor,
        on: bool,
        touched: bool,
    },
    /// Closes into a bouncy wall while its observers' colours mix to `color`
    Door {
        color: MoverColor,
        wall: Option<EntityId>,
    },
    /// May arm a bomb when it drops out of sight; observers mixing to the
    /// bomb colour defuse it before `blast_tick`
    Timer {
        bomb: Option<MoverColor>,
        blast_tick: Option<u64>,
    },
}

/// A passable floor tile that tracks who sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub kind: PanelKind,
    pub observers: Vec<EntityId>,
    /// Mix of the observers' colours this tick
    pub color: MoverColor,
    /// Seen at some point since the last re-roll
    pub watched: bool,
}

impl Panel {
    pub fn new(kind: PanelKind) -> Self {
        Self {
            kind,
            observers: Vec::new(),
            color: MoverColor::BLACK,
            watched: false,
        }
    }
}

/// What an entity does each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Behavior {
    /// Immovable wall; bodies are pushed back out of it
    Rigid,
    /// Immovable obstacle pushing bodies away with `bounce / distance`
    Bouncy { bounce: f64 },
    /// Bouncy obstacle that is itself pushed around
    Drifting { bounce: f64 },
    Mover(Mover),
    Panel(Panel),
    /// Bursts on first contact with a solid, shoving movers within `range`
    Projectile { range: f64, force: f64 },
}

impl Behavior {
    pub fn default_flags(&self) -> Flags {
        match self {
            Behavior::Rigid | Behavior::Bouncy { .. } => Flags {
                movable: false,
                passable: false,
                opaque: true,
            },
            Behavior::Drifting { .. } => Flags {
                movable: true,
                passable: false,
                opaque: true,
            },
            Behavior::Mover(_) | Behavior::Projectile { .. } => Flags {
                movable: true,
                passable: true,
                opaque: false,
            },
            Behavior::Panel(_) => Flags {
                movable: false,
                passable: true,
                opaque: false,
            },
        }
    }

    pub fn default_friction(&self) -> f64 {
        match self {
            Behavior::Mover(_) => MOVER_FRICTION,
            Behavior::Drifting { .. } => DRIFTING_FRICTION,
            _ => 1.0,
        }
    }
}

/// Anything in the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub pos: Vector,
    pub vel: Vector,
    /// Force accumulated this tick
    pub force: Vector,
    pub mass: f64,
    /// Fraction of velocity kept after one second
    pub friction: f64,
    pub shape: Shape,
    pub flags: Flags,
    /// Movement applied by the last integration step
    pub displacement: Vector,
    pub behavior: Behavior,
}

impl Entity {
    pub fn new(id: EntityId, pos: Vector, shape: Shape, behavior: Behavior) -> Self {
        Self {
            id,
            pos,
            vel: Vector::ZERO,
            force: Vector::ZERO,
            mass: MOVER_MASS,
            friction: behavior.default_friction(),
            shape,
            flags: behavior.default_flags(),
            displacement: Vector::ZERO,
            behavior,
        }
    }

    pub fn placed(&self) -> Placed {
        Placed::new(self.pos, self.shape)
    }

    pub fn apply_force(&mut self, force: Vector) {
        self.force += force;
    }

    /// Semi-implicit Euler step; clears the accumulated force
    pub fn integrate(&mut self, dt: f64) {
        if self.mass > 0.0 {
            self.vel += self.force * (dt / self.mass);
        }
        self.displacement = self.vel * dt;
        self.pos += self.displacement;
        self.force = Vector::ZERO;
    }

    /// Velocity decay, applied after collisions
    pub fn damp(&mut self, dt: f64) {
        self.vel *= self.friction.powf(dt);
    }

    /// Obstacles solid enough to push bodies around
    pub fn is_obstacle(&self) -> bool {
        !self.flags.passable
            && matches!(
                self.behavior,
                Behavior::Rigid | Behavior::Bouncy { .. } | Behavior::Drifting { .. }
            )
    }

    pub fn mover(&self) -> Option<&Mover> {
        match &self.behavior {
            Behavior::Mover(m) => Some(m),
            _ => None,
        }
    }

    pub fn panel(&self) -> Option<&Panel> {
        match &self.behavior {
            Behavior::Panel(p) => Some(p),
            _ => None,
        }
    }

    pub fn panel_mut(&mut self) -> Option<&mut Panel> {
        match &mut self.behavior {
            Behavior::Panel(p) => Some(p),
            _ => None,
        }
    }
}

/// Structural change queued until the tick boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Spawn(Entity),
    Despawn(EntityId),
}

/// RNG state wrapper for serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub stream: u64,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self { seed, stream: 0 }
    }

    /// A fresh generator on the next stream, so replays draw the same values
    pub fn next_rng(&mut self) -> Pcg32 {
        let rng = Pcg32::new(self.seed, self.stream);
        self.stream += 1;
        rng
    }
}

/// Contact reported during the last tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub body: EntityId,
    pub obstacle: EntityId,
    pub outcome: ContactOutcome,
}

/// Complete simulation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub name: String,
    /// Level size in cells
    pub width: usize,
    pub height: usize,
    pub settings: Settings,
    pub rng_state: RngState,
    /// Simulation tick counter
    pub time_ticks: u64,
    /// Bombs defused this session
    #[serde(skip)]
    pub score: u32,
    /// Bombs that went off this session
    #[serde(skip)]
    pub blasts: u32,
    /// All entities (sorted by id for determinism)
    pub entities: Vec<Entity>,
    pending: Vec<Command>,
    /// Next entity ID
    next_id: u32,
    #[serde(skip)]
    pub occluders: OccluderPools,
    /// Latest visibility polygon per mover
    #[serde(skip)]
    pub views: BTreeMap<EntityId, VisibilityPolygon>,
    #[serde(skip)]
    pub contacts: Vec<ContactEvent>,
    #[serde(skip)]
    pub(crate) gathered: Vec<Segment>,
    #[serde(skip)]
    pub(crate) scratch: SweepScratch,
}

impl World {
    pub fn new(name: &str, settings: Settings) -> Self {
        Self {
            name: name.to_string(),
            width: 0,
            height: 0,
            rng_state: RngState::new(settings.seed),
            settings,
            time_ticks: 0,
            score: 0,
            blasts: 0,
            entities: Vec::new(),
            pending: Vec::new(),
            next_id: 1,
            occluders: OccluderPools::default(),
            views: BTreeMap::new(),
            contacts: Vec::new(),
            gathered: Vec::new(),
            scratch: SweepScratch::default(),
        }
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert immediately. Only for building a world outside a tick.
    pub fn spawn(&mut self, pos: Vector, shape: Shape, behavior: Behavior) -> EntityId {
        let id = self.next_entity_id();
        self.insert(Entity::new(id, pos, shape, behavior));
        id
    }

    /// Queue a spawn; the id is valid immediately, the entity appears at the tick boundary
    pub fn defer_spawn(&mut self, pos: Vector, shape: Shape, behavior: Behavior) -> EntityId {
        let id = self.next_entity_id();
        self.defer(Command::Spawn(Entity::new(id, pos, shape, behavior)));
        id
    }

    pub fn defer_despawn(&mut self, id: EntityId) {
        self.defer(Command::Despawn(id));
    }

    pub fn defer(&mut self, command: Command) {
        self.pending.push(command);
    }

    pub fn pending(&self) -> &[Command] {
        &self.pending
    }

    /// Apply queued spawns and despawns in submission order
    pub fn apply_pending(&mut self) {
        for command in std::mem::take(&mut self.pending) {
            match command {
                Command::Spawn(entity) => self.insert(entity),
                Command::Despawn(id) => self.remove(id),
            }
        }
    }

    fn insert(&mut self, entity: Entity) {
        if entity.flags.opaque && !entity.flags.movable {
            self.occluders.invalidate();
        }
        let at = self.entities.partition_point(|e| e.id < entity.id);
        if self.entities.get(at).is_some_and(|e| e.id == entity.id) {
            log::warn!("Entity {:?} already exists; replacing", entity.id);
            self.entities[at] = entity;
        } else {
            self.entities.insert(at, entity);
        }
    }

    fn remove(&mut self, id: EntityId) {
        let Ok(index) = self.entities.binary_search_by_key(&id, |e| e.id) else {
            log::debug!("Despawn of missing entity {:?}", id);
            return;
        };
        let entity = self.entities.remove(index);
        if entity.flags.opaque && !entity.flags.movable {
            self.occluders.invalidate();
        }
        self.occluders.forget(id);
        self.views.remove(&id);
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &mut self.entities[i])
    }

    /// Snapshot of matching ids, safe to hold while mutating entities
    pub fn ids_where<F: Fn(&Entity) -> bool>(&self, pred: F) -> Vec<EntityId> {
        self.entities.iter().filter(|e| pred(e)).map(|e| e.id).collect()
    }

    pub fn mover_ids(&self) -> Vec<EntityId> {
        self.ids_where(|e| e.mover().is_some())
    }

    /// Latest visibility polygon of a mover
    pub fn view(&self, id: EntityId) -> Option<&VisibilityPolygon> {
        self.views.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Shape {
        Shape::Rect {
            width: size,
            height: size,
        }
    }

    #[test]
    fn test_color_mix_is_additive() {
        let mixed = MoverColor::mix([MoverColor::RED, MoverColor::BLUE]);
        assert_eq!(mixed, MoverColor::from_name("magenta").unwrap());
        assert_eq!(MoverColor::mix([]), MoverColor::BLACK);
        assert_eq!((MoverColor::RED | MoverColor::RED).name(), "red");
        assert!(MoverColor::from_name("plaid").is_none());

        let yellow = MoverColor::RED | MoverColor::GREEN;
        let covered: Vec<_> = MoverColor::MIXES
            .into_iter()
            .filter(|&c| yellow.covers(c))
            .collect();
        assert_eq!(covered, vec![MoverColor::GREEN, MoverColor::RED, yellow]);
    }

    #[test]
    fn test_drive_force_has_constant_magnitude() {
        let mover = Mover::new(MoverColor::RED, default_bindings(0));
        let pressed: BTreeSet<String> = ["KeyW", "KeyD"].iter().map(|s| s.to_string()).collect();
        let force = mover.drive_force(&pressed);
        assert!((force.length() - MOVER_FORCE).abs() < 1e-9);
        assert!(force.x() > 0.0 && force.y() < 0.0);

        // Opposite keys cancel
        let pressed: BTreeSet<String> = ["KeyA", "KeyD"].iter().map(|s| s.to_string()).collect();
        assert!(mover.drive_force(&pressed).is_zero());
    }

    #[test]
    fn test_integrate_and_damp() {
        let mut e = Entity::new(EntityId(1), Vector::ZERO, square(1.0), Behavior::Rigid);
        e.apply_force(Vector::new(10.0, 0.0));
        e.integrate(0.5);
        assert!(e.vel.same(Vector::new(5.0, 0.0)));
        assert!(e.pos.same(Vector::new(2.5, 0.0)));
        assert!(e.displacement.same(Vector::new(2.5, 0.0)));
        assert!(e.force.is_zero());

        e.friction = 0.25;
        e.damp(0.5);
        assert!((e.vel.x() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_deferred_commands_apply_at_boundary() {
        let mut world = World::new("test", Settings::default());
        let wall = world.spawn(Vector::ZERO, square(10.0), Behavior::Rigid);
        let late = world.defer_spawn(Vector::new(20.0, 0.0), square(10.0), Behavior::Rigid);
        world.defer_despawn(wall);

        assert!(world.get(wall).is_some());
        assert!(world.get(late).is_none());
        assert_eq!(world.pending().len(), 2);

        world.apply_pending();
        assert!(world.get(wall).is_none());
        assert!(world.get(late).is_some());
        assert!(world.pending().is_empty());
    }

    #[test]
    fn test_ids_where_is_a_snapshot() {
        let mut world = World::new("test", Settings::default());
        for i in 0..3 {
            world.spawn(Vector::new(i as f64, 0.0), square(1.0), Behavior::Rigid);
        }
        let ids = world.ids_where(|e| e.flags.opaque);
        for id in &ids {
            world.defer_despawn(*id);
        }
        world.apply_pending();
        assert_eq!(ids.len(), 3);
        assert!(world.entities.is_empty());
    }

    #[test]
    fn test_rng_streams_are_reproducible() {
        use rand::Rng;
        let mut a = RngState::new(7);
        let mut b = RngState::new(7);
        let xs: Vec<u32> = (0..4).map(|_| a.next_rng().random()).collect();
        let ys: Vec<u32> = (0..4).map(|_| b.next_rng().random()).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.stream, 4);
    }

    #[test]
    fn test_world_serializes_without_caches() {
        let mut world = World::new("test", Settings::default());
        world.spawn(Vector::new(1.0, 2.0), square(1.0), Behavior::Bouncy { bounce: 5.0 });
        let json = serde_json::to_string(&world).unwrap();
        let restored: World = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.entities, world.entities);
        assert!(restored.views.is_empty());
    }
}
