//! Fixed timestep simulation tick
//!
//! Core loop that advances the world deterministically. Iteration is always
//! over id snapshots; spawns and despawns are deferred to the end of the tick.

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use rand::Rng;

use super::collision::collides;
use super::contact::{bounce_force, resolve_rigid, ContactOutcome};
use super::shape::Placed;
use super::state::{Behavior, ContactEvent, EntityId, MoverColor, PanelKind, World};
use super::visibility::{compute_visibility, Observer};
use super::Vector;
use crate::consts::*;

/// Input for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Key codes held down this tick
    pub pressed: BTreeSet<String>,
    /// One-shot key presses this tick; `Digit{n}` flips the n-th mover's input
    pub toggled: BTreeSet<String>,
}

impl TickInput {
    pub fn with_keys(keys: &[&str]) -> Self {
        Self {
            pressed: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_toggles(mut self, keys: &[&str]) -> Self {
        self.toggled = keys.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Advance the world by one fixed timestep
pub fn tick(world: &mut World, input: &TickInput, dt: f64) {
    world.contacts.clear();

    let moved = integrate(world, input, dt);
    resolve_collisions(world);
    for e in world.entities.iter_mut().filter(|e| e.flags.movable) {
        e.damp(dt);
    }
    refresh_occluders(world, &moved);
    update_views(world);
    update_panels(world);
    world.apply_pending();

    world.time_ticks += 1;
    if world.time_ticks % 100 == 0 {
        log::debug!(
            "Tick {}: {} entities, {} views",
            world.time_ticks,
            world.entities.len(),
            world.views.len()
        );
    }
}

/// Movers turn held keys into force, then every movable entity steps
fn integrate(world: &mut World, input: &TickInput, dt: f64) -> Vec<EntityId> {
    let mut moved = Vec::new();
    let mut movers = 0;
    for e in world.entities.iter_mut().filter(|e| e.flags.movable) {
        if let Behavior::Mover(mover) = &mut e.behavior {
            movers += 1;
            if input.toggled.contains(&format!("Digit{movers}")) {
                mover.active = !mover.active;
                log::info!("Mover {} input {}", movers, if mover.active { "on" } else { "off" });
            }
            let drive = mover.drive_force(&input.pressed);
            e.apply_force(drive);
        }
        e.integrate(dt);
        if !e.displacement.is_zero() {
            moved.push(e.id);
        }
    }
    moved
}

fn resolve_collisions(world: &mut World) {
    let bodies = world.ids_where(|e| e.flags.movable);
    let obstacles = world.ids_where(|e| e.is_obstacle());
    let accuracy = world.settings.contact_accuracy;
    let mut burst = HashSet::new();

    for body_id in bodies {
        for &obstacle_id in &obstacles {
            if body_id == obstacle_id || burst.contains(&body_id) {
                continue;
            }
            let (Some(body), Some(obstacle)) = (world.get(body_id), world.get(obstacle_id)) else {
                continue;
            };
            let obstacle_placed = obstacle.placed();
            if !collides(&body.placed(), &obstacle_placed) {
                continue;
            }
            let body_pos = body.pos;
            let obstacle_behavior = obstacle.behavior.clone();
            let projectile = match body.behavior {
                Behavior::Projectile { range, force } => Some((range, force)),
                _ => None,
            };

            if let Some((range, force)) = projectile {
                burst_projectile(world, body_id, body_pos, range, force);
                burst.insert(body_id);
                continue;
            }

            match obstacle_behavior {
                Behavior::Rigid => {
                    let Some(body) = world.get_mut(body_id) else {
                        continue;
                    };
                    let outcome = resolve_rigid(body, &obstacle_placed, accuracy);
                    if outcome != ContactOutcome::Clear {
                        world.contacts.push(ContactEvent {
                            body: body_id,
                            obstacle: obstacle_id,
                            outcome,
                        });
                    }
                }
                Behavior::Bouncy { bounce } => {
                    let push = bounce_force(body_pos, &obstacle_placed, bounce);
                    if let Some(body) = world.get_mut(body_id) {
                        body.apply_force(push);
                    }
                }
                Behavior::Drifting { bounce } => {
                    let push = bounce_force(body_pos, &obstacle_placed, bounce);
                    if let Some(body) = world.get_mut(body_id) {
                        body.apply_force(push);
                    }
                    if let Some(obstacle) = world.get_mut(obstacle_id) {
                        obstacle.apply_force(-push);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Shove every mover in range away from the burst, then remove the projectile
fn burst_projectile(world: &mut World, id: EntityId, center: Vector, range: f64, force: f64) {
    for mover_id in world.mover_ids() {
        let Some(mover) = world.get_mut(mover_id) else {
            continue;
        };
        let rel = mover.pos - center;
        let d = rel.length();
        if d > 0.0 && d < range {
            mover.apply_force(rel.normalize_or_zero() * (force / d));
        }
    }
    log::debug!("Projectile {:?} burst at {:?}", id, center);
    world.defer_despawn(id);
}

fn refresh_occluders(world: &mut World, moved: &[EntityId]) {
    if world.occluders.rebuild_permanent(&world.entities) {
        log::info!("Permanent occluders rebuilt at tick {}", world.time_ticks);
    }
    let moved: HashSet<EntityId> = moved.iter().copied().collect();
    for e in world.entities.iter().filter(|e| e.flags.opaque && e.flags.movable) {
        if moved.contains(&e.id) || !world.occluders.tracks(e.id) {
            world.occluders.rebuild_on_change(e);
        }
    }
}

fn update_views(world: &mut World) {
    let ring_segments = world.settings.ring_segments;
    for id in world.mover_ids() {
        let Some(observer) = world.get(id).and_then(|e| {
            e.mover()
                .map(|m| Observer::new(e.pos, m.view_range).with_ring_segments(ring_segments))
        }) else {
            continue;
        };
        world.occluders.gather(
            observer.position,
            observer.view_range,
            &world.entities,
            &mut world.gathered,
        );
        let polygon = compute_visibility(&observer, &world.gathered, &mut world.scratch);
        world.views.insert(id, polygon);
    }
}

/// Movers whose view covers a panel at `placed`
fn observers_of(world: &World, placed: &Placed) -> Vec<EntityId> {
    let outline = placed.vertices();
    world
        .mover_ids()
        .into_iter()
        .filter(|&id| {
            let (Some(e), Some(view)) = (world.get(id), world.view(id)) else {
                return false;
            };
            let in_range = e
                .mover()
                .is_some_and(|m| e.pos.distance(placed.pos) < m.view_range);
            in_range && (view.contains_point(placed.pos) || view.intersects_polygon(&outline))
        })
        .collect()
}

fn update_panels(world: &mut World) {
    let panels = world.ids_where(|e| e.panel().is_some());
    for id in panels {
        let Some(entity) = world.get(id) else {
            continue;
        };
        let placed = entity.placed();
        let observers = observers_of(world, &placed);
        let color = MoverColor::mix(
            observers
                .iter()
                .filter_map(|&m| world.get(m).and_then(|e| e.mover()).map(|m| m.color)),
        );
        let touched_now = world.mover_ids().into_iter().any(|m| {
            world
                .get(m)
                .is_some_and(|e| collides(&e.placed(), &placed))
        });

        let Some(panel) = world.get_mut(id).and_then(|e| e.panel_mut()) else {
            continue;
        };
        panel.observers = observers;
        panel.color = color;
        let seen = !panel.observers.is_empty();
        let kind = panel.kind;

        match kind {
            PanelKind::Positive => {}
            PanelKind::Button { color, on, touched } => {
                let on = if touched_now && !touched { !on } else { on };
                panel.kind = PanelKind::Button {
                    color,
                    on,
                    touched: touched_now,
                };
            }
            PanelKind::Uncertain { wall } => {
                if seen {
                    panel.watched = true;
                } else if panel.watched {
                    panel.watched = false;
                    let new_wall = reroll_uncertain(world, &placed, wall);
                    if let Some(panel) = world.get_mut(id).and_then(|e| e.panel_mut()) {
                        panel.kind = PanelKind::Uncertain { wall: new_wall };
                    }
                }
            }
            PanelKind::Door { color: key, wall } => {
                let closed = seen && color == key;
                match (closed, wall) {
                    (true, None) => {
                        let wall = world.defer_spawn(
                            placed.pos,
                            placed.shape,
                            Behavior::Bouncy { bounce: DOOR_BOUNCE },
                        );
                        log::info!("Door {:?} closed", id);
                        if let Some(panel) = world.get_mut(id).and_then(|e| e.panel_mut()) {
                            panel.kind = PanelKind::Door {
                                color: key,
                                wall: Some(wall),
                            };
                        }
                    }
                    (false, Some(old)) => {
                        world.defer_despawn(old);
                        log::info!("Door {:?} opened", id);
                        if let Some(panel) = world.get_mut(id).and_then(|e| e.panel_mut()) {
                            panel.kind = PanelKind::Door {
                                color: key,
                                wall: None,
                            };
                        }
                    }
                    _ => {}
                }
            }
            PanelKind::Timer { bomb, blast_tick } => {
                let defuse = seen && bomb == Some(color);
                let arm = !seen && panel.watched && bomb.is_none();
                panel.watched = seen;
                let kind = update_timer(world, id, bomb, blast_tick, defuse, arm);
                if let Some(panel) = world.get_mut(id).and_then(|e| e.panel_mut()) {
                    panel.kind = kind;
                }
            }
        }
    }
}

fn update_timer(
    world: &mut World,
    id: EntityId,
    mut bomb: Option<MoverColor>,
    mut blast_tick: Option<u64>,
    defuse: bool,
    arm: bool,
) -> PanelKind {
    if defuse {
        world.score += 1;
        log::info!("Timer {:?} defused; score {}", id, world.score);
        bomb = None;
        blast_tick = None;
    } else if arm {
        let mut rng = world.rng_state.next_rng();
        let palette = bomb_palette(world);
        if rng.random_bool(TIMER_ARM_CHANCE)
            && armed_timers(world) < MAX_ARMED_TIMERS
            && !palette.is_empty()
        {
            let color = palette[rng.random_range(0..palette.len())];
            let fuse = (TIMER_BLAST_SECONDS * world.settings.tick_rate).round() as u64;
            bomb = Some(color);
            blast_tick = Some(world.time_ticks + fuse);
            log::info!("Timer {:?} armed with a {} bomb", id, color.name());
        }
    }

    if blast_tick.is_some_and(|t| world.time_ticks > t) {
        world.blasts += 1;
        log::warn!(
            "Timer {:?} blasted at tick {} (score {})",
            id,
            world.time_ticks,
            world.score
        );
        bomb = None;
        blast_tick = None;
    }
    PanelKind::Timer { bomb, blast_tick }
}

/// Colours the movers present can mix to
fn bomb_palette(world: &World) -> Vec<MoverColor> {
    let lit = MoverColor::mix(world.entities.iter().filter_map(|e| e.mover()).map(|m| m.color));
    MoverColor::MIXES
        .into_iter()
        .filter(|&c| lit.covers(c))
        .collect()
}

fn armed_timers(world: &World) -> usize {
    world
        .entities
        .iter()
        .filter(|e| {
            matches!(
                e.panel().map(|p| p.kind),
                Some(PanelKind::Timer { bomb: Some(_), .. })
            )
        })
        .count()
}

/// Replace an uncertain panel's wall with a fresh roll; returns the new wall
pub fn reroll_uncertain(world: &mut World, placed: &Placed, old: Option<EntityId>) -> Option<EntityId> {
    if let Some(old) = old {
        world.defer_despawn(old);
    }
    let mut rng = world.rng_state.next_rng();
    if rng.random_bool(1.0 - UNCERTAIN_EMPTY_CHANCE) {
        Some(world.defer_spawn(placed.pos, placed.shape, Behavior::Rigid))
    } else {
        None
    }
}

/// Paces ticks at a fixed rate without catching up after a stall
#[derive(Debug, Clone)]
pub struct FixedScheduler {
    period: Duration,
    next: Option<Instant>,
}

impl FixedScheduler {
    pub fn new(tick_rate: f64) -> Self {
        let rate = if tick_rate > 0.0 { tick_rate } else { TICK_RATE };
        Self {
            period: Duration::from_secs_f64(1.0 / rate),
            next: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// True if a tick is due at `now`. At most one tick per call; a late
    /// tick pushes the next deadline to `now + period`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next {
            Some(deadline) if now < deadline => false,
            Some(deadline) => {
                let next = deadline + self.period;
                self.next = Some(if next <= now { now + self.period } else { next });
                true
            }
            None => {
                self.next = Some(now + self.period);
                true
            }
        }
    }

    /// How long to sleep before the next tick is due
    pub fn until_next(&self, now: Instant) -> Duration {
        self.next
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::shape::Shape;
    use crate::sim::level::{build_world, load_level, LevelData, DEMO_LEVEL};
    use crate::sim::state::{default_bindings, Mover, Panel};
    use crate::sim::visibility::EdgeShape;

    const DT: f64 = 1.0 / TICK_RATE;

    fn cell() -> Shape {
        Shape::Rect {
            width: 40.0,
            height: 40.0,
        }
    }

    fn add_mover(world: &mut World, x: f64, y: f64, color: MoverColor) -> EntityId {
        let bindings = default_bindings(0);
        world.spawn(
            Vector::new(x, y),
            Shape::Circle { radius: 8.0 },
            Behavior::Mover(Mover::new(color, bindings)),
        )
    }

    #[test]
    fn test_mover_drives_with_keys() {
        let mut world = World::new("test", Settings::default());
        let id = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        tick(&mut world, &TickInput::with_keys(&["KeyD"]), DT);
        let mover = world.get(id).unwrap();
        assert!(mover.pos.x() > 0.0);
        assert_eq!(mover.pos.y(), 0.0);
        assert!(world.view(id).is_some());
        assert_eq!(world.time_ticks, 1);
    }

    #[test]
    fn test_rigid_wall_stops_mover() {
        let mut world = World::new("test", Settings::default());
        let id = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        let wall = world.spawn(Vector::new(60.0, 0.0), cell(), Behavior::Rigid);
        let input = TickInput::with_keys(&["KeyD"]);
        let mut saw_contact = false;
        for _ in 0..100 {
            tick(&mut world, &input, DT);
            saw_contact |= !world.contacts.is_empty();
            let mover = world.get(id).unwrap();
            let wall = world.get(wall).unwrap();
            assert!(!collides(&mover.placed(), &wall.placed()));
        }
        assert!(saw_contact);
        assert!(world.get(id).unwrap().pos.x() < 40.0 - 8.0);
    }

    #[test]
    fn test_wall_casts_shadow_in_view() {
        let mut world = World::new("test", Settings::default());
        let id = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        world.spawn(Vector::new(100.0, 0.0), cell(), Behavior::Rigid);
        tick(&mut world, &TickInput::default(), DT);
        let view = world.view(id).unwrap();
        assert!(view.contains_point(Vector::new(70.0, 0.0)));
        assert!(!view.contains_point(Vector::new(200.0, 0.0)));
    }

    #[test]
    fn test_projectile_bursts_and_is_removed_at_boundary() {
        let mut world = World::new("test", Settings::default());
        let mover = add_mover(&mut world, 0.0, 30.0, MoverColor::RED);
        world.spawn(Vector::new(60.0, 0.0), cell(), Behavior::Rigid);
        let mut shots = Vec::new();
        for y in [-5.0, 5.0] {
            let shot = world.spawn(
                Vector::new(30.0, y),
                Shape::Circle { radius: 2.0 },
                Behavior::Projectile {
                    range: 100.0,
                    force: 500.0,
                },
            );
            world.get_mut(shot).unwrap().vel = Vector::new(200.0, 0.0);
            shots.push(shot);
        }

        tick(&mut world, &TickInput::default(), DT);
        for shot in shots {
            assert!(world.get(shot).is_none());
        }
        assert!(world.pending().is_empty());
        // Pushed away from the bursts, applied on the next integration
        let force = world.get(mover).unwrap().force;
        assert!(force.y() > 0.0);
    }

    #[test]
    fn test_button_toggles_on_rising_edge() {
        let mut world = World::new("test", Settings::default());
        let button = world.spawn(
            Vector::ZERO,
            cell(),
            Behavior::Panel(Panel::new(PanelKind::Button {
                color: MoverColor::GREEN,
                on: false,
                touched: false,
            })),
        );
        let mover = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        let state = |world: &World| match world.get(button).unwrap().panel().unwrap().kind {
            PanelKind::Button { on, .. } => on,
            _ => unreachable!(),
        };

        tick(&mut world, &TickInput::default(), DT);
        assert!(state(&world));
        // Still standing on it: no toggle
        tick(&mut world, &TickInput::default(), DT);
        assert!(state(&world));

        world.get_mut(mover).unwrap().pos = Vector::new(500.0, 0.0);
        tick(&mut world, &TickInput::default(), DT);
        assert!(state(&world));
        world.get_mut(mover).unwrap().pos = Vector::ZERO;
        tick(&mut world, &TickInput::default(), DT);
        assert!(!state(&world));
    }

    #[test]
    fn test_door_closes_for_matching_color() {
        let mut world = World::new("test", Settings::default());
        let door = world.spawn(
            Vector::new(100.0, 0.0),
            cell(),
            Behavior::Panel(Panel::new(PanelKind::Door {
                color: MoverColor::RED,
                wall: None,
            })),
        );
        let mover = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        let wall_of = |world: &World| match world.get(door).unwrap().panel().unwrap().kind {
            PanelKind::Door { wall, .. } => wall,
            _ => unreachable!(),
        };

        tick(&mut world, &TickInput::default(), DT);
        let wall = wall_of(&world).expect("door should close");
        assert!(matches!(
            world.get(wall).unwrap().behavior,
            Behavior::Bouncy { .. }
        ));

        // Still observed through its own wall, but the colour no longer matches
        if let Behavior::Mover(m) = &mut world.get_mut(mover).unwrap().behavior {
            m.color = MoverColor::GREEN;
        }
        tick(&mut world, &TickInput::default(), DT);
        assert!(wall_of(&world).is_none());
        assert!(world.get(wall).is_none());
    }

    #[test]
    fn test_uncertain_panel_rerolls_when_unseen() {
        let mut world = World::new("test", Settings::default());
        let panel = world.spawn(
            Vector::new(100.0, 0.0),
            cell(),
            Behavior::Panel(Panel::new(PanelKind::Uncertain { wall: None })),
        );
        let mover = add_mover(&mut world, 0.0, 0.0, MoverColor::BLUE);

        tick(&mut world, &TickInput::default(), DT);
        assert!(world.get(panel).unwrap().panel().unwrap().watched);
        assert_eq!(world.rng_state.stream, 0);

        // Walk out of range
        if let Behavior::Mover(m) = &mut world.get_mut(mover).unwrap().behavior {
            m.view_range = 50.0;
        }
        tick(&mut world, &TickInput::default(), DT);
        let p = world.get(panel).unwrap().panel().unwrap();
        assert!(!p.watched);
        assert_eq!(world.rng_state.stream, 1);
        if let PanelKind::Uncertain { wall: Some(wall) } = p.kind {
            assert!(world.get(wall).is_some());
        }
    }

    #[test]
    fn test_determinism() {
        let build = || {
            let mut world = World::new("test", Settings::default());
            add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
            world.spawn(Vector::new(80.0, 20.0), cell(), Behavior::Bouncy { bounce: 90_000.0 });
            world.spawn(
                Vector::new(0.0, 80.0),
                Shape::Circle { radius: 12.0 },
                Behavior::Drifting { bounce: 150_000.0 },
            );
            world
        };
        let mut a = build();
        let mut b = build();
        let inputs = [
            TickInput::with_keys(&["KeyD"]),
            TickInput::with_keys(&["KeyD", "KeyS"]),
            TickInput::with_keys(&["KeyS"]),
            TickInput::default(),
        ];
        for _ in 0..10 {
            for input in &inputs {
                tick(&mut a, input, DT);
                tick(&mut b, input, DT);
            }
        }
        assert_eq!(a.entities, b.entities);
        assert_eq!(a.views, b.views);
    }

    #[test]
    fn test_scheduler_does_not_catch_up() {
        let mut scheduler = FixedScheduler::new(10.0);
        let t0 = Instant::now();
        let ms = |n: u64| t0 + Duration::from_millis(n);

        assert!(scheduler.poll(t0));
        assert!(!scheduler.poll(ms(50)));
        assert!(scheduler.poll(ms(100)));
        // Stalled for several periods: one tick, then wait a full period
        assert!(scheduler.poll(ms(450)));
        assert!(!scheduler.poll(ms(460)));
        assert!(!scheduler.poll(ms(549)));
        assert!(scheduler.poll(ms(550)));
        assert_eq!(scheduler.until_next(ms(600)), Duration::from_millis(50));
    }

    fn timer_kind(world: &World, id: EntityId) -> (Option<MoverColor>, Option<u64>) {
        match world.get(id).unwrap().panel().unwrap().kind {
            PanelKind::Timer { bomb, blast_tick } => (bomb, blast_tick),
            other => panic!("expected a timer, got {other:?}"),
        }
    }

    fn add_timer(world: &mut World, x: f64, bomb: Option<MoverColor>, blast_tick: Option<u64>) -> EntityId {
        world.spawn(
            Vector::new(x, 0.0),
            Shape::Circle { radius: 8.0 },
            Behavior::Panel(Panel::new(PanelKind::Timer { bomb, blast_tick })),
        )
    }

    fn set_view_range(world: &mut World, id: EntityId, range: f64) {
        if let Behavior::Mover(m) = &mut world.get_mut(id).unwrap().behavior {
            m.view_range = range;
        }
    }

    #[test]
    fn test_timer_arms_out_of_sight_and_is_defused_by_matching_color() {
        let mut world = World::new("test", Settings::default());
        let mover = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        let timer = add_timer(&mut world, 100.0, None, None);

        let mut armed_at = None;
        for _ in 0..200 {
            set_view_range(&mut world, mover, 500.0);
            tick(&mut world, &TickInput::default(), DT);
            set_view_range(&mut world, mover, 50.0);
            let now = world.time_ticks;
            tick(&mut world, &TickInput::default(), DT);
            if timer_kind(&world, timer).0.is_some() {
                armed_at = Some(now);
                break;
            }
        }
        let armed_at = armed_at.expect("timer never armed");
        // A lone red mover can only mix red
        let fuse = (TIMER_BLAST_SECONDS * TICK_RATE).round() as u64;
        assert_eq!(
            timer_kind(&world, timer),
            (Some(MoverColor::RED), Some(armed_at + fuse))
        );
        assert_eq!(world.score, 0);

        set_view_range(&mut world, mover, 500.0);
        tick(&mut world, &TickInput::default(), DT);
        assert_eq!(timer_kind(&world, timer), (None, None));
        assert_eq!(world.score, 1);
        assert_eq!(world.blasts, 0);
    }

    #[test]
    fn test_timer_blasts_when_fuse_runs_out() {
        let mut world = World::new("test", Settings::default());
        add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        // Seen the whole time, but red never matches blue
        let timer = add_timer(&mut world, 100.0, Some(MoverColor::BLUE), Some(5));

        for _ in 0..6 {
            tick(&mut world, &TickInput::default(), DT);
        }
        assert_eq!(timer_kind(&world, timer).0, Some(MoverColor::BLUE));
        tick(&mut world, &TickInput::default(), DT);
        assert_eq!(timer_kind(&world, timer), (None, None));
        assert_eq!(world.blasts, 1);
        assert_eq!(world.score, 0);
    }

    #[test]
    fn test_timer_arming_is_capped() {
        let mut world = World::new("test", Settings::default());
        let mover = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        for k in 0..MAX_ARMED_TIMERS {
            add_timer(&mut world, -100.0 - 20.0 * k as f64, Some(MoverColor::BLUE), Some(u64::MAX));
        }
        let spare = add_timer(&mut world, 100.0, None, None);

        for _ in 0..50 {
            set_view_range(&mut world, mover, 500.0);
            tick(&mut world, &TickInput::default(), DT);
            set_view_range(&mut world, mover, 50.0);
            tick(&mut world, &TickInput::default(), DT);
        }
        assert_eq!(timer_kind(&world, spare), (None, None));
        assert!(world.rng_state.stream >= 50);
    }

    #[test]
    fn test_digit_toggles_mover_input() {
        let mut world = World::new("test", Settings::default());
        let first = add_mover(&mut world, 0.0, 0.0, MoverColor::RED);
        let second = add_mover(&mut world, 0.0, 100.0, MoverColor::GREEN);

        let toggle = TickInput::with_keys(&["KeyD"]).with_toggles(&["Digit1"]);
        tick(&mut world, &toggle, DT);
        assert!(!world.get(first).unwrap().mover().unwrap().active);
        assert_eq!(world.get(first).unwrap().pos.x(), 0.0);
        assert!(world.get(second).unwrap().pos.x() > 0.0);

        tick(&mut world, &TickInput::with_keys(&["KeyD"]), DT);
        assert_eq!(world.get(first).unwrap().pos.x(), 0.0);

        tick(&mut world, &toggle, DT);
        assert!(world.get(first).unwrap().mover().unwrap().active);
        assert!(world.get(first).unwrap().pos.x() > 0.0);
    }

    fn grid(map: &[&str]) -> World {
        let level = LevelData {
            name: "grid".to_string(),
            width: map[0].len(),
            height: map.len(),
            map: map
                .iter()
                .map(|row| row.chars().map(|c| c.to_string()).collect())
                .collect(),
            object: Default::default(),
        };
        build_world(&level, Settings::default()).unwrap()
    }

    #[test]
    fn test_tiled_room_view_is_one_clean_square() {
        let mut world = grid(&["RRRRR", "R   R", "R M R", "R   R", "RRRRR"]);
        tick(&mut world, &TickInput::default(), DT);

        let view = world.view(world.mover_ids()[0]).unwrap();
        let cell = world.settings.cell_size;
        let inner = 3.0 * cell;
        assert_eq!(view.len(), 4, "vertices: {:?}", view.vertices);
        assert!((view.area() - inner * inner).abs() < 1e-6);
        for v in &view.vertices {
            assert!(v.x() >= cell - 1e-9 && v.x() <= 4.0 * cell + 1e-9);
            assert!(v.y() >= cell - 1e-9 && v.y() <= 4.0 * cell + 1e-9);
        }
        assert!(view.edges.iter().all(|e| e.is_some()));
    }

    #[test]
    fn test_level_pillar_hides_what_is_behind_it() {
        let mut world = grid(&["M  r   "]);
        tick(&mut world, &TickInput::default(), DT);

        let cell = world.settings.cell_size;
        let view = world.view(world.mover_ids()[0]).unwrap();
        let pillar = Vector::new(3.5 * cell, 0.5 * cell);

        assert!(view.contains_point(Vector::new(2.0 * cell, 0.5 * cell)));
        assert!(!view.contains_point(pillar + Vector::new(2.0 * cell, 0.0)));
        assert!(view.contains_point(pillar + Vector::new(0.0, 3.0 * cell)));

        // The face toward the mover is the near arc of the pillar
        let arcs: Vec<_> = view
            .edges
            .iter()
            .flatten()
            .filter_map(|e| match e.shape {
                EdgeShape::Arc(arc) if arc.center.same(pillar) => Some(arc),
                _ => None,
            })
            .collect();
        assert_eq!(arcs.len(), 1);
        assert!(arcs[0].midpoint().x() < pillar.x());
    }

    #[test]
    fn test_closed_door_blocks_sight() {
        let json = r#"{
            "width": 5, "height": 1,
            "map": [["M1", " ", "C1", " ", "P"]],
            "object": { "M1": { "color": "blue" }, "C1": { "color": "blue" } }
        }"#;
        let mut world = load_level(json, Settings::default()).unwrap();
        let cell = world.settings.cell_size;
        let mover = world.mover_ids()[0];
        let beyond = Vector::new(4.5 * cell, 0.5 * cell);

        tick(&mut world, &TickInput::default(), DT);
        // Open during the first sweep, closed at the end of the tick
        assert!(world.view(mover).unwrap().contains_point(beyond));
        tick(&mut world, &TickInput::default(), DT);
        assert!(!world.view(mover).unwrap().contains_point(beyond));
    }

    fn script(i: u64) -> TickInput {
        match (i / 20) % 4 {
            0 => TickInput::with_keys(&["KeyD", "KeyH"]),
            1 => TickInput::with_keys(&["KeyS", "KeyG"]),
            2 => TickInput::with_keys(&["KeyA", "KeyF", "KeyS"]),
            _ => TickInput::with_keys(&["KeyW", "KeyT"]),
        }
    }

    fn demo() -> World {
        load_level(DEMO_LEVEL, Settings::default()).unwrap()
    }

    #[test]
    fn test_demo_runs_and_every_mover_sees() {
        let mut world = demo();
        for i in 0..200 {
            tick(&mut world, &script(i), DT);
        }
        assert_eq!(world.time_ticks, 200);
        assert!(world.pending().is_empty());

        for id in world.mover_ids() {
            let mover = world.get(id).unwrap();
            assert!(mover.pos.x().is_finite() && mover.pos.y().is_finite());
            let view = world.view(id).unwrap();
            assert!(view.len() >= 3);
            assert!(view.area() > 0.0);
            assert_eq!(view.vertices.len(), view.edges.len());
        }

        // Panel walls always point at live entities
        for e in &world.entities {
            let wall = match e.panel().map(|p| p.kind) {
                Some(PanelKind::Uncertain { wall }) | Some(PanelKind::Door { wall, .. }) => wall,
                _ => None,
            };
            if let Some(wall) = wall {
                assert!(world.get(wall).is_some(), "dangling wall {wall:?}");
            }
        }
    }

    #[test]
    fn test_demo_replays_are_identical() {
        let mut a = demo();
        let mut b = demo();
        for i in 0..150 {
            tick(&mut a, &script(i), DT);
            tick(&mut b, &script(i), DT);
        }
        assert_eq!(a.entities, b.entities);
        assert_eq!(a.views, b.views);
        assert_eq!(a.rng_state.stream, b.rng_state.stream);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn test_saved_world_resumes_identically() {
        let mut world = demo();
        for i in 0..40 {
            tick(&mut world, &script(i), DT);
        }
        let json = serde_json::to_string(&world).unwrap();
        let mut restored: World = serde_json::from_str(&json).unwrap();

        for i in 40..80 {
            tick(&mut world, &script(i), DT);
            tick(&mut restored, &script(i), DT);
        }
        assert_eq!(world.entities, restored.entities);
    }

    #[test]
    fn test_idle_demo_movers_stay_put() {
        let mut world = demo();
        let movers = world.mover_ids();
        let before: Vec<_> = movers.iter().map(|&id| world.get(id).unwrap().pos).collect();
        for _ in 0..30 {
            tick(&mut world, &TickInput::default(), DT);
        }
        let after: Vec<_> = movers.iter().map(|&id| world.get(id).unwrap().pos).collect();
        assert_eq!(before, after);
    }
}
