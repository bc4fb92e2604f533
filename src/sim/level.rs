//! Tile level loading
//!
//! Levels are JSON grids of cell codes. The first character of a code picks
//! the factory; the full code looks up optional properties in `object`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::shape::{Placed, Quadrant, Shape};
use super::state::{
    bindings_from_keys, default_bindings, Behavior, Mover, MoverColor, Panel, PanelKind, World,
};
use super::tick::reroll_uncertain;
use super::Vector;
use crate::consts::*;
use crate::settings::Settings;

/// Small level used when no file is given
pub const DEMO_LEVEL: &str = r#"{
    "name": "demo",
    "width": 12,
    "height": 8,
    "map": [
        ["R", "R", "R", "R", "R", "R", "R", "R", "R", "R", "R", "R"],
        ["R", "M1", " ", " ", "b", " ", " ", "U", " ", " ", "M2", "R"],
        ["R", " ", " ", " ", " ", " ", " ", " ", " ", " ", " ", "R"],
        ["R", " ", "R", "R", " ", "H", " ", " ", "D", " ", " ", "R"],
        ["R", " ", " ", " ", " ", " ", "c", " ", " ", " ", " ", "R"],
        ["R", "P", " ", "Q1", " ", "m", " ", " ", " ", "r", " ", "R"],
        ["R", " ", " ", " ", " ", " ", " ", " ", " ", " ", "t", "R"],
        ["R", "R", "R", "R", "R", "C1", "R", "R", "R", "R", "R", "R"]
    ],
    "object": {
        "M1": { "color": "red" },
        "M2": { "color": "green", "keys": ["KeyT", "KeyF", "KeyG", "KeyH"] },
        "Q1": { "quadrant": [-1, 1] },
        "C1": { "color": "yellow" }
    }
}"#;

/// Optional per-code properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectProps {
    pub color: Option<String>,
    pub radius: Option<f64>,
    /// Mover driving force
    pub speed: Option<f64>,
    /// Up, left, down, right
    pub keys: Option<Vec<String>>,
    pub view_range: Option<f64>,
    pub mass: Option<f64>,
    pub friction: Option<f64>,
    pub quadrant: Option<Quadrant>,
    pub bounce: Option<f64>,
    /// Replaces the outline of a solid cell: rect, circle, annulus, triangle or hexagon
    pub shape: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    #[serde(default)]
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// Rows of cell codes, top to bottom
    pub map: Vec<Vec<String>>,
    #[serde(default)]
    pub object: BTreeMap<String, ObjectProps>,
}

impl LevelData {
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug)]
pub enum LevelError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    /// Declared size disagrees with the map
    Size {
        row: Option<usize>,
        expected: usize,
        found: usize,
    },
    UnknownColor { code: String, color: String },
    BadKeys { code: String, count: usize },
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::Io(e) => write!(f, "failed to read level: {e}"),
            LevelError::Parse(e) => write!(f, "failed to parse level: {e}"),
            LevelError::Size {
                row: None,
                expected,
                found,
            } => write!(f, "level declares {expected} rows but the map has {found}"),
            LevelError::Size {
                row: Some(row),
                expected,
                found,
            } => write!(f, "row {row} has {found} cells, expected {expected}"),
            LevelError::UnknownColor { code, color } => {
                write!(f, "object '{code}' has unknown color '{color}'")
            }
            LevelError::BadKeys { code, count } => {
                write!(f, "object '{code}' binds {count} keys, expected 4")
            }
        }
    }
}

impl std::error::Error for LevelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LevelError::Io(e) => Some(e),
            LevelError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LevelError {
    fn from(e: serde_json::Error) -> Self {
        LevelError::Parse(e)
    }
}

impl From<std::io::Error> for LevelError {
    fn from(e: std::io::Error) -> Self {
        LevelError::Io(e)
    }
}

/// Parse and build a level in one go
pub fn load_level(json: &str, settings: Settings) -> Result<World, LevelError> {
    build_world(&LevelData::from_json(json)?, settings)
}

pub fn load_level_file(path: &Path, settings: Settings) -> Result<World, LevelError> {
    let json = std::fs::read_to_string(path)?;
    load_level(&json, settings)
}

/// Codes whose outline the `shape` property may replace
const SOLID_CODES: &str = "RrBbmcDHQ";

/// Colours handed out to movers and buttons without an explicit one
const CYCLE: [MoverColor; 3] = [MoverColor::RED, MoverColor::GREEN, MoverColor::BLUE];

pub fn build_world(level: &LevelData, settings: Settings) -> Result<World, LevelError> {
    if level.map.len() != level.height {
        return Err(LevelError::Size {
            row: None,
            expected: level.height,
            found: level.map.len(),
        });
    }
    if let Some((row, cells)) = level
        .map
        .iter()
        .enumerate()
        .find(|(_, cells)| cells.len() != level.width)
    {
        return Err(LevelError::Size {
            row: Some(row),
            expected: level.width,
            found: cells.len(),
        });
    }

    let mut world = World::new(&level.name, settings);
    world.width = level.width;
    world.height = level.height;
    let mut builder = Builder {
        level,
        cell: world.settings.cell_size,
        movers: 0,
        buttons: 0,
    };

    for (y, row) in level.map.iter().enumerate() {
        for (x, code) in row.iter().enumerate() {
            builder.place(&mut world, code, x, y)?;
        }
    }
    world.apply_pending();

    log::info!(
        "Loaded level '{}': {}x{} cells, {} entities, {} movers",
        level.name,
        level.width,
        level.height,
        world.entities.len(),
        builder.movers
    );
    Ok(world)
}

struct Builder<'a> {
    level: &'a LevelData,
    cell: f64,
    movers: usize,
    buttons: usize,
}

impl Builder<'_> {
    fn place(&mut self, world: &mut World, code: &str, x: usize, y: usize) -> Result<(), LevelError> {
        let Some(kind) = code.chars().next() else {
            return Ok(());
        };
        let props = self.level.object.get(code).cloned().unwrap_or_default();
        let pos = Vector::new((x as f64 + 0.5) * self.cell, (y as f64 + 0.5) * self.cell);
        let cell = self.cell;
        let square = |size: f64| Shape::Rect {
            width: size,
            height: size,
        };
        let round = |default: f64| Shape::Circle {
            radius: props.radius.unwrap_or(default),
        };
        let bounce = |default: f64| props.bounce.unwrap_or(default);
        let outline = match props.shape.as_deref() {
            Some(name) if SOLID_CODES.contains(kind) => match Shape::from_kind(name, cell) {
                Some(shape) => Some(shape),
                None => return Ok(()),
            },
            _ => None,
        };
        let solid = |default: Shape| outline.unwrap_or(default);

        let id = match kind {
            ' ' => return Ok(()),
            'R' => world.spawn(pos, solid(square(cell)), Behavior::Rigid),
            'r' => world.spawn(pos, solid(round(cell * 0.5)), Behavior::Rigid),
            'B' => world.spawn(
                pos,
                solid(square(cell)),
                Behavior::Bouncy {
                    bounce: bounce(BOUNCY_RECT_BOUNCE),
                },
            ),
            'b' => world.spawn(
                pos,
                solid(round(cell * 0.5)),
                Behavior::Bouncy {
                    bounce: bounce(BOUNCY_CIRCLE_BOUNCE),
                },
            ),
            'm' => world.spawn(
                pos,
                solid(square(cell)),
                Behavior::Drifting {
                    bounce: bounce(DRIFTING_RECT_BOUNCE),
                },
            ),
            'c' => world.spawn(
                pos,
                solid(round(cell * 0.1)),
                Behavior::Drifting {
                    bounce: bounce(DRIFTING_CIRCLE_BOUNCE),
                },
            ),
            'D' => world.spawn(
                pos,
                solid(Shape::Annulus {
                    inner: cell / 4.0,
                    outer: props.radius.unwrap_or(cell / 2.0),
                }),
                Behavior::Rigid,
            ),
            'H' => world.spawn(
                pos,
                solid(Shape::Hexagon {
                    radius: props.radius.unwrap_or(cell / 2.0),
                }),
                Behavior::Rigid,
            ),
            'Q' => world.spawn(
                pos,
                solid(Shape::Triangle {
                    width: cell,
                    height: cell,
                    quadrant: props.quadrant.unwrap_or_default(),
                }),
                Behavior::Rigid,
            ),
            'M' => {
                let mover = self.mover(world, code, &props)?;
                let id = world.spawn(
                    pos,
                    round(cell * MOVER_RADIUS_RATIO),
                    Behavior::Mover(mover),
                );
                let (mass, friction) = (world.settings.mover_mass, world.settings.mover_friction);
                if let Some(e) = world.get_mut(id) {
                    e.mass = mass;
                    e.friction = friction;
                }
                id
            }
            'P' => world.spawn(
                pos,
                square(cell * 0.2),
                Behavior::Panel(Panel::new(PanelKind::Positive)),
            ),
            'T' => world.spawn(
                pos,
                Shape::Circle { radius: cell * 0.2 },
                Behavior::Panel(Panel::new(PanelKind::Timer {
                    bomb: None,
                    blast_tick: None,
                })),
            ),
            'U' => {
                let placed = Placed::new(pos, square(cell));
                let id = world.spawn(
                    pos,
                    placed.shape,
                    Behavior::Panel(Panel::new(PanelKind::Uncertain { wall: None })),
                );
                let wall = reroll_uncertain(world, &placed, None);
                if let Some(panel) = world.get_mut(id).and_then(|e| e.panel_mut()) {
                    panel.kind = PanelKind::Uncertain { wall };
                }
                id
            }
            't' => {
                let fallback = CYCLE[self.buttons % CYCLE.len()];
                self.buttons += 1;
                let color = color_of(code, &props)?.unwrap_or(fallback);
                world.spawn(
                    pos,
                    square(cell * 0.5),
                    Behavior::Panel(Panel::new(PanelKind::Button {
                        color,
                        on: false,
                        touched: false,
                    })),
                )
            }
            'C' => {
                let color = color_of(code, &props)?.unwrap_or_else(|| {
                    log::warn!("Door '{}' has no color; using white", code);
                    MoverColor::WHITE
                });
                world.spawn(
                    pos,
                    square(cell),
                    Behavior::Panel(Panel::new(PanelKind::Door { color, wall: None })),
                )
            }
            other => {
                log::warn!("Unknown cell code '{}' at ({}, {}); skipping", other, x, y);
                return Ok(());
            }
        };

        if let Some(e) = world.get_mut(id) {
            if let Some(mass) = props.mass {
                e.mass = mass;
            }
            if let Some(friction) = props.friction {
                e.friction = friction;
            }
        }
        Ok(())
    }

    fn mover(&mut self, world: &mut World, code: &str, props: &ObjectProps) -> Result<Mover, LevelError> {
        let index = self.movers;
        self.movers += 1;
        let color = color_of(code, props)?.unwrap_or(CYCLE[index % CYCLE.len()]);
        let bindings = match &props.keys {
            Some(keys) => {
                let keys: [&str; 4] = match keys.as_slice() {
                    [up, left, down, right] => {
                        [up.as_str(), left.as_str(), down.as_str(), right.as_str()]
                    }
                    _ => {
                        return Err(LevelError::BadKeys {
                            code: code.to_string(),
                            count: keys.len(),
                        });
                    }
                };
                bindings_from_keys(&keys)
            }
            None => default_bindings(index),
        };
        if bindings.is_empty() {
            log::warn!("Mover '{}' has no key bindings", code);
        }

        let settings = &world.settings;
        let mut mover = Mover::new(color, bindings);
        mover.view_range = props.view_range.unwrap_or(settings.view_range);
        mover.moving_force = props.speed.unwrap_or(settings.mover_force);
        Ok(mover)
    }
}

fn color_of(code: &str, props: &ObjectProps) -> Result<Option<MoverColor>, LevelError> {
    match &props.color {
        None => Ok(None),
        Some(name) => MoverColor::from_name(name)
            .map(Some)
            .ok_or_else(|| LevelError::UnknownColor {
                code: code.to_string(),
                color: name.clone(),
            }),
    }
}
