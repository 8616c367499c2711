//! Procedural trail generation: synthesizes the whole level once, before simulation starts, as a
//! left-to-right run of platform segments ending at a goal marker.
//!
//! Generation is a pure function of `GeneratorConfig` and a seed, so a layout can be rebuilt or
//! compared exactly. The resulting `Level` is stored as a resource while the trail is loaded;
//! other systems (goal and fall checks) read it without owning the platform entities.

use std::ops::RangeInclusive;

use bevy::math::bounding::{Aabb2d, IntersectsVolume};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::character::{Companion, Party, Variant};
use crate::motion::MotionSettings;
use crate::physics::{
    Collider, Contacts, PhysicsSettings, Position, Pushable, Solid, StayInBounds, Velocity,
    WorldBounds,
};
use crate::presentation;
use crate::scene::{Outcome, SceneEntity};
use crate::state::GameSet;

/// Registers the trail's end-of-attempt checks. Generation itself is driven by the scene loader.
pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GeneratorConfig>()
            .init_resource::<TrailSettings>()
            .add_systems(
                Update,
                (detect_fall, detect_goal)
                    .chain()
                    .in_set(GameSet::Resolve)
                    .run_if(resource_exists::<Level>)
                    .run_if(resource_exists::<Party>),
            );
    }
}

/// Generation ranges. These are load-bearing: the gap and climb bounds are what keep every
/// platform inside the companions' jump arc.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub world_width: f32,
    pub world_height: f32,
    /// Generation stops once the last edge is within this distance of the world's end.
    pub end_margin: f32,
    pub start_width: f32,
    pub start_y: f32,
    pub gap: RangeInclusive<i32>,
    pub vertical_delta: RangeInclusive<i32>,
    pub width: RangeInclusive<i32>,
    pub min_y: f32,
    pub max_y: f32,
    pub platform_thickness: f32,
    pub step_count: u32,
    pub step_width: f32,
    pub step_spacing: f32,
    pub step_rise: f32,
    pub ramp_span: f32,
    pub ramp_slices: u32,
    pub ramp_height: RangeInclusive<i32>,
    pub squeeze_clearance: f32,
    pub ceiling_thickness: f32,
    pub boulder_radius: f32,
    pub boulder_mass: f32,
    pub boulder_drag: f32,
    /// Height of the boulder's centre above the platform it is dropped onto.
    pub boulder_lift: f32,
    pub bridge_offset: f32,
    pub goal_inset: f32,
    pub goal_lift: f32,
    pub goal_size: [f32; 2],
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            world_width: 10_000.0,
            world_height: 1200.0,
            end_margin: 1200.0,
            start_width: 1000.0,
            start_y: 1000.0,
            gap: 120..=180,
            vertical_delta: -80..=80,
            width: 300..=600,
            min_y: 500.0,
            max_y: 1050.0,
            platform_thickness: 64.0,
            step_count: 3,
            step_width: 150.0,
            step_spacing: 200.0,
            step_rise: 80.0,
            ramp_span: 600.0,
            ramp_slices: 20,
            ramp_height: -100..=100,
            squeeze_clearance: 60.0,
            ceiling_thickness: 32.0,
            boulder_radius: 32.0,
            boulder_mass: 20.0,
            boulder_drag: 1000.0,
            boulder_lift: 100.0,
            bridge_offset: 50.0,
            goal_inset: 300.0,
            goal_lift: 60.0,
            goal_size: [120.0, 80.0],
        }
    }
}

impl GeneratorConfig {
    pub fn max_gap(&self) -> f32 {
        *self.gap.end() as f32
    }

    fn platform(&self, left: f32, width: f32, top: f32) -> Platform {
        Platform {
            left,
            top,
            width,
            height: self.platform_thickness,
            walkable: true,
        }
    }

    pub fn flat(&self, left: f32, width: f32, top: f32) -> TerrainSegment {
        TerrainSegment {
            kind: SegmentKind::Flat,
            origin: [left, top],
            width,
            height_delta: None,
            platforms: vec![self.platform(left, width, top)],
            boulder: None,
        }
    }

    /// Narrow platforms climbing from `top`, each `step_rise` above the last.
    pub fn steps(&self, left: f32, top: f32) -> TerrainSegment {
        let platforms: Vec<Platform> = (0..self.step_count)
            .map(|index| {
                let index = index as f32;
                self.platform(
                    left + index * self.step_spacing,
                    self.step_width,
                    top - index * self.step_rise,
                )
            })
            .collect();
        let width = platforms.last().map_or(0.0, |last| last.right() - left);

        TerrainSegment {
            kind: SegmentKind::Steps,
            origin: [left, top],
            width,
            height_delta: Some(-(self.step_count.saturating_sub(1) as f32) * self.step_rise),
            platforms,
            boulder: None,
        }
    }

    /// Slope approximated by equal slices interpolating from `top` toward `top + height_delta`.
    pub fn ramp(&self, left: f32, top: f32, height_delta: f32) -> TerrainSegment {
        let slices = self.ramp_slices.max(1);
        let slice_width = self.ramp_span / slices as f32;
        let slice_rise = height_delta / slices as f32;
        let platforms = (0..slices)
            .map(|index| {
                let index = index as f32;
                self.platform(
                    left + index * slice_width,
                    slice_width,
                    top + index * slice_rise,
                )
            })
            .collect();

        TerrainSegment {
            kind: SegmentKind::Ramp,
            origin: [left, top],
            width: self.ramp_span,
            height_delta: Some(height_delta),
            platforms,
            boulder: None,
        }
    }

    pub fn boulder_hazard(&self, left: f32, width: f32, top: f32) -> TerrainSegment {
        let mut segment = self.flat(left, width, top);
        segment.kind = SegmentKind::BoulderHazard;
        segment.boulder = Some(Boulder {
            x: left + width * 0.5,
            y: top - self.boulder_lift,
            radius: self.boulder_radius,
            mass: self.boulder_mass,
            drag: self.boulder_drag,
        });
        segment
    }

    /// Floor plus a ceiling slab of the same width whose underside sits `squeeze_clearance` above
    /// the floor.
    pub fn squeeze(&self, left: f32, width: f32, top: f32) -> TerrainSegment {
        let mut segment = self.flat(left, width, top);
        segment.kind = SegmentKind::Squeeze;
        segment.platforms.push(Platform {
            left,
            top: top - self.squeeze_clearance - self.ceiling_thickness,
            width,
            height: self.ceiling_thickness,
            walkable: false,
        });
        segment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentKind {
    Flat,
    Steps,
    Ramp,
    BoulderHazard,
    Squeeze,
}

impl SegmentKind {
    pub const ALL: [Self; 5] = [
        Self::Flat,
        Self::Steps,
        Self::Ramp,
        Self::BoulderHazard,
        Self::Squeeze,
    ];
}

/// Axis-aligned slab in layout space; `top` is the walking surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    /// Part of the main route (floors and steps), as opposed to overhead slabs.
    pub walkable: bool,
}

impl Platform {
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.left + self.width * 0.5, self.top + self.height * 0.5)
    }
}

/// Free-rolling hazard dropped onto a platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boulder {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub mass: f32,
    pub drag: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSegment {
    pub kind: SegmentKind,
    pub origin: [f32; 2],
    pub width: f32,
    pub height_delta: Option<f32>,
    pub platforms: Vec<Platform>,
    pub boulder: Option<Boulder>,
}

impl TerrainSegment {
    pub fn right_edge(&self) -> f32 {
        self.platforms
            .iter()
            .map(Platform::right)
            .fold(self.origin[0], f32::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalMarker {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl GoalMarker {
    pub fn aabb(&self) -> Aabb2d {
        Aabb2d::new(
            Vec2::new(self.x, self.y),
            Vec2::new(self.width, self.height) * 0.5,
        )
    }
}

/// A fully generated trail.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub seed: u64,
    pub width: f32,
    pub height: f32,
    pub segments: Vec<TerrainSegment>,
    pub goal: GoalMarker,
}

impl Level {
    pub fn right_edge(&self) -> f32 {
        self.segments
            .iter()
            .map(TerrainSegment::right_edge)
            .fold(0.0, f32::max)
    }

    pub fn platforms(&self) -> impl Iterator<Item = &Platform> {
        self.segments.iter().flat_map(|segment| segment.platforms.iter())
    }

    /// Main-route platforms in traversal order.
    pub fn walkable(&self) -> Vec<&Platform> {
        self.platforms().filter(|platform| platform.walkable).collect()
    }

    pub fn boulders(&self) -> impl Iterator<Item = &Boulder> {
        self.segments.iter().filter_map(|segment| segment.boulder.as_ref())
    }

    /// Checks that every hop along the main route fits inside `envelope`, and that the route
    /// actually spans the world.
    pub fn verify_reachability(
        &self,
        envelope: &JumpEnvelope,
        max_gap: f32,
    ) -> Result<(), TerrainError> {
        let right_edge = self.right_edge();
        if right_edge < self.width {
            return Err(TerrainError::Truncated {
                right_edge,
                world_width: self.width,
            });
        }

        for (index, pair) in self.walkable().windows(2).enumerate() {
            let [from, to] = pair else {
                continue;
            };
            let gap = to.left - from.right();
            let rise = from.top - to.top;
            let reachable = if gap <= 0.0 {
                rise <= envelope.max_rise()
            } else {
                gap <= max_gap && envelope.reach_at_rise(rise).is_some_and(|reach| reach >= gap)
            };

            if !reachable {
                return Err(TerrainError::Unreachable {
                    index: index + 1,
                    left: to.left,
                    gap,
                    rise,
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TerrainError {
    #[error("platform {index} at x={left} is {gap:.0} units past the previous edge with a {rise:.0} unit climb, outside the jump arc")]
    Unreachable {
        index: usize,
        left: f32,
        gap: f32,
        rise: f32,
    },
    #[error("trail ends at x={right_edge}, short of the world width {world_width}")]
    Truncated { right_edge: f32, world_width: f32 },
}

/// Worst-case jump arc across both companions: the weakest take-off and slowest air speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpEnvelope {
    /// Magnitude of the initial upward velocity.
    pub jump_speed: f32,
    pub air_speed: f32,
    pub gravity: f32,
}

impl JumpEnvelope {
    pub fn weakest(physics: &PhysicsSettings, motion: &MotionSettings) -> Self {
        let jump_speed = Variant::ALL
            .into_iter()
            .map(|variant| variant.stats().jump_strength.abs())
            .fold(f32::INFINITY, f32::min);
        let air_speed = Variant::ALL
            .into_iter()
            .map(|variant| variant.stats().move_speed * motion.air_control)
            .fold(f32::INFINITY, f32::min);

        Self {
            jump_speed,
            air_speed,
            gravity: physics.gravity,
        }
    }

    /// Apex height of a full jump.
    pub fn max_rise(&self) -> f32 {
        self.jump_speed * self.jump_speed / (2.0 * self.gravity)
    }

    /// Horizontal distance covered before coming down onto a surface `rise` units above take-off
    /// (negative for drops). `None` when the surface is above the apex.
    pub fn reach_at_rise(&self, rise: f32) -> Option<f32> {
        let discriminant = self.jump_speed * self.jump_speed - 2.0 * self.gravity * rise;
        if discriminant < 0.0 {
            return None;
        }
        let airtime = (self.jump_speed + discriminant.sqrt()) / self.gravity;
        Some(self.air_speed * airtime)
    }
}

/// Seeded trail builder. Every random draw goes through the one `fastrand::Rng`, so a seed fully
/// determines the layout.
pub struct TerrainGenerator {
    config: GeneratorConfig,
    rng: fastrand::Rng,
    seed: u64,
}

impl TerrainGenerator {
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: fastrand::Rng::with_seed(seed),
            seed,
        }
    }

    pub fn generate(mut self) -> Level {
        let config = self.config.clone();
        let mut current_y = config.start_y;
        let mut segments = vec![config.flat(0.0, config.start_width, current_y)];
        let mut last_right_edge = config.start_width;

        while last_right_edge < config.world_width - config.end_margin {
            let gap = self.rng.i32(config.gap.clone()) as f32;
            let delta = self.rng.i32(config.vertical_delta.clone()) as f32;
            let width = self.rng.i32(config.width.clone()) as f32;
            current_y = (current_y + delta).clamp(config.min_y, config.max_y);
            let left = last_right_edge + gap;

            let kind = SegmentKind::ALL[self.rng.usize(..SegmentKind::ALL.len())];
            let segment = match kind {
                SegmentKind::Flat => config.flat(left, width, current_y),
                SegmentKind::Steps => {
                    let segment = config.steps(left, current_y);
                    current_y += segment.height_delta.unwrap_or(0.0);
                    segment
                }
                SegmentKind::Ramp => {
                    let height_delta = self.rng.i32(config.ramp_height.clone()) as f32;
                    config.ramp(left, current_y, height_delta)
                }
                SegmentKind::BoulderHazard => config.boulder_hazard(left, width, current_y),
                SegmentKind::Squeeze => config.squeeze(left, width, current_y),
            };

            last_right_edge = last_right_edge.max(segment.right_edge());
            segments.push(segment);
        }

        let bridge_left = last_right_edge + config.bridge_offset;
        let bridge_width = config.world_width - last_right_edge;
        segments.push(config.flat(bridge_left, bridge_width, current_y));

        Level {
            seed: self.seed,
            width: config.world_width,
            height: config.world_height,
            segments,
            goal: GoalMarker {
                x: config.world_width - config.goal_inset,
                y: current_y - config.goal_lift,
                width: config.goal_size[0],
                height: config.goal_size[1],
            },
        }
    }
}

const GENERATION_ATTEMPTS: u32 = 8;

/// Generates a trail, moving to the next seed while the reachability check rejects the layout.
/// After the last attempt the layout is used as-is.
pub fn generate_reachable(config: &GeneratorConfig, envelope: &JumpEnvelope, seed: u64) -> Level {
    let mut level = TerrainGenerator::new(config.clone(), seed).generate();
    for _ in 1..GENERATION_ATTEMPTS {
        match level.verify_reachability(envelope, config.max_gap()) {
            Ok(()) => return level,
            Err(error) => {
                warn!("Discarding trail seed {}: {error}", level.seed);
                let next_seed = level.seed.wrapping_add(1);
                level = TerrainGenerator::new(config.clone(), next_seed).generate();
            }
        }
    }

    if let Err(error) = level.verify_reachability(envelope, config.max_gap()) {
        warn!("Keeping trail seed {} despite failed check: {error}", level.seed);
    }
    level
}

/// Pins the trail seed; `None` draws a fresh one per attempt.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrailSettings {
    pub seed: Option<u64>,
}

pub const TRAIL_SPAWNS: [Vec2; 2] = [Vec2::new(300.0, 800.0), Vec2::new(450.0, 800.0)];

/// Spawns static geometry, hazards and the goal flag for `level`, then stores the layout and the
/// trail's world bounds as resources.
pub fn build_trail(commands: &mut Commands, level: Level) {
    for platform in level.platforms() {
        commands.spawn((
            Name::new("Platform"),
            SceneEntity,
            Solid,
            Position(platform.center()),
            Collider::from_size(platform.size()),
            presentation::block_sprite(presentation::GROUND, platform.size(), 0.0),
        ));
    }

    for boulder in level.boulders() {
        let size = Vec2::splat(boulder.radius * 2.0);
        commands.spawn((
            Name::new("Boulder"),
            SceneEntity,
            Pushable {
                mass: boulder.mass,
                drag: boulder.drag,
            },
            Position(Vec2::new(boulder.x, boulder.y)),
            Velocity::default(),
            Collider::from_size(size),
            Contacts::default(),
            StayInBounds,
            presentation::block_sprite(presentation::BOULDER, size, 1.0),
        ));
    }

    let goal = level.goal;
    let goal_size = Vec2::new(goal.width, goal.height);
    commands.spawn((
        Name::new("Goal"),
        SceneEntity,
        Position(Vec2::new(goal.x, goal.y)),
        presentation::block_sprite(presentation::FLAG, goal_size, 0.5),
    ));

    commands.insert_resource(WorldBounds {
        size: Vec2::new(level.width, level.height),
        floor: false,
        fall_limit: Some(level.height),
    });
    info!(
        "Built trail from seed {} with {} segments",
        level.seed,
        level.segments.len()
    );
    commands.insert_resource(level);
}

fn detect_fall(
    bounds: Res<WorldBounds>,
    party: Res<Party>,
    positions: Query<&Position, With<Companion>>,
    mut outcomes: EventWriter<Outcome>,
) {
    let Some(fall_limit) = bounds.fall_limit else {
        return;
    };
    let Ok(position) = positions.get(party.active_entity()) else {
        return;
    };

    if position.y > fall_limit {
        outcomes.send(Outcome::Fell);
    }
}

/// Both companions must stand on the flag at the same time.
fn detect_goal(
    level: Res<Level>,
    party: Res<Party>,
    companions: Query<(&Position, &Collider), With<Companion>>,
    mut outcomes: EventWriter<Outcome>,
) {
    let goal = level.goal.aabb();
    let arrived = Variant::ALL.into_iter().all(|variant| {
        companions
            .get(party.entity(variant))
            .is_ok_and(|(position, collider)| collider.aabb(position.0).intersects(&goal))
    });

    if arrived {
        outcomes.send(Outcome::GoalReached);
    }
}
