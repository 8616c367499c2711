//! Kinematic physics service. Integrates gravity, resolves bodies against static solids and
//! pushable hazards, and reports contact flags plus overlap-start events. Gameplay code only reads
//! `Velocity`, `Contacts`, and `OverlapStarted`; it never reaches into the resolver.
//!
//! World space here is the level layout space: x grows right, y grows down.

use std::collections::HashSet;

use bevy::math::bounding::{Aabb2d, IntersectsVolume};
use bevy::prelude::*;

use crate::state::GameSet;

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PhysicsSettings>()
            .init_resource::<WorldBounds>()
            .init_resource::<OverlapCache>()
            .add_event::<OverlapStarted>()
            .add_systems(
                Update,
                (integrate_kinematic, step_bodies, detect_overlaps)
                    .chain()
                    .in_set(GameSet::Physics),
            );
    }
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct PhysicsSettings {
    pub gravity: f32,
    pub terminal_velocity: f32,
    /// Ledges no taller than this are climbed without a jump (ramp slices).
    pub step_height: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: 1000.0,
            terminal_velocity: 1800.0,
            step_height: 8.0,
        }
    }
}

/// Extent of the current scene. Bodies tagged `StayInBounds` cannot leave it horizontally.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub size: Vec2,
    /// Whether the bottom edge acts as a floor.
    pub floor: bool,
    /// Depth past which a body counts as fallen out of the world.
    pub fall_limit: Option<f32>,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            size: Vec2::new(1280.0, 720.0),
            floor: true,
            fall_limit: None,
        }
    }
}

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Deref, DerefMut)]
pub struct Position(pub Vec2);

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Deref, DerefMut)]
pub struct Velocity(pub Vec2);

#[derive(Component, Debug, Copy, Clone, PartialEq)]
pub struct Collider {
    pub half_extents: Vec2,
}

impl Collider {
    pub fn from_size(size: Vec2) -> Self {
        Self {
            half_extents: size * 0.5,
        }
    }

    pub fn aabb(&self, center: Vec2) -> Aabb2d {
        Aabb2d::new(center, self.half_extents)
    }
}

/// Mass used when a body shoves a pushable hazard.
#[derive(Component, Debug, Clone, Copy, PartialEq, Deref)]
pub struct Mass(pub f32);

/// Static geometry other bodies collide against.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Solid;

/// Moves purely by velocity: no gravity, no collision response.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Kinematic;

/// Free body that other bodies can shove. `drag` is a horizontal deceleration in units/s².
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Pushable {
    pub mass: f32,
    pub drag: f32,
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct StayInBounds;

/// Participates in overlap detection.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Hitbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Per-step contact report for a dynamic body.
#[derive(Component, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Contacts {
    pub grounded: bool,
    pub blocked_left: bool,
    pub blocked_right: bool,
}

impl Contacts {
    pub fn is_blocked(&self, side: Side) -> bool {
        match side {
            Side::Left => self.blocked_left,
            Side::Right => self.blocked_right,
        }
    }

    pub fn is_blocked_either(&self) -> bool {
        self.blocked_left || self.blocked_right
    }
}

/// Sent once when two hitboxes begin overlapping. `a` is always the lower entity id.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapStarted {
    pub a: Entity,
    pub b: Entity,
}

impl OverlapStarted {
    /// Returns the other participant when `entity` is one of the pair.
    pub fn other(&self, entity: Entity) -> Option<Entity> {
        if self.a == entity {
            Some(self.b)
        } else if self.b == entity {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Resource, Debug, Default)]
pub struct OverlapCache {
    pairs: HashSet<(Entity, Entity)>,
}

impl OverlapCache {
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

/// Something a moving body can run into.
#[derive(Debug, Clone, Copy)]
pub struct Obstacle {
    pub rect: Aabb2d,
    /// Pushable hazard entity and its mass.
    pub push: Option<(Entity, f32)>,
}

impl Obstacle {
    pub fn fixed(rect: Aabb2d) -> Self {
        Self { rect, push: None }
    }
}

/// Outcome of resolving one body for one step.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BodyStep {
    pub contacts: Contacts,
    /// Hazard shoved this step and the velocity it now shares with the pusher.
    pub pushed: Option<(Entity, f32)>,
}

const SKIN: f32 = 0.001;
const TOLERANCE: f32 = 1.0;

/// Moves a body by `velocity * dt`, horizontally first, then vertically.
pub fn step_body(
    position: &mut Vec2,
    velocity: &mut Vec2,
    half: Vec2,
    mass: f32,
    dt: f32,
    obstacles: &[Obstacle],
    settings: &PhysicsSettings,
) -> BodyStep {
    let mut step = BodyStep::default();
    step.pushed = resolve_horizontal(
        position,
        velocity,
        half,
        mass,
        dt,
        obstacles,
        settings,
        &mut step.contacts,
    );
    resolve_vertical(position, velocity, half, dt, obstacles, &mut step.contacts);
    step
}

#[allow(clippy::too_many_arguments)]
fn resolve_horizontal(
    position: &mut Vec2,
    velocity: &mut Vec2,
    half: Vec2,
    mass: f32,
    dt: f32,
    obstacles: &[Obstacle],
    settings: &PhysicsSettings,
    contacts: &mut Contacts,
) -> Option<(Entity, f32)> {
    if velocity.x.abs() < f32::EPSILON {
        return None;
    }

    let dir = velocity.x.signum();
    let mut new_x = position.x + velocity.x * dt;
    let top = position.y - half.y + SKIN;
    let feet = position.y + half.y;
    let mut hit: Option<Obstacle> = None;
    let mut step_top: Option<f32> = None;

    for obstacle in obstacles {
        let rect = obstacle.rect;
        if rect.max.y <= top || rect.min.y >= feet - SKIN {
            continue;
        }

        let climbable = obstacle.push.is_none()
            && velocity.y >= 0.0
            && rect.min.y >= feet - settings.step_height;

        if dir > 0.0 {
            if rect.min.x < position.x + half.x - TOLERANCE {
                continue;
            }
            if climbable {
                if rect.min.x < new_x + half.x {
                    step_top = Some(step_top.map_or(rect.min.y, |t| t.min(rect.min.y)));
                }
                continue;
            }
            let limit = rect.min.x - half.x - SKIN;
            if new_x > limit {
                new_x = limit;
                hit = Some(*obstacle);
            }
        } else {
            if rect.max.x > position.x - half.x + TOLERANCE {
                continue;
            }
            if climbable {
                if rect.max.x > new_x - half.x {
                    step_top = Some(step_top.map_or(rect.min.y, |t| t.min(rect.min.y)));
                }
                continue;
            }
            let limit = rect.max.x + half.x + SKIN;
            if new_x < limit {
                new_x = limit;
                hit = Some(*obstacle);
            }
        }
    }

    position.x = new_x;
    if let Some(top) = step_top {
        position.y = position.y.min(top - half.y);
    }

    let obstacle = hit?;
    if dir > 0.0 {
        contacts.blocked_right = true;
    } else {
        contacts.blocked_left = true;
    }

    match obstacle.push {
        Some((entity, other_mass)) => {
            let shared = velocity.x * mass / (mass + other_mass);
            velocity.x = shared;
            Some((entity, shared))
        }
        None => {
            velocity.x = 0.0;
            None
        }
    }
}

fn resolve_vertical(
    position: &mut Vec2,
    velocity: &mut Vec2,
    half: Vec2,
    dt: f32,
    obstacles: &[Obstacle],
    contacts: &mut Contacts,
) {
    let mut new_y = position.y + velocity.y * dt;
    let left = position.x - half.x + SKIN;
    let right = position.x + half.x - SKIN;
    let mut landed = false;
    let mut bumped = false;

    for obstacle in obstacles {
        let rect = obstacle.rect;
        if rect.max.x <= left || rect.min.x >= right {
            continue;
        }

        if velocity.y > 0.0 {
            if rect.min.y < position.y + half.y - TOLERANCE {
                continue;
            }
            let limit = rect.min.y - half.y;
            if new_y >= limit {
                new_y = limit;
                landed = true;
            }
        } else if velocity.y < 0.0 {
            if rect.max.y > position.y - half.y + TOLERANCE {
                continue;
            }
            let limit = rect.max.y + half.y;
            if new_y <= limit {
                new_y = limit;
                bumped = true;
            }
        }
    }

    position.y = new_y;
    if landed {
        velocity.y = 0.0;
        contacts.grounded = true;
    }
    if bumped {
        velocity.y = 0.0;
    }
}

/// Clamps a body inside the world and flags the edges it rests against.
pub fn clamp_to_bounds(
    position: &mut Vec2,
    velocity: &mut Vec2,
    half: Vec2,
    bounds: &WorldBounds,
    contacts: &mut Contacts,
) {
    if position.x - half.x <= 0.0 {
        position.x = half.x;
        velocity.x = velocity.x.max(0.0);
        contacts.blocked_left = true;
    }
    if position.x + half.x >= bounds.size.x {
        position.x = bounds.size.x - half.x;
        velocity.x = velocity.x.min(0.0);
        contacts.blocked_right = true;
    }
    if bounds.floor && position.y + half.y >= bounds.size.y {
        position.y = bounds.size.y - half.y;
        velocity.y = velocity.y.min(0.0);
        contacts.grounded = true;
    }
}

/// Reduces horizontal speed toward zero by `amount` without overshooting.
pub fn apply_drag(vx: f32, amount: f32) -> f32 {
    if vx.abs() <= amount {
        0.0
    } else {
        vx - amount * vx.signum()
    }
}

/// Every unordered pair of overlapping boxes, lower entity first.
pub fn collect_overlaps(boxes: &[(Entity, Aabb2d)]) -> HashSet<(Entity, Entity)> {
    let mut pairs = HashSet::new();
    for (index, (a, rect_a)) in boxes.iter().enumerate() {
        for (b, rect_b) in boxes.iter().skip(index + 1) {
            if rect_a.intersects(rect_b) {
                pairs.insert(if a < b { (*a, *b) } else { (*b, *a) });
            }
        }
    }
    pairs
}

fn integrate_kinematic(time: Res<Time>, mut bodies: Query<(&mut Position, &Velocity), With<Kinematic>>) {
    let dt = time.delta_seconds();
    for (mut position, velocity) in &mut bodies {
        position.0 += velocity.0 * dt;
    }
}

type DynamicBody<'a> = (
    Entity,
    &'a mut Position,
    &'a mut Velocity,
    &'a Collider,
    &'a mut Contacts,
    Option<&'a Mass>,
    Option<&'a Pushable>,
    Has<StayInBounds>,
);

fn step_bodies(
    time: Res<Time>,
    settings: Res<PhysicsSettings>,
    bounds: Res<WorldBounds>,
    solids: Query<(&Position, &Collider), (With<Solid>, Without<Velocity>)>,
    mut bodies: Query<DynamicBody, (Without<Solid>, Without<Kinematic>)>,
) {
    let dt = time.delta_seconds();
    if dt <= 0.0 {
        return;
    }

    let statics: Vec<Obstacle> = solids
        .iter()
        .map(|(position, collider)| Obstacle::fixed(collider.aabb(position.0)))
        .collect();

    // Hazards settle first so characters collide against where they actually are this step.
    for (_, mut position, mut velocity, collider, mut contacts, _, pushable, in_bounds) in
        &mut bodies
    {
        let Some(pushable) = pushable else {
            continue;
        };
        velocity.x = apply_drag(velocity.x, pushable.drag * dt);
        velocity.y = (velocity.y + settings.gravity * dt).min(settings.terminal_velocity);
        let step = step_body(
            &mut position.0,
            &mut velocity.0,
            collider.half_extents,
            pushable.mass,
            dt,
            &statics,
            &settings,
        );
        *contacts = step.contacts;
        if in_bounds {
            clamp_to_bounds(
                &mut position.0,
                &mut velocity.0,
                collider.half_extents,
                &bounds,
                &mut contacts,
            );
        }
    }

    let mut obstacles = statics;
    obstacles.extend(bodies.iter().filter_map(
        |(entity, position, _, collider, _, _, pushable, _)| {
            pushable.map(|pushable| Obstacle {
                rect: collider.aabb(position.0),
                push: Some((entity, pushable.mass)),
            })
        },
    ));

    // Characters block each other where they stood before this step.
    let characters: Vec<(Entity, Obstacle)> = bodies
        .iter()
        .filter(|(.., pushable, _)| pushable.is_none())
        .map(|(entity, position, _, collider, ..)| {
            (entity, Obstacle::fixed(collider.aabb(position.0)))
        })
        .collect();

    let mut pushes = Vec::new();
    for (entity, mut position, mut velocity, collider, mut contacts, mass, pushable, in_bounds) in
        &mut bodies
    {
        if pushable.is_some() {
            continue;
        }
        let mut blockers = obstacles.clone();
        blockers.extend(
            characters
                .iter()
                .filter(|(other, _)| *other != entity)
                .map(|(_, obstacle)| *obstacle),
        );

        velocity.y = (velocity.y + settings.gravity * dt).min(settings.terminal_velocity);
        let step = step_body(
            &mut position.0,
            &mut velocity.0,
            collider.half_extents,
            mass.map_or(1.0, |mass| mass.0),
            dt,
            &blockers,
            &settings,
        );
        *contacts = step.contacts;
        if in_bounds {
            clamp_to_bounds(
                &mut position.0,
                &mut velocity.0,
                collider.half_extents,
                &bounds,
                &mut contacts,
            );
        }
        pushes.extend(step.pushed);
    }

    for (entity, shared) in pushes {
        if let Ok((_, _, mut velocity, ..)) = bodies.get_mut(entity) {
            if shared.abs() > velocity.x.abs() {
                velocity.x = shared;
            }
        }
    }
}

fn detect_overlaps(
    hitboxes: Query<(Entity, &Position, &Collider), With<Hitbox>>,
    mut cache: ResMut<OverlapCache>,
    mut events: EventWriter<OverlapStarted>,
) {
    let boxes: Vec<(Entity, Aabb2d)> = hitboxes
        .iter()
        .map(|(entity, position, collider)| (entity, collider.aabb(position.0)))
        .collect();

    let current = collect_overlaps(&boxes);
    for &(a, b) in &current {
        if !cache.pairs.contains(&(a, b)) {
            events.send(OverlapStarted { a, b });
        }
    }
    cache.pairs = current;
}
