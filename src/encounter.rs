//! Boss encounter for the arena: phase machine, attack cadence, and damage resolution.
//!
//! `Encounter` is plain data advanced against the simulation clock; the systems here only feed it
//! overlaps and apply what it decides. Damage is accepted only while the fight is `Active`, so a
//! terminal phase is reached exactly once.

use std::collections::HashSet;

use bevy::prelude::*;

use crate::character::{Companion, Party, Variant};
use crate::checkpoint::Checkpoints;
use crate::effects::{Easing, Repeat, ScreenFlash, ScreenShake, Tween};
use crate::physics::{
    Collider, Hitbox, Kinematic, OverlapStarted, Position, Solid, Velocity, WorldBounds,
};
use crate::presentation;
use crate::scene::{Outcome, SceneEntity};
use crate::state::GameSet;

pub struct EncounterPlugin;

impl Plugin for EncounterPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<EncounterSettings>().add_systems(
            Update,
            (advance_encounter, resolve_hits, cull_projectiles)
                .chain()
                .in_set(GameSet::Resolve)
                .run_if(resource_exists::<Encounter>)
                .run_if(resource_exists::<Party>),
        );
    }
}

#[derive(Resource, Debug, Clone, PartialEq)]
pub struct EncounterSettings {
    pub boss_health: i32,
    pub companion_health: i32,
    pub boss_size: Vec2,
    pub boss_spawn_x: f32,
    pub intro_from_y: f32,
    pub hover_y: f32,
    pub intro_duration: f32,
    pub patrol: (f32, f32),
    pub patrol_leg: f32,
    pub volley_interval: f32,
    pub volley_angles: [f32; 3],
    pub projectile_speed: f32,
    pub projectile_size: f32,
    pub projectile_damage: i32,
    pub leap_interval: f32,
    /// The boss only leaps at a companion standing higher than this.
    pub leap_ceiling: f32,
    pub leap_duration: f32,
    pub contact_damage: i32,
    /// How far above the boss's centre a companion must be for contact to count as a dunk.
    pub dunk_margin: f32,
    pub dunk_bounce: f32,
    pub knockback: Vec2,
    pub blink_period: f32,
    pub blink_repeats: u32,
    pub shake_duration: f32,
    pub shake_intensity: f32,
    pub flash_duration: f32,
}

impl Default for EncounterSettings {
    fn default() -> Self {
        Self {
            boss_health: 100,
            companion_health: 100,
            boss_size: Vec2::new(240.0, 220.0),
            boss_spawn_x: 640.0,
            intro_from_y: -300.0,
            hover_y: 350.0,
            intro_duration: 2.0,
            patrol: (250.0, 1030.0),
            patrol_leg: 3.0,
            volley_interval: 2.5,
            volley_angles: [-0.3, 0.0, 0.3],
            projectile_speed: 400.0,
            projectile_size: 15.0,
            projectile_damage: 5,
            leap_interval: 4.0,
            leap_ceiling: 450.0,
            leap_duration: 0.8,
            contact_damage: 5,
            dunk_margin: 100.0,
            dunk_bounce: -700.0,
            knockback: Vec2::new(250.0, -300.0),
            blink_period: 0.1,
            blink_repeats: 5,
            shake_duration: 0.1,
            shake_intensity: 0.01,
            flash_duration: 0.1,
        }
    }
}

impl EncounterSettings {
    /// Length of the post-hit window: one out-and-back blink per repeat, plus the first.
    pub fn invincibility(&self) -> f32 {
        self.blink_period * 2.0 * (self.blink_repeats as f32 + 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterPhase {
    Intro,
    Active,
    Victory,
    Defeat,
}

impl EncounterPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Victory | Self::Defeat)
    }
}

/// Attacks the boss starts during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BossAction {
    Volley,
    Leap { target_y: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Nothing changed: the target was invincible or the fight is not in progress.
    Ignored,
    Applied { remaining: i32 },
    Victory,
    Defeat,
}

#[derive(Resource, Debug, Clone, PartialEq)]
pub struct Encounter {
    phase: EncounterPhase,
    boss_health: i32,
    companion_health: [i32; 2],
    drop: Tween,
    patrol: Option<Tween>,
    leap: Option<Tween>,
    blink: Option<Tween>,
    invincible_until: f32,
    next_volley: f32,
    next_leap: f32,
    hover_y: f32,
    rest_x: f32,
}

impl Encounter {
    pub fn new(settings: &EncounterSettings, now: f32) -> Self {
        Self {
            phase: EncounterPhase::Intro,
            boss_health: settings.boss_health,
            companion_health: [settings.companion_health; 2],
            drop: Tween::new(
                settings.intro_from_y,
                settings.hover_y,
                now,
                settings.intro_duration,
                Easing::BounceOut,
            ),
            patrol: None,
            leap: None,
            blink: None,
            invincible_until: f32::NEG_INFINITY,
            next_volley: f32::INFINITY,
            next_leap: f32::INFINITY,
            hover_y: settings.hover_y,
            rest_x: settings.boss_spawn_x,
        }
    }

    pub fn phase(&self) -> EncounterPhase {
        self.phase
    }

    pub fn boss_health(&self) -> i32 {
        self.boss_health
    }

    pub fn companion_health(&self, variant: Variant) -> i32 {
        self.companion_health[variant.index()]
    }

    /// Advances the phase machine and returns the attacks that start at `now`. `active_y` is the
    /// controlled companion's height, which gates the leap.
    pub fn update(
        &mut self,
        settings: &EncounterSettings,
        now: f32,
        active_y: f32,
    ) -> Vec<BossAction> {
        match self.phase {
            EncounterPhase::Intro => {
                if !self.drop.is_finished(now) {
                    return Vec::new();
                }
                self.activate(settings, now);
            }
            EncounterPhase::Active => {}
            EncounterPhase::Victory | EncounterPhase::Defeat => return Vec::new(),
        }

        let mut actions = Vec::new();
        if now >= self.next_volley {
            self.next_volley = now + settings.volley_interval;
            actions.push(BossAction::Volley);
        }
        // The leap timer only restarts once a leap actually happens.
        if now >= self.next_leap && active_y < settings.leap_ceiling {
            self.next_leap = now + settings.leap_interval;
            self.leap = Some(
                Tween::new(self.hover_y, active_y, now, settings.leap_duration, Easing::QuadInOut)
                    .yoyo(),
            );
            actions.push(BossAction::Leap { target_y: active_y });
        }
        actions
    }

    fn activate(&mut self, settings: &EncounterSettings, now: f32) {
        let (from, to) = settings.patrol;
        self.phase = EncounterPhase::Active;
        self.patrol = Some(
            Tween::new(from, to, now, settings.patrol_leg, Easing::SineInOut)
                .yoyo()
                .repeat(Repeat::Forever),
        );
        // Both attacks are ready the moment the fight starts.
        self.next_volley = now;
        self.next_leap = now;
        info!("Boss encounter active");
    }

    pub fn boss_position(&self, now: f32) -> Vec2 {
        let x = self.patrol.map_or(self.rest_x, |patrol| patrol.sample(now));
        let y = match (self.phase, self.leap) {
            (EncounterPhase::Intro, _) => self.drop.sample(now),
            (_, Some(leap)) if !leap.is_finished(now) => leap.sample(now),
            _ => self.hover_y,
        };
        Vec2::new(x, y)
    }

    pub fn is_invincible(&self, now: f32) -> bool {
        now < self.invincible_until
    }

    pub fn is_leaping(&self, now: f32) -> bool {
        self.leap.is_some_and(|leap| !leap.is_finished(now))
    }

    /// Boss opacity while the post-hit blink plays.
    pub fn blink_alpha(&self, now: f32) -> f32 {
        self.blink.map_or(1.0, |blink| blink.sample(now))
    }

    /// A dunk by `variant`. Lands only outside the invincibility window.
    pub fn strike_boss(
        &mut self,
        settings: &EncounterSettings,
        variant: Variant,
        now: f32,
    ) -> DamageOutcome {
        if self.phase != EncounterPhase::Active || self.is_invincible(now) {
            return DamageOutcome::Ignored;
        }

        self.boss_health = (self.boss_health - variant.stats().dunk_damage).max(0);
        self.invincible_until = now + settings.invincibility();
        self.blink = Some(
            Tween::new(1.0, 0.5, now, settings.blink_period, Easing::Linear)
                .yoyo()
                .repeat(Repeat::Times(settings.blink_repeats)),
        );

        if self.boss_health == 0 {
            self.phase = EncounterPhase::Victory;
            return DamageOutcome::Victory;
        }
        DamageOutcome::Applied {
            remaining: self.boss_health,
        }
    }

    pub fn damage_companion(&mut self, variant: Variant, amount: i32) -> DamageOutcome {
        if self.phase != EncounterPhase::Active {
            return DamageOutcome::Ignored;
        }

        let health = &mut self.companion_health[variant.index()];
        *health = (*health - amount).max(0);
        if *health == 0 {
            self.phase = EncounterPhase::Defeat;
            return DamageOutcome::Defeat;
        }
        DamageOutcome::Applied { remaining: *health }
    }
}

/// Velocities for a spread of projectiles aimed from `origin` at `target`, each rotated by one of
/// `angles` (radians).
pub fn volley_velocities(origin: Vec2, target: Vec2, speed: f32, angles: &[f32]) -> Vec<Vec2> {
    let aim = (target - origin).normalize_or_zero() * speed;
    angles
        .iter()
        .map(|angle| Vec2::from_angle(*angle).rotate(aim))
        .collect()
}

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Boss;

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Projectile;

pub const ARENA_SIZE: Vec2 = Vec2::new(1280.0, 720.0);
pub const ARENA_SPAWNS: [Vec2; 2] = [Vec2::new(100.0, 600.0), Vec2::new(200.0, 600.0)];

/// Ground and ledges as (left, top, width, height).
const ARENA_SLABS: [(f32, f32, f32, f32); 3] = [
    (0.0, 668.0, 1280.0, 64.0),
    (104.0, 484.0, 192.0, 32.0),
    (984.0, 484.0, 192.0, 32.0),
];

pub fn build_arena(commands: &mut Commands, settings: &EncounterSettings, now: f32) {
    for (left, top, width, height) in ARENA_SLABS {
        let size = Vec2::new(width, height);
        commands.spawn((
            Name::new("Ledge"),
            SceneEntity,
            Solid,
            Position(Vec2::new(left, top) + size * 0.5),
            Collider::from_size(size),
            presentation::block_sprite(presentation::GROUND, size, 0.0),
        ));
    }

    let encounter = Encounter::new(settings, now);
    commands.spawn((
        Name::new("Boss"),
        SceneEntity,
        Boss,
        Position(encounter.boss_position(now)),
        Collider::from_size(settings.boss_size),
        Hitbox,
        presentation::block_sprite(presentation::BOSS, settings.boss_size, 1.0),
    ));

    commands.insert_resource(WorldBounds {
        size: ARENA_SIZE,
        floor: true,
        fall_limit: None,
    });
    commands.insert_resource(encounter);
}

fn advance_encounter(
    mut commands: Commands,
    time: Res<Time>,
    settings: Res<EncounterSettings>,
    mut encounter: ResMut<Encounter>,
    party: Res<Party>,
    companions: Query<&Position, (With<Companion>, Without<Boss>)>,
    mut boss: Query<&mut Position, With<Boss>>,
) {
    let now = time.elapsed_seconds();
    let Ok(active) = companions.get(party.active_entity()).copied() else {
        return;
    };
    let Ok(mut boss_position) = boss.get_single_mut() else {
        return;
    };

    let actions = encounter.update(&settings, now, active.y);
    boss_position.0 = encounter.boss_position(now);

    for action in actions {
        match action {
            BossAction::Volley => {
                let size = Vec2::splat(settings.projectile_size);
                for velocity in volley_velocities(
                    boss_position.0,
                    active.0,
                    settings.projectile_speed,
                    &settings.volley_angles,
                ) {
                    commands.spawn((
                        Name::new("Projectile"),
                        SceneEntity,
                        Projectile,
                        Kinematic,
                        Hitbox,
                        Position(boss_position.0),
                        Velocity(velocity),
                        Collider::from_size(size),
                        presentation::block_sprite(presentation::LASER, size, 1.5),
                    ));
                }
            }
            BossAction::Leap { target_y } => debug!("Boss leaps toward y={target_y}"),
        }
    }
}

/// True while the boss is still dropping in. Companions hold still until the fight starts.
pub fn intro_playing(encounter: Option<Res<Encounter>>) -> bool {
    encounter.is_some_and(|encounter| encounter.phase() == EncounterPhase::Intro)
}

#[allow(clippy::too_many_arguments)]
fn resolve_hits(
    mut commands: Commands,
    time: Res<Time>,
    settings: Res<EncounterSettings>,
    mut encounter: ResMut<Encounter>,
    party: Res<Party>,
    mut overlaps: EventReader<OverlapStarted>,
    boss: Query<(Entity, &Position), With<Boss>>,
    projectiles: Query<(), With<Projectile>>,
    mut companions: Query<(&Position, &mut Velocity), (With<Companion>, Without<Boss>)>,
    mut shake: ResMut<ScreenShake>,
    mut flash: ResMut<ScreenFlash>,
    mut checkpoints: ResMut<Checkpoints>,
    mut outcomes: EventWriter<Outcome>,
) {
    let now = time.elapsed_seconds();
    let Ok((boss_entity, boss_position)) = boss.get_single() else {
        overlaps.clear();
        return;
    };
    // Contacts during the drop or after the result carry no knockback or shake.
    if encounter.phase() != EncounterPhase::Active {
        overlaps.clear();
        return;
    }

    let mut boss_contacts = Vec::new();
    let mut projectile_hits = Vec::new();
    for overlap in overlaps.read() {
        for entity in [overlap.a, overlap.b] {
            let (Some(variant), Some(other)) = (party.variant_of(entity), overlap.other(entity))
            else {
                continue;
            };
            if other == boss_entity {
                boss_contacts.push(variant);
            } else if projectiles.contains(other) {
                projectile_hits.push((variant, other));
            }
        }
    }
    boss_contacts.sort_by_key(|variant| variant.index());
    projectile_hits.sort_by_key(|(variant, _)| variant.index());

    let mut results = Vec::new();
    for variant in boss_contacts {
        let Ok((position, mut velocity)) = companions.get_mut(party.entity(variant)) else {
            continue;
        };

        if position.y < boss_position.y - settings.dunk_margin {
            velocity.y = settings.dunk_bounce;
            let outcome = encounter.strike_boss(&settings, variant, now);
            if outcome != DamageOutcome::Ignored {
                flash.trigger(now, settings.flash_duration);
            }
            results.push(outcome);
        } else {
            let away = if position.x < boss_position.x { -1.0 } else { 1.0 };
            velocity.0 = Vec2::new(away * settings.knockback.x, settings.knockback.y);
            shake.trigger(now, settings.shake_duration, settings.shake_intensity);
            results.push(encounter.damage_companion(variant, settings.contact_damage));
        }
    }

    let mut spent = HashSet::new();
    for (variant, projectile) in projectile_hits {
        if !spent.insert(projectile) {
            continue;
        }
        commands.entity(projectile).despawn_recursive();
        shake.trigger(now, settings.shake_duration, settings.shake_intensity);
        results.push(encounter.damage_companion(variant, settings.projectile_damage));
    }

    for result in results {
        match result {
            DamageOutcome::Victory => {
                info!("Boss defeated");
                checkpoints.clear();
                outcomes.send(Outcome::Victory);
            }
            DamageOutcome::Defeat => {
                info!("A companion fell in the arena");
                outcomes.send(Outcome::Defeat);
            }
            DamageOutcome::Applied { .. } | DamageOutcome::Ignored => {}
        }
    }
}

const CULL_MARGIN: f32 = 100.0;

fn cull_projectiles(
    mut commands: Commands,
    bounds: Res<WorldBounds>,
    projectiles: Query<(Entity, &Position), With<Projectile>>,
) {
    for (entity, position) in &projectiles {
        let outside = position.x < -CULL_MARGIN
            || position.y < -CULL_MARGIN
            || position.x > bounds.size.x + CULL_MARGIN
            || position.y > bounds.size.y + CULL_MARGIN;
        if outside {
            commands.entity(entity).despawn_recursive();
        }
    }
}
