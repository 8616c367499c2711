//! Companion lifecycle management. Holds the per-variant data table, spawns both companions with
//! the components the controllers expect, and owns the swap action.
//!
//! Teardown happens with the rest of the scene (see `scene.rs`), which despawns every
//! `SceneEntity`.

use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::motion::MotionState;
use crate::physics::{Collider, Contacts, Hitbox, Mass, Position, StayInBounds, Velocity};
use crate::presentation;
use crate::scene::SceneEntity;
use crate::state::GameSet;

/// Registers the swap action. It only runs inside `GameSet::Input`, so it is disabled as soon as
/// an attempt ends.
pub struct CharacterPlugin;

impl Plugin for CharacterPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            swap_active_companion
                .in_set(GameSet::Input)
                .run_if(resource_exists::<Party>),
        );
    }
}

/// The two companion builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Slower, higher mass, hits harder.
    Heavy,
    /// Faster, lighter, hits softer.
    Light,
}

/// Per-variant constants fixed at spawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantStats {
    pub move_speed: f32,
    /// Initial vertical velocity of a jump; negative is upward.
    pub jump_strength: f32,
    pub mass: f32,
    pub dunk_damage: i32,
    pub size: Vec2,
}

impl Variant {
    /// Fixed evaluation order wherever both companions are considered in turn.
    pub const ALL: [Self; 2] = [Self::Heavy, Self::Light];

    pub const fn stats(self) -> VariantStats {
        match self {
            Self::Heavy => VariantStats {
                move_speed: 200.0,
                jump_strength: -800.0,
                mass: 2.0,
                dunk_damage: 10,
                size: Vec2::new(64.0, 64.0),
            },
            Self::Light => VariantStats {
                move_speed: 300.0,
                jump_strength: -850.0,
                mass: 0.5,
                dunk_damage: 5,
                size: Vec2::new(32.0, 32.0),
            },
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Self::Heavy => Self::Light,
            Self::Light => Self::Heavy,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Heavy => 0,
            Self::Light => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Heavy => "Heavy",
            Self::Light => "Light",
        }
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Companion {
    pub variant: Variant,
}

impl Companion {
    pub const fn stats(&self) -> VariantStats {
        self.variant.stats()
    }
}

/// Both companions of the current scene and which one takes player input. Storing a single active
/// variant makes "both active" and "neither active" unrepresentable.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Party {
    members: [Entity; 2],
    active: Variant,
}

impl Party {
    pub fn new(heavy: Entity, light: Entity, active: Variant) -> Self {
        Self {
            members: [heavy, light],
            active,
        }
    }

    pub fn active(&self) -> Variant {
        self.active
    }

    pub fn passive(&self) -> Variant {
        self.active.other()
    }

    pub fn is_active(&self, variant: Variant) -> bool {
        self.active == variant
    }

    pub fn entity(&self, variant: Variant) -> Entity {
        match variant {
            Variant::Heavy => self.members[0],
            Variant::Light => self.members[1],
        }
    }

    pub fn active_entity(&self) -> Entity {
        self.entity(self.active)
    }

    pub fn passive_entity(&self) -> Entity {
        self.entity(self.passive())
    }

    pub fn variant_of(&self, entity: Entity) -> Option<Variant> {
        Variant::ALL
            .into_iter()
            .find(|variant| self.entity(*variant) == entity)
    }

    /// Hands control to the other companion and returns the newly active variant.
    pub fn swap(&mut self) -> Variant {
        self.active = self.active.other();
        self.active
    }
}

/// Spawns one companion at `position` (layout space) and returns its entity.
pub fn spawn_companion(commands: &mut Commands, variant: Variant, position: Vec2) -> Entity {
    let stats = variant.stats();
    commands
        .spawn((
            Name::new(variant.label()),
            SceneEntity,
            Companion { variant },
            presentation::block_sprite(presentation::companion_color(variant), stats.size, 2.0),
            Position(position),
            Velocity::default(),
            Collider::from_size(stats.size),
            Contacts::default(),
            MotionState::default(),
            Mass(stats.mass),
            (Hitbox, StayInBounds),
        ))
        .id()
}

/// Spawns both companions with the heavy one in control and returns the roster.
pub fn spawn_party(commands: &mut Commands, heavy_at: Vec2, light_at: Vec2) -> Party {
    let heavy = spawn_companion(commands, Variant::Heavy, heavy_at);
    let light = spawn_companion(commands, Variant::Light, light_at);
    Party::new(heavy, light, Variant::Heavy)
}

fn swap_active_companion(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut party: ResMut<Party>,
    mut velocities: Query<&mut Velocity, With<Companion>>,
) {
    if !keyboard.just_pressed(KeyCode::Space) {
        return;
    }

    // The companion losing control stops dead instead of coasting on the last input.
    if let Ok(mut velocity) = velocities.get_mut(party.active_entity()) {
        velocity.x = 0.0;
    }
    let active = party.swap();
    debug!("Control swapped to {}", active.label());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party() -> Party {
        Party::new(Entity::from_raw(10), Entity::from_raw(11), Variant::Heavy)
    }

    #[test]
    fn swapping_always_leaves_exactly_one_active() {
        let mut party = party();
        for _ in 0..5 {
            let active_count = Variant::ALL
                .into_iter()
                .filter(|variant| party.is_active(*variant))
                .count();
            assert_eq!(active_count, 1);
            assert_ne!(party.active_entity(), party.passive_entity());
            party.swap();
        }
    }

    #[test]
    fn roster_maps_entities_back_to_variants() {
        let party = party();
        assert_eq!(party.variant_of(Entity::from_raw(11)), Some(Variant::Light));
        assert_eq!(party.variant_of(Entity::from_raw(99)), None);
    }

    #[test]
    fn variants_trade_speed_for_weight() {
        let heavy = Variant::Heavy.stats();
        let light = Variant::Light.stats();
        assert!(heavy.mass > light.mass);
        assert!(heavy.dunk_damage > light.dunk_damage);
        assert!(light.move_speed > heavy.move_speed);
        assert!(light.jump_strength < heavy.jump_strength);
    }

    #[test]
    fn space_swaps_control_and_halts_the_old_leader() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.init_resource::<ButtonInput<KeyCode>>();
        app.add_systems(Update, swap_active_companion);

        let heavy = app
            .world_mut()
            .spawn((Companion { variant: Variant::Heavy }, Velocity(Vec2::new(200.0, -50.0))))
            .id();
        let light = app
            .world_mut()
            .spawn((Companion { variant: Variant::Light }, Velocity::default()))
            .id();
        app.insert_resource(Party::new(heavy, light, Variant::Heavy));

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::Space);
        app.update();

        assert_eq!(app.world().resource::<Party>().active(), Variant::Light);
        let velocity = app.world().get::<Velocity>(heavy).unwrap();
        assert_eq!(velocity.0, Vec2::new(0.0, -50.0));
    }
}
