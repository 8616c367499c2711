//! Sprite presentation. The simulation works in layout space (y down); everything drawn is mirrored
//! into Bevy's y-up world here, together with the purely cosmetic companion and boss animation.

use bevy::prelude::*;

use crate::character::{Companion, Party, Variant};
use crate::effects::ScalePulse;
use crate::encounter::{Boss, Encounter};
use crate::motion::{Facing, MotionState};
use crate::physics::Position;
use crate::state::GameSet;

pub const SKY: Color = Color::srgb(0.529, 0.808, 0.922);
pub const GROUND: Color = Color::srgb(0.365, 0.251, 0.216);
pub const HEAVY: Color = Color::srgb(0.290, 0.216, 0.157);
pub const LIGHT: Color = Color::srgb(0.824, 0.706, 0.549);
pub const BOULDER: Color = Color::srgb(0.459, 0.459, 0.459);
pub const BOSS: Color = Color::srgb(0.2, 0.2, 0.2);
pub const BOSS_LEAPING: Color = Color::srgb(0.2, 0.107, 0.107);
pub const LASER: Color = Color::srgb(1.0, 0.0, 0.0);
pub const FLAG: Color = Color::srgb(1.0, 0.0, 0.0);

/// Opacity of the companion not under player control.
pub const PASSIVE_ALPHA: f32 = 0.6;

pub struct PresentationPlugin;

impl Plugin for PresentationPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (
                sync_transforms,
                animate_companions.run_if(resource_exists::<Party>),
                animate_boss.run_if(resource_exists::<Encounter>),
            )
                .after(GameSet::Effects),
        );
    }
}

/// Flat coloured rectangle at depth `z`; the transform is filled in from `Position`.
pub fn block_sprite(color: Color, size: Vec2, z: f32) -> SpriteBundle {
    SpriteBundle {
        sprite: Sprite {
            color,
            custom_size: Some(size),
            ..default()
        },
        transform: Transform::from_xyz(0.0, 0.0, z),
        ..default()
    }
}

pub fn companion_color(variant: Variant) -> Color {
    match variant {
        Variant::Heavy => HEAVY,
        Variant::Light => LIGHT,
    }
}

/// Layout-space point to world translation at depth `z`.
pub fn to_world(position: Vec2, z: f32) -> Vec3 {
    Vec3::new(position.x, -position.y, z)
}

fn sync_transforms(mut bodies: Query<(&Position, &mut Transform), Changed<Position>>) {
    for (position, mut transform) in &mut bodies {
        transform.translation = to_world(position.0, transform.translation.z);
    }
}

fn animate_companions(
    time: Res<Time>,
    party: Res<Party>,
    mut companions: Query<(
        &Companion,
        &MotionState,
        Option<&ScalePulse>,
        &mut Transform,
        &mut Sprite,
    )>,
) {
    let now = time.elapsed_seconds();
    for (companion, motion, pulse, mut transform, mut sprite) in &mut companions {
        // Layout rotation is clockwise-positive; the world is y-up.
        transform.rotation = Quat::from_rotation_z(-motion.wobble);
        transform.scale = pulse
            .map_or(Vec2::ONE, |pulse| pulse.scale(now))
            .extend(1.0);
        sprite.flip_x = motion.facing == Facing::Left;

        let alpha = if party.is_active(companion.variant) {
            1.0
        } else {
            PASSIVE_ALPHA
        };
        sprite.color = companion_color(companion.variant).with_alpha(alpha);
    }
}

fn animate_boss(
    time: Res<Time>,
    encounter: Res<Encounter>,
    mut bosses: Query<&mut Sprite, With<Boss>>,
) {
    let now = time.elapsed_seconds();
    let base = if encounter.is_leaping(now) {
        BOSS_LEAPING
    } else {
        BOSS
    };
    for mut sprite in &mut bosses {
        sprite.color = base.with_alpha(encounter.blink_alpha(now));
    }
}
