//! Camera follow system. Keeps the main 2D camera centered between the two companions while
//! respecting the scene's bounds, and layers screen shake on top.

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::character::{Companion, Party};
use crate::effects::ScreenShake;
use crate::physics::{Position, WorldBounds};
use crate::presentation;
use crate::state::GameSet;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraSettings>().add_systems(
            Update,
            follow_party_camera
                .after(GameSet::Effects)
                .run_if(resource_exists::<Party>),
        );
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Exponential decay rate of the follow lag.
    pub follow_speed: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self { follow_speed: 6.0 }
    }
}

/// Tags the camera the follow system drives. `focus` is the smoothed centre before shake is added.
#[derive(Component, Debug, Default, Clone, Copy, PartialEq)]
pub struct FollowCamera {
    pub focus: Vec2,
}

/// Clamps a world-space camera centre so the view stays inside `bounds`. Scenes no larger than the
/// view on an axis are centred on that axis.
pub fn clamp_to_world(desired: Vec2, half_view: Vec2, bounds: &WorldBounds) -> Vec2 {
    let size = bounds.size;
    let x = if size.x > half_view.x * 2.0 {
        desired.x.clamp(half_view.x, size.x - half_view.x)
    } else {
        size.x * 0.5
    };
    // World y is the layout y mirrored, so the scene spans [-height, 0].
    let y = if size.y > half_view.y * 2.0 {
        desired.y.clamp(-(size.y - half_view.y), -half_view.y)
    } else {
        -size.y * 0.5
    };
    Vec2::new(x, y)
}

#[allow(clippy::too_many_arguments)]
fn follow_party_camera(
    mut camera_query: Query<(&mut Transform, &mut FollowCamera, &OrthographicProjection)>,
    companions: Query<&Position, With<Companion>>,
    party: Res<Party>,
    bounds: Res<WorldBounds>,
    settings: Res<CameraSettings>,
    shake: Res<ScreenShake>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    time: Res<Time>,
) {
    let Ok([active, passive]) =
        companions.get_many([party.active_entity(), party.passive_entity()])
    else {
        return;
    };
    let Ok((mut camera_transform, mut camera, projection)) = camera_query.get_single_mut() else {
        return;
    };

    let midpoint = (active.0 + passive.0) * 0.5;
    let mut desired = presentation::to_world(midpoint, 0.0).truncate();
    let mut viewport = Vec2::ZERO;
    if let Ok(window) = window_query.get_single() {
        viewport = Vec2::new(window.resolution.width(), window.resolution.height())
            * projection.scale;
        desired = clamp_to_world(desired, viewport * 0.5, &bounds);
    }

    let lerp_t = 1.0 - f32::exp(-settings.follow_speed * time.delta_seconds());
    let z = camera_transform.translation.z;
    camera.focus = camera.focus.lerp(desired, lerp_t);
    let jitter = shake.offset(time.elapsed_seconds(), viewport);
    camera_transform.translation = (camera.focus + jitter).extend(z);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bevy::time::TimeUpdateStrategy;

    use super::*;
    use crate::character::Variant;

    #[test]
    fn trail_view_is_kept_inside_the_world() {
        let bounds = WorldBounds {
            size: Vec2::new(10_000.0, 1200.0),
            floor: false,
            fall_limit: Some(1200.0),
        };
        let half = Vec2::new(640.0, 360.0);

        assert_eq!(
            clamp_to_world(Vec2::new(100.0, -50.0), half, &bounds),
            Vec2::new(640.0, -360.0)
        );
        assert_eq!(
            clamp_to_world(Vec2::new(9900.0, -1190.0), half, &bounds),
            Vec2::new(9360.0, -840.0)
        );
        assert_eq!(
            clamp_to_world(Vec2::new(5000.0, -600.0), half, &bounds),
            Vec2::new(5000.0, -600.0)
        );
    }

    fn camera_app(shaking: bool) -> (App, Entity) {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f32(
                1.0 / 60.0,
            )))
            .init_resource::<CameraSettings>()
            .insert_resource(WorldBounds {
                size: Vec2::new(10_000.0, 1200.0),
                floor: false,
                fall_limit: Some(1200.0),
            })
            .init_resource::<ScreenShake>()
            .add_systems(Update, follow_party_camera);
        if shaking {
            app.world_mut()
                .resource_mut::<ScreenShake>()
                .trigger(0.0, 100.0, 0.01);
        }

        let world = app.world_mut();
        world.spawn((Window::default(), PrimaryWindow));
        let heavy = world
            .spawn((Companion { variant: Variant::Heavy }, Position(Vec2::new(3000.0, 600.0))))
            .id();
        let light = world
            .spawn((Companion { variant: Variant::Light }, Position(Vec2::new(3200.0, 600.0))))
            .id();
        world.insert_resource(Party::new(heavy, light, Variant::Heavy));
        let camera = world
            .spawn((
                Transform::default(),
                OrthographicProjection::default(),
                FollowCamera::default(),
            ))
            .id();
        (app, camera)
    }

    #[test]
    fn shake_does_not_drift_the_follow_position() {
        let (mut steady, steady_camera) = camera_app(false);
        let (mut shaken, shaken_camera) = camera_app(true);
        for _ in 0..30 {
            steady.update();
            shaken.update();
        }

        let steady_focus = steady.world().get::<FollowCamera>(steady_camera).unwrap().focus;
        let shaken_focus = shaken.world().get::<FollowCamera>(shaken_camera).unwrap().focus;
        assert_eq!(steady_focus, shaken_focus);

        let translation = shaken.world().get::<Transform>(shaken_camera).unwrap().translation;
        assert_ne!(translation.truncate(), shaken_focus);
        assert_eq!(
            steady.world().get::<Transform>(steady_camera).unwrap().translation.truncate(),
            steady_focus
        );
    }

    #[test]
    fn arena_sized_scene_stays_centred() {
        let bounds = WorldBounds::default();
        let centre = clamp_to_world(Vec2::new(100.0, -600.0), Vec2::new(640.0, 360.0), &bounds);
        assert_eq!(centre, Vec2::new(640.0, -360.0));
    }
}
