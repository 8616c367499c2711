//! Passive-companion steering. The companion not under player control walks toward the active one,
//! hops walls on its own, and is teleported back when it falls out of the world. The hard leash
//! runs regardless of follow mode: it drags the active companion back toward the passive one.

use bevy::prelude::*;

use crate::character::{Companion, Party};
use crate::motion::{Facing, MotionState};
use crate::physics::{Contacts, Position, Velocity, WorldBounds};
use crate::state::{FollowMode, GameSet, SceneKind};

pub struct FollowPlugin;

impl Plugin for FollowPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FollowSettings>()
            .init_resource::<FollowPolicy>()
            .add_systems(
                Update,
                (recover_passive_companion, steer_passive_companion, enforce_leash)
                    .chain()
                    .in_set(GameSet::Follow)
                    .run_if(resource_exists::<Party>),
            );
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct FollowSettings {
    /// Within this horizontal distance the follower idles.
    pub idle_radius: f32,
    /// Beyond this distance the follower sprints.
    pub sprint_distance: f32,
    pub walk_speed: f32,
    pub sprint_speed: f32,
    /// Hard cap on horizontal separation between the two companions.
    pub max_separation: f32,
    /// How much higher the leader must stand before the follower jumps toward it.
    pub climb_margin: f32,
    /// Height above the leader at which a fallen follower reappears.
    pub recovery_lift: f32,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            idle_radius: 100.0,
            sprint_distance: 400.0,
            walk_speed: 120.0,
            sprint_speed: 250.0,
            max_separation: 1100.0,
            climb_margin: 60.0,
            recovery_lift: 50.0,
        }
    }
}

/// Follow behaviour for the current scene, chosen when the scene is built and fixed until it is
/// torn down.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct FollowPolicy {
    pub mode: FollowMode,
    /// Vertical velocity applied by an autonomous hop.
    pub jump_impulse: f32,
    /// Hop whenever the leader stands noticeably higher, not only at walls.
    pub climb_to_leader: bool,
}

impl FollowPolicy {
    pub fn for_scene(scene: SceneKind, mode: FollowMode) -> Self {
        match scene {
            SceneKind::Trail => Self {
                mode,
                jump_impulse: -850.0,
                climb_to_leader: true,
            },
            SceneKind::Arena => Self {
                mode,
                jump_impulse: -750.0,
                climb_to_leader: false,
            },
        }
    }
}

impl Default for FollowPolicy {
    fn default() -> Self {
        Self::for_scene(SceneKind::Trail, FollowMode::Follow)
    }
}

/// Velocity override for the follower this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowCommand {
    pub vx: f32,
    /// Replacement vertical velocity when the follower hops.
    pub vy: Option<f32>,
    pub facing: Option<Facing>,
}

/// Horizontal speed the follower should walk at for a given separation.
pub fn target_speed(settings: &FollowSettings, distance: f32) -> f32 {
    if distance <= settings.idle_radius {
        0.0
    } else if distance > settings.sprint_distance {
        settings.sprint_speed
    } else {
        settings.walk_speed
    }
}

pub fn follow_step(
    settings: &FollowSettings,
    policy: &FollowPolicy,
    leader: Vec2,
    follower: Vec2,
    contacts: Contacts,
) -> FollowCommand {
    if policy.mode == FollowMode::Manual {
        return FollowCommand {
            vx: 0.0,
            vy: None,
            facing: None,
        };
    }

    let distance = (leader.x - follower.x).abs();
    let direction = if leader.x > follower.x { 1.0 } else { -1.0 };
    let speed = target_speed(settings, distance);
    if speed == 0.0 {
        return FollowCommand {
            vx: 0.0,
            vy: None,
            facing: None,
        };
    }

    let leader_above = policy.climb_to_leader && leader.y < follower.y - settings.climb_margin;
    let hop = contacts.grounded && (contacts.is_blocked_either() || leader_above);

    FollowCommand {
        vx: direction * speed,
        vy: hop.then_some(policy.jump_impulse),
        facing: Some(Facing::from_direction(direction)),
    }
}

/// New x for the active companion when the pair is further apart than `max_separation`.
pub fn clamp_leash(active_x: f32, passive_x: f32, max_separation: f32) -> Option<f32> {
    let min_x = active_x.min(passive_x);
    let max_x = active_x.max(passive_x);
    if max_x - min_x <= max_separation {
        return None;
    }

    if active_x == max_x {
        Some(min_x + max_separation)
    } else {
        Some(max_x - max_separation)
    }
}

fn recover_passive_companion(
    settings: Res<FollowSettings>,
    bounds: Res<WorldBounds>,
    party: Res<Party>,
    mut companions: Query<(&mut Position, &mut Velocity), With<Companion>>,
) {
    let Some(fall_limit) = bounds.fall_limit else {
        return;
    };
    let Ok([(active_position, _), (mut passive_position, mut passive_velocity)]) =
        companions.get_many_mut([party.active_entity(), party.passive_entity()])
    else {
        return;
    };

    if passive_position.y > fall_limit {
        passive_position.0 = active_position.0 - Vec2::new(0.0, settings.recovery_lift);
        passive_velocity.0 = Vec2::ZERO;
        debug!("Recovered fallen {:?} companion", party.passive());
    }
}

fn steer_passive_companion(
    settings: Res<FollowSettings>,
    policy: Res<FollowPolicy>,
    party: Res<Party>,
    mut companions: Query<(&Position, &mut Velocity, &Contacts, &mut MotionState), With<Companion>>,
) {
    let Ok(leader) = companions.get(party.active_entity()).map(|(position, ..)| position.0) else {
        return;
    };
    let Ok((position, mut velocity, contacts, mut state)) =
        companions.get_mut(party.passive_entity())
    else {
        return;
    };

    let command = follow_step(&settings, &policy, leader, position.0, *contacts);
    velocity.x = command.vx;
    if let Some(vy) = command.vy {
        velocity.y = vy;
    }
    if let Some(facing) = command.facing {
        state.facing = facing;
    }
    state.wobble = 0.0;
}

fn enforce_leash(
    settings: Res<FollowSettings>,
    party: Res<Party>,
    mut companions: Query<(&mut Position, &mut Velocity), With<Companion>>,
) {
    let Ok([(mut active_position, mut active_velocity), (passive_position, _)]) =
        companions.get_many_mut([party.active_entity(), party.passive_entity()])
    else {
        return;
    };

    if let Some(x) = clamp_leash(active_position.x, passive_position.x, settings.max_separation) {
        active_position.x = x;
        active_velocity.x = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::character::Variant;

    fn follow_policy() -> FollowPolicy {
        FollowPolicy::for_scene(SceneKind::Trail, FollowMode::Follow)
    }

    #[rstest]
    #[case(1000.0, 100.0, 250.0)]
    #[case(250.0, 100.0, 120.0)]
    #[case(150.0, 100.0, 0.0)]
    #[case(100.0, 1000.0, -250.0)]
    fn follower_speed_depends_on_separation(
        #[case] leader_x: f32,
        #[case] follower_x: f32,
        #[case] expected: f32,
    ) {
        let command = follow_step(
            &FollowSettings::default(),
            &follow_policy(),
            Vec2::new(leader_x, 800.0),
            Vec2::new(follower_x, 800.0),
            Contacts::default(),
        );
        assert_eq!(command.vx, expected);
    }

    #[test]
    fn speed_thresholds_match_the_leash_bands() {
        let settings = FollowSettings::default();
        assert_eq!(target_speed(&settings, 900.0), 250.0);
        assert_eq!(target_speed(&settings, 150.0), 120.0);
        assert_eq!(target_speed(&settings, 400.0), 120.0);
        assert_eq!(target_speed(&settings, 100.0), 0.0);
        assert_eq!(target_speed(&settings, 50.0), 0.0);
    }

    #[test]
    fn blocked_grounded_follower_hops() {
        let contacts = Contacts {
            grounded: true,
            blocked_right: true,
            ..Contacts::default()
        };
        let command = follow_step(
            &FollowSettings::default(),
            &FollowPolicy::for_scene(SceneKind::Arena, FollowMode::Follow),
            Vec2::new(900.0, 600.0),
            Vec2::new(300.0, 600.0),
            contacts,
        );
        assert_eq!(command.vy, Some(-750.0));
        assert_eq!(command.facing, Some(Facing::Right));
    }

    #[test]
    fn trail_follower_hops_toward_a_higher_leader() {
        let grounded = Contacts {
            grounded: true,
            ..Contacts::default()
        };
        let settings = FollowSettings::default();
        let leader = Vec2::new(600.0, 700.0);
        let follower = Vec2::new(300.0, 800.0);

        let trail = follow_step(&settings, &follow_policy(), leader, follower, grounded);
        assert_eq!(trail.vy, Some(-850.0));

        let arena = FollowPolicy::for_scene(SceneKind::Arena, FollowMode::Follow);
        assert_eq!(follow_step(&settings, &arena, leader, follower, grounded).vy, None);

        let airborne = follow_step(
            &settings,
            &follow_policy(),
            leader,
            follower,
            Contacts::default(),
        );
        assert_eq!(airborne.vy, None);
    }

    #[test]
    fn manual_mode_holds_the_follower_still() {
        let policy = FollowPolicy::for_scene(SceneKind::Trail, FollowMode::Manual);
        let command = follow_step(
            &FollowSettings::default(),
            &policy,
            Vec2::new(2000.0, 0.0),
            Vec2::ZERO,
            Contacts {
                grounded: true,
                blocked_left: true,
                ..Contacts::default()
            },
        );
        assert_eq!(command.vx, 0.0);
        assert_eq!(command.vy, None);
    }

    #[test]
    fn leash_pulls_the_leader_back() {
        assert_eq!(clamp_leash(2000.0, 0.0, 1100.0), Some(1100.0));
        assert_eq!(clamp_leash(0.0, 2000.0, 1100.0), Some(900.0));
        assert_eq!(clamp_leash(1000.0, 0.0, 1100.0), None);
    }

    #[test]
    fn leash_applies_in_manual_mode_after_one_tick() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.init_resource::<FollowSettings>();
        app.insert_resource(FollowPolicy::for_scene(SceneKind::Trail, FollowMode::Manual));
        app.add_systems(Update, (steer_passive_companion, enforce_leash).chain());

        let active = app
            .world_mut()
            .spawn((
                Companion {
                    variant: Variant::Heavy,
                },
                Position(Vec2::new(2000.0, 800.0)),
                Velocity(Vec2::new(200.0, 0.0)),
                Contacts::default(),
                MotionState::default(),
            ))
            .id();
        let passive = app
            .world_mut()
            .spawn((
                Companion {
                    variant: Variant::Light,
                },
                Position(Vec2::new(0.0, 800.0)),
                Velocity(Vec2::new(50.0, 0.0)),
                Contacts::default(),
                MotionState::default(),
            ))
            .id();
        app.insert_resource(Party::new(active, passive, Variant::Heavy));

        app.update();

        let world = app.world();
        assert_eq!(world.get::<Position>(active).unwrap().x, 1100.0);
        assert_eq!(world.get::<Velocity>(active).unwrap().x, 0.0);
        assert_eq!(world.get::<Velocity>(passive).unwrap().x, 0.0);
    }

    #[test]
    fn fallen_follower_reappears_above_the_leader() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.init_resource::<FollowSettings>();
        app.insert_resource(WorldBounds {
            size: Vec2::new(10_000.0, 1200.0),
            floor: false,
            fall_limit: Some(1200.0),
        });
        app.add_systems(Update, recover_passive_companion);

        let active = app
            .world_mut()
            .spawn((
                Companion {
                    variant: Variant::Light,
                },
                Position(Vec2::new(4200.0, 700.0)),
                Velocity::default(),
            ))
            .id();
        let passive = app
            .world_mut()
            .spawn((
                Companion {
                    variant: Variant::Heavy,
                },
                Position(Vec2::new(3900.0, 1250.0)),
                Velocity(Vec2::new(120.0, 900.0)),
            ))
            .id();
        app.insert_resource(Party::new(passive, active, Variant::Light));

        app.update();

        let world = app.world();
        assert_eq!(world.get::<Position>(passive).unwrap().0, Vec2::new(4200.0, 650.0));
        assert_eq!(world.get::<Velocity>(passive).unwrap().0, Vec2::ZERO);
    }
}
