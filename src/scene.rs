//! Scene lifecycle. Builds the requested scene when entering `Loading`, tears it down again, and
//! turns gameplay outcomes into delayed transitions.
//!
//! Every entity a scene spawns carries `SceneEntity`, so teardown is a single despawn sweep plus
//! removal of the per-scene resources. Delayed transitions are queued on a `Timeline` that is
//! emptied on every teardown; a cue from an abandoned attempt can never fire into a new one.

use bevy::prelude::*;

use crate::character::{spawn_party, Party};
use crate::checkpoint::Checkpoints;
use crate::effects::{ScreenFlash, ScreenShake, Timeline};
use crate::encounter::{build_arena, Encounter, EncounterSettings, ARENA_SPAWNS};
use crate::follow::FollowPolicy;
use crate::motion::MotionSettings;
use crate::physics::{OverlapCache, PhysicsSettings};
use crate::state::{GameSet, GameState, SceneKind, Session};
use crate::terrain::{
    build_trail, generate_reachable, GeneratorConfig, JumpEnvelope, Level, TrailSettings,
    TRAIL_SPAWNS,
};

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<Outcome>()
            .init_resource::<SceneTimings>()
            .init_resource::<Timeline<SceneCue>>()
            .init_resource::<LastOutcome>()
            .init_resource::<Checkpoints>()
            .add_systems(OnEnter(GameState::Loading), (teardown_scene, build_scene).chain())
            .add_systems(OnEnter(GameState::Menu), teardown_scene)
            .add_systems(
                Update,
                handle_outcomes
                    .after(GameSet::Resolve)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                Update,
                (run_due_cues, retry_attempt).run_if(in_state(GameState::Ended)),
            );
    }
}

/// Marks everything owned by the current scene.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SceneEntity;

/// Terminal result of an attempt.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The controlled companion dropped out of the trail.
    Fell,
    /// A companion ran out of health in the arena.
    Defeat,
    Victory,
    /// Both companions reached the trail's flag.
    GoalReached,
}

impl Outcome {
    pub fn allows_retry(self) -> bool {
        matches!(self, Self::Fell | Self::Defeat)
    }

    pub fn banner(self) -> &'static str {
        match self {
            Self::Fell => "YOU FELL!\nPress ENTER to retry",
            Self::Defeat => "THE CAT HAS WON...\nClick or press ENTER to retry",
            Self::Victory => "BOSS DEFEATED!",
            Self::GoalReached => "MADE IT!",
        }
    }
}

/// The outcome that ended the last attempt, kept for the end-of-attempt overlay.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LastOutcome(pub Option<Outcome>);

/// Deferred scene transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCue {
    Load(SceneKind),
    ReturnToMenu,
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct SceneTimings {
    pub goal_to_arena: f32,
    pub victory_to_menu: f32,
    pub fall_shake_duration: f32,
    pub fall_shake_intensity: f32,
}

impl Default for SceneTimings {
    fn default() -> Self {
        Self {
            goal_to_arena: 1.5,
            victory_to_menu: 3.0,
            fall_shake_duration: 0.25,
            fall_shake_intensity: 0.02,
        }
    }
}

/// Despawns the current scene and drops every per-scene resource and pending cue.
pub fn teardown_scene(
    mut commands: Commands,
    entities: Query<Entity, With<SceneEntity>>,
    mut timeline: ResMut<Timeline<SceneCue>>,
    mut overlaps: ResMut<OverlapCache>,
    mut shake: ResMut<ScreenShake>,
    mut flash: ResMut<ScreenFlash>,
) {
    for entity in &entities {
        commands.entity(entity).despawn_recursive();
    }
    commands.remove_resource::<Party>();
    commands.remove_resource::<Encounter>();
    commands.remove_resource::<Level>();

    let dropped = timeline.cancel_all();
    if dropped > 0 {
        debug!("Dropped {dropped} pending scene cues");
    }
    overlaps.clear();
    *shake = ScreenShake::default();
    *flash = ScreenFlash::default();
}

#[allow(clippy::too_many_arguments)]
fn build_scene(
    mut commands: Commands,
    time: Res<Time>,
    mut session: ResMut<Session>,
    mut checkpoints: ResMut<Checkpoints>,
    physics: Res<PhysicsSettings>,
    motion: Res<MotionSettings>,
    generator: Res<GeneratorConfig>,
    trail: Res<TrailSettings>,
    encounter: Res<EncounterSettings>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    session.attempt += 1;
    commands.insert_resource(FollowPolicy::for_scene(session.scene, session.follow));

    let [heavy_at, light_at] = match session.scene {
        SceneKind::Trail => {
            let seed = trail.seed.unwrap_or_else(|| fastrand::u64(..));
            let envelope = JumpEnvelope::weakest(&physics, &motion);
            build_trail(&mut commands, generate_reachable(&generator, &envelope, seed));
            TRAIL_SPAWNS
        }
        SceneKind::Arena => {
            checkpoints.enter_scene(SceneKind::Arena);
            build_arena(&mut commands, &encounter, time.elapsed_seconds());
            ARENA_SPAWNS
        }
    };
    let party = spawn_party(&mut commands, heavy_at, light_at);
    commands.insert_resource(party);

    info!(
        "Loaded {} ({:?}), attempt {}",
        session.scene.as_str(),
        session.follow,
        session.attempt
    );
    next_state.set(GameState::Playing);
}

/// Ends the attempt on the first outcome of the frame; later ones in the same frame are dropped.
fn handle_outcomes(
    time: Res<Time>,
    timings: Res<SceneTimings>,
    mut outcomes: EventReader<Outcome>,
    mut timeline: ResMut<Timeline<SceneCue>>,
    mut last: ResMut<LastOutcome>,
    mut shake: ResMut<ScreenShake>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Some(outcome) = outcomes.read().next().copied() else {
        return;
    };
    outcomes.clear();

    let now = time.elapsed_seconds();
    info!("Attempt ended: {outcome:?}");
    match outcome {
        Outcome::GoalReached => {
            timeline.schedule(now + timings.goal_to_arena, SceneCue::Load(SceneKind::Arena));
        }
        Outcome::Victory => {
            timeline.schedule(now + timings.victory_to_menu, SceneCue::ReturnToMenu);
        }
        Outcome::Fell => {
            shake.trigger(now, timings.fall_shake_duration, timings.fall_shake_intensity);
        }
        Outcome::Defeat => {}
    }

    last.0 = Some(outcome);
    next_state.set(GameState::Ended);
}

fn run_due_cues(
    time: Res<Time>,
    mut timeline: ResMut<Timeline<SceneCue>>,
    mut session: ResMut<Session>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    for cue in timeline.drain_due(time.elapsed_seconds()) {
        match cue {
            SceneCue::Load(scene) => {
                let follow = session.follow;
                session.start(scene, follow);
                next_state.set(GameState::Loading);
            }
            SceneCue::ReturnToMenu => next_state.set(GameState::Menu),
        }
    }
}

/// Rebuilds the same scene after a fall or a defeat.
fn retry_attempt(
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse: Res<ButtonInput<MouseButton>>,
    last: Res<LastOutcome>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !last.0.is_some_and(Outcome::allows_retry) {
        return;
    }

    if keyboard.just_pressed(KeyCode::Enter) || mouse.just_pressed(MouseButton::Left) {
        next_state.set(GameState::Loading);
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;
    use bevy::state::app::StatesPlugin;

    use super::*;

    fn ended_app(last: Option<Outcome>) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin))
            .insert_state(GameState::Ended)
            .init_resource::<Session>()
            .init_resource::<Timeline<SceneCue>>()
            .init_resource::<ButtonInput<KeyCode>>()
            .init_resource::<ButtonInput<MouseButton>>()
            .insert_resource(LastOutcome(last))
            .add_systems(Update, (run_due_cues, retry_attempt));
        app
    }

    fn pending_state(app: &App) -> Option<GameState> {
        match app.world().resource::<NextState<GameState>>() {
            NextState::Pending(state) => Some(*state),
            NextState::Unchanged => None,
        }
    }

    #[test]
    fn reaching_the_goal_queues_the_arena() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin))
            .insert_state(GameState::Playing)
            .add_event::<Outcome>()
            .init_resource::<SceneTimings>()
            .init_resource::<Timeline<SceneCue>>()
            .init_resource::<LastOutcome>()
            .init_resource::<ScreenShake>()
            .add_systems(Update, handle_outcomes);

        app.world_mut().send_event(Outcome::GoalReached);
        app.world_mut().send_event(Outcome::Fell);
        app.update();

        assert_eq!(app.world().resource::<LastOutcome>().0, Some(Outcome::GoalReached));
        assert_eq!(app.world().resource::<Timeline<SceneCue>>().len(), 1);
        assert!(!app.world().resource::<ScreenShake>().is_active(0.0));

        app.update();
        assert_eq!(
            app.world().resource::<State<GameState>>().get(),
            &GameState::Ended
        );
    }

    #[test]
    fn due_cue_loads_the_next_scene() {
        let mut app = ended_app(Some(Outcome::GoalReached));
        app.world_mut()
            .resource_mut::<Timeline<SceneCue>>()
            .schedule(0.0, SceneCue::Load(SceneKind::Arena));
        app.update();

        assert_eq!(app.world().resource::<Session>().scene, SceneKind::Arena);
        assert_eq!(pending_state(&app), Some(GameState::Loading));
    }

    #[test]
    fn cues_wait_for_their_deadline() {
        let mut app = ended_app(Some(Outcome::Victory));
        app.world_mut()
            .resource_mut::<Timeline<SceneCue>>()
            .schedule(3.0, SceneCue::ReturnToMenu);
        app.update();

        assert_eq!(pending_state(&app), None);
        assert_eq!(app.world().resource::<Timeline<SceneCue>>().len(), 1);
    }

    #[test]
    fn enter_retries_after_a_fall() {
        let mut app = ended_app(Some(Outcome::Fell));
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::Enter);
        app.update();
        assert_eq!(pending_state(&app), Some(GameState::Loading));
    }

    #[test]
    fn victory_cannot_be_retried() {
        let mut app = ended_app(Some(Outcome::Victory));
        app.world_mut()
            .resource_mut::<ButtonInput<MouseButton>>()
            .press(MouseButton::Left);
        app.update();
        assert_eq!(pending_state(&app), None);
    }

    #[test]
    fn teardown_clears_the_scene_and_stale_cues() {
        let mut world = World::new();
        world.init_resource::<Timeline<SceneCue>>();
        world.init_resource::<OverlapCache>();
        world.init_resource::<ScreenShake>();
        world.init_resource::<ScreenFlash>();
        let scenery = world.spawn(SceneEntity).id();
        let keeper = world.spawn_empty().id();
        world.insert_resource(Party::new(
            Entity::from_raw(1),
            Entity::from_raw(2),
            crate::character::Variant::Heavy,
        ));
        world
            .resource_mut::<Timeline<SceneCue>>()
            .schedule(1.0, SceneCue::ReturnToMenu);

        world.run_system_once(teardown_scene);

        assert!(world.get_entity(scenery).is_none());
        assert!(world.get_entity(keeper).is_some());
        assert!(!world.contains_resource::<Party>());
        assert!(world.resource::<Timeline<SceneCue>>().is_empty());
    }
}
