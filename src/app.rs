//! High-level plugin composition.
//!
//! `SlopeScramblePlugin` glues together all domain-specific plugins and sets up system ordering.
//! Each subsystem is responsible for its own state; this orchestrator merely registers them with
//! the Bevy application.

use bevy::prelude::*;

use crate::camera::{CameraPlugin, FollowCamera};
use crate::character::CharacterPlugin;
use crate::effects::EffectsPlugin;
use crate::encounter::{intro_playing, EncounterPlugin};
use crate::follow::FollowPlugin;
use crate::motion::MotionPlugin;
use crate::physics::PhysicsPlugin;
use crate::presentation::PresentationPlugin;
use crate::scene::ScenePlugin;
use crate::state::{pause_clock, resume_clock, toggle_pause, GameSet, GameState, Session};
use crate::terrain::TerrainPlugin;
use crate::ui::UiPlugin;

pub struct SlopeScramblePlugin;

impl Plugin for SlopeScramblePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>()
            .init_resource::<Session>()
            .add_plugins((
                PhysicsPlugin,      // Gravity, solids, pushables, overlap events.
                CharacterPlugin,    // Companion roster + swap.
                MotionPlugin,       // Player-driven movement.
                FollowPlugin,       // Passive companion steering and leash.
                TerrainPlugin,      // Trail goal and fall checks.
                EncounterPlugin,    // Boss fight.
                EffectsPlugin,      // Squash pulses, shake, flash.
                ScenePlugin,        // Scene build/teardown and outcome routing.
                PresentationPlugin, // Layout-to-sprite sync.
                CameraPlugin,
                UiPlugin,
            ))
            // Simulation runs only while `Playing`; the chain guarantees the passive companion
            // reads the active one's velocity for this tick before physics moves either.
            .configure_sets(
                Update,
                (
                    GameSet::Input,
                    GameSet::Motion,
                    GameSet::Follow,
                    GameSet::Physics,
                    GameSet::Resolve,
                    GameSet::Effects,
                )
                    .chain()
                    .run_if(in_state(GameState::Playing)),
            )
            .configure_sets(
                Update,
                (GameSet::Motion, GameSet::Follow).run_if(not(intro_playing)),
            )
            .add_systems(Startup, setup_camera)
            .add_systems(Update, toggle_pause)
            .add_systems(OnEnter(GameState::Paused), pause_clock)
            .add_systems(OnExit(GameState::Paused), resume_clock);
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("MainCamera"),
        Camera2dBundle::default(),
        FollowCamera::default(),
    ));
}
