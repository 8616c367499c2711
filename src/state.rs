//! Global game state definitions. States are stored by Bevy in a stack; switching states simply
//! updates an enum value and triggers on-enter/on-exit schedules. The `Session` resource records
//! which scene the next `Loading` pass should build, so a retry rebuilds exactly what was played.

use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// High-level state machine for the game loop.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub enum GameState {
    #[default]
    Menu,
    Loading,
    Playing,
    Paused,
    /// A terminal outcome was reached; the world stays on screen but no longer simulates.
    Ended,
}

/// Named system sets to structure the Update schedule. Chained in declaration order so the
/// passive companion always reads the active companion's freshly written velocity.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameSet {
    Input,
    Motion,
    Follow,
    Physics,
    /// Outcome checks: boss combat, goal arrival, falls.
    Resolve,
    Effects,
}

/// The two playable scenes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneKind {
    /// Procedurally generated terrain ending at a goal marker.
    #[default]
    Trail,
    /// Fixed arena hosting the boss encounter.
    Arena,
}

impl SceneKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trail => "trail",
            Self::Arena => "arena",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "trail" => Some(Self::Trail),
            "arena" => Some(Self::Arena),
            _ => None,
        }
    }
}

/// Whether the passive companion walks after the active one or stands still.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FollowMode {
    #[default]
    Follow,
    Manual,
}

/// Scene request consumed by the loading pass. Cloning is cheap; only plain values live here.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub scene: SceneKind,
    pub follow: FollowMode,
    /// Number of times the current scene has been (re)built.
    pub attempt: u32,
}

impl Session {
    pub fn start(&mut self, scene: SceneKind, follow: FollowMode) {
        self.scene = scene;
        self.follow = follow;
        self.attempt = 0;
    }
}

/// Toggles between Playing and Paused when `ESC` is pressed. The `State` resource is read-only
/// snapshot; `NextState` writes the pending transition which Bevy applies at the end of the frame.
pub fn toggle_pause(
    keyboard: Res<ButtonInput<KeyCode>>,
    state: Res<State<GameState>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if !keyboard.just_pressed(KeyCode::Escape) {
        return;
    }

    match state.get() {
        GameState::Playing => next_state.set(GameState::Paused),
        GameState::Paused => next_state.set(GameState::Playing),
        GameState::Menu | GameState::Loading | GameState::Ended => {}
    }
}

/// Freezes the virtual clock so grace windows and attack timers do not expire behind the pause
/// overlay.
pub fn pause_clock(mut time: ResMut<Time<Virtual>>) {
    time.pause();
}

pub fn resume_clock(mut time: ResMut<Time<Virtual>>) {
    time.unpause();
}
