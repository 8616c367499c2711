//! Application entry point: composes the Bevy runtime, core plugins, and window configuration,
//! then defers to the `SlopeScramblePlugin` defined in `app.rs`.

mod app;
mod camera;
mod character;
mod checkpoint;
mod effects;
mod encounter;
mod follow;
mod motion;
mod physics;
mod presentation;
mod scene;
mod state;
mod terrain;
mod ui;

use app::SlopeScramblePlugin;
use bevy::prelude::*;
use bevy::window::{Window, WindowResizeConstraints, WindowResolution};

fn main() {
    // Scene layouts are authored against a 1280×720 view; resizing is allowed but bounded.
    let primary_window = Window {
        title: "Slope Scramble".to_string(),
        resolution: WindowResolution::new(1280.0, 720.0),
        resizable: true,
        resize_constraints: WindowResizeConstraints {
            min_width: 640.0,
            min_height: 360.0,
            max_width: f32::INFINITY,
            max_height: f32::INFINITY,
        },
        ..default()
    };

    App::new()
        .insert_resource(ClearColor(presentation::SKY))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(primary_window),
            ..default()
        }))
        .add_plugins(SlopeScramblePlugin)
        .run();
}
