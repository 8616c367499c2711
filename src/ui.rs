//! Menu, pause and end-of-attempt overlays, plus the arena health readout and hit flash.
//!
//! UI entities are part of Bevy's ECS; each overlay is spawned on entering its state and
//! despawned on leaving it.

use bevy::prelude::*;

use crate::character::Variant;
use crate::checkpoint::Checkpoints;
use crate::effects::ScreenFlash;
use crate::encounter::Encounter;
use crate::scene::{LastOutcome, SceneEntity};
use crate::state::{FollowMode, GameState, SceneKind, Session};

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_flash_overlay)
            .add_systems(OnEnter(GameState::Menu), spawn_main_menu)
            .add_systems(OnExit(GameState::Menu), despawn_overlay::<MainMenu>)
            .add_systems(OnEnter(GameState::Paused), spawn_pause_menu)
            .add_systems(OnExit(GameState::Paused), despawn_overlay::<PauseMenu>)
            .add_systems(OnEnter(GameState::Ended), spawn_outcome_banner)
            .add_systems(OnExit(GameState::Ended), despawn_overlay::<OutcomeBanner>)
            .add_systems(Update, choose_from_menu.run_if(in_state(GameState::Menu)))
            .add_systems(
                Update,
                (update_health_hud.run_if(resource_exists::<Encounter>), update_flash_overlay),
            );
    }
}

#[derive(Component)]
struct MainMenu;

#[derive(Component)]
struct PauseMenu;

#[derive(Component)]
struct OutcomeBanner;

#[derive(Component)]
struct HealthHud;

#[derive(Component)]
struct FlashOverlay;

/// Maps a menu key to the scene it starts.
pub fn menu_choice(key: KeyCode) -> Option<(SceneKind, FollowMode)> {
    match key {
        KeyCode::Digit1 => Some((SceneKind::Trail, FollowMode::Follow)),
        KeyCode::Digit2 => Some((SceneKind::Trail, FollowMode::Manual)),
        KeyCode::Digit3 => Some((SceneKind::Arena, FollowMode::Follow)),
        KeyCode::Digit4 => Some((SceneKind::Arena, FollowMode::Manual)),
        _ => None,
    }
}

pub fn health_line(encounter: &Encounter) -> String {
    format!(
        "BOSS {:>3}    {} {:>3}    {} {:>3}",
        encounter.boss_health(),
        Variant::Heavy.label(),
        encounter.companion_health(Variant::Heavy),
        Variant::Light.label(),
        encounter.companion_health(Variant::Light),
    )
}

fn overlay_root(background: Color) -> NodeBundle {
    NodeBundle {
        background_color: BackgroundColor(background),
        style: Style {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            align_items: AlignItems::Center,
            justify_content: JustifyContent::Center,
            ..default()
        },
        ..default()
    }
}

fn centered_text(text: impl Into<String>, font_size: f32, color: Color) -> TextBundle {
    TextBundle::from_section(
        text,
        TextStyle {
            font_size,
            color,
            ..default()
        },
    )
    .with_text_justify(JustifyText::Center)
}

fn spawn_main_menu(mut commands: Commands, checkpoints: Res<Checkpoints>) {
    let mut lines = String::from(
        "SLOPE SCRAMBLE\n\n\
         THE FULL JOURNEY\n\
         [1] Co-op mode    [2] Duo mode\n\n\
         BOSS CHALLENGE\n\
         [3] Boss rush (co-op)    [4] Boss rush (duo)",
    );
    if checkpoints.resume_scene().is_some() {
        lines.push_str("\n\n[C] Resume checkpoint");
    }

    commands
        .spawn((
            MainMenu,
            Name::new("MainMenu"),
            overlay_root(Color::srgb(0.14, 0.14, 0.14)),
        ))
        .with_children(|parent| {
            parent.spawn(centered_text(lines, 32.0, Color::WHITE));
        });
}

fn choose_from_menu(
    keyboard: Res<ButtonInput<KeyCode>>,
    checkpoints: Res<Checkpoints>,
    mut session: ResMut<Session>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let choice = keyboard
        .get_just_pressed()
        .find_map(|key| menu_choice(*key))
        .or_else(|| {
            keyboard
                .just_pressed(KeyCode::KeyC)
                .then(|| checkpoints.resume_scene())
                .flatten()
                .map(|scene| (scene, FollowMode::Follow))
        });

    if let Some((scene, follow)) = choice {
        session.start(scene, follow);
        next_state.set(GameState::Loading);
    }
}

fn spawn_pause_menu(mut commands: Commands) {
    commands
        .spawn((
            PauseMenu,
            Name::new("PauseMenu"),
            overlay_root(Color::srgba(0.0, 0.0, 0.0, 0.6)),
        ))
        .with_children(|parent| {
            parent.spawn(centered_text(
                "Paused\nPress ESC to resume",
                36.0,
                Color::srgba(0.9, 0.9, 0.9, 1.0),
            ));
        });
}

fn spawn_outcome_banner(mut commands: Commands, last: Res<LastOutcome>) {
    let Some(outcome) = last.0 else {
        return;
    };

    commands
        .spawn((
            OutcomeBanner,
            Name::new("OutcomeBanner"),
            overlay_root(Color::NONE),
        ))
        .with_children(|parent| {
            parent.spawn(centered_text(outcome.banner(), 48.0, Color::WHITE));
        });
}

fn despawn_overlay<T: Component>(mut commands: Commands, query: Query<Entity, With<T>>) {
    for entity in &query {
        commands.entity(entity).despawn_recursive();
    }
}

fn update_health_hud(
    mut commands: Commands,
    encounter: Res<Encounter>,
    mut huds: Query<&mut Text, With<HealthHud>>,
) {
    let line = health_line(&encounter);
    let Ok(mut text) = huds.get_single_mut() else {
        commands.spawn((
            HealthHud,
            SceneEntity,
            Name::new("HealthHud"),
            centered_text(line, 28.0, Color::WHITE).with_style(Style {
                position_type: PositionType::Absolute,
                top: Val::Px(20.0),
                left: Val::Px(20.0),
                ..default()
            }),
        ));
        return;
    };

    if let Some(section) = text.sections.first_mut() {
        if section.value != line {
            section.value = line;
        }
    }
}

fn spawn_flash_overlay(mut commands: Commands) {
    commands.spawn((
        FlashOverlay,
        Name::new("FlashOverlay"),
        overlay_root(Color::NONE),
    ));
}

fn update_flash_overlay(
    time: Res<Time>,
    flash: Res<ScreenFlash>,
    mut overlays: Query<&mut BackgroundColor, With<FlashOverlay>>,
) {
    let color = if flash.is_active(time.elapsed_seconds()) {
        Color::srgba(1.0, 0.0, 0.0, 0.4)
    } else {
        Color::NONE
    };
    for mut background in &mut overlays {
        background.0 = color;
    }
}
