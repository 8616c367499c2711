use bevy::input::keyboard::KeyCode;
use bevy::prelude::*;

use crate::character::{Companion, Party, VariantStats};
use crate::effects::ScalePulse;
use crate::physics::{Contacts, Velocity};
use crate::state::GameSet;

pub struct MotionPlugin;

impl Plugin for MotionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MotionSettings>()
            .init_resource::<PlayerInput>()
            .add_systems(
                Update,
                (
                    read_player_input.in_set(GameSet::Input),
                    drive_active_companion
                        .in_set(GameSet::Motion)
                        .run_if(resource_exists::<Party>),
                ),
            );
    }
}

/// Grace windows and feel constants. Times are seconds on the simulation clock.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct MotionSettings {
    pub coyote_time: f32,
    pub jump_buffer_time: f32,
    /// Horizontal speed multiplier while airborne.
    pub air_control: f32,
    /// Per-tick horizontal damping with no direction held.
    pub idle_damping: f32,
    /// Per-tick multiplier on upward speed once the jump key is released.
    pub jump_cut: f32,
    /// Wobble angular rate in radians per second.
    pub wobble_rate: f32,
    pub wobble_amplitude: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            coyote_time: 0.1,
            jump_buffer_time: 0.15,
            air_control: 0.8,
            idle_damping: 0.9,
            jump_cut: 0.5,
            wobble_rate: 20.0,
            wobble_amplitude: 0.1,
        }
    }
}

/// Directional state sampled once per tick.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerInput {
    pub left: bool,
    pub right: bool,
    /// Edge-triggered: true only on the tick the key went down.
    pub jump_pressed: bool,
    pub jump_held: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Facing {
    #[default]
    Right,
    Left,
}

impl Facing {
    pub fn from_direction(direction: f32) -> Self {
        if direction < 0.0 {
            Self::Left
        } else {
            Self::Right
        }
    }
}

/// Transient jump bookkeeping for one companion.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    pub coyote_deadline: f32,
    pub jump_buffer_deadline: f32,
    /// The current rise comes from a jump (enables jump cut and the landing squash).
    pub airborne: bool,
    pub facing: Facing,
    /// Cosmetic rotation in radians.
    pub wobble: f32,
}

/// Visual cues produced by a motion step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionFeedback {
    pub jumped: bool,
    pub landed: bool,
}

impl MotionState {
    pub fn can_jump(&self, now: f32) -> bool {
        self.coyote_deadline > now && self.jump_buffer_deadline > now && !self.airborne
    }

    /// Advances one tick: grace windows, horizontal drive, jump trigger, jump cut, landing.
    pub fn step(
        &mut self,
        settings: &MotionSettings,
        stats: &VariantStats,
        input: PlayerInput,
        contacts: Contacts,
        velocity: &mut Vec2,
        now: f32,
    ) -> MotionFeedback {
        if contacts.grounded {
            self.coyote_deadline = now + settings.coyote_time;
        }
        if input.jump_pressed {
            self.jump_buffer_deadline = now + settings.jump_buffer_time;
        }

        let factor = if contacts.grounded {
            1.0
        } else {
            settings.air_control
        };
        let direction = if input.left {
            -1.0
        } else if input.right {
            1.0
        } else {
            0.0
        };

        if direction != 0.0 {
            velocity.x = direction * stats.move_speed * factor;
            self.facing = Facing::from_direction(direction);
            self.wobble = (now * settings.wobble_rate).sin() * settings.wobble_amplitude;
        } else {
            velocity.x *= settings.idle_damping;
            self.wobble = 0.0;
        }

        let mut feedback = MotionFeedback::default();
        if self.can_jump(now) {
            velocity.y = stats.jump_strength;
            self.airborne = true;
            self.coyote_deadline = 0.0;
            self.jump_buffer_deadline = 0.0;
            feedback.jumped = true;
        }

        if self.airborne && !input.jump_held && velocity.y < 0.0 {
            velocity.y *= settings.jump_cut;
        }

        if contacts.grounded && velocity.y >= 0.0 && self.airborne {
            self.airborne = false;
            feedback.landed = true;
        }

        feedback
    }
}

fn read_player_input(keyboard: Res<ButtonInput<KeyCode>>, mut input: ResMut<PlayerInput>) {
    *input = PlayerInput {
        left: keyboard.any_pressed([KeyCode::ArrowLeft, KeyCode::KeyA]),
        right: keyboard.any_pressed([KeyCode::ArrowRight, KeyCode::KeyD]),
        jump_pressed: keyboard.any_just_pressed([KeyCode::ArrowUp, KeyCode::KeyW]),
        jump_held: keyboard.any_pressed([KeyCode::ArrowUp, KeyCode::KeyW]),
    };
}

fn drive_active_companion(
    mut commands: Commands,
    time: Res<Time>,
    settings: Res<MotionSettings>,
    input: Res<PlayerInput>,
    party: Res<Party>,
    mut companions: Query<(&Companion, &Contacts, &mut Velocity, &mut MotionState)>,
) {
    let now = time.elapsed_seconds();
    let entity = party.active_entity();
    let Ok((companion, contacts, mut velocity, mut state)) = companions.get_mut(entity) else {
        return;
    };

    let feedback = state.step(
        &settings,
        &companion.stats(),
        *input,
        *contacts,
        &mut velocity.0,
        now,
    );

    if feedback.jumped {
        commands.entity(entity).insert(ScalePulse::jump(now));
    } else if feedback.landed {
        commands.entity(entity).insert(ScalePulse::landing(now));
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;
    use crate::character::Variant;

    const TICK: f32 = 1.0 / 60.0;

    fn grounded() -> Contacts {
        Contacts {
            grounded: true,
            ..Contacts::default()
        }
    }

    fn press_jump() -> PlayerInput {
        PlayerInput {
            jump_pressed: true,
            jump_held: true,
            ..PlayerInput::default()
        }
    }

    fn hold_jump() -> PlayerInput {
        PlayerInput {
            jump_held: true,
            ..PlayerInput::default()
        }
    }

    #[test]
    fn grounded_ticks_open_the_coyote_window() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState::default();
        let mut velocity = Vec2::ZERO;

        for tick in 0..10 {
            let now = 5.0 + tick as f32 * TICK;
            state.step(&settings, &stats, PlayerInput::default(), grounded(), &mut velocity, now);
            assert_relative_eq!(state.coyote_deadline, now + 0.1);
        }
    }

    #[test]
    fn airborne_ticks_never_extend_the_coyote_window() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState::default();
        let mut velocity = Vec2::ZERO;

        state.step(&settings, &stats, PlayerInput::default(), grounded(), &mut velocity, 1.0);
        let deadline = state.coyote_deadline;
        for tick in 1..20 {
            let now = 1.0 + tick as f32 * TICK;
            state.step(
                &settings,
                &stats,
                PlayerInput::default(),
                Contacts::default(),
                &mut velocity,
                now,
            );
            assert_eq!(state.coyote_deadline, deadline);
        }
    }

    #[test]
    fn jump_fires_when_both_windows_are_open_and_consumes_them() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState::default();
        let mut velocity = Vec2::ZERO;

        let feedback = state.step(&settings, &stats, press_jump(), grounded(), &mut velocity, 2.0);

        assert!(feedback.jumped);
        assert_eq!(velocity.y, stats.jump_strength);
        assert!(state.airborne);
        assert_eq!(state.coyote_deadline, 0.0);
        assert_eq!(state.jump_buffer_deadline, 0.0);
    }

    #[test]
    fn coyote_time_allows_a_late_jump_after_leaving_the_edge() {
        let settings = MotionSettings::default();
        let stats = Variant::Light.stats();
        let mut state = MotionState::default();
        let mut velocity = Vec2::ZERO;

        state.step(&settings, &stats, PlayerInput::default(), grounded(), &mut velocity, 1.0);
        let feedback = state.step(
            &settings,
            &stats,
            press_jump(),
            Contacts::default(),
            &mut velocity,
            1.05,
        );
        assert!(feedback.jumped);

        let mut late = MotionState::default();
        late.step(&settings, &stats, PlayerInput::default(), grounded(), &mut velocity, 1.0);
        let feedback = late.step(
            &settings,
            &stats,
            press_jump(),
            Contacts::default(),
            &mut velocity,
            1.2,
        );
        assert!(!feedback.jumped);
    }

    #[test]
    fn buffered_press_fires_on_landing() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState::default();
        let mut velocity = Vec2::new(0.0, 300.0);

        let feedback = state.step(
            &settings,
            &stats,
            press_jump(),
            Contacts::default(),
            &mut velocity,
            3.0,
        );
        assert!(!feedback.jumped);

        velocity.y = 0.0;
        let feedback = state.step(&settings, &stats, hold_jump(), grounded(), &mut velocity, 3.1);
        assert!(feedback.jumped);

        let mut stale = MotionState::default();
        stale.step(&settings, &stats, press_jump(), Contacts::default(), &mut velocity, 3.0);
        velocity.y = 0.0;
        let feedback = stale.step(&settings, &stats, hold_jump(), grounded(), &mut velocity, 3.2);
        assert!(!feedback.jumped);
    }

    #[test]
    fn no_second_jump_while_the_first_is_still_rising() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState {
            airborne: true,
            coyote_deadline: 10.0,
            jump_buffer_deadline: 10.0,
            ..MotionState::default()
        };
        let mut velocity = Vec2::new(0.0, -400.0);

        let feedback = state.step(&settings, &stats, hold_jump(), grounded(), &mut velocity, 1.0);

        assert!(!feedback.jumped);
        assert_eq!(velocity.y, -400.0);
    }

    #[test]
    fn releasing_jump_mid_ascent_only_ever_slows_the_rise() {
        let settings = MotionSettings::default();
        let stats = Variant::Light.stats();
        let mut state = MotionState::default();
        let mut velocity = Vec2::ZERO;
        state.step(&settings, &stats, press_jump(), grounded(), &mut velocity, 0.0);

        let mut previous = velocity.y;
        for tick in 1..12 {
            state.step(
                &settings,
                &stats,
                PlayerInput::default(),
                Contacts::default(),
                &mut velocity,
                tick as f32 * TICK,
            );
            assert!(velocity.y <= 0.0);
            assert!(velocity.y.abs() < previous.abs());
            previous = velocity.y;
        }
    }

    #[test]
    fn landing_clears_the_jump_and_squashes() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState {
            airborne: true,
            ..MotionState::default()
        };
        let mut velocity = Vec2::new(0.0, 0.0);

        let feedback = state.step(&settings, &stats, PlayerInput::default(), grounded(), &mut velocity, 4.0);

        assert!(feedback.landed);
        assert!(!state.airborne);
    }

    #[rstest]
    #[case(Variant::Heavy, true, 200.0)]
    #[case(Variant::Heavy, false, 160.0)]
    #[case(Variant::Light, true, 300.0)]
    #[case(Variant::Light, false, 240.0)]
    fn air_control_reduces_horizontal_drive(
        #[case] variant: Variant,
        #[case] on_ground: bool,
        #[case] expected: f32,
    ) {
        let settings = MotionSettings::default();
        let mut state = MotionState::default();
        let mut velocity = Vec2::ZERO;
        let contacts = Contacts {
            grounded: on_ground,
            ..Contacts::default()
        };
        let input = PlayerInput {
            right: true,
            ..PlayerInput::default()
        };

        state.step(&settings, &variant.stats(), input, contacts, &mut velocity, 0.3);

        assert_relative_eq!(velocity.x, expected);
        assert_eq!(state.facing, Facing::Right);
        assert!(state.wobble.abs() <= settings.wobble_amplitude);
    }

    #[test]
    fn idle_ticks_decay_momentum_and_clear_wobble() {
        let settings = MotionSettings::default();
        let stats = Variant::Heavy.stats();
        let mut state = MotionState {
            wobble: 0.05,
            ..MotionState::default()
        };
        let mut velocity = Vec2::new(-200.0, 0.0);

        state.step(&settings, &stats, PlayerInput::default(), grounded(), &mut velocity, 0.0);

        assert_relative_eq!(velocity.x, -180.0);
        assert_eq!(state.wobble, 0.0);
    }
}
