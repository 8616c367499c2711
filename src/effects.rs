//! Time-keyed effects: eased tweens with optional yoyo/repeat, squash pulses, screen shake and
//! flash, plus a deadline queue for deferred scene cues.
//!
//! Nothing here renders. Effects are plain data sampled against the simulation clock, so an effect
//! only needs to know when it started and when it ends. The presentation layer turns samples into
//! sprite scale, alpha, or camera offsets.

use std::f32::consts::PI;

use bevy::prelude::*;

use crate::state::GameSet;

pub struct EffectsPlugin;

impl Plugin for EffectsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ScreenShake>()
            .init_resource::<ScreenFlash>()
            .add_systems(Update, expire_pulses.in_set(GameSet::Effects));
    }
}

/// Interpolation curve applied to a tween's normalized progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    QuadInOut,
    SineInOut,
    /// Lands, then rebounds with decaying bounces.
    BounceOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) * 0.5
                }
            }
            Self::SineInOut => -((PI * t).cos() - 1.0) * 0.5,
            Self::BounceOut => bounce_out(t),
        }
    }
}

fn bounce_out(t: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;

    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984_375
    }
}

/// How many extra cycles a tween plays after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(u32),
    Forever,
}

/// A scalar animated from `from` to `to`, starting at `started_at` on the simulation clock.
///
/// With `yoyo` one cycle is out-and-back (twice `duration`). A finished yoyo tween rests at
/// `from`; a finished one-way tween rests at `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    pub from: f32,
    pub to: f32,
    pub started_at: f32,
    pub duration: f32,
    pub easing: Easing,
    pub yoyo: bool,
    pub repeat: Repeat,
}

impl Tween {
    pub fn new(from: f32, to: f32, started_at: f32, duration: f32, easing: Easing) -> Self {
        Self {
            from,
            to,
            started_at,
            duration,
            easing,
            yoyo: false,
            repeat: Repeat::Times(0),
        }
    }

    pub fn yoyo(mut self) -> Self {
        self.yoyo = true;
        self
    }

    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    fn cycle_duration(&self) -> f32 {
        if self.yoyo {
            self.duration * 2.0
        } else {
            self.duration
        }
    }

    /// Clock time at which the tween stops, or `None` for endless tweens.
    pub fn ends_at(&self) -> Option<f32> {
        match self.repeat {
            Repeat::Times(extra) => {
                Some(self.started_at + self.cycle_duration() * (extra as f32 + 1.0))
            }
            Repeat::Forever => None,
        }
    }

    pub fn is_finished(&self, now: f32) -> bool {
        self.ends_at().is_some_and(|end| now >= end)
    }

    pub fn sample(&self, now: f32) -> f32 {
        let rest = if self.yoyo { self.from } else { self.to };
        if self.duration <= 0.0 || self.is_finished(now) {
            return rest;
        }

        let elapsed = (now - self.started_at).max(0.0);
        let local = elapsed.rem_euclid(self.cycle_duration());
        let progress = if local <= self.duration {
            local / self.duration
        } else {
            (self.cycle_duration() - local) / self.duration
        };

        self.from + (self.to - self.from) * self.easing.apply(progress)
    }
}

/// Brief non-uniform scale impulse on a sprite (jump squash, landing squash).
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ScalePulse {
    pub peak: Vec2,
    pub tween: Tween,
}

impl ScalePulse {
    const DURATION: f32 = 0.1;

    /// Narrow and tall, played when a jump leaves the ground.
    pub fn jump(now: f32) -> Self {
        Self::new(Vec2::new(0.8, 1.2), now)
    }

    /// Wide and flat, played when a jump lands.
    pub fn landing(now: f32) -> Self {
        Self::new(Vec2::new(1.3, 0.7), now)
    }

    fn new(peak: Vec2, now: f32) -> Self {
        Self {
            peak,
            tween: Tween::new(0.0, 1.0, now, Self::DURATION, Easing::Linear).yoyo(),
        }
    }

    pub fn scale(&self, now: f32) -> Vec2 {
        Vec2::ONE.lerp(self.peak, self.tween.sample(now))
    }
}

/// Camera jitter requested by gameplay; the camera adds `offset` on top of its follow target.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenShake {
    pub until: f32,
    pub intensity: f32,
}

impl ScreenShake {
    pub fn trigger(&mut self, now: f32, duration: f32, intensity: f32) {
        if now >= self.until {
            self.intensity = intensity;
        } else {
            self.intensity = self.intensity.max(intensity);
        }
        self.until = self.until.max(now + duration);
    }

    pub fn is_active(&self, now: f32) -> bool {
        now < self.until
    }

    /// Jitter as a fraction of the viewport, deterministic for a given clock value.
    pub fn offset(&self, now: f32, viewport: Vec2) -> Vec2 {
        if !self.is_active(now) {
            return Vec2::ZERO;
        }
        Vec2::new((now * 97.0).sin(), (now * 131.0).cos()) * viewport * self.intensity
    }
}

/// Full-screen tint shown for a moment when the boss takes a hit.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenFlash {
    pub until: f32,
}

impl ScreenFlash {
    pub fn trigger(&mut self, now: f32, duration: f32) {
        self.until = self.until.max(now + duration);
    }

    pub fn is_active(&self, now: f32) -> bool {
        now < self.until
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scheduled<A> {
    at: f32,
    action: A,
}

/// One-shot callbacks keyed by deadline on the simulation clock. Draining never blocks; restarting
/// a scene calls `cancel_all` so a cue from an abandoned attempt can never fire later.
#[derive(Resource, Debug)]
pub struct Timeline<A: Send + Sync + 'static> {
    pending: Vec<Scheduled<A>>,
}

impl<A: Send + Sync + 'static> Default for Timeline<A> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<A: Copy + Send + Sync + 'static> Timeline<A> {
    pub fn schedule(&mut self, at: f32, action: A) {
        self.pending.push(Scheduled { at, action });
    }

    /// Drops every pending cue and reports how many were discarded.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Removes and returns every cue whose deadline has passed, earliest first.
    pub fn drain_due(&mut self, now: f32) -> Vec<A> {
        let (mut due, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|cue| cue.at <= now);
        self.pending = later;
        due.sort_by(|a, b| a.at.total_cmp(&b.at));
        due.into_iter().map(|cue| cue.action).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn expire_pulses(
    mut commands: Commands,
    time: Res<Time>,
    pulses: Query<(Entity, &ScalePulse)>,
) {
    let now = time.elapsed_seconds();
    for (entity, pulse) in &pulses {
        if pulse.tween.is_finished(now) {
            commands.entity(entity).remove::<ScalePulse>();
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Easing::Linear)]
    #[case(Easing::QuadInOut)]
    #[case(Easing::SineInOut)]
    #[case(Easing::BounceOut)]
    fn easings_pin_their_endpoints(#[case] easing: Easing) {
        assert_relative_eq!(easing.apply(0.0), 0.0, epsilon = 1e-4);
        assert_relative_eq!(easing.apply(1.0), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn yoyo_tween_peaks_midway_and_returns() {
        let tween = Tween::new(1.0, 0.5, 2.0, 0.1, Easing::Linear).yoyo();
        assert_relative_eq!(tween.sample(2.0), 1.0);
        assert_relative_eq!(tween.sample(2.1), 0.5, epsilon = 1e-4);
        assert_relative_eq!(tween.sample(2.15), 0.75, epsilon = 1e-4);
        assert!(tween.is_finished(2.21));
        assert_relative_eq!(tween.sample(5.0), 1.0);
    }

    #[test]
    fn repeated_yoyo_lasts_every_cycle() {
        // Six out-and-back blinks of 100 ms each way.
        let tween = Tween::new(1.0, 0.5, 0.0, 0.1, Easing::Linear)
            .yoyo()
            .repeat(Repeat::Times(5));
        let end = tween.ends_at().unwrap();
        assert_relative_eq!(end, 1.2, epsilon = 1e-5);
        assert!(!tween.is_finished(1.19));
        assert!(tween.is_finished(1.21));
    }

    #[test]
    fn endless_tweens_never_finish() {
        let tween = Tween::new(250.0, 1030.0, 0.0, 3.0, Easing::SineInOut)
            .yoyo()
            .repeat(Repeat::Forever);
        assert_eq!(tween.ends_at(), None);
        assert!(!tween.is_finished(10_000.0));
        assert_relative_eq!(tween.sample(3.0), 1030.0, epsilon = 1e-3);
        assert_relative_eq!(tween.sample(6.0), 250.0, epsilon = 1e-3);
    }

    #[test]
    fn one_way_tween_rests_at_its_target() {
        let tween = Tween::new(-300.0, 350.0, 0.0, 2.0, Easing::BounceOut);
        assert_relative_eq!(tween.sample(-1.0), -300.0);
        assert_relative_eq!(tween.sample(2.5), 350.0);
    }

    #[test]
    fn squash_pulses_return_to_unit_scale() {
        let pulse = ScalePulse::jump(0.0);
        let peak = pulse.scale(0.1);
        assert_relative_eq!(peak.x, 0.8, epsilon = 1e-4);
        assert_relative_eq!(peak.y, 1.2, epsilon = 1e-4);
        assert_eq!(pulse.scale(0.3), Vec2::ONE);
    }

    #[test]
    fn shake_keeps_the_strongest_overlapping_request() {
        let mut shake = ScreenShake::default();
        shake.trigger(0.0, 0.25, 0.01);
        shake.trigger(0.1, 0.1, 0.005);
        assert_relative_eq!(shake.intensity, 0.01);
        assert_relative_eq!(shake.until, 0.25);
        assert!(shake.is_active(0.2));
        assert_eq!(shake.offset(0.3, Vec2::new(1280.0, 720.0)), Vec2::ZERO);
    }

    #[test]
    fn timeline_drains_due_cues_in_deadline_order() {
        let mut timeline = Timeline::default();
        timeline.schedule(3.0, 'c');
        timeline.schedule(1.0, 'a');
        timeline.schedule(2.0, 'b');

        assert!(timeline.drain_due(0.5).is_empty());
        assert_eq!(timeline.drain_due(2.0), vec!['a', 'b']);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.drain_due(10.0), vec!['c']);
        assert!(timeline.is_empty());
    }

    #[test]
    fn cancelled_cues_never_fire() {
        let mut timeline = Timeline::default();
        timeline.schedule(1.5, "defeat text");
        assert_eq!(timeline.cancel_all(), 1);
        assert!(timeline.drain_due(100.0).is_empty());
    }
}
