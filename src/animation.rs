//! What the controller tells animation and foot placement layers.
//!
//! The controller never waits on playback. It publishes a [`MotionSnapshot`] every tick
//! and fires one [`ActionEvent`] per started action; mapping those to animation clips
//! is up to the consumer.

use crate::prelude::*;

pub(super) fn plugin(app: &mut App) {
    app.add_message::<CharacterAction>();
}

/// Horizontal speed above which the character counts as moving for foot placement.
pub const MOVING_SPEED_THRESHOLD: f32 = 0.1;

/// One-shot action started during a tick.
#[derive(Clone, Copy, Reflect, Debug, PartialEq)]
pub enum ActionEvent {
    /// Ground, coyote or wall jump.
    Jump,
    DoubleJump,
    /// Started sliding down a wall.
    WallSlide,
    Dash,
    GroundSlide,
    FallAttack,
    /// Touched the ground after falling at least `min_fall_distance`.
    Land { fall_distance: f32 },
}

/// Receiver of [`ActionEvent`]s.
pub trait AnimationEventSink {
    fn emit(&mut self, event: ActionEvent);
}

impl AnimationEventSink for Vec<ActionEvent> {
    fn emit(&mut self, event: ActionEvent) {
        self.push(event);
    }
}

/// Sink that drops everything, for callers that only care about motion.
impl AnimationEventSink for () {
    fn emit(&mut self, _event: ActionEvent) {}
}

/// Written for every [`ActionEvent`] a character produces.
#[derive(Message, Clone, Copy, Debug, PartialEq)]
pub struct CharacterAction {
    pub entity: Entity,
    pub action: ActionEvent,
}

/// Animation facing state of a character, refreshed after every tick.
#[derive(Component, Clone, Copy, Reflect, Default, Debug, PartialEq)]
#[reflect(Component)]
pub struct MotionSnapshot {
    /// Horizontal speed divided by the walk speed.
    pub speed: f32,
    pub vertical_velocity: f32,
    pub grounded: bool,
    pub wall_sliding: bool,
    pub dashing: bool,
    pub ground_sliding: bool,
    pub fall_attacking: bool,
    pub is_snapping: bool,
    /// Gate for foot placement.
    pub is_moving: bool,
    pub fall_distance: f32,
    pub direction: f32,
    /// Yaw in degrees.
    pub rotation: f32,
}

impl MotionSnapshot {
    pub fn new(state: &CharacterControllerState, cfg: &CharacterController) -> Self {
        let horizontal_speed = state.velocity.z.abs();
        Self {
            speed: horizontal_speed / cfg.walk_speed.max(f32::EPSILON),
            vertical_velocity: state.velocity.y,
            grounded: state.contacts.grounded,
            wall_sliding: state.actions.wall_sliding,
            dashing: state.actions.dashing,
            ground_sliding: state.actions.ground_sliding,
            fall_attacking: state.actions.fall_attacking,
            is_snapping: state.is_snapping,
            is_moving: horizontal_speed > MOVING_SPEED_THRESHOLD,
            fall_distance: state.fall_distance,
            direction: state.direction,
            rotation: state.rotation,
        }
    }
}
