//! The per tick action rules.
//!
//! Rules run in a fixed priority order. An active fall attack, ground slide or dash ends the
//! tick early, skipping walking, wall sliding, jumping and gravity.

use core::ops::ControlFlow;

use tracing::debug;

use crate::{
    MIN_DURATION,
    animation::{ActionEvent, AnimationEventSink},
    collision::{self, Capsule, CollisionCapability, ProbeShape},
    input::InputSnapshot,
    prelude::*,
};

#[derive(Debug)]
pub struct MotionCtx<'a> {
    pub cfg: &'a CharacterController,
    pub input: InputSnapshot,
    pub dt: f32,
    /// Vertical gravity, negative when pulling down.
    pub gravity: f32,
    /// Position at the start of the tick.
    pub position: Vec3,
}

/// Runs the action rules for one tick, leaving the velocity to move with in `state.velocity`.
pub fn update_motion(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) {
    let _ = run_rules(state, world, events, ctx);
}

fn run_rules(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) -> ControlFlow<()> {
    handle_fall_attack(state, events, ctx)?;
    handle_ground_slide(state, world, events, ctx)?;
    handle_dash(state, events, ctx)?;

    check_wall_slide_snap(state, world, ctx);
    accelerate(state, ctx);
    handle_wall_slide(state, events, ctx);
    reset_on_contact(state, events, ctx);
    trigger_jump(state, events, ctx);
    tick_jump_timers(state, ctx);
    resolve_buffered_jump(state, events, ctx);
    cut_jump(state, ctx);
    apply_gravity(state, ctx);
    ControlFlow::Continue(())
}

/// Turns the character towards 0° or 180° depending on its facing.
pub fn update_rotation(state: &mut CharacterControllerState, cfg: &CharacterController, dt: f32) {
    let target = if state.direction < 0.0 { 180.0 } else { 0.0 };
    state.rotation =
        move_towards_angle(state.rotation, target, cfg.rotate_speed * dt).rem_euclid(360.0);
}

fn seconds(duration: core::time::Duration) -> f32 {
    duration.max(MIN_DURATION).as_secs_f32()
}

fn handle_fall_attack(
    state: &mut CharacterControllerState,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) -> ControlFlow<()> {
    let actions = state.actions;
    if ctx.input.fall_attack
        && !actions.fall_attacking
        && !actions.dashing
        && !actions.ground_sliding
        && !actions.wall_sliding
        && !state.contacts.grounded
    {
        state.actions.fall_attacking = true;
        state.velocity.y = 0.0;
        state.velocity.z = 0.0;
        events.emit(ActionEvent::FallAttack);
        debug!("fall attack started");
    }

    if !state.actions.fall_attacking {
        return ControlFlow::Continue(());
    }

    state.velocity.y = move_towards(
        state.velocity.y,
        -ctx.cfg.fall_attack_velocity,
        ctx.cfg.fall_attack_acceleration * ctx.dt,
    );
    if !state.contacts.grounded {
        return ControlFlow::Break(());
    }

    state.actions.fall_attacking = false;
    state.velocity.y = 0.0;
    debug!("fall attack landed");
    ControlFlow::Continue(())
}

fn handle_ground_slide(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) -> ControlFlow<()> {
    let cfg = ctx.cfg;
    let actions = state.actions;
    if ctx.input.ground_slide
        && !actions.ground_sliding
        && !actions.wall_sliding
        && !actions.dashing
        && !actions.fall_attacking
        && state.contacts.grounded
    {
        let speed_ratio = state.velocity.z.abs() / cfg.sprint_speed();
        let distance =
            cfg.ground_slide_distance * lerp(1.0, cfg.ground_slide_move_boost, speed_ratio);
        let alpha = collision::slide_distance_alpha(state, world, cfg, ctx.position, distance);
        if alpha > 0.0 {
            let slide_time = seconds(cfg.ground_slide_time);
            state.actions.ground_sliding = true;
            state.velocity.z = distance / slide_time * state.direction * alpha;
            state.timers.ground_slide = slide_time;
            events.emit(ActionEvent::GroundSlide);
            debug!(distance, alpha, "ground slide started");
        }
    }

    if !state.actions.ground_sliding {
        return ControlFlow::Continue(());
    }

    // Checked before counting down, so the slide moves for exactly its duration.
    if state.timers.ground_slide > 0.0 {
        state.timers.ground_slide -= ctx.dt;
        return ControlFlow::Break(());
    }

    state.velocity.z = 0.0;
    state.actions.ground_sliding = false;
    ControlFlow::Continue(())
}

fn handle_dash(
    state: &mut CharacterControllerState,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) -> ControlFlow<()> {
    let cfg = ctx.cfg;
    let move_input = ctx.input.move_input;
    let wall_sliding_away = state.actions.wall_sliding && sign(move_input) != state.direction;
    if ctx.input.dash
        && !state.actions.dashing
        && !state.actions.ground_sliding
        && !state.actions.fall_attacking
        && (!state.contacts.hanging_wall || wall_sliding_away)
    {
        if move_input != 0.0 {
            state.direction = sign(move_input);
        }
        let dash_time = seconds(cfg.dash_time);
        state.actions.dashing = true;
        state.velocity.z = cfg.dash_distance / dash_time * state.direction;
        state.velocity.y = 0.0;
        state.timers.dash = dash_time;
        state.actions.wall_sliding = false;
        state.actions.double_jumping = false;
        state.contacts.hanging_wall = false;
        state.rotation = if state.direction < 0.0 { 180.0 } else { 0.0 };
        state.can_double_jump = false;
        state.fall_distance = 0.0;
        events.emit(ActionEvent::Dash);
        debug!(direction = state.direction, "dash started");
    }

    if !state.actions.dashing {
        return ControlFlow::Continue(());
    }

    if state.timers.dash > 0.0 && !state.contacts.hanging_wall {
        state.timers.dash -= ctx.dt;
        return ControlFlow::Break(());
    }

    state.velocity.z = 0.0;
    state.actions.dashing = false;
    ControlFlow::Continue(())
}

/// Whether a wall lies within snapping reach in front of the character. Only a hint for consumers.
fn check_wall_slide_snap(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    ctx: &MotionCtx,
) {
    let cfg = ctx.cfg;
    state.is_snapping = state.velocity.z != 0.0
        && !state.contacts.grounded
        && !state.actions.wall_sliding
        && world.check_overlap(
            &ProbeShape::Capsule(Capsule {
                top: collision::wall_probe(ctx.position, cfg, state.direction, 0.0),
                bottom: collision::wall_probe(
                    ctx.position,
                    cfg,
                    state.direction,
                    cfg.wall_sliding_snap_distance,
                ),
                radius: cfg.wall_check_radius,
            }),
            cfg.collision_mask,
        );
}

fn accelerate(state: &mut CharacterControllerState, ctx: &MotionCtx) {
    let cfg = ctx.cfg;
    let move_input = ctx.input.move_input;
    let velocity = &mut state.velocity;

    // Turning around in the air drops the old momentum instead of braking against it.
    if velocity.y != 0.0
        && ((move_input > 0.0 && velocity.z < 0.0) || (move_input < 0.0 && velocity.z > 0.0))
    {
        velocity.z = 0.0;
    }

    let max_speed = cfg.walk_speed * if ctx.input.sprint { cfg.sprint_modifier } else { 1.0 };
    let acceleration = if state.contacts.grounded {
        cfg.ground_acceleration
    } else {
        cfg.air_acceleration
    };
    velocity.z = move_towards(velocity.z, move_input * max_speed, acceleration * ctx.dt);
}

fn handle_wall_slide(
    state: &mut CharacterControllerState,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) {
    let cfg = ctx.cfg;
    let move_input = ctx.input.move_input;
    if !(state.contacts.hanging_wall && !state.contacts.grounded && move_input != 0.0) {
        state.actions.wall_sliding = false;
        return;
    }

    if !state.actions.wall_sliding {
        events.emit(ActionEvent::WallSlide);
        debug!(hanging_direction = state.hanging_direction, "wall slide started");
    }
    state.actions.wall_sliding = true;
    state.actions.double_jumping = false;
    state.can_double_jump = false;
    state.is_snapping = false;
    state.fall_distance = 0.0;
    state.velocity.y = state.velocity.y.max(-cfg.wall_sliding_max_falling_speed);

    if state.timers.wall_stick > 0.0 {
        state.velocity.z = 0.0;
        if sign(move_input) == state.hanging_direction {
            state.timers.wall_stick = cfg.wall_stick_time.as_secs_f32();
        } else {
            state.timers.wall_stick -= ctx.dt;
        }
    } else {
        state.timers.wall_stick = cfg.wall_stick_time.as_secs_f32();
    }
}

fn reset_on_contact(
    state: &mut CharacterControllerState,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) {
    if !(state.contacts.ceiling || state.contacts.grounded) {
        return;
    }
    if state.contacts.grounded && state.fall_distance >= ctx.cfg.min_fall_distance {
        events.emit(ActionEvent::Land {
            fall_distance: state.fall_distance,
        });
    }
    state.velocity.y = 0.0;
    state.actions.double_jumping = false;
    state.can_double_jump = false;
    state.fall_distance = 0.0;
}

fn trigger_jump(
    state: &mut CharacterControllerState,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) {
    if !ctx.input.jump_pressed {
        return;
    }
    if ctx.cfg.double_jump_enabled
        && state.can_double_jump
        && !state.actions.double_jumping
        && !state.actions.wall_sliding
    {
        state.actions.double_jumping = true;
        apply_jump(state, ctx);
        events.emit(ActionEvent::DoubleJump);
        debug!(velocity = state.velocity.y, "double jump");
    } else {
        state.timers.jump_buffer = ctx.cfg.jump_input_buffer.as_secs_f32();
    }
    state.can_double_jump = false;
}

fn tick_jump_timers(state: &mut CharacterControllerState, ctx: &MotionCtx) {
    if state.contacts.grounded {
        state.timers.coyote = ctx.cfg.coyote_time.as_secs_f32();
    } else {
        state.timers.coyote -= ctx.dt;
        state.timers.jump_buffer -= ctx.dt;
    }
}

fn resolve_buffered_jump(
    state: &mut CharacterControllerState,
    events: &mut impl AnimationEventSink,
    ctx: &MotionCtx,
) {
    if !(state.timers.jump_buffer > 0.0) || state.actions.double_jumping {
        return;
    }
    if state.actions.wall_sliding {
        apply_wall_jump(state, ctx);
    } else if state.timers.coyote > 0.0 {
        apply_jump(state, ctx);
    } else {
        return;
    }
    state.can_double_jump = true;
    events.emit(ActionEvent::Jump);
}

/// Height of a jump, raised or lowered by the current horizontal speed.
///
/// The speed ratio uses `|v.z|`, so running towards `-Z` boosts the same as towards `+Z`.
pub fn boosted_jump_height(state: &CharacterControllerState, cfg: &CharacterController) -> f32 {
    let speed_ratio = state.velocity.z.abs() / cfg.sprint_speed();
    cfg.jump_height * lerp(speed_ratio, 1.0, cfg.speed_jump_boost)
}

fn apply_jump(state: &mut CharacterControllerState, ctx: &MotionCtx) {
    let height = boosted_jump_height(state, ctx.cfg);
    state.velocity.y = (-2.0 * ctx.gravity * height).max(0.0).sqrt();
    state.timers.jump_buffer = 0.0;
    state.timers.coyote = 0.0;
}

/// Jumps off the wall being slid on. Pushing towards the wall climbs it, pushing away leaps,
/// and an input inside the deadzone pushes off.
fn apply_wall_jump(state: &mut CharacterControllerState, ctx: &MotionCtx) {
    let cfg = ctx.cfg;
    let move_input = ctx.input.move_input;
    let away = -state.hanging_direction;
    let (launch, turn, kind) = if move_input.abs() < cfg.wall_jump_deadzone {
        (cfg.wall_jump_off, true, "push off")
    } else if sign(move_input) == state.hanging_direction {
        (cfg.wall_climb, false, "climb")
    } else {
        (cfg.wall_leap, true, "leap")
    };

    state.velocity.z = launch.z * away;
    state.velocity.y = launch.y;
    if turn {
        state.direction = away;
    }
    state.timers.jump_buffer = 0.0;
    state.timers.coyote = 0.0;
    debug!(kind, "wall jump");
}

fn cut_jump(state: &mut CharacterControllerState, ctx: &MotionCtx) {
    if state.velocity.y > 0.0 && ctx.input.jump_released {
        state.velocity.y *= ctx.cfg.early_jump_modifier;
    }
}

fn apply_gravity(state: &mut CharacterControllerState, ctx: &MotionCtx) {
    let cfg = ctx.cfg;
    let velocity = &mut state.velocity;
    let modifier = if velocity.y < 0.0 {
        cfg.fall_gravity_modifier
    } else if velocity.y > 0.0 {
        cfg.jump_gravity_modifier
    } else {
        1.0
    };
    velocity.y += ctx.gravity * modifier * ctx.dt;
    // The config may have been changed after it was sanitized.
    let limit = cfg.clamp_vertical_velocity.abs();
    let limit = if limit.is_nan() { 0.0 } else { limit };
    velocity.y = velocity.y.clamp(-limit, limit);
}

/// `1.0`, `-1.0` or `0.0`.
fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Linear interpolation with `t` clamped to `[0, 1]`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Moves `current` towards `target` by at most `max_delta`, never overshooting.
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Shortest signed difference from `current` to `target` in degrees, in `(-180, 180]`.
pub fn delta_angle(current: f32, target: f32) -> f32 {
    let delta = (target - current).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// Like [`move_towards`], but for angles in degrees that wrap around 360.
pub fn move_towards_angle(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = delta_angle(current, target);
    if -max_delta < delta && delta < max_delta {
        return target;
    }
    move_towards(current, current + delta, max_delta)
}
