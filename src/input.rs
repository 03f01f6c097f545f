use crate::prelude::*;

use crate::fixed_update_utils::did_fixed_timestep_run_this_frame;

pub(super) fn plugin(app: &mut App) {
    app.add_observer(apply_movement)
        .add_observer(apply_jump_pressed)
        .add_observer(apply_jump_released)
        .add_observer(apply_sprint_started)
        .add_observer(apply_sprint_stopped)
        .add_observer(apply_dash)
        .add_observer(apply_ground_slide)
        .add_observer(apply_fall_attack)
        .add_systems(
            RunFixedMainLoop,
            clear_accumulated_input
                .run_if(did_fixed_timestep_run_this_frame)
                .in_set(RunFixedMainLoopSystems::AfterFixedMainLoop),
        );
}

/// Horizontal movement. Only the `x` axis is read.
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct Movement;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Jump;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Sprint;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Dash;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct GroundSlide;

#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct FallAttack;

/// Everything the movement core reads from the player in one tick.
///
/// The booleans other than `sprint` are edges: they are `true` for exactly one tick.
#[derive(Clone, Copy, Reflect, Default, Debug, PartialEq)]
pub struct InputSnapshot {
    /// Horizontal axis in `[-1, 1]`.
    pub move_input: f32,
    pub jump_pressed: bool,
    pub jump_released: bool,
    pub sprint: bool,
    pub dash: bool,
    pub ground_slide: bool,
    pub fall_attack: bool,
}

impl InputSnapshot {
    /// Clamps the move axis into `[-1, 1]` and maps non-finite values to zero.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.move_input = if self.move_input.is_finite() {
            self.move_input.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Anything that can produce an [`InputSnapshot`] for the current tick.
pub trait InputSource {
    fn snapshot(&self) -> InputSnapshot;
}

impl InputSource for InputSnapshot {
    fn snapshot(&self) -> InputSnapshot {
        self.normalized()
    }
}

/// Input accumulated since the last fixed update loop. Edges are cleared after every fixed update loop.
#[derive(Component, Clone, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct AccumulatedInput {
    // The last move that was input since the last fixed update loop
    pub last_movement: Option<Vec2>,
    pub jump_pressed: bool,
    pub jump_released: bool,
    // Held state, survives the clear
    pub sprint: bool,
    pub dash: bool,
    pub ground_slide: bool,
    pub fall_attack: bool,
}

impl InputSource for AccumulatedInput {
    fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            move_input: self.last_movement.map_or(0.0, |movement| movement.x),
            jump_pressed: self.jump_pressed,
            jump_released: self.jump_released,
            sprint: self.sprint,
            dash: self.dash,
            ground_slide: self.ground_slide,
            fall_attack: self.fall_attack,
        }
        .normalized()
    }
}

impl AccumulatedInput {
    /// Marks the one-tick edges as processed, so a frame running several fixed steps sees them once.
    pub fn consume_edges(&mut self) {
        self.jump_pressed = false;
        self.jump_released = false;
        self.dash = false;
        self.ground_slide = false;
        self.fall_attack = false;
    }
}

fn apply_movement(
    movement: On<Fire<Movement>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(movement.context) {
        accumulated_inputs.last_movement = Some(movement.value);
    }
}

fn apply_jump_pressed(jump: On<Start<Jump>>, mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(jump.context) {
        accumulated_inputs.jump_pressed = true;
    }
}

fn apply_jump_released(
    jump: On<Complete<Jump>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(jump.context) {
        accumulated_inputs.jump_released = true;
    }
}

fn apply_sprint_started(
    sprint: On<Start<Sprint>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(sprint.context) {
        accumulated_inputs.sprint = true;
    }
}

fn apply_sprint_stopped(
    sprint: On<Complete<Sprint>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(sprint.context) {
        accumulated_inputs.sprint = false;
    }
}

fn apply_dash(dash: On<Start<Dash>>, mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(dash.context) {
        accumulated_inputs.dash = true;
    }
}

fn apply_ground_slide(
    slide: On<Start<GroundSlide>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(slide.context) {
        accumulated_inputs.ground_slide = true;
    }
}

fn apply_fall_attack(
    attack: On<Start<FallAttack>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(attack.context) {
        accumulated_inputs.fall_attack = true;
    }
}

fn clear_accumulated_input(mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    for mut accumulated_input in &mut accumulated_inputs {
        *accumulated_input = AccumulatedInput {
            sprint: accumulated_input.sprint,
            ..default()
        }
    }
}
