#![doc = include_str!("../readme.md")]

/// Everything you need to get started with `bevy_ledge`
pub mod prelude {
    pub(crate) use {
        avian3d::prelude::*,
        bevy_app::prelude::*,
        bevy_derive::{Deref, DerefMut},
        bevy_ecs::prelude::*,
        bevy_enhanced_input::prelude::*,
        bevy_math::prelude::*,
        bevy_reflect::prelude::*,
        bevy_time::prelude::*,
        bevy_transform::prelude::*,
        bevy_utils::prelude::*,
    };

    pub use crate::{
        ActionFlags, BodyDimensions, CharacterController, CharacterControllerState, ContactFlags,
        LedgePlugin, LedgeSystems, MovementTimers,
        animation::{ActionEvent, AnimationEventSink, CharacterAction, MotionSnapshot},
        collision::{CastHit, CollisionCapability, CollisionMask, ShapeGeometry},
        input::{Dash, FallAttack, GroundSlide, InputSnapshot, InputSource, Jump, Movement, Sprint},
        kcc::{TickContext, step_character},
    };
}

use crate::{animation::MotionSnapshot, input::AccumulatedInput, prelude::*};
use bevy_ecs::{intern::Interned, lifecycle::HookContext, schedule::ScheduleLabel, world::DeferredWorld};
use core::time::Duration;
use tracing::warn;

pub mod animation;
pub mod collision;
mod fixed_update_utils;
pub mod input;
pub mod kcc;
pub mod motion;
#[cfg(test)]
mod test_world;

/// Shortest duration accepted for dash, ground slide and the other timed windows.
pub const MIN_DURATION: Duration = Duration::from_millis(1);
/// Smallest skin width kept by [`CharacterController::sanitized`].
pub const MIN_SKIN_WIDTH: f32 = 1.0e-3;
/// Smallest body and wall probe radius.
pub const MIN_RADIUS: f32 = 1.0e-2;

/// Also requires you to add [`PhysicsPlugins`] and [`EnhancedInputPlugin`] to work properly.
pub struct LedgePlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl LedgePlugin {
    /// Create a new plugin in the given schedule. The default is [`FixedPostUpdate`].
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for LedgePlugin {
    fn default() -> Self {
        Self {
            schedule: FixedPostUpdate.intern(),
        }
    }
}

impl Plugin for LedgePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            self.schedule,
            LedgeSystems::MoveCharacters.in_set(PhysicsSystems::First),
        )
        .add_plugins((
            animation::plugin,
            input::plugin,
            kcc::plugin(self.schedule),
            fixed_update_utils::plugin,
        ));
    }
}

/// System set used by all systems of `bevy_ledge`.
#[derive(SystemSet, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum LedgeSystems {
    MoveCharacters,
}

/// Tuning of a platformer character. The character moves in the YZ plane:
/// `+Z` is facing direction `1`, `+Y` is up.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(
    AccumulatedInput,
    CharacterControllerState,
    MotionSnapshot,
    TranslationInterpolation,
    RigidBody = RigidBody::Kinematic,
    Collider = Collider::capsule(0.5, 1.0),
    CustomPositionIntegration,
    Transform,
    SpeculativeMargin::ZERO,
)]
#[component(on_add = CharacterController::on_add)]
pub struct CharacterController {
    // movement
    pub walk_speed: f32,
    pub ground_acceleration: f32,
    pub air_acceleration: f32,
    /// Degrees per second.
    pub rotate_speed: f32,
    pub sprint_modifier: f32,

    // jump
    pub jump_height: f32,
    pub speed_jump_boost: f32,
    pub jump_input_buffer: Duration,
    pub coyote_time: Duration,
    pub early_jump_modifier: f32,
    pub fall_gravity_modifier: f32,
    pub jump_gravity_modifier: f32,
    pub clamp_vertical_velocity: f32,
    pub double_jump_enabled: bool,

    // wall sliding
    /// Offset of the wall probe sphere. `z` is mirrored by the facing direction.
    pub wall_check_offset: Vec3,
    pub wall_check_radius: f32,
    /// Wall jump velocities. `z` points away from the wall, `y` up.
    pub wall_climb: Vec3,
    pub wall_jump_off: Vec3,
    pub wall_leap: Vec3,
    /// Inputs with a smaller magnitude count as "no input" when picking the wall jump.
    pub wall_jump_deadzone: f32,
    pub wall_sliding_max_falling_speed: f32,
    pub wall_stick_time: Duration,
    pub wall_sliding_snap_distance: f32,

    // dash
    pub dash_distance: f32,
    pub dash_time: Duration,

    // ground slide
    pub ground_slide_distance: f32,
    pub ground_slide_move_boost: f32,
    pub ground_slide_time: Duration,
    pub ground_slide_collider_height: f32,

    // fall attack
    pub fall_attack_velocity: f32,
    pub fall_attack_acceleration: f32,

    // collision
    /// Landings from at least this height emit [`ActionEvent::Land`].
    pub min_fall_distance: f32,
    pub skin_width: f32,
    pub collision_mask: CollisionMask,
}

impl Default for CharacterController {
    fn default() -> Self {
        Self {
            walk_speed: 3.0,
            ground_acceleration: 10.0,
            air_acceleration: 7.0,
            rotate_speed: 720.0,
            sprint_modifier: 2.0,
            jump_height: 3.0,
            speed_jump_boost: 1.7,
            jump_input_buffer: Duration::from_millis(500),
            coyote_time: Duration::from_millis(200),
            early_jump_modifier: 0.5,
            fall_gravity_modifier: 1.5,
            jump_gravity_modifier: 1.0,
            clamp_vertical_velocity: 10.0,
            double_jump_enabled: true,
            wall_check_offset: vec3(0.0, 1.0, 0.6),
            wall_check_radius: 0.1,
            wall_climb: vec3(0.0, 7.0, 1.0),
            wall_jump_off: vec3(0.0, 3.0, 4.0),
            wall_leap: vec3(0.0, 6.0, 5.0),
            wall_jump_deadzone: 0.2,
            wall_sliding_max_falling_speed: 3.0,
            wall_stick_time: Duration::from_millis(300),
            wall_sliding_snap_distance: 1.0,
            dash_distance: 5.0,
            dash_time: Duration::from_millis(500),
            ground_slide_distance: 3.0,
            ground_slide_move_boost: 1.3,
            ground_slide_time: Duration::from_millis(500),
            ground_slide_collider_height: 0.75,
            fall_attack_velocity: 20.0,
            fall_attack_acceleration: 50.0,
            min_fall_distance: 0.5,
            skin_width: 0.05,
            collision_mask: CollisionMask::ALL,
        }
    }
}

impl CharacterController {
    pub fn on_add(mut world: DeferredWorld, ctx: HookContext) {
        {
            let Some(mut kcc) = world.get_mut::<Self>(ctx.entity) else {
                return;
            };
            let sanitized = kcc.sanitized();
            *kcc = sanitized;
        }

        let Some(collider) = world.entity(ctx.entity).get::<Collider>().cloned() else {
            return;
        };
        let body = BodyDimensions::from_collider(&collider);

        let Some(mut state) = world.get_mut::<CharacterControllerState>(ctx.entity) else {
            return;
        };
        state.body = body;
    }

    /// Returns a copy that is safe to simulate: timed windows are at least [`MIN_DURATION`],
    /// probe and skin sizes are positive and the vertical clamp is non-negative.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut cfg = self.clone();
        for (name, duration) in [
            ("dash_time", &mut cfg.dash_time),
            ("ground_slide_time", &mut cfg.ground_slide_time),
        ] {
            if *duration < MIN_DURATION {
                warn!("{name} is {duration:?}, clamping to {MIN_DURATION:?}");
                *duration = MIN_DURATION;
            }
        }
        for (name, value, min) in [
            ("skin_width", &mut cfg.skin_width, MIN_SKIN_WIDTH),
            ("wall_check_radius", &mut cfg.wall_check_radius, MIN_RADIUS),
        ] {
            if !(*value >= min) {
                warn!("{name} is {value}, clamping to {min}");
                *value = min;
            }
        }
        if !(cfg.clamp_vertical_velocity >= 0.0) {
            warn!(
                "clamp_vertical_velocity is {}, using its magnitude",
                cfg.clamp_vertical_velocity
            );
            cfg.clamp_vertical_velocity = cfg.clamp_vertical_velocity.abs();
            if cfg.clamp_vertical_velocity.is_nan() {
                cfg.clamp_vertical_velocity = 0.0;
            }
        }
        cfg
    }

    /// Top horizontal speed, used to normalize speed dependent boosts.
    pub(crate) fn sprint_speed(&self) -> f32 {
        (self.walk_speed * self.sprint_modifier).max(f32::EPSILON)
    }
}

/// Size of the character's capsule, relative to its origin.
#[derive(Clone, Copy, Reflect, Debug, PartialEq)]
pub struct BodyDimensions {
    pub height: f32,
    pub radius: f32,
    pub center: Vec3,
}

impl Default for BodyDimensions {
    fn default() -> Self {
        Self {
            height: 2.0,
            radius: 0.5,
            center: Vec3::ZERO,
        }
    }
}

impl BodyDimensions {
    pub fn from_collider(collider: &Collider) -> Self {
        let aabb = collider.aabb(Vec3::ZERO, Rotation::default());
        let size = aabb.max - aabb.min;
        Self {
            height: size.y,
            radius: 0.5 * size.x.min(size.z),
            center: (aabb.min + aabb.max) * 0.5,
        }
        .sanitized()
    }

    #[must_use]
    pub fn sanitized(self) -> Self {
        if self.radius >= MIN_RADIUS && self.height >= 2.0 * self.radius {
            return self;
        }
        warn!(
            "degenerate character body (height {}, radius {}), clamping",
            self.height, self.radius
        );
        let radius = if self.radius >= MIN_RADIUS {
            self.radius
        } else {
            MIN_RADIUS
        };
        Self {
            radius,
            height: self.height.max(2.0 * radius),
            center: self.center,
        }
    }
}

/// Contacts reported by the last collision resolution.
#[derive(Clone, Copy, Reflect, Debug, PartialEq, Eq)]
pub struct ContactFlags {
    pub grounded: bool,
    pub ceiling: bool,
    pub hanging_wall: bool,
}

impl Default for ContactFlags {
    fn default() -> Self {
        Self {
            grounded: true,
            ceiling: false,
            hanging_wall: false,
        }
    }
}

/// Actions in progress. Dashing, ground sliding and fall attacking exclude each other.
#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq, Eq)]
pub struct ActionFlags {
    pub wall_sliding: bool,
    pub double_jumping: bool,
    pub dashing: bool,
    pub ground_sliding: bool,
    pub fall_attacking: bool,
}

impl ActionFlags {
    /// Number of active actions among dash, ground slide and fall attack. Never above one.
    pub fn exclusive_actions(&self) -> usize {
        [self.dashing, self.ground_sliding, self.fall_attacking]
            .into_iter()
            .filter(|active| *active)
            .count()
    }
}

/// Countdowns in seconds. Only ever advanced by the tick's `dt`.
#[derive(Clone, Copy, Reflect, Debug, Default, PartialEq)]
pub struct MovementTimers {
    pub coyote: f32,
    pub jump_buffer: f32,
    pub wall_stick: f32,
    pub dash: f32,
    pub ground_slide: f32,
}

#[derive(Component, Clone, Reflect, Debug, PartialEq)]
#[reflect(Component)]
pub struct CharacterControllerState {
    /// Units per second. Only `y` and `z` are used.
    pub velocity: Vec3,
    /// Facing, either `1.0` (+Z) or `-1.0`.
    pub direction: f32,
    /// Yaw in degrees, turning between 0 and 180.
    pub rotation: f32,
    pub contacts: ContactFlags,
    pub actions: ActionFlags,
    pub timers: MovementTimers,
    pub fall_distance: f32,
    pub can_double_jump: bool,
    /// Side of the wall last touched by the wall probe.
    pub hanging_direction: f32,
    pub is_snapping: bool,
    pub body: BodyDimensions,
}

impl Default for CharacterControllerState {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            direction: 1.0,
            rotation: 0.0,
            contacts: ContactFlags::default(),
            actions: ActionFlags::default(),
            timers: MovementTimers::default(),
            fall_distance: 0.0,
            can_double_jump: false,
            hanging_direction: 1.0,
            is_snapping: false,
            body: BodyDimensions::default(),
        }
    }
}

impl CharacterControllerState {
    pub fn new(body: BodyDimensions) -> Self {
        Self {
            body: body.sanitized(),
            ..default()
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.contacts.grounded
    }
}
