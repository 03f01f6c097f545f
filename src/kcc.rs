use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use tracing::{trace, warn};

use crate::{
    animation::{AnimationEventSink, CharacterAction, MotionSnapshot},
    collision::{self, Capsule, CapsuleCast, CollisionCapability, ProbeShape},
    input::{AccumulatedInput, InputSource},
    motion::{self, MotionCtx},
    prelude::*,
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(schedule, run_controllers.in_set(LedgeSystems::MoveCharacters));
    }
}

/// Per tick parameters that would otherwise be global.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickContext {
    /// Seconds since the last tick.
    pub dt: f32,
    /// Vertical component of gravity, negative when pulling down.
    pub gravity: f32,
}

impl Default for TickContext {
    fn default() -> Self {
        Self {
            dt: 1.0 / 64.0,
            gravity: -9.81,
        }
    }
}

/// Advances one character by one tick: action rules, facing, then the collision corrected move.
///
/// Returns the displacement that was added to `position`.
pub fn step_character(
    cfg: &CharacterController,
    state: &mut CharacterControllerState,
    position: &mut Vec3,
    input: &impl InputSource,
    world: &impl CollisionCapability,
    events: &mut impl AnimationEventSink,
    tick: TickContext,
) -> Vec3 {
    let dt = if tick.dt.is_finite() && tick.dt > 0.0 {
        tick.dt
    } else {
        0.0
    };
    let ctx = MotionCtx {
        cfg,
        input: input.snapshot(),
        dt,
        gravity: tick.gravity,
        position: *position,
    };

    motion::update_motion(state, world, events, &ctx);
    validate_velocity(&mut state.velocity);
    motion::update_rotation(state, cfg, dt);

    let displacement = collision::resolve_move(state, world, cfg, *position, state.velocity * dt);
    *position += displacement;
    displacement
}

fn validate_velocity(velocity: &mut Vec3) {
    for i in 0..3 {
        if !velocity[i].is_finite() {
            warn!("velocity[{i}] is not finite: {}, setting to 0", velocity[i]);
            velocity[i] = 0.0;
        }
    }
    velocity.x = 0.0;
}

/// [`CollisionCapability`] backed by avian's spatial queries, ignoring the character's own collider.
pub struct SpatialQueryWorld<'a> {
    pipeline: &'a SpatialQueryPipeline,
    character: Entity,
}

impl<'a> SpatialQueryWorld<'a> {
    pub fn new(pipeline: &'a SpatialQueryPipeline, character: Entity) -> Self {
        Self {
            pipeline,
            character,
        }
    }

    fn filter(&self, mask: CollisionMask) -> SpatialQueryFilter {
        SpatialQueryFilter::from_mask(LayerMask(mask.0)).with_excluded_entities([self.character])
    }
}

fn capsule_collider(capsule: &Capsule) -> (Collider, Vec3) {
    let origin = capsule.center();
    (
        Collider::capsule_endpoints(capsule.radius, capsule.top - origin, capsule.bottom - origin),
        origin,
    )
}

impl CollisionCapability for SpatialQueryWorld<'_> {
    fn capsule_cast(&self, cast: &CapsuleCast) -> Option<CastHit> {
        let (shape, origin) = capsule_collider(&cast.capsule);
        let hit = self.pipeline.cast_shape(
            &shape,
            origin,
            Quat::IDENTITY,
            cast.direction,
            &ShapeCastConfig {
                // Touching contacts at the start must not stop the move.
                ignore_origin_penetration: true,
                ..ShapeCastConfig::from_max_distance(cast.max_distance)
            },
            &self.filter(cast.mask),
        )?;
        Some(CastHit {
            distance: hit.distance,
            point: hit.point1,
            normal: hit.normal1,
        })
    }

    fn check_overlap(&self, shape: &ProbeShape, mask: CollisionMask) -> bool {
        let (collider, origin) = match *shape {
            ProbeShape::Capsule(capsule) => capsule_collider(&capsule),
            ProbeShape::Sphere { center, radius } => (Collider::sphere(radius), center),
        };
        let mut intersecting = false;
        self.pipeline.shape_intersections_callback(
            &collider,
            origin,
            Quat::IDENTITY,
            &self.filter(mask),
            |_| {
                intersecting = true;
                false
            },
        );
        intersecting
    }
}

fn run_controllers(
    mut kccs: Query<(
        Entity,
        &CharacterController,
        &mut CharacterControllerState,
        &mut AccumulatedInput,
        &mut Transform,
        &mut MotionSnapshot,
    )>,
    pipeline: Res<SpatialQueryPipeline>,
    gravity: Res<Gravity>,
    time: Res<Time>,
    mut actions: MessageWriter<CharacterAction>,
) {
    let tick = TickContext {
        dt: time.delta_secs(),
        gravity: gravity.0.y,
    };
    let mut events = Vec::new();
    for (entity, cfg, mut state, mut input, mut transform, mut snapshot) in &mut kccs {
        let world = SpatialQueryWorld::new(&pipeline, entity);
        let mut position = transform.translation;
        let displacement = step_character(
            cfg,
            &mut *state,
            &mut position,
            &*input,
            &world,
            &mut events,
            tick,
        );
        input.consume_edges();

        transform.translation = position;
        transform.rotation = Quat::from_rotation_y(state.rotation.to_radians());
        *snapshot = MotionSnapshot::new(&state, cfg);
        trace!(?entity, ?displacement, "moved character");

        actions.write_batch(
            events
                .drain(..)
                .map(|action| CharacterAction { entity, action }),
        );
    }
}
