//! Axis separated collision resolution against a static world.
//!
//! The world is reached only through [`CollisionCapability`], so the resolver runs the same
//! against avian's spatial queries and against a hand built test world.

use crate::prelude::*;
use tracing::trace;

/// Displacement components smaller than this are reported as exactly zero.
pub const ZERO_SNAP: f32 = 1.0e-4;

/// Bitmask of the collision layers a query considers.
#[derive(Clone, Copy, Reflect, Debug, PartialEq, Eq, Hash)]
pub struct CollisionMask(pub u32);

impl CollisionMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    pub fn intersects(self, layers: u32) -> bool {
        self.0 & layers != 0
    }
}

impl Default for CollisionMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Capsule spanned between the centers of its two end spheres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capsule {
    pub top: Vec3,
    pub bottom: Vec3,
    pub radius: f32,
}

impl Capsule {
    #[must_use]
    pub fn translated(self, offset: Vec3) -> Self {
        Self {
            top: self.top + offset,
            bottom: self.bottom + offset,
            radius: self.radius,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.top + self.bottom) * 0.5
    }
}

/// Shapes accepted by [`CollisionCapability::check_overlap`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProbeShape {
    Capsule(Capsule),
    Sphere { center: Vec3, radius: f32 },
}

/// A capsule swept along `direction` for at most `max_distance`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapsuleCast {
    pub capsule: Capsule,
    pub direction: Dir3,
    pub max_distance: f32,
    pub mask: CollisionMask,
}

/// First contact of a [`CapsuleCast`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastHit {
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Read-only queries against the static environment.
///
/// Implementations must be free of side effects; the resolver calls them several times per tick.
/// Shapes already overlapping the world at the start of a cast are ignored by the cast.
pub trait CollisionCapability {
    fn capsule_cast(&self, cast: &CapsuleCast) -> Option<CastHit>;

    fn check_overlap(&self, shape: &ProbeShape, mask: CollisionMask) -> bool;
}

impl<T: CollisionCapability + ?Sized> CollisionCapability for &T {
    fn capsule_cast(&self, cast: &CapsuleCast) -> Option<CastHit> {
        (**self).capsule_cast(cast)
    }

    fn check_overlap(&self, shape: &ProbeShape, mask: CollisionMask) -> bool {
        (**self).check_overlap(shape, mask)
    }
}

/// Cast capsules of a character at one position, in the standing and the ground sliding profile.
///
/// The end spheres are pushed `2 * skin_width` outwards along the vertical axis.
/// The radius is the body radius; the skin only acts along the cast.
/// A sliding height below the body's diameter collapses the crouched capsule into a sphere at
/// the bottom instead of turning it upside down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeGeometry {
    pub top: Vec3,
    pub top_sliding: Vec3,
    pub bottom: Vec3,
    pub radius: f32,
}

impl ShapeGeometry {
    pub fn new(position: Vec3, body: &BodyDimensions, cfg: &CharacterController) -> Self {
        let center = position + body.center;
        let half_segment = body.height * 0.5 - body.radius + 2.0 * cfg.skin_width;
        let crouch_drop = body.height - cfg.ground_slide_collider_height;
        let sliding_half_segment = (half_segment - crouch_drop).max(-half_segment);
        Self {
            top: center + Vec3::Y * half_segment,
            top_sliding: center + Vec3::Y * sliding_half_segment,
            bottom: center - Vec3::Y * half_segment,
            radius: body.radius,
        }
    }

    pub fn standing(&self) -> Capsule {
        Capsule {
            top: self.top,
            bottom: self.bottom,
            radius: self.radius,
        }
    }

    pub fn crouched(&self) -> Capsule {
        Capsule {
            top: self.top_sliding,
            bottom: self.bottom,
            radius: self.radius,
        }
    }

    pub fn profile(&self, ground_sliding: bool) -> Capsule {
        if ground_sliding {
            self.crouched()
        } else {
            self.standing()
        }
    }
}

pub(crate) fn facing(direction: f32) -> Dir3 {
    if direction < 0.0 { Dir3::NEG_Z } else { Dir3::Z }
}

/// Center of the wall probe sphere, mirrored to the facing side.
pub(crate) fn wall_probe(position: Vec3, cfg: &CharacterController, direction: f32, extra: f32) -> Vec3 {
    let offset = cfg.wall_check_offset;
    position + vec3(offset.x, offset.y, (offset.z + extra) * direction)
}

/// Turns a desired displacement into one that does not pass through the world.
///
/// Refreshes facing from the displacement, then the grounded, ceiling and wall contacts in
/// `state.contacts`. Returns the corrected displacement.
pub fn resolve_move(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    cfg: &CharacterController,
    position: Vec3,
    displacement: Vec3,
) -> Vec3 {
    let mut displacement = displacement;
    if displacement.z > 0.0 {
        state.direction = 1.0;
    } else if displacement.z < 0.0 {
        state.direction = -1.0;
    }

    state.contacts = ContactFlags {
        grounded: false,
        ceiling: false,
        hanging_wall: false,
    };

    let geometry = ShapeGeometry::new(position, &state.body, cfg);
    resolve_horizontal(state, world, cfg, position, &geometry, &mut displacement);
    if displacement.y != 0.0 {
        resolve_vertical(state, world, cfg, &geometry, &mut displacement);
    }

    for component in [&mut displacement.y, &mut displacement.z] {
        if component.abs() < ZERO_SNAP {
            *component = 0.0;
        }
    }
    trace!(
        ?displacement,
        contacts = ?state.contacts,
        "resolved character move"
    );
    displacement
}

fn resolve_horizontal(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    cfg: &CharacterController,
    position: Vec3,
    geometry: &ShapeGeometry,
    displacement: &mut Vec3,
) {
    if state.actions.ground_sliding {
        return;
    }

    let direction = state.direction;
    let skin = cfg.skin_width;
    let travel = displacement.z.abs();
    // Still probe a little when idle so walls right next to us are seen.
    let distance = if travel < skin { 2.0 * skin } else { travel + skin };

    if let Some(hit) = world.capsule_cast(&CapsuleCast {
        capsule: geometry.standing(),
        direction: facing(direction),
        max_distance: distance,
        mask: cfg.collision_mask,
    }) {
        let allowed = hit.distance - skin;
        displacement.z = allowed.min(travel) * direction;
    }

    let probe = ProbeShape::Sphere {
        center: wall_probe(position, cfg, direction, 0.0),
        radius: cfg.wall_check_radius,
    };
    if world.check_overlap(&probe, cfg.collision_mask) {
        state.contacts.hanging_wall = true;
        state.hanging_direction = direction;
    }
}

fn resolve_vertical(
    state: &mut CharacterControllerState,
    world: &impl CollisionCapability,
    cfg: &CharacterController,
    geometry: &ShapeGeometry,
    displacement: &mut Vec3,
) {
    let sign = displacement.y.signum();
    let travel = displacement.y.abs() + cfg.skin_width;
    let capsule = geometry
        .profile(state.actions.ground_sliding)
        .translated(Vec3::Z * displacement.z);

    let Some(hit) = world.capsule_cast(&CapsuleCast {
        capsule,
        direction: if sign > 0.0 { Dir3::Y } else { Dir3::NEG_Y },
        max_distance: f32::MAX,
        mask: cfg.collision_mask,
    }) else {
        return;
    };

    if hit.distance <= travel {
        displacement.y = (hit.distance - cfg.skin_width) * sign;
        state.contacts.grounded = sign < 0.0;
        state.contacts.ceiling = sign > 0.0;
    }

    if !state.contacts.grounded && displacement.y <= 0.0 {
        state.fall_distance = state.fall_distance.max(hit.distance);
    }
}

/// Fraction of a ground slide of `distance` the character can travel.
///
/// A slide blocked for the standing profile is still allowed in full when the crouched
/// profile clears the whole path and the character can stand up at its end.
pub fn slide_distance_alpha(
    state: &CharacterControllerState,
    world: &impl CollisionCapability,
    cfg: &CharacterController,
    position: Vec3,
    distance: f32,
) -> f32 {
    if !(distance > 0.0) {
        return 0.0;
    }

    let geometry = ShapeGeometry::new(position, &state.body, cfg);
    let direction = facing(state.direction);
    let max_distance = distance + cfg.skin_width;

    let Some(stand_hit) = world.capsule_cast(&CapsuleCast {
        capsule: geometry.standing(),
        direction,
        max_distance,
        mask: cfg.collision_mask,
    }) else {
        return 1.0;
    };
    let stand_alpha = (stand_hit.distance - cfg.skin_width) / distance;

    let crouch_blocked = world
        .capsule_cast(&CapsuleCast {
            capsule: geometry.crouched(),
            direction,
            max_distance,
            mask: cfg.collision_mask,
        })
        .is_some();
    if !crouch_blocked {
        let landing = geometry
            .standing()
            .translated(direction.as_vec3() * distance);
        if !world.check_overlap(&ProbeShape::Capsule(landing), cfg.collision_mask) {
            return 1.0;
        }
    }

    stand_alpha
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_world::{BoxWorld, REST_HEIGHT};

    const EPSILON: f32 = 1.0e-5;

    fn airborne_state() -> CharacterControllerState {
        CharacterControllerState {
            contacts: ContactFlags {
                grounded: false,
                ..default()
            },
            ..default()
        }
    }

    #[test]
    fn geometry_extends_endpoints_by_skin() {
        let cfg = CharacterController::default();
        let geometry = ShapeGeometry::new(Vec3::ZERO, &BodyDimensions::default(), &cfg);
        assert!((geometry.top.y - 0.6).abs() < EPSILON);
        assert!((geometry.bottom.y + 0.6).abs() < EPSILON);
        // 0.75 is below the diameter, the crouched capsule is a sphere at the bottom.
        assert_eq!(geometry.top_sliding, geometry.bottom);
        assert_eq!(geometry.radius, 0.5);

        let cfg = CharacterController {
            ground_slide_collider_height: 1.5,
            ..default()
        };
        let geometry = ShapeGeometry::new(Vec3::ZERO, &BodyDimensions::default(), &cfg);
        assert!((geometry.top_sliding.y - 0.1).abs() < EPSILON);
    }

    #[test]
    fn free_move_is_unchanged() {
        let cfg = CharacterController::default();
        let mut state = airborne_state();
        let displacement = vec3(0.0, -0.2, 0.3);
        let resolved = resolve_move(&mut state, &BoxWorld::new(), &cfg, Vec3::ZERO, displacement);
        assert_eq!(resolved, displacement);
        assert_eq!(
            state.contacts,
            ContactFlags {
                grounded: false,
                ceiling: false,
                hanging_wall: false
            }
        );
    }

    #[test]
    fn wall_clamps_horizontal_move() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new()
            .floor()
            .with_box(vec3(-10.0, 0.0, 1.0), vec3(10.0, 5.0, 2.0));
        let mut state = CharacterControllerState::default();
        let position = vec3(0.0, REST_HEIGHT, 0.0);
        let resolved = resolve_move(&mut state, &world, &cfg, position, vec3(0.0, 0.0, 0.7));
        assert!((resolved.z - 0.45).abs() < EPSILON);
    }

    #[test]
    fn idle_next_to_wall_does_not_creep() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new().with_box(vec3(-10.0, -5.0, 0.57), vec3(10.0, 5.0, 2.0));
        let mut state = airborne_state();
        let resolved = resolve_move(&mut state, &world, &cfg, Vec3::ZERO, Vec3::ZERO);
        assert_eq!(resolved, Vec3::ZERO);
        assert!(state.contacts.hanging_wall);
        assert_eq!(state.hanging_direction, 1.0);
    }

    #[test]
    fn empty_mask_ignores_the_world() {
        let cfg = CharacterController {
            collision_mask: CollisionMask::NONE,
            ..default()
        };
        let world = BoxWorld::new()
            .floor()
            .with_box(vec3(-10.0, 0.0, 1.0), vec3(10.0, 5.0, 2.0));
        let mut state = CharacterControllerState::default();
        let displacement = vec3(0.0, -0.5, 0.7);
        let resolved = resolve_move(&mut state, &world, &cfg, vec3(0.0, REST_HEIGHT, 0.0), displacement);
        assert_eq!(resolved, displacement);
        assert!(!state.contacts.grounded);
        assert!(!state.contacts.hanging_wall);
    }

    #[test]
    fn wall_probe_follows_facing() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new().with_box(vec3(-10.0, -5.0, -2.0), vec3(10.0, 5.0, -0.6));
        let mut state = airborne_state();

        resolve_move(&mut state, &world, &cfg, Vec3::ZERO, Vec3::ZERO);
        assert!(!state.contacts.hanging_wall);

        let resolved = resolve_move(&mut state, &world, &cfg, Vec3::ZERO, vec3(0.0, 0.0, -0.01));
        assert_eq!(state.direction, -1.0);
        assert!(state.contacts.hanging_wall);
        assert_eq!(state.hanging_direction, -1.0);
        assert!((resolved.z + 0.01).abs() < EPSILON);
    }

    #[test]
    fn landing_clamps_and_grounds() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new().floor();
        let mut state = airborne_state();
        let position = vec3(0.0, 1.5, 0.0);
        let resolved = resolve_move(&mut state, &world, &cfg, position, vec3(0.0, -0.5, 0.0));
        assert!((position.y + resolved.y - REST_HEIGHT).abs() < EPSILON);
        assert!(state.contacts.grounded);
        assert!(!state.contacts.ceiling);
    }

    #[test]
    fn ceiling_clamps_upward_move() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new().with_box(vec3(-10.0, 3.0, -10.0), vec3(10.0, 4.0, 10.0));
        let mut state = airborne_state();
        let position = vec3(0.0, REST_HEIGHT, 0.0);
        let resolved = resolve_move(&mut state, &world, &cfg, position, vec3(0.0, 1.0, 0.0));
        assert!((resolved.y - 0.7).abs() < EPSILON);
        assert!(state.contacts.ceiling);
        assert!(!state.contacts.grounded);
    }

    #[test]
    fn descending_tracks_fall_distance() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new().floor();
        let mut state = airborne_state();
        resolve_move(&mut state, &world, &cfg, vec3(0.0, 3.0, 0.0), vec3(0.0, -0.5, 0.0));
        assert!((state.fall_distance - 1.9).abs() < EPSILON);
        assert!(!state.contacts.grounded);

        resolve_move(&mut state, &world, &cfg, vec3(0.0, 2.5, 0.0), vec3(0.0, -0.5, 0.0));
        assert!((state.fall_distance - 1.9).abs() < EPSILON);
    }

    #[test]
    fn tiny_components_snap_to_zero() {
        let cfg = CharacterController::default();
        let mut state = airborne_state();
        let resolved = resolve_move(
            &mut state,
            &BoxWorld::new(),
            &cfg,
            Vec3::ZERO,
            vec3(0.0, 5.0e-5, -9.0e-5),
        );
        assert_eq!(resolved.y, 0.0);
        assert_eq!(resolved.z, 0.0);
        assert_eq!(state.direction, -1.0);
    }

    #[test]
    fn ground_slide_skips_horizontal_casts() {
        let cfg = CharacterController::default();
        let world = BoxWorld::new().with_box(vec3(-10.0, -5.0, 0.6), vec3(10.0, 5.0, 2.0));
        let mut state = CharacterControllerState {
            actions: ActionFlags {
                ground_sliding: true,
                ..default()
            },
            ..airborne_state()
        };
        let resolved = resolve_move(&mut state, &world, &cfg, Vec3::ZERO, vec3(0.0, 0.0, 0.5));
        assert_eq!(resolved.z, 0.5);
        assert!(!state.contacts.hanging_wall);
    }

    fn overhang(end_z: f32) -> BoxWorld {
        // Blocks the standing capsule after 1.5 units of travel, clears the crouched one.
        BoxWorld::new().with_box(vec3(-10.0, 0.0, 2.05), vec3(10.0, 3.0, end_z))
    }

    #[test]
    fn slide_alpha_without_obstruction_is_full() {
        let cfg = CharacterController::default();
        let state = CharacterControllerState::default();
        let alpha = slide_distance_alpha(&state, &BoxWorld::new(), &cfg, Vec3::ZERO, 3.0);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn slide_alpha_passes_under_overhang() {
        let cfg = CharacterController::default();
        let state = CharacterControllerState::default();
        let alpha = slide_distance_alpha(&state, &overhang(2.4), &cfg, Vec3::ZERO, 3.0);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn slide_alpha_stops_when_cannot_stand_up() {
        let cfg = CharacterController::default();
        let state = CharacterControllerState::default();
        let alpha = slide_distance_alpha(&state, &overhang(6.0), &cfg, Vec3::ZERO, 3.0);
        assert!((alpha - 0.5).abs() < EPSILON);
    }

    #[test]
    fn slide_alpha_stops_at_full_height_wall() {
        let cfg = CharacterController::default();
        let state = CharacterControllerState::default();
        let world = BoxWorld::new().with_box(vec3(-10.0, -5.0, 2.05), vec3(10.0, 5.0, 2.4));
        let alpha = slide_distance_alpha(&state, &world, &cfg, Vec3::ZERO, 3.0);
        assert!((alpha - 0.5).abs() < EPSILON);
    }

    #[test]
    fn slide_alpha_faces_backwards() {
        let cfg = CharacterController::default();
        let state = CharacterControllerState {
            direction: -1.0,
            ..default()
        };
        let world = BoxWorld::new().with_box(vec3(-10.0, -5.0, -2.4), vec3(10.0, 5.0, -2.05));
        let alpha = slide_distance_alpha(&state, &world, &cfg, Vec3::ZERO, 3.0);
        assert!((alpha - 0.5).abs() < EPSILON);
    }

    #[test]
    fn slide_alpha_of_zero_distance_is_zero() {
        let cfg = CharacterController::default();
        let state = CharacterControllerState::default();
        assert_eq!(
            slide_distance_alpha(&state, &BoxWorld::new(), &cfg, Vec3::ZERO, 0.0),
            0.0
        );
    }
}
