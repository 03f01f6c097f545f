//! Axis aligned box world for deterministic tests.
//!
//! Shapes are approximated by their bounding boxes, which is exact enough for the
//! axis aligned casts the controller performs.

use crate::{
    collision::{Capsule, CapsuleCast, ProbeShape},
    prelude::*,
};

/// Height at which a default character rests on [`BoxWorld::floor`].
pub(crate) const REST_HEIGHT: f32 = 1.15;

#[derive(Clone, Debug, Default)]
pub(crate) struct BoxWorld {
    boxes: Vec<(Vec3, Vec3, u32)>,
}

impl BoxWorld {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_box(self, min: Vec3, max: Vec3) -> Self {
        self.with_layered_box(min, max, 1)
    }

    pub(crate) fn with_layered_box(mut self, min: Vec3, max: Vec3, layers: u32) -> Self {
        self.boxes.push((min, max, layers));
        self
    }

    /// Floor whose top face is at `y = 0`.
    pub(crate) fn floor(self) -> Self {
        self.with_box(vec3(-10.0, -1.0, -100.0), vec3(10.0, 0.0, 100.0))
    }

    fn solids(&self, mask: CollisionMask) -> impl Iterator<Item = (Vec3, Vec3)> + '_ {
        self.boxes
            .iter()
            .filter(move |(_, _, layers)| mask.intersects(*layers))
            .map(|(min, max, _)| (*min, *max))
    }
}

fn capsule_bounds(capsule: &Capsule) -> (Vec3, Vec3) {
    let radius = Vec3::splat(capsule.radius);
    (
        capsule.top.min(capsule.bottom) - radius,
        capsule.top.max(capsule.bottom) + radius,
    )
}

fn shape_bounds(shape: &ProbeShape) -> (Vec3, Vec3) {
    match shape {
        ProbeShape::Capsule(capsule) => capsule_bounds(capsule),
        ProbeShape::Sphere { center, radius } => {
            (*center - Vec3::splat(*radius), *center + Vec3::splat(*radius))
        }
    }
}

/// Entry distance of a ray into a box. Rays starting inside or touching the box miss.
fn ray_box(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let mut enter = f32::NEG_INFINITY;
    let mut exit = f32::INFINITY;
    for axis in 0..3 {
        if direction[axis] == 0.0 {
            if origin[axis] <= min[axis] || origin[axis] >= max[axis] {
                return None;
            }
            continue;
        }
        let a = (min[axis] - origin[axis]) / direction[axis];
        let b = (max[axis] - origin[axis]) / direction[axis];
        enter = enter.max(a.min(b));
        exit = exit.min(a.max(b));
    }
    (enter >= 0.0 && enter < exit).then_some(enter)
}

impl CollisionCapability for BoxWorld {
    fn capsule_cast(&self, cast: &CapsuleCast) -> Option<CastHit> {
        let (min, max) = capsule_bounds(&cast.capsule);
        let half = (max - min) * 0.5;
        let origin = (min + max) * 0.5;
        let direction = cast.direction.as_vec3();
        self.solids(cast.mask)
            .filter_map(|(box_min, box_max)| ray_box(origin, direction, box_min - half, box_max + half))
            .filter(|distance| *distance <= cast.max_distance)
            .min_by(f32::total_cmp)
            .map(|distance| CastHit {
                distance,
                point: origin + direction * distance,
                normal: -direction,
            })
    }

    fn check_overlap(&self, shape: &ProbeShape, mask: CollisionMask) -> bool {
        let (min, max) = shape_bounds(shape);
        self.solids(mask).any(|(box_min, box_max)| {
            min.cmplt(box_max).all() && max.cmpgt(box_min).all()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_out_boxes_are_ignored() {
        let world = BoxWorld::new().with_layered_box(Vec3::splat(-1.0), Vec3::splat(1.0), 0b10);
        let sphere = ProbeShape::Sphere {
            center: Vec3::ZERO,
            radius: 0.5,
        };
        assert!(world.check_overlap(&sphere, CollisionMask(0b10)));
        assert!(!world.check_overlap(&sphere, CollisionMask(0b01)));
    }

    #[test]
    fn cast_starting_inside_misses() {
        let world = BoxWorld::new().with_box(Vec3::splat(-1.0), Vec3::splat(1.0));
        let cast = CapsuleCast {
            capsule: Capsule {
                top: Vec3::Y * 0.1,
                bottom: Vec3::ZERO,
                radius: 0.1,
            },
            direction: Dir3::Z,
            max_distance: 10.0,
            mask: CollisionMask::ALL,
        };
        assert_eq!(world.capsule_cast(&cast), None);
    }
}
