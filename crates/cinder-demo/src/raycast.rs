//! Voxel traversal (Amanatides & Woo) against the block grid.

use glam::{IVec3, Vec3};

use crate::world::World;

/// First solid block along a ray.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hit {
    pub block: IVec3,
    /// Ray parameter at which the block's cell was entered.
    pub distance: f32,
}

/// Ray parameter at which `s` first crosses an integer boundary moving at `ds`.
fn int_bound(s: f32, ds: f32) -> f32 {
    if ds > 0.0 {
        (s.floor() + 1.0 - s) / ds
    } else if ds < 0.0 {
        (s - s.floor()) / -ds
    } else {
        f32::INFINITY
    }
}

/// Walks the cells pierced by `origin + t * direction` for `t <= range` and
/// returns the first solid one. `direction` need not be normalized; `range` is
/// measured along its normalized form.
pub fn raycast(world: &World, origin: Vec3, direction: Vec3, range: f32) -> Option<Hit> {
    let dir = direction.try_normalize()?;

    let mut cell = origin.floor().as_ivec3();
    let step = IVec3::new(
        if dir.x > 0.0 { 1 } else { -1 },
        if dir.y > 0.0 { 1 } else { -1 },
        if dir.z > 0.0 { 1 } else { -1 },
    );
    let mut t_max = Vec3::new(
        int_bound(origin.x, dir.x),
        int_bound(origin.y, dir.y),
        int_bound(origin.z, dir.z),
    );
    let t_delta = Vec3::new(
        if dir.x != 0.0 { (1.0 / dir.x).abs() } else { f32::INFINITY },
        if dir.y != 0.0 { (1.0 / dir.y).abs() } else { f32::INFINITY },
        if dir.z != 0.0 { (1.0 / dir.z).abs() } else { f32::INFINITY },
    );

    let mut distance = 0.0;
    while distance <= range {
        if world.is_solid(cell) {
            return Some(Hit {
                block: cell,
                distance,
            });
        }

        if t_max.x < t_max.y && t_max.x < t_max.z {
            cell.x += step.x;
            distance = t_max.x;
            t_max.x += t_delta.x;
        } else if t_max.y < t_max.z {
            cell.y += step.y;
            distance = t_max.y;
            t_max.y += t_delta.y;
        } else {
            cell.z += step.z;
            distance = t_max.z;
            t_max.z += t_delta.z;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looking_down_hits_the_floor() {
        let world = World::flat(10, 10);
        let hit = raycast(&world, Vec3::new(3.5, 2.5, 4.5), Vec3::NEG_Y, 8.0).unwrap();
        assert_eq!(hit.block, IVec3::new(3, 0, 4));
        assert!((hit.distance - 1.5).abs() < 1e-5);
    }

    #[test]
    fn looking_up_misses() {
        let world = World::flat(10, 10);
        assert_eq!(raycast(&world, Vec3::new(3.5, 2.5, 4.5), Vec3::Y, 8.0), None);
    }

    #[test]
    fn range_limits_the_walk() {
        let world = World::flat(10, 10);
        let origin = Vec3::new(3.5, 20.0, 4.5);
        assert_eq!(raycast(&world, origin, Vec3::NEG_Y, 8.0), None);
        assert!(raycast(&world, origin, Vec3::NEG_Y, 32.0).is_some());
    }

    #[test]
    fn oblique_ray_finds_the_nearest_block() {
        let mut world = World::default();
        world.insert(IVec3::new(2, 0, 0));
        world.insert(IVec3::new(4, 0, 0));
        let hit = raycast(&world, Vec3::new(0.5, 1.5, 0.5), Vec3::new(1.0, -0.5, 0.0), 8.0).unwrap();
        assert_eq!(hit.block, IVec3::new(2, 0, 0));
    }

    #[test]
    fn zero_direction_is_no_ray() {
        let world = World::flat(1, 1);
        assert_eq!(raycast(&world, Vec3::new(0.5, 0.5, 0.5), Vec3::ZERO, 8.0), None);
    }
}
