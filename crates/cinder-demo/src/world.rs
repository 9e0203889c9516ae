use std::collections::HashSet;

use glam::IVec3;

/// Solid unit blocks, each occupying the cell `[p, p + 1)` on every axis.
#[derive(Debug, Default, Clone)]
pub struct World {
    /// Insertion order, so draws come out in a stable order.
    order: Vec<IVec3>,
    solid: HashSet<IVec3>,
}

impl World {
    /// A single layer of `width` x `depth` blocks at y = 0, starting at the origin.
    pub fn flat(width: i32, depth: i32) -> Self {
        let mut world = Self::default();
        for x in 0..width {
            for z in 0..depth {
                world.insert(IVec3::new(x, 0, z));
            }
        }
        world
    }

    pub fn insert(&mut self, block: IVec3) -> bool {
        let added = self.solid.insert(block);
        if added {
            self.order.push(block);
        }
        added
    }

    #[inline]
    pub fn is_solid(&self, block: IVec3) -> bool {
        self.solid.contains(&block)
    }

    pub fn blocks(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_world_is_one_layer() {
        let world = World::flat(10, 10);
        assert_eq!(world.len(), 100);
        assert!(world.is_solid(IVec3::new(0, 0, 0)));
        assert!(world.is_solid(IVec3::new(9, 0, 9)));
        assert!(!world.is_solid(IVec3::new(10, 0, 0)));
        assert!(!world.is_solid(IVec3::new(0, 1, 0)));
    }

    #[test]
    fn insert_keeps_order_and_ignores_duplicates() {
        let mut world = World::flat(2, 1);
        assert!(!world.insert(IVec3::new(0, 0, 0)));
        assert!(world.insert(IVec3::new(0, 1, 0)));
        let blocks: Vec<_> = world.blocks().collect();
        assert_eq!(
            blocks,
            vec![IVec3::new(0, 0, 0), IVec3::new(1, 0, 0), IVec3::new(0, 1, 0)]
        );
    }
}
