//! Axis-aligned box containment in voxel space.

/// Inclusive bounds `[lo, hi]` on one axis.
pub type Span = [i64; 2];

/// Test whether a 2D point lies inside an inclusive box.
pub fn in_box_2d(coords: [i64; 2], bounds: [Span; 2]) -> bool {
    coords
        .iter()
        .zip(bounds.iter())
        .all(|(&c, &[lo, hi])| c >= lo && c <= hi)
}

/// Test whether a 3D point lies inside an inclusive box.
pub fn in_box_3d(coords: [i64; 3], bounds: [Span; 3]) -> bool {
    coords
        .iter()
        .zip(bounds.iter())
        .all(|(&c, &[lo, hi])| c >= lo && c <= hi)
}

/// Inclusive voxel box in (z, row, col) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VoxelBox {
    /// Lowest voxel index per axis.
    pub min: [usize; 3],
    /// Highest voxel index per axis (inclusive).
    pub max: [usize; 3],
}

impl VoxelBox {
    /// Box covering a single voxel.
    pub fn point(p: [usize; 3]) -> Self {
        Self { min: p, max: p }
    }

    /// Grow the box so that it contains `p`.
    pub fn include(&mut self, p: [usize; 3]) {
        for a in 0..3 {
            self.min[a] = self.min[a].min(p[a]);
            self.max[a] = self.max[a].max(p[a]);
        }
    }

    /// Enlarge by `margin` voxels on every side, clipped to a volume of `shape`.
    pub fn expanded(&self, margin: usize, shape: [usize; 3]) -> Self {
        let mut out = *self;
        for a in 0..3 {
            out.min[a] = self.min[a].saturating_sub(margin);
            out.max[a] = (self.max[a] + margin).min(shape[a].saturating_sub(1));
        }
        out
    }

    /// Extent per axis.
    pub fn shape(&self) -> [usize; 3] {
        [
            self.max[0] - self.min[0] + 1,
            self.max[1] - self.min[1] + 1,
            self.max[2] - self.min[2] + 1,
        ]
    }

    /// Signed inclusive spans, for use with [`in_box_3d`].
    pub fn spans(&self) -> [Span; 3] {
        [
            [self.min[0] as i64, self.max[0] as i64],
            [self.min[1] as i64, self.max[1] as i64],
            [self.min[2] as i64, self.max[2] as i64],
        ]
    }

    /// Whether a (possibly out-of-volume) voxel coordinate lies in the box.
    pub fn contains(&self, coords: [i64; 3]) -> bool {
        in_box_3d(coords, self.spans())
    }

    /// Translate a voxel coordinate into box-local indices.
    pub fn to_local(&self, p: [usize; 3]) -> Option<[usize; 3]> {
        if !self.contains([p[0] as i64, p[1] as i64, p[2] as i64]) {
            return None;
        }
        Some([p[0] - self.min[0], p[1] - self.min[1], p[2] - self.min[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_bounds_are_inclusive() {
        let b = [[0, 4], [2, 6], [1, 1]];
        assert!(in_box_3d([0, 2, 1], b));
        assert!(in_box_3d([4, 6, 1], b));
        assert!(!in_box_3d([5, 6, 1], b));
        assert!(!in_box_3d([0, 2, 0], b));
        assert!(in_box_2d([3, 3], [[3, 3], [0, 9]]));
        assert!(!in_box_2d([-1, 3], [[0, 3], [0, 9]]));
    }

    #[test]
    fn expanded_box_is_clipped_to_volume() {
        let mut b = VoxelBox::point([0, 5, 9]);
        b.include([2, 6, 9]);
        let e = b.expanded(1, [3, 20, 10]);
        assert_eq!(e.min, [0, 4, 8]);
        assert_eq!(e.max, [2, 7, 9]);
        assert_eq!(e.shape(), [3, 4, 2]);
    }

    #[test]
    fn local_coordinates_are_relative_to_min_corner() {
        let b = VoxelBox {
            min: [1, 2, 3],
            max: [4, 5, 6],
        };
        assert_eq!(b.to_local([1, 2, 3]), Some([0, 0, 0]));
        assert_eq!(b.to_local([4, 5, 6]), Some([3, 3, 3]));
        assert_eq!(b.to_local([0, 5, 6]), None);
        assert!(!b.contains([-1, 2, 3]));
    }
}
