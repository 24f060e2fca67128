//! 3D array aliases and voxel spacing.
//!
//! Volumes are indexed `[z, row, col]`. Dot tables call the row axis `x` and
//! the column axis `y`, so a dot at `(z, x, y)` addresses `volume[[z, x, y]]`.

use ndarray::{s, Array3, Axis};

/// Intensity stack.
pub type Stack = Array3<f32>;
/// Binary foreground mask.
pub type Mask = Array3<bool>;
/// Connected-component labels; 0 is background.
pub type LabelVolume = Array3<u32>;

/// Physical voxel size along (z, row, col).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Spacing {
    /// Z voxel side.
    pub z: f64,
    /// Row-axis voxel side.
    pub y: f64,
    /// Column-axis voxel side.
    pub x: f64,
}

impl Default for Spacing {
    fn default() -> Self {
        Self {
            z: 300.0,
            y: 130.0,
            x: 130.0,
        }
    }
}

impl Spacing {
    /// Construct from `[z, y, x]`.
    pub fn new(zyx: [f64; 3]) -> Self {
        Self {
            z: zyx[0],
            y: zyx[1],
            x: zyx[2],
        }
    }

    /// Spacing per array axis.
    pub fn per_axis(&self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    /// Physical volume of one voxel.
    pub fn voxel_volume(&self) -> f64 {
        self.z * self.y * self.x
    }

    /// `true` when every side is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.per_axis().iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Copy `mask` into a volume with one empty slice above and below.
pub fn pad_z(mask: &Mask) -> Mask {
    let (nz, nr, nc) = mask.dim();
    let mut out = Mask::from_elem((nz + 2, nr, nc), false);
    out.slice_mut(s![1..nz + 1, .., ..]).assign(mask);
    out
}

/// Drop the first and last slice added by [`pad_z`].
pub fn unpad_z<T: Clone>(padded: &Array3<T>) -> Array3<T> {
    let nz = padded.len_of(Axis(0));
    padded.slice(s![1..nz - 1, .., ..]).to_owned()
}

/// Convert a signed dot coordinate into an in-volume index.
pub fn voxel_index(coords: [i64; 3], dim: (usize, usize, usize)) -> Option<[usize; 3]> {
    let shape = [dim.0, dim.1, dim.2];
    let mut out = [0usize; 3];
    for a in 0..3 {
        if coords[a] < 0 || coords[a] as usize >= shape[a] {
            return None;
        }
        out[a] = coords[a] as usize;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_round_trips() {
        let mut m = Mask::from_elem((2, 3, 3), false);
        m[[0, 1, 1]] = true;
        m[[1, 2, 0]] = true;
        let p = pad_z(&m);
        assert_eq!(p.dim(), (4, 3, 3));
        assert!(!p[[0, 1, 1]]);
        assert!(p[[1, 1, 1]]);
        assert!(p[[2, 2, 0]]);
        assert_eq!(unpad_z(&p), m);
    }

    #[test]
    fn voxel_index_rejects_out_of_bounds() {
        assert_eq!(voxel_index([0, 1, 2], (1, 2, 3)), Some([0, 1, 2]));
        assert_eq!(voxel_index([1, 1, 2], (1, 2, 3)), None);
        assert_eq!(voxel_index([0, -1, 2], (1, 2, 3)), None);
    }

    #[test]
    fn spacing_validation() {
        assert!(Spacing::default().is_valid());
        assert!(!Spacing::new([0.0, 1.0, 1.0]).is_valid());
        assert!(!Spacing::new([1.0, f64::NAN, 1.0]).is_valid());
        assert_eq!(Spacing::new([2.0, 3.0, 4.0]).voxel_volume(), 24.0);
    }
}
