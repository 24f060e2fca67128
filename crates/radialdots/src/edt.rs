//! Exact Euclidean distance transform under anisotropic voxel spacing.
//!
//! Separable lower-envelope-of-parabolas transform (Felzenszwalb &
//! Huttenlocher), one pass per axis on squared distances. Foreground voxels get
//! the physical distance to the nearest background voxel inside the array;
//! background voxels get 0. Nothing outside the array counts as background.

use ndarray::{Array3, Axis};

use crate::volume::{Mask, Spacing};

/// Distance of every foreground voxel to the nearest background voxel.
///
/// A mask without any background yields `f64::INFINITY` on every voxel.
pub fn distance_transform(mask: &Mask, spacing: &Spacing) -> Array3<f64> {
    let mut sq = mask.mapv(|fg| if fg { f64::INFINITY } else { 0.0 });
    let w = spacing.per_axis();
    let longest = mask.shape().iter().copied().max().unwrap_or(0);
    let mut scratch = Envelope::with_capacity(longest);

    for (axis, &step) in w.iter().enumerate() {
        for mut lane in sq.lanes_mut(Axis(axis)) {
            scratch.load(lane.iter().copied());
            scratch.transform(step);
            for (dst, &v) in lane.iter_mut().zip(scratch.out.iter()) {
                *dst = v;
            }
        }
    }

    sq.mapv_inplace(f64::sqrt);
    sq
}

/// Reusable buffers for the 1D transform.
struct Envelope {
    f: Vec<f64>,
    out: Vec<f64>,
    v: Vec<usize>,
    z: Vec<f64>,
}

impl Envelope {
    fn with_capacity(n: usize) -> Self {
        Self {
            f: Vec::with_capacity(n),
            out: Vec::with_capacity(n),
            v: Vec::with_capacity(n),
            z: Vec::with_capacity(n + 1),
        }
    }

    fn load(&mut self, values: impl Iterator<Item = f64>) {
        self.f.clear();
        self.f.extend(values);
    }

    /// Squared-distance transform of `self.f` with sample spacing `step`.
    fn transform(&mut self, step: f64) {
        let n = self.f.len();
        self.out.clear();
        self.v.clear();
        self.z.clear();

        let first = match self.f.iter().position(|v| v.is_finite()) {
            Some(i) => i,
            None => {
                self.out.resize(n, f64::INFINITY);
                return;
            }
        };

        let pos = |i: usize| i as f64 * step;
        self.v.push(first);
        self.z.push(f64::NEG_INFINITY);
        self.z.push(f64::INFINITY);

        for q in (first + 1)..n {
            let fq = self.f[q];
            if !fq.is_finite() {
                continue;
            }
            let pq = pos(q);
            loop {
                let k = self.v.len() - 1;
                let r = self.v[k];
                let pr = pos(r);
                let s = ((fq + pq * pq) - (self.f[r] + pr * pr)) / (2.0 * (pq - pr));
                // z[0] is -inf, so the first parabola is never popped.
                if k > 0 && s <= self.z[k] {
                    self.v.pop();
                    self.z.pop();
                    continue;
                }
                self.v.push(q);
                let last = self.z.len() - 1;
                self.z[last] = s;
                self.z.push(f64::INFINITY);
                break;
            }
        }

        let mut k = 0usize;
        for q in 0..n {
            let pq = pos(q);
            while self.z[k + 1] < pq {
                k += 1;
            }
            let r = self.v[k];
            let d = pq - pos(r);
            self.out.push(d * d + self.f[r]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn brute_force(mask: &Mask, spacing: &Spacing) -> Array3<f64> {
        let w = spacing.per_axis();
        let bg: Vec<[usize; 3]> = mask
            .indexed_iter()
            .filter(|(_, &v)| !v)
            .map(|((z, r, c), _)| [z, r, c])
            .collect();
        Array3::from_shape_fn(mask.dim(), |(z, r, c)| {
            if !mask[[z, r, c]] {
                return 0.0;
            }
            bg.iter()
                .map(|b| {
                    let dz = (z as f64 - b[0] as f64) * w[0];
                    let dr = (r as f64 - b[1] as f64) * w[1];
                    let dc = (c as f64 - b[2] as f64) * w[2];
                    (dz * dz + dr * dr + dc * dc).sqrt()
                })
                .fold(f64::INFINITY, f64::min)
        })
    }

    #[test]
    fn single_line_matches_index_distance() {
        let mut m = Mask::from_elem((1, 1, 7), true);
        m[[0, 0, 0]] = false;
        let d = distance_transform(&m, &Spacing::new([1.0, 1.0, 2.0]));
        for c in 0..7 {
            assert_abs_diff_eq!(d[[0, 0, c]], 2.0 * c as f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn anisotropic_block_matches_brute_force() {
        let mut m = Mask::from_elem((5, 9, 8), false);
        for z in 1..4 {
            for r in 1..8 {
                for c in 2..7 {
                    m[[z, r, c]] = true;
                }
            }
        }
        m[[2, 4, 4]] = false;
        let spacing = Spacing::new([300.0, 130.0, 110.0]);
        let fast = distance_transform(&m, &spacing);
        let slow = brute_force(&m, &spacing);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn no_background_is_infinite() {
        let m = Mask::from_elem((2, 2, 2), true);
        let d = distance_transform(&m, &Spacing::default());
        assert!(d.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn background_is_zero() {
        let mut m = Mask::from_elem((3, 3, 3), false);
        m[[1, 1, 1]] = true;
        let d = distance_transform(&m, &Spacing::new([1.0, 1.0, 1.0]));
        assert_abs_diff_eq!(d[[1, 1, 1]], 1.0, epsilon = 1e-12);
        assert_eq!(d[[0, 0, 0]], 0.0);
    }
}
