//! 3D connected-component labeling with full (26-) connectivity.
//!
//! Labels are numbered `1..=n` in order of each component's first voxel in
//! raster (z, row, col) order.

use std::collections::VecDeque;

use crate::volume::{LabelVolume, Mask};

/// Label connected foreground components. Returns the label volume and `n`.
pub fn label_components(mask: &Mask) -> (LabelVolume, u32) {
    let (nz, nr, nc) = mask.dim();
    let mut labels = LabelVolume::zeros((nz, nr, nc));
    let mut next = 0u32;
    let mut queue: VecDeque<[usize; 3]> = VecDeque::new();

    for z in 0..nz {
        for r in 0..nr {
            for c in 0..nc {
                if !mask[[z, r, c]] || labels[[z, r, c]] != 0 {
                    continue;
                }
                next += 1;
                labels[[z, r, c]] = next;
                queue.push_back([z, r, c]);
                while let Some(p) = queue.pop_front() {
                    for_each_neighbor(p, [nz, nr, nc], |q| {
                        if mask[q] && labels[q] == 0 {
                            labels[q] = next;
                            queue.push_back(q);
                        }
                    });
                }
            }
        }
    }

    (labels, next)
}

/// Visit the in-bounds 26-neighbourhood of `p`.
fn for_each_neighbor(p: [usize; 3], shape: [usize; 3], mut visit: impl FnMut([usize; 3])) {
    for dz in -1i64..=1 {
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                if dz == 0 && dr == 0 && dc == 0 {
                    continue;
                }
                let q = [p[0] as i64 + dz, p[1] as i64 + dr, p[2] as i64 + dc];
                if q.iter().zip(shape.iter()).all(|(&v, &n)| v >= 0 && (v as usize) < n) {
                    visit([q[0] as usize, q[1] as usize, q[2] as usize]);
                }
            }
        }
    }
}

/// Isolate one label as a binary mask.
#[cfg(test)]
pub(crate) fn label_mask(labels: &LabelVolume, id: u32) -> Mask {
    labels.mapv(|l| l == id)
}
