//! Binary dilation by a cube structuring element.

use ndarray::Axis;

use crate::volume::Mask;

/// Dilate `mask` by a cube of side `side` voxels.
///
/// `side == 0` skips dilation and returns an identical copy. The cube covers
/// offsets `-(side / 2) ..= (side - 1) / 2` on every axis, so even sides are
/// anchored one voxel towards the origin. The transform is separable: one
/// running-window OR per axis.
pub fn dilate_cube(mask: &Mask, side: usize) -> Mask {
    if side == 0 {
        return mask.clone();
    }
    let lo = side / 2;
    let hi = (side - 1) / 2;

    let mut out = mask.clone();
    let mut line: Vec<bool> = Vec::new();
    let mut prefix: Vec<usize> = Vec::new();

    for axis in 0..3 {
        for mut lane in out.lanes_mut(Axis(axis)) {
            line.clear();
            line.extend(lane.iter().copied());
            let n = line.len();

            prefix.clear();
            prefix.push(0);
            for &v in &line {
                let last = prefix[prefix.len() - 1];
                prefix.push(last + usize::from(v));
            }

            // out[p] = any(in[p - hi ..= p + lo])
            for (p, dst) in lane.iter_mut().enumerate() {
                let start = p.saturating_sub(hi);
                let end = (p + lo).min(n - 1);
                *dst = prefix[end + 1] > prefix[start];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_voxel(dim: (usize, usize, usize), p: [usize; 3]) -> Mask {
        let mut m = Mask::from_elem(dim, false);
        m[p] = true;
        m
    }

    #[test]
    fn zero_side_is_identity() {
        let m = single_voxel((3, 4, 5), [1, 2, 3]);
        assert_eq!(dilate_cube(&m, 0), m);
    }

    #[test]
    fn side_one_is_identity() {
        let m = single_voxel((3, 4, 5), [1, 2, 3]);
        assert_eq!(dilate_cube(&m, 1), m);
    }

    #[test]
    fn odd_side_grows_symmetrically() {
        let m = single_voxel((7, 7, 7), [3, 3, 3]);
        let d = dilate_cube(&m, 3);
        assert_eq!(d.iter().filter(|&&v| v).count(), 27);
        assert!(d[[2, 2, 2]] && d[[4, 4, 4]]);
        assert!(!d[[1, 3, 3]]);
    }

    #[test]
    fn even_side_anchors_towards_origin() {
        let m = single_voxel((5, 5, 5), [2, 2, 2]);
        let d = dilate_cube(&m, 2);
        assert_eq!(d.iter().filter(|&&v| v).count(), 8);
        assert!(d[[1, 1, 1]] && d[[2, 2, 2]]);
        assert!(!d[[3, 2, 2]]);
    }

    #[test]
    fn dilation_is_clipped_at_volume_border() {
        let m = single_voxel((2, 2, 2), [0, 0, 0]);
        let d = dilate_cube(&m, 5);
        assert!(d.iter().all(|&v| v));
    }
}
