//! Nuclear binarization.
//!
//! [`Segmenter`] is the capability the field-of-view analyzer needs:
//! binarize a stack, filter objects by XY and Z size, and estimate the
//! background intensity. [`OtsuSegmenter`] is the default implementation:
//!
//! 1. global Otsu threshold over every voxel,
//! 2. per-slice filling of enclosed background holes,
//! 3. removal of objects touching the XY border.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::config::SegmentationConfig;
use crate::error::FovError;
use crate::label::label_components;
use crate::volume::{LabelVolume, Mask, Stack};

/// Output of a binarization run.
#[derive(Debug, Clone)]
pub struct Binarization {
    /// Foreground mask.
    pub mask: Mask,
    /// Intensity threshold that produced the mask.
    pub threshold: f64,
    /// Human-readable step log.
    pub log: String,
}

/// Binarization and size-filtering capability.
pub trait Segmenter: Sync {
    /// Split a stack into nuclear foreground and background.
    fn binarize(&self, stack: &Stack) -> Result<Binarization, FovError>;

    /// Drop objects whose XY projection is too small or too large.
    fn filter_xy_size(&self, mask: Mask) -> Mask;

    /// Drop objects spanning too few slices.
    fn filter_z_size(&self, mask: Mask) -> Mask;

    /// Background intensity of the stack outside `mask`.
    fn estimate_background(&self, stack: &Stack, mask: &Mask) -> f64;
}

/// Default [`Segmenter`] based on a global Otsu threshold.
#[derive(Debug, Clone, Default)]
pub struct OtsuSegmenter {
    config: SegmentationConfig,
}

impl OtsuSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }
}

impl Segmenter for OtsuSegmenter {
    fn binarize(&self, stack: &Stack) -> Result<Binarization, FovError> {
        if stack.is_empty() {
            return Err(FovError::EmptyStack);
        }
        let values: Vec<f64> = stack.iter().map(|&v| v as f64).collect();
        let threshold = otsu_threshold(&values, self.config.histogram_bins)
            .ok_or_else(|| FovError::Binarize("flat intensity profile".into()))?;

        let mut log = format!("    > Otsu threshold: {:.3}\n", threshold);
        let mut mask = stack.mapv(|v| v as f64 > threshold);

        if self.config.fill_holes {
            let filled = fill_holes_per_slice(&mut mask);
            log.push_str(&format!("    > Filled {} hole voxels\n", filled));
        }
        if self.config.clear_xy_borders {
            let removed = remove_components(&mut mask, |c| c.touches_xy_border);
            log.push_str(&format!("    > Cleared {} border objects\n", removed));
        }

        Ok(Binarization {
            mask,
            threshold,
            log,
        })
    }

    fn filter_xy_size(&self, mut mask: Mask) -> Mask {
        let [lo, hi] = self.config.xy_area_range();
        let removed = remove_components(&mut mask, |c| {
            let area = c.flat_area as f64;
            area < lo || area > hi
        });
        tracing::debug!("XY size filter removed {} objects", removed);
        mask
    }

    fn filter_z_size(&self, mut mask: Mask) -> Mask {
        let min_slices = self.config.min_z_slices(mask.dim().0);
        let removed = remove_components(&mut mask, |c| c.z_extent < min_slices);
        tracing::debug!("Z size filter removed {} objects", removed);
        mask
    }

    fn estimate_background(&self, stack: &Stack, mask: &Mask) -> f64 {
        let bg: Vec<f64> = stack
            .iter()
            .zip(mask.iter())
            .filter(|&(_, &fg)| !fg)
            .map(|(&v, _)| v as f64)
            .collect();
        histogram_mode(&bg, self.config.histogram_bins)
    }
}

/// Otsu's threshold: maximizes inter-class variance of a histogram.
///
/// Returns `None` for empty or constant input. The threshold is the upper
/// edge of the last background bin, so `v > threshold` is foreground.
pub fn otsu_threshold(data: &[f64], num_bins: usize) -> Option<f64> {
    let (min_val, max_val) = min_max(data)?;
    if (max_val - min_val).abs() < 1e-12 || num_bins < 2 {
        return None;
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let histogram = histogram(data, min_val, bin_width, num_bins);
    let total = data.len() as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_bg = 0.0;
    let mut weight_bg = 0.0;
    let mut best = (f64::MIN, 0usize);

    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_total - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if between > best.0 {
            best = (between, t);
        }
    }

    Some(min_val + (best.1 + 1) as f64 * bin_width)
}

/// Center of the most populated histogram bin; 0 for empty input.
fn histogram_mode(data: &[f64], num_bins: usize) -> f64 {
    let Some((min_val, max_val)) = min_max(data) else {
        return 0.0;
    };
    if (max_val - min_val).abs() < 1e-12 {
        return min_val;
    }
    let bin_width = (max_val - min_val) / num_bins as f64;
    let histogram = histogram(data, min_val, bin_width, num_bins);
    let peak = histogram
        .iter()
        .enumerate()
        .max_by_key(|&(i, &c)| (c, std::cmp::Reverse(i)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    min_val + (peak as f64 + 0.5) * bin_width
}

fn min_max(data: &[f64]) -> Option<(f64, f64)> {
    if data.is_empty() {
        return None;
    }
    let min_val = data.iter().fold(f64::MAX, |a, &b| a.min(b));
    let max_val = data.iter().fold(f64::MIN, |a, &b| a.max(b));
    Some((min_val, max_val))
}

fn histogram(data: &[f64], min_val: f64, bin_width: f64, num_bins: usize) -> Vec<usize> {
    let mut h = vec![0usize; num_bins];
    for &v in data {
        let bin = (((v - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        h[bin] += 1;
    }
    h
}

/// Fill background regions not connected to the border of their slice.
///
/// Returns the number of voxels switched to foreground.
fn fill_holes_per_slice(mask: &mut Mask) -> usize {
    let (nz, nr, nc) = mask.dim();
    let mut filled = 0usize;
    for z in 0..nz {
        let background = GrayImage::from_fn(nc as u32, nr as u32, |x, y| {
            Luma([if mask[[z, y as usize, x as usize]] { 0 } else { 255 }])
        });
        let regions = connected_components(&background, Connectivity::Four, Luma([0u8]));

        let mut outside = std::collections::HashSet::new();
        for (x, y, px) in regions.enumerate_pixels() {
            let on_border = x == 0 || y == 0 || x as usize == nc - 1 || y as usize == nr - 1;
            if on_border && px[0] != 0 {
                outside.insert(px[0]);
            }
        }
        for (x, y, px) in regions.enumerate_pixels() {
            if px[0] != 0 && !outside.contains(&px[0]) {
                mask[[z, y as usize, x as usize]] = true;
                filled += 1;
            }
        }
    }
    filled
}

/// Per-component statistics used by the object filters.
#[derive(Debug, Clone, Default)]
struct ComponentStats {
    flat_area: usize,
    z_extent: usize,
    touches_xy_border: bool,
}

fn component_stats(labels: &LabelVolume, count: u32) -> Vec<ComponentStats> {
    let (nz, nr, nc) = labels.dim();
    let n = count as usize;
    let mut z_range = vec![(usize::MAX, 0usize); n];
    let mut border = vec![false; n];
    let mut flat = vec![std::collections::HashSet::new(); n];

    for z in 0..nz {
        for r in 0..nr {
            for c in 0..nc {
                let l = labels[[z, r, c]];
                if l == 0 {
                    continue;
                }
                let i = (l - 1) as usize;
                z_range[i].0 = z_range[i].0.min(z);
                z_range[i].1 = z_range[i].1.max(z);
                if r == 0 || c == 0 || r == nr - 1 || c == nc - 1 {
                    border[i] = true;
                }
                flat[i].insert((r, c));
            }
        }
    }

    (0..n)
        .map(|i| ComponentStats {
            flat_area: flat[i].len(),
            z_extent: if flat[i].is_empty() {
                0
            } else {
                z_range[i].1 - z_range[i].0 + 1
            },
            touches_xy_border: border[i],
        })
        .collect()
}

/// Clear every component for which `reject` holds; returns how many.
fn remove_components(mask: &mut Mask, reject: impl Fn(&ComponentStats) -> bool) -> usize {
    let (labels, count) = label_components(mask);
    let drop: Vec<bool> = component_stats(&labels, count).iter().map(reject).collect();
    for (m, &l) in mask.iter_mut().zip(labels.iter()) {
        if l != 0 && drop[(l - 1) as usize] {
            *m = false;
        }
    }
    drop.iter().filter(|&&d| d).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ellipsoid_stack;

    #[test]
    fn otsu_separates_two_levels() {
        let mut data = vec![10.0; 500];
        data.extend(vec![200.0; 100]);
        let t = otsu_threshold(&data, 256).unwrap();
        assert!(t > 10.0 && t < 200.0, "threshold {}", t);
        assert!(otsu_threshold(&[3.0, 3.0], 256).is_none());
        assert!(otsu_threshold(&[], 256).is_none());
    }

    #[test]
    fn binarize_finds_ellipsoid() {
        let stack = ellipsoid_stack((12, 40, 40), &[([6.0, 20.0, 20.0], [4.0, 10.0, 10.0])]);
        let seg = OtsuSegmenter::default();
        let bin = seg.binarize(&stack).unwrap();
        assert!(bin.mask[[6, 20, 20]]);
        assert!(!bin.mask[[0, 0, 0]]);
        assert!(bin.log.contains("Otsu"));
    }

    #[test]
    fn flat_stack_fails_to_binarize() {
        let stack = Stack::from_elem((3, 8, 8), 5.0);
        let err = OtsuSegmenter::default().binarize(&stack).unwrap_err();
        assert!(matches!(err, FovError::Binarize(_)));
    }

    #[test]
    fn holes_are_filled_within_slices() {
        let mut m = Mask::from_elem((1, 7, 7), false);
        for r in 1..6 {
            for c in 1..6 {
                m[[0, r, c]] = true;
            }
        }
        m[[0, 3, 3]] = false;
        assert_eq!(fill_holes_per_slice(&mut m), 1);
        assert!(m[[0, 3, 3]]);
        assert!(!m[[0, 0, 0]]);
    }

    #[test]
    fn border_objects_are_cleared() {
        let mut m = Mask::from_elem((2, 10, 10), false);
        m[[0, 0, 4]] = true;
        m[[1, 5, 5]] = true;
        let removed = remove_components(&mut m, |c| c.touches_xy_border);
        assert_eq!(removed, 1);
        assert!(!m[[0, 0, 4]]);
        assert!(m[[1, 5, 5]]);
    }

    #[test]
    fn size_filters_drop_small_objects() {
        let mut m = Mask::from_elem((8, 30, 30), false);
        // 1 voxel blob and a 6x6x6 cube.
        m[[4, 3, 3]] = true;
        for z in 1..7 {
            for r in 10..16 {
                for c in 10..16 {
                    m[[z, r, c]] = true;
                }
            }
        }
        let seg = OtsuSegmenter::new(SegmentationConfig {
            min_xy_radius: 2.0,
            min_z_size: 3.0,
            ..Default::default()
        });
        let m = seg.filter_z_size(seg.filter_xy_size(m));
        assert!(!m[[4, 3, 3]]);
        assert!(m[[3, 12, 12]]);

        let strict = OtsuSegmenter::new(SegmentationConfig {
            min_xy_radius: 0.0,
            min_z_size: 7.0,
            ..Default::default()
        });
        let m = strict.filter_z_size(m);
        assert!(m.iter().all(|&v| !v));
    }

    #[test]
    fn background_is_the_dominant_outside_level() {
        let stack = ellipsoid_stack((6, 20, 20), &[([3.0, 10.0, 10.0], [2.0, 5.0, 5.0])]);
        let seg = OtsuSegmenter::default();
        let bin = seg.binarize(&stack).unwrap();
        let bg = seg.estimate_background(&stack, &bin.mask);
        assert!((bg - crate::test_utils::BACKGROUND as f64).abs() < 2.0, "bg {}", bg);
    }
}
