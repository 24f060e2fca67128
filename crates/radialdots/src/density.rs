//! Gaussian kernel density estimate and full-width-at-half-maximum range.

/// Density evaluated on a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Density {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Density {
    /// Grid value at the (first) density maximum.
    pub fn peak(&self) -> Option<f64> {
        argmax(&self.y).map(|i| self.x[i])
    }

    /// Contiguous grid interval around the peak where the density is at
    /// least half of its maximum, as `[left, right]`.
    pub fn fwhm(&self) -> Option<[f64; 2]> {
        let peak = argmax(&self.y)?;
        let half = self.y[peak] / 2.0;
        let mut left = peak;
        while left > 0 && self.y[left - 1] >= half {
            left -= 1;
        }
        let mut right = peak;
        while right + 1 < self.y.len() && self.y[right + 1] >= half {
            right += 1;
        }
        Some([self.x[left], self.x[right]])
    }
}

fn argmax(v: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &y) in v.iter().enumerate() {
        if best.map_or(true, |b| y > v[b]) {
            best = Some(i);
        }
    }
    best
}

/// Sample standard deviation (ddof = 1); 0 for fewer than two samples.
pub fn sample_std(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let ss: f64 = data.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Gaussian KDE of `data` on `grid_points` evenly spaced values spanning
/// `[min, max]` of the data.
///
/// The kernel bandwidth is `sigma` times the sample standard deviation.
/// Degenerate samples (a single value, or zero spread) collapse to a
/// one-point density at that value. Returns `None` for empty input.
pub fn kernel_density(data: &[f64], sigma: f64, grid_points: usize) -> Option<Density> {
    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    let first = *finite.first()?;
    let min = finite.iter().fold(f64::MAX, |a, &b| a.min(b));
    let max = finite.iter().fold(f64::MIN, |a, &b| a.max(b));
    let bandwidth = sigma * sample_std(&finite);

    if !(bandwidth > 0.0) || max <= min || grid_points < 2 {
        return Some(Density {
            x: vec![first],
            y: vec![1.0],
        });
    }

    let step = (max - min) / (grid_points - 1) as f64;
    let norm = 1.0 / (finite.len() as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    let x: Vec<f64> = (0..grid_points).map(|i| min + i as f64 * step).collect();
    let y = x
        .iter()
        .map(|&g| {
            let s: f64 = finite
                .iter()
                .map(|&v| {
                    let u = (g - v) / bandwidth;
                    (-0.5 * u * u).exp()
                })
                .sum();
            s * norm
        })
        .collect();
    Some(Density { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn sample_std_uses_unbiased_estimator() {
        assert_abs_diff_eq!(sample_std(&[1.0, 2.0, 3.0, 4.0]), 1.2909944, epsilon = 1e-6);
        assert_eq!(sample_std(&[5.0]), 0.0);
    }

    #[test]
    fn density_integrates_to_about_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let data: Vec<f64> = (0..2000).map(|_| normal.sample(&mut rng)).collect();
        let d = kernel_density(&data, 0.1, 1000).unwrap();
        assert_eq!(d.x.len(), 1000);
        let step = d.x[1] - d.x[0];
        let area: f64 = d.y.iter().sum::<f64>() * step;
        assert_abs_diff_eq!(area, 1.0, epsilon = 0.05);
    }

    #[test]
    fn fwhm_of_normal_sample() {
        let mut rng = StdRng::seed_from_u64(11);
        let normal = Normal::new(10.0, 2.0).unwrap();
        let data: Vec<f64> = (0..5000).map(|_| normal.sample(&mut rng)).collect();
        let d = kernel_density(&data, 0.1, 1000).unwrap();
        let [lo, hi] = d.fwhm().unwrap();
        // FWHM of a normal is 2.355 sigma.
        assert_abs_diff_eq!(hi - lo, 2.355 * 2.0, epsilon = 0.6);
        assert_abs_diff_eq!(d.peak().unwrap(), 10.0, epsilon = 0.5);
    }

    #[test]
    fn degenerate_samples_collapse_to_a_point() {
        let d = kernel_density(&[3.0, 3.0, 3.0], 0.1, 1000).unwrap();
        assert_eq!(d.fwhm(), Some([3.0, 3.0]));
        let d = kernel_density(&[4.5], 0.1, 1000).unwrap();
        assert_eq!(d.fwhm(), Some([4.5, 4.5]));
        assert!(kernel_density(&[], 0.1, 1000).is_none());
    }

    #[test]
    fn fwhm_stays_around_the_main_peak() {
        let d = Density {
            x: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            y: vec![0.9, 0.1, 0.6, 1.0, 0.5, 0.2, 0.8],
        };
        assert_eq!(d.fwhm(), Some([2.0, 4.0]));
    }
}
