//! Analysis parameters: voxel spacing, segmentation, gating and run options.

use crate::error::{Error, Result};
use crate::nucleus::NuclearFeature;
use crate::volume::Spacing;

/// Binarization and object-size filtering parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Histogram bins used by the Otsu threshold.
    pub histogram_bins: usize,
    /// Fill background holes enclosed within each z-slice.
    pub fill_holes: bool,
    /// Drop objects touching the XY border of the stack.
    pub clear_xy_borders: bool,
    /// Minimum equivalent radius (voxels) of an object's XY projection.
    ///
    /// Area bounds are `pi * r^2`.
    pub min_xy_radius: f64,
    /// Maximum equivalent XY radius; `None` leaves it unbounded.
    pub max_xy_radius: Option<f64>,
    /// Minimum z extent. Values below 1 are a fraction of the stack depth,
    /// otherwise a number of slices.
    pub min_z_size: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            histogram_bins: 256,
            fill_holes: true,
            clear_xy_borders: true,
            min_xy_radius: 10.0,
            max_xy_radius: None,
            min_z_size: 0.25,
        }
    }
}

impl SegmentationConfig {
    /// Accepted XY-projected area range in voxels.
    pub fn xy_area_range(&self) -> [f64; 2] {
        let area = |r: f64| std::f64::consts::PI * r * r;
        [
            area(self.min_xy_radius),
            self.max_xy_radius.map_or(f64::INFINITY, area),
        ]
    }

    /// Minimum z extent in slices for a stack of `depth` slices.
    pub fn min_z_slices(&self, depth: usize) -> usize {
        if self.min_z_size < 1.0 {
            (self.min_z_size * depth as f64).round() as usize
        } else {
            self.min_z_size.round() as usize
        }
    }
}

/// Population (G1) gating parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// KDE bandwidth as a fraction of the sample standard deviation.
    pub sigma: f64,
    /// Number of grid points at which the density is evaluated.
    pub grid_points: usize,
    /// Morphometric features that must all fall within their FWHM range.
    pub features: Vec<NuclearFeature>,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            sigma: 0.1,
            grid_points: 1000,
            features: vec![NuclearFeature::FlatSize, NuclearFeature::SumI],
        }
    }
}

/// Top-level analysis configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Physical voxel size (z, y, x).
    pub spacing: Spacing,
    /// Side of the cube used to dilate each nucleus; 0 disables dilation.
    pub dilation: usize,
    /// Worker threads; clamped to the available parallelism.
    pub threads: usize,
    /// Flag dots belonging to the dominant (G1) nuclear subpopulation.
    pub select_g1: bool,
    /// Skip mask PNG export.
    pub no_plot: bool,
    /// Input table delimiter.
    pub delimiter: char,
    /// Return an error after the barrier if any field of view failed.
    pub fail_fast: bool,
    /// Margin (voxels) added around each nucleus bounding box.
    pub box_margin: usize,
    /// Binarization parameters.
    pub segmentation: SegmentationConfig,
    /// Gating parameters.
    pub gating: GatingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            spacing: Spacing::default(),
            dilation: 0,
            threads: 1,
            select_g1: false,
            no_plot: false,
            delimiter: ',',
            fail_fast: false,
            box_margin: 1,
            segmentation: SegmentationConfig::default(),
            gating: GatingConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.spacing.is_valid() {
            return Err(Error::Config(format!(
                "voxel spacing must be positive and finite, got {:?}",
                self.spacing.per_axis()
            )));
        }
        if self.threads == 0 {
            return Err(Error::Config("threads must be >= 1".into()));
        }
        if !self.delimiter.is_ascii() {
            return Err(Error::Config(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )));
        }
        let r0 = self.segmentation.min_xy_radius;
        let r1 = self.segmentation.max_xy_radius.unwrap_or(f64::INFINITY);
        if r0.is_nan() || r1.is_nan() || r0 < 0.0 || r0 > r1 {
            return Err(Error::Config(format!(
                "invalid xy radius range [{}, {}]",
                r0, r1
            )));
        }
        if self.segmentation.histogram_bins < 2 {
            return Err(Error::Config("histogram_bins must be >= 2".into()));
        }
        if !(self.gating.sigma.is_finite() && self.gating.sigma > 0.0) {
            return Err(Error::Config("gating sigma must be positive".into()));
        }
        if self.gating.grid_points < 2 {
            return Err(Error::Config("gating grid_points must be >= 2".into()));
        }
        if self.select_g1 && self.gating.features.is_empty() {
            return Err(Error::Config("gating needs at least one feature".into()));
        }
        Ok(())
    }

    /// Requested thread count clamped to the machine's parallelism.
    pub fn effective_threads(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if self.threads > available {
            tracing::info!(
                "Lowered number of threads to maximum available: {}",
                available
            );
        }
        self.threads.clamp(1, available)
    }
}
