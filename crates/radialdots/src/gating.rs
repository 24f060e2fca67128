//! Selection of the dominant (G1) nuclear subpopulation.
//!
//! For every gated feature the values of all registered nuclei are smoothed
//! with a Gaussian KDE and the FWHM interval around the density peak is taken
//! as the inclusion range. A nucleus is selected when every feature value
//! falls within its range, bounds included.
//!
//! The estimate needs a few hundred nuclei to be meaningful. Small samples
//! are not rejected; they simply give degenerate ranges.

use std::collections::HashSet;

use crate::config::GatingConfig;
use crate::density::{kernel_density, Density};
use crate::nucleus::NuclearFeature;
use crate::registry::{NucleusKey, NucleusRegistry};
use crate::table::DotRecord;

/// Inclusion range of one feature.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FeatureRange {
    pub feature: NuclearFeature,
    /// Feature value at the density maximum.
    pub peak: Option<f64>,
    /// Inclusive `[low, high]` bounds; `None` when the registry is empty.
    pub range: Option<[f64; 2]>,
    /// Nuclei within this feature's range.
    pub n_in_range: usize,
}

/// Outcome of a gating run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GatingReport {
    pub n_nuclei: usize,
    pub n_selected: usize,
    pub ranges: Vec<FeatureRange>,
}

/// Select the nuclei that are in range for every configured feature.
pub fn select_g1(registry: &NucleusRegistry, cfg: &GatingConfig) -> (HashSet<NucleusKey>, GatingReport) {
    let mut selected = vec![true; registry.len()];
    let mut ranges = Vec::with_capacity(cfg.features.len());

    for &feature in &cfg.features {
        let values = registry.feature_values(feature);
        let density = kernel_density(&values, cfg.sigma, cfg.grid_points);
        let peak = density.as_ref().and_then(Density::peak);
        let range = density.as_ref().and_then(Density::fwhm);
        let mut n_in_range = 0usize;
        for (keep, &v) in selected.iter_mut().zip(&values) {
            let inside = range.map_or(false, |[lo, hi]| v >= lo && v <= hi);
            if inside {
                n_in_range += 1;
            }
            *keep &= inside;
        }
        if let Some([lo, hi]) = range {
            tracing::info!(
                "Nuclear {} range: [{:.3}, {:.3}] ({} of {} nuclei)",
                feature.name(),
                lo,
                hi,
                n_in_range,
                values.len()
            );
        }
        ranges.push(FeatureRange {
            feature,
            peak,
            range,
            n_in_range,
        });
    }

    let keys: HashSet<NucleusKey> = registry
        .iter()
        .zip(&selected)
        .filter(|&(_, &keep)| keep)
        .map(|(n, _)| NucleusKey {
            fov: n.fov,
            label: n.label,
        })
        .collect();

    tracing::info!("Selected {} G1 nuclei of {}", keys.len(), registry.len());
    let report = GatingReport {
        n_nuclei: registry.len(),
        n_selected: keys.len(),
        ranges,
    };
    (keys, report)
}

/// Set the G1 flag of every dot whose nucleus was selected; all others get 0.
pub fn flag_dots(records: &mut [DotRecord], selected: &HashSet<NucleusKey>) {
    for rec in records.iter_mut() {
        rec.g1 = match rec.cell_id {
            Some(label) if label > 0 => {
                let key = NucleusKey {
                    fov: rec.fov,
                    label,
                };
                u8::from(selected.contains(&key))
            }
            _ => 0,
        };
    }
}
