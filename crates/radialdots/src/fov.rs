//! Per-field-of-view analysis.
//!
//! One stack is binarized, its nuclei labeled and described, every dot of
//! the field assigned to a nucleus, and lamina distances computed under the
//! anisotropic voxel spacing. Without dilation dots are assigned by direct
//! label lookup and distances come from one transform of the whole field.
//! With dilation each nucleus is dilated on its own; dots go to the first
//! nucleus (ascending label) whose box contains them and distances come from
//! that nucleus' own mask.

use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::config::AnalysisConfig;
use crate::edt::distance_transform;
use crate::error::FovError;
use crate::label::label_components;
use crate::mask_png;
use crate::nucleus::{extract_nuclei, Nucleus, NucleusContext};
use crate::segment::Segmenter;
use crate::stack_io::{read_stack, rescaling_factor};
use crate::table::DotRecord;
use crate::volume::{pad_z, unpad_z, voxel_index, LabelVolume, Mask, Spacing, Stack};

/// Work item for one field of view.
#[derive(Debug, Clone)]
pub struct FovTask {
    pub fov: u32,
    /// Matching image, if any was found.
    pub image: Option<PathBuf>,
    /// Rows of the master table this field owns.
    pub indices: Vec<usize>,
    /// Copies of those rows.
    pub dots: Vec<DotRecord>,
}

/// Result of a successful field-of-view analysis.
#[derive(Debug)]
pub struct FovOutcome {
    pub fov: u32,
    pub nuclei: Vec<Nucleus>,
    /// Binarization threshold of the rescaled stack.
    pub threshold: f64,
    pub dna_bg: f64,
    /// Master-table rows of `dots`, in the same order.
    pub indices: Vec<usize>,
    pub dots: Vec<DotRecord>,
}

/// Intermediate products of [`analyze_stack`].
#[derive(Debug)]
pub struct FovAnalysis {
    pub nuclei: Vec<Nucleus>,
    /// Size-filtered binary mask.
    pub mask: Mask,
    pub labels: LabelVolume,
    pub threshold: f64,
    pub dna_bg: f64,
}

/// Read, rescale and analyze one field of view.
///
/// When `masks_dir` is set, mask projections are written there; export
/// failures are logged and do not fail the field.
pub fn analyze_field_of_view(
    task: FovTask,
    config: &AnalysisConfig,
    segmenter: &dyn Segmenter,
    masks_dir: Option<&Path>,
) -> Result<FovOutcome, FovError> {
    let FovTask {
        fov,
        image,
        indices,
        mut dots,
    } = task;
    let path = image.ok_or(FovError::NoMatchingImage)?;
    tracing::info!("Analyzing field {} from {}", fov, path.display());

    let mut stack = read_stack(&path)?;
    let factor = rescaling_factor(&path);
    if factor != 1.0 {
        tracing::debug!("fov {}: rescaling by {}", fov, factor);
        let factor = factor as f32;
        stack.mapv_inplace(|v| v / factor);
    }

    let analysis = analyze_stack(fov, &stack, &mut dots, config, segmenter)?;

    if let Some(dir) = masks_dir {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{:03}", fov));
        if let Err(e) = mask_png::export_masks(dir, &name, &analysis, config.dilation) {
            tracing::warn!("fov {}: mask export failed: {}", fov, e);
        }
    }

    Ok(FovOutcome {
        fov,
        nuclei: analysis.nuclei,
        threshold: analysis.threshold,
        dna_bg: analysis.dna_bg,
        indices,
        dots,
    })
}

/// Analyze an in-memory stack and fill the analysis fields of `dots`.
pub fn analyze_stack(
    fov: u32,
    stack: &Stack,
    dots: &mut [DotRecord],
    config: &AnalysisConfig,
    segmenter: &dyn Segmenter,
) -> Result<FovAnalysis, FovError> {
    let bin = segmenter.binarize(stack)?;
    for line in bin.log.lines() {
        tracing::debug!("fov {}: {}", fov, line.trim());
    }
    let dna_bg = segmenter.estimate_background(stack, &bin.mask);
    let mask = segmenter.filter_z_size(segmenter.filter_xy_size(bin.mask));

    let (labels, count) = label_components(&mask);
    tracing::info!(
        "fov {}: threshold {:.3}, background {:.2}, {} nuclei",
        fov,
        bin.threshold,
        dna_bg,
        count
    );

    let ctx = NucleusContext {
        fov,
        image: stack,
        spacing: config.spacing,
        dna_bg,
        dilation: config.dilation,
        margin: config.box_margin,
    };
    let mut nuclei = extract_nuclei(&labels, count, &ctx);

    if config.dilation == 0 {
        measure_undilated(fov, &mask, &labels, &mut nuclei, dots, &config.spacing);
    } else {
        measure_dilated(fov, stack.dim(), &mut nuclei, dots, &config.spacing);
    }

    let assigned = dots.iter().filter(|d| d.is_assigned()).count();
    tracing::info!("fov {}: {} of {} dots inside nuclei", fov, assigned, dots.len());

    Ok(FovAnalysis {
        nuclei,
        mask,
        labels,
        threshold: bin.threshold,
        dna_bg,
    })
}

/// Lamina distance of every voxel, with one empty slice padded above and
/// below so foreground on the first and last slice keeps a finite distance.
fn lamina_distance(mask: &Mask, spacing: &Spacing) -> Array3<f64> {
    unpad_z(&distance_transform(&pad_z(mask), spacing))
}

fn measure_undilated(
    fov: u32,
    mask: &Mask,
    labels: &LabelVolume,
    nuclei: &mut [Nucleus],
    dots: &mut [DotRecord],
    spacing: &Spacing,
) {
    let dist = lamina_distance(mask, spacing);

    let mut max_dist = vec![0.0f64; nuclei.len() + 1];
    for (&l, &d) in labels.iter().zip(dist.iter()) {
        let l = l as usize;
        if l > 0 && l < max_dist.len() && d > max_dist[l] {
            max_dist[l] = d;
        }
    }
    for n in nuclei.iter_mut() {
        n.summary.max_lamin_dist = max_dist[n.label as usize];
    }

    for dot in dots.iter_mut() {
        let Some(p) = voxel_index(dot.coords, labels.dim()) else {
            tracing::warn!("fov {}: dot at {:?} lies outside the stack", fov, dot.coords);
            dot.set_unassigned();
            continue;
        };
        match labels[p] {
            0 => dot.set_unassigned(),
            cell => dot.set_distances(cell, dist[p], max_dist[cell as usize]),
        }
    }
}

fn measure_dilated(
    fov: u32,
    dim: (usize, usize, usize),
    nuclei: &mut [Nucleus],
    dots: &mut [DotRecord],
    spacing: &Spacing,
) {
    let dists: Vec<Array3<f64>> = nuclei
        .iter_mut()
        .map(|n| {
            let d = lamina_distance(&n.mask, spacing);
            n.summary.max_lamin_dist = d.iter().copied().fold(0.0, f64::max);
            d
        })
        .collect();

    for dot in dots.iter_mut() {
        let Some(p) = voxel_index(dot.coords, dim) else {
            tracing::warn!("fov {}: dot at {:?} lies outside the stack", fov, dot.coords);
            dot.set_unassigned();
            continue;
        };
        let hit = nuclei
            .iter()
            .zip(&dists)
            .find_map(|(n, d)| n.bbox.to_local(p).map(|local| (n, d[local])));
        match hit {
            Some((n, d)) => dot.set_distances(n.label, d, n.summary.max_lamin_dist),
            None => dot.set_unassigned(),
        }
    }
}
