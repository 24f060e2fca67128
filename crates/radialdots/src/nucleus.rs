//! Nucleus descriptors built from a labeled field of view.
//!
//! Every nucleus carries its own bounding box and a mask cropped to that box,
//! whether or not dilation is enabled. Dilation is applied to each isolated
//! label independently, so overlapping dilated nuclei never merge.

use ndarray::s;

use crate::geometry::VoxelBox;
use crate::morphology::dilate_cube;
use crate::volume::{LabelVolume, Mask, Spacing, Stack};

/// Morphometric features available for population gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NuclearFeature {
    /// Area of the XY projection (voxels).
    FlatSize,
    /// Voxel count.
    Size,
    /// Physical volume.
    Volume,
    /// Integrated intensity.
    SumI,
    /// Integrated intensity of the max projection over the flattened mask.
    FlatSumI,
    /// Mean intensity.
    MeanI,
}

impl NuclearFeature {
    /// Human-readable name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::FlatSize => "flatten size",
            Self::Size => "size",
            Self::Volume => "volume",
            Self::SumI => "intensity integral",
            Self::FlatSumI => "flatten intensity integral",
            Self::MeanI => "mean intensity",
        }
    }
}

/// Per-nucleus summary row.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NuclearSummary {
    /// Field-of-view id.
    pub s: u32,
    /// Label within the field of view.
    pub n: u32,
    pub flat_size: f64,
    pub size: f64,
    pub volume: f64,
    pub sum_i: f64,
    pub flat_sum_i: f64,
    pub mean_i: f64,
    /// Background intensity estimate of the field.
    pub dna_bg: f64,
    /// Largest lamina distance inside the nucleus.
    pub max_lamin_dist: f64,
}

impl NuclearSummary {
    /// Value of one gating feature.
    pub fn feature(&self, f: NuclearFeature) -> f64 {
        match f {
            NuclearFeature::FlatSize => self.flat_size,
            NuclearFeature::Size => self.size,
            NuclearFeature::Volume => self.volume,
            NuclearFeature::SumI => self.sum_i,
            NuclearFeature::FlatSumI => self.flat_sum_i,
            NuclearFeature::MeanI => self.mean_i,
        }
    }
}

/// One segmented (and possibly dilated) nucleus.
#[derive(Debug, Clone)]
pub struct Nucleus {
    /// Field-of-view id.
    pub fov: u32,
    /// Label id, `1..=n` within the field.
    pub label: u32,
    /// Bounding box of the mask plus margin, clipped to the stack.
    pub bbox: VoxelBox,
    /// Mask cropped to `bbox`.
    pub mask: Mask,
    /// Morphometric summary.
    pub summary: NuclearSummary,
}

impl Nucleus {
    /// Mask value at a global voxel; `false` outside the box.
    #[cfg(test)]
    pub(crate) fn mask_at(&self, p: [usize; 3]) -> bool {
        self.bbox.to_local(p).map(|l| self.mask[l]).unwrap_or(false)
    }
}

/// Inputs shared by every nucleus of one field.
pub struct NucleusContext<'a> {
    pub fov: u32,
    pub image: &'a Stack,
    pub spacing: Spacing,
    pub dna_bg: f64,
    /// Dilation cube side; 0 disables dilation.
    pub dilation: usize,
    /// Margin added around each box.
    pub margin: usize,
}

/// Tight bounding box of each label, indexed by `label - 1`.
pub fn label_boxes(labels: &LabelVolume, count: u32) -> Vec<Option<VoxelBox>> {
    let mut boxes: Vec<Option<VoxelBox>> = vec![None; count as usize];
    for ((z, r, c), &l) in labels.indexed_iter() {
        if l == 0 || l > count {
            continue;
        }
        let p = [z, r, c];
        boxes[(l - 1) as usize]
            .get_or_insert(VoxelBox::point(p))
            .include(p);
    }
    boxes
}

/// Build one descriptor per label, in ascending label order.
pub fn extract_nuclei(labels: &LabelVolume, count: u32, ctx: &NucleusContext<'_>) -> Vec<Nucleus> {
    let dim = labels.dim();
    let shape = [dim.0, dim.1, dim.2];
    // Room for the dilation reach plus the box margin around the label.
    let reach = ctx.dilation / 2 + ctx.margin;

    label_boxes(labels, count)
        .into_iter()
        .enumerate()
        .filter_map(|(i, tight)| {
            let label = i as u32 + 1;
            let region = tight?.expanded(reach, shape);
            let local = labels
                .slice(s![
                    region.min[0]..=region.max[0],
                    region.min[1]..=region.max[1],
                    region.min[2]..=region.max[2]
                ])
                .mapv(|l| l == label);
            let local = dilate_cube(&local, ctx.dilation);
            build_nucleus(label, region, &local, shape, ctx)
        })
        .collect()
}

/// Crop a region-local mask to its own box (plus margin) and summarize it.
fn build_nucleus(
    label: u32,
    region: VoxelBox,
    local: &Mask,
    shape: [usize; 3],
    ctx: &NucleusContext<'_>,
) -> Option<Nucleus> {
    let mut tight: Option<VoxelBox> = None;
    for ((z, r, c), &v) in local.indexed_iter() {
        if !v {
            continue;
        }
        let p = [region.min[0] + z, region.min[1] + r, region.min[2] + c];
        tight.get_or_insert(VoxelBox::point(p)).include(p);
    }
    let bbox = tight?.expanded(ctx.margin, shape);

    let off = [
        bbox.min[0] - region.min[0],
        bbox.min[1] - region.min[1],
        bbox.min[2] - region.min[2],
    ];
    let ext = bbox.shape();
    let mask = local
        .slice(s![
            off[0]..off[0] + ext[0],
            off[1]..off[1] + ext[1],
            off[2]..off[2] + ext[2]
        ])
        .to_owned();

    let summary = summarize(ctx, label, &bbox, &mask);
    tracing::debug!(
        "fov {} nucleus {}: box {:?}..{:?}, {} voxels",
        ctx.fov,
        label,
        bbox.min,
        bbox.max,
        summary.size
    );
    Some(Nucleus {
        fov: ctx.fov,
        label,
        bbox,
        mask,
        summary,
    })
}

fn summarize(ctx: &NucleusContext<'_>, label: u32, bbox: &VoxelBox, mask: &Mask) -> NuclearSummary {
    let (nz, nr, nc) = mask.dim();
    let mut size = 0usize;
    let mut flat_size = 0usize;
    let mut sum_i = 0.0f64;
    let mut flat_sum_i = 0.0f64;

    for r in 0..nr {
        for c in 0..nc {
            let mut column_max: Option<f32> = None;
            for z in 0..nz {
                if !mask[[z, r, c]] {
                    continue;
                }
                let v = ctx.image[[bbox.min[0] + z, bbox.min[1] + r, bbox.min[2] + c]];
                size += 1;
                sum_i += v as f64;
                column_max = Some(column_max.map_or(v, |m| m.max(v)));
            }
            if let Some(m) = column_max {
                flat_size += 1;
                flat_sum_i += m as f64;
            }
        }
    }

    NuclearSummary {
        s: ctx.fov,
        n: label,
        flat_size: flat_size as f64,
        size: size as f64,
        volume: size as f64 * ctx.spacing.voxel_volume(),
        sum_i,
        flat_sum_i,
        mean_i: if size > 0 { sum_i / size as f64 } else { 0.0 },
        dna_bg: ctx.dna_bg,
        max_lamin_dist: 0.0,
    }
}
