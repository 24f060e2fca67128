//! radialdots: radial position of FISH dots inside 3D-segmented nuclei.
//!
//! Input is a table of dot voxel coordinates and a directory holding one
//! image stack per field of view. For every dot the crate computes the
//! containing nucleus, its distance from the nuclear lamina and the
//! distance normalized by the nucleus-wide maximum. The stages are:
//!
//! 1. **Segmentation** – Otsu binarization, hole filling, border clearing
//!    and object-size filtering ([`segment`]).
//! 2. **Nuclei** – 3D connected components, optional per-nucleus cube
//!    dilation, bounding boxes and morphometric summaries ([`nucleus`]).
//! 3. **Distances** – exact Euclidean distance transform under anisotropic
//!    voxel spacing ([`edt`]).
//! 4. **Gating** – optional G1 selection from the FWHM ranges of nuclear
//!    size and intensity densities ([`gating`]).
//! 5. **Alleles** – central/peripheral labels for dot pairs ([`allele`]).
//!
//! Fields of view are analyzed in parallel and merged back into the table
//! by row index ([`pipeline`]).

pub mod allele;
pub mod config;
pub mod density;
pub mod edt;
pub mod error;
pub mod fov;
pub mod gating;
pub mod geometry;
pub mod label;
pub mod mask_png;
pub mod morphology;
pub mod nucleus;
pub mod pipeline;
pub mod registry;
pub mod segment;
pub mod stack_io;
pub mod table;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{AnalysisConfig, GatingConfig, SegmentationConfig};
pub use error::{Error, FovError, Result};
pub use nucleus::{NuclearFeature, NuclearSummary, Nucleus};
pub use pipeline::{run, run_with_segmenter, RunPaths, RunReport};
pub use segment::{OtsuSegmenter, Segmenter};
pub use table::{DotRecord, DotTable};
pub use volume::Spacing;
