//! Shared fixtures for unit tests: synthetic stacks, TIFF files and nuclei.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::geometry::VoxelBox;
use crate::nucleus::{NuclearSummary, Nucleus};
use crate::volume::{Mask, Stack};

pub(crate) const BACKGROUND: f32 = 100.0;
pub(crate) const FOREGROUND: f32 = 1000.0;

/// Stack of `dim` voxels with `FOREGROUND` inside each `(center, radii)`
/// ellipsoid and `BACKGROUND` elsewhere. Coordinates are `(z, row, col)`.
pub(crate) fn ellipsoid_stack(dim: (usize, usize, usize), ellipsoids: &[([f64; 3], [f64; 3])]) -> Stack {
    Stack::from_shape_fn(dim, |(z, r, c)| {
        let p = [z as f64, r as f64, c as f64];
        let inside = ellipsoids.iter().any(|(center, radii)| {
            (0..3)
                .map(|k| {
                    let u = (p[k] - center[k]) / radii[k];
                    u * u
                })
                .sum::<f64>()
                <= 1.0
        });
        if inside {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Write 16-bit pages (row-major, `width * height` each) as a multi-page TIFF.
pub(crate) fn write_tiff_stack(path: &Path, width: u32, height: u32, pages: &[Vec<u16>]) {
    let mut tiff = TiffEncoder::new(BufWriter::new(File::create(path).unwrap())).unwrap();
    for page in pages {
        tiff.write_image::<colortype::Gray16>(width, height, page).unwrap();
    }
}

/// Like [`write_tiff_stack`], with an ImageDescription on the first page.
pub(crate) fn write_tiff_stack_with_description(
    path: &Path,
    width: u32,
    height: u32,
    pages: &[Vec<u16>],
    description: &str,
) {
    let mut tiff = TiffEncoder::new(BufWriter::new(File::create(path).unwrap())).unwrap();
    for (i, page) in pages.iter().enumerate() {
        let mut image = tiff.new_image::<colortype::Gray16>(width, height).unwrap();
        if i == 0 {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description)
                .unwrap();
        }
        image.write_data(page).unwrap();
    }
}

/// One-voxel nucleus carrying the given flat size and intensity integral.
pub(crate) fn nucleus_with_summary(fov: u32, label: u32, flat_size: f64, sum_i: f64) -> Nucleus {
    Nucleus {
        fov,
        label,
        bbox: VoxelBox::point([0, 0, 0]),
        mask: Mask::from_elem((1, 1, 1), true),
        summary: NuclearSummary {
            s: fov,
            n: label,
            flat_size,
            size: flat_size,
            volume: flat_size,
            sum_i,
            flat_sum_i: sum_i,
            mean_i: sum_i / flat_size.max(1.0),
            dna_bg: 0.0,
            max_lamin_dist: 1.0,
        },
    }
}
