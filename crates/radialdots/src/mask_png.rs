//! Z max-projection PNGs of field-of-view masks.

use std::path::Path;

use image::{GrayImage, Luma};
use ndarray::Axis;

use crate::error::Result;
use crate::fov::FovAnalysis;
use crate::morphology::dilate_cube;
use crate::volume::{LabelVolume, Mask};

/// Write a binary mask as a white-on-black max projection.
pub fn save_mask_png(path: &Path, mask: &Mask) -> Result<()> {
    let proj = mask.fold_axis(Axis(0), false, |&a, &b| a || b);
    let (h, w) = proj.dim();
    let img = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([if proj[[y as usize, x as usize]] { 255 } else { 0 }])
    });
    img.save(path)?;
    Ok(())
}

/// Write a label volume as a max projection with labels spread over 1..=255.
pub fn save_label_png(path: &Path, labels: &LabelVolume) -> Result<()> {
    let proj = labels.fold_axis(Axis(0), 0u32, |&a, &b| a.max(b));
    let top = proj.iter().copied().max().unwrap_or(0).max(1) as f64;
    let (h, w) = proj.dim();
    let img = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let l = proj[[y as usize, x as usize]];
        let v = if l == 0 {
            0
        } else {
            (l as f64 / top * 254.0).round() as u8 + 1
        };
        Luma([v])
    });
    img.save(path)?;
    Ok(())
}

/// Write the default, dilated (when `dilation > 0`) and label projections
/// of one field as `mask.<image>.{default,dilated<d>,nuclei}.png`.
pub fn export_masks(dir: &Path, image: &str, analysis: &FovAnalysis, dilation: usize) -> Result<()> {
    save_mask_png(&dir.join(format!("mask.{}.default.png", image)), &analysis.mask)?;
    if dilation > 0 {
        let dilated = dilate_cube(&analysis.mask, dilation);
        save_mask_png(
            &dir.join(format!("mask.{}.dilated{}.png", image, dilation)),
            &dilated,
        )?;
    }
    save_label_png(&dir.join(format!("mask.{}.nuclei.png", image)), &analysis.labels)
}
