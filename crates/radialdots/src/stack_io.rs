//! Reading image stacks and their intensity rescaling factor.
//!
//! Stacks are multi-page TIFF files, one page per z-slice. ImageJ
//! hyperstacks with several time frames are reduced to the brightest frame.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::Array3;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::FovError;
use crate::volume::Stack;

/// Decode a multi-page TIFF into a `(z, row, col)` stack.
///
/// A single page yields a one-slice stack.
pub fn read_stack(path: &Path) -> Result<Stack, FovError> {
    let read_err = |reason: String| FovError::Read {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| read_err(e.to_string()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| read_err(e.to_string()))?
        .with_limits(Limits::unlimited());

    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();
    let (width, height) = decoder.dimensions().map_err(|e| read_err(e.to_string()))?;
    let plane_len = width as usize * height as usize;

    let mut planes: Vec<Vec<f32>> = Vec::new();
    loop {
        let dims = decoder.dimensions().map_err(|e| read_err(e.to_string()))?;
        if dims != (width, height) {
            return Err(read_err(format!(
                "page {} is {}x{}, expected {}x{}",
                planes.len(),
                dims.0,
                dims.1,
                width,
                height
            )));
        }
        let plane = to_intensities(decoder.read_image().map_err(|e| read_err(e.to_string()))?)?;
        if plane.len() != plane_len {
            return Err(FovError::UnsupportedSampleFormat);
        }
        planes.push(plane);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| read_err(e.to_string()))?;
    }

    if let Some(frames) = description.as_deref().and_then(imagej_frames) {
        planes = select_frame(planes, frames);
    }
    if planes.is_empty() || plane_len == 0 {
        return Err(FovError::EmptyStack);
    }

    let depth = planes.len();
    let data: Vec<f32> = planes.into_iter().flatten().collect();
    let stack = Array3::from_shape_vec((depth, height as usize, width as usize), data)
        .map_err(|e| read_err(e.to_string()))?;
    tracing::debug!("Read {} with shape {:?}", path.display(), stack.dim());
    Ok(stack)
}

fn to_intensities(result: DecodingResult) -> Result<Vec<f32>, FovError> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => return Err(FovError::UnsupportedSampleFormat),
    };
    Ok(values)
}

/// Number of time frames declared in an ImageJ description (`frames=N`).
pub fn imagej_frames(description: &str) -> Option<usize> {
    description
        .lines()
        .filter_map(|line| line.trim().strip_prefix("frames="))
        .find_map(|v| v.trim().parse().ok())
}

/// Keep the frame with the highest summed intensity.
///
/// Planes are in ImageJ order, so each frame is a contiguous run. Inputs
/// that do not split evenly into `frames` are returned unchanged.
pub fn select_frame(planes: Vec<Vec<f32>>, frames: usize) -> Vec<Vec<f32>> {
    if frames <= 1 || planes.is_empty() || planes.len() % frames != 0 {
        return planes;
    }
    let per_frame = planes.len() / frames;
    let sum = |chunk: &[Vec<f32>]| -> f64 {
        chunk.iter().flatten().map(|&v| v as f64).sum()
    };
    let best = planes
        .chunks(per_frame)
        .enumerate()
        .fold((0usize, f64::MIN), |best, (i, chunk)| {
            let s = sum(chunk);
            if s > best.1 {
                (i, s)
            } else {
                best
            }
        })
        .0;
    tracing::debug!("Selected time frame {} of {}", best, frames);
    planes
        .into_iter()
        .skip(best * per_frame)
        .take(per_frame)
        .collect()
}

/// Intensity divisor of an image, read from `<stem>_history.txt` next to it.
///
/// Deconvolution histories record the stretch to integer type followed by a
/// line ending with the factor. Missing files or entries give 1.
pub fn rescaling_factor(image: &Path) -> f64 {
    let Some(stem) = image.file_stem().and_then(|s| s.to_str()) else {
        return 1.0;
    };
    let history = image.with_file_name(format!("{}_history.txt", stem));
    let Ok(text) = std::fs::read_to_string(&history) else {
        return 1.0;
    };
    match parse_rescaling_factor(&text) {
        Some(f) if f.is_finite() && f > 0.0 => {
            tracing::debug!("Rescaling factor {} from {}", f, history.display());
            f
        }
        _ => 1.0,
    }
}

fn parse_rescaling_factor(history: &str) -> Option<f64> {
    let mut lines = history.lines();
    lines.find(|l| l.contains("Stretched to Integer type"))?;
    let line = lines.find(|l| l.contains("factor"))?;
    line.split_whitespace()
        .rev()
        .find_map(|tok| tok.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{write_tiff_stack, write_tiff_stack_with_description};

    #[test]
    fn reads_pages_as_slices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001.tif");
        let pages: Vec<Vec<u16>> = (0..3u16).map(|z| vec![z * 10; 4 * 5]).collect();
        write_tiff_stack(&path, 5, 4, &pages);

        let stack = read_stack(&path).unwrap();
        assert_eq!(stack.dim(), (3, 4, 5));
        assert_eq!(stack[[2, 3, 4]], 20.0);
        assert_eq!(stack[[0, 0, 0]], 0.0);
    }

    #[test]
    fn single_page_is_one_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("002.tif");
        write_tiff_stack(&path, 3, 2, &[vec![7u16; 6]]);
        assert_eq!(read_stack(&path).unwrap().dim(), (1, 2, 3));
    }

    #[test]
    fn brightest_imagej_frame_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("003.tif");
        let pages = vec![vec![1u16; 4], vec![1; 4], vec![9; 4], vec![8; 4]];
        write_tiff_stack_with_description(
            &path,
            2,
            2,
            &pages,
            "ImageJ=1.52\nimages=4\nslices=2\nframes=2\n",
        );
        let stack = read_stack(&path).unwrap();
        assert_eq!(stack.dim(), (2, 2, 2));
        assert_eq!(stack[[0, 0, 0]], 9.0);
        assert_eq!(stack[[1, 1, 1]], 8.0);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_stack(Path::new("/nonexistent/004.tif")).unwrap_err();
        assert!(matches!(err, FovError::Read { .. }));
    }

    #[test]
    fn frame_count_from_description() {
        assert_eq!(imagej_frames("ImageJ=1.52\nframes=3\nloop=false"), Some(3));
        assert_eq!(imagej_frames("ImageJ=1.52\nslices=3"), None);
    }

    #[test]
    fn uneven_frames_are_left_alone() {
        let planes = vec![vec![1.0f32], vec![2.0], vec![3.0]];
        assert_eq!(select_frame(planes.clone(), 2), planes);
    }

    #[test]
    fn rescaling_factor_from_history() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("005.tif");
        std::fs::write(
            dir.path().join("005_history.txt"),
            "Deconvolution\nStretched to Integer type\nUsing scaling factor: 2.5\nfactor 9\n",
        )
        .unwrap();
        assert_eq!(rescaling_factor(&image), 2.5);
        assert_eq!(rescaling_factor(&dir.path().join("006.tif")), 1.0);
    }

    #[test]
    fn history_without_stretch_entry_gives_none() {
        assert_eq!(parse_rescaling_factor("scaling factor: 3\n"), None);
        assert_eq!(
            parse_rescaling_factor("Stretched to Integer type\nno number\nfactor = 4.0.\n"),
            Some(4.0)
        );
    }
}
