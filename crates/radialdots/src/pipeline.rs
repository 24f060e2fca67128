//! Run driver: image matching, parallel field analysis, merge, gating,
//! allele labeling and output.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::allele::add_allele;
use crate::config::AnalysisConfig;
use crate::error::{Error, FovError, Result};
use crate::fov::{analyze_field_of_view, FovOutcome, FovTask};
use crate::gating::{flag_dots, select_g1, GatingReport};
use crate::registry::NucleusRegistry;
use crate::segment::{OtsuSegmenter, Segmenter};
use crate::table::DotTable;

/// Input and output locations of a run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Dot table.
    pub table: PathBuf,
    /// Directory holding one stack per field of view.
    pub image_dir: PathBuf,
    /// Output directory; created if missing.
    pub out_dir: PathBuf,
}

/// A field of view whose analysis failed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FovFailure {
    pub fov: u32,
    pub image: Option<PathBuf>,
    pub error: String,
}

/// Segmentation outcome of one analyzed field of view.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FieldSummary {
    pub fov: u32,
    pub threshold: f64,
    pub dna_bg: f64,
    pub n_nuclei: usize,
}

/// Summary of a run, written as `run_report.json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub nuclei_table: Option<PathBuf>,
    pub dilation: usize,
    pub threads: usize,
    pub n_dots: usize,
    pub n_assigned: usize,
    pub n_nuclei: usize,
    pub fovs_processed: Vec<u32>,
    pub fields: Vec<FieldSummary>,
    pub failures: Vec<FovFailure>,
    pub gating: Option<GatingReport>,
}

/// Fields analyzed in one batch.
#[derive(Debug, Default)]
pub struct Batch {
    pub registry: NucleusRegistry,
    pub processed: Vec<u32>,
    pub fields: Vec<FieldSummary>,
    pub failures: Vec<FovFailure>,
    pub threads: usize,
}

/// Names of the stack files in `dir`: regular files with `tif` in the name,
/// sorted.
pub fn list_images(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains("tif") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// First image whose name contains the zero-padded field id.
pub fn match_image(fov: u32, names: &[String]) -> Option<&str> {
    let key = format!("{:03}", fov);
    let mut hits = names.iter().filter(|n| n.contains(&key));
    let first = hits.next()?;
    let extra = hits.count();
    if extra > 0 {
        tracing::warn!(
            "Field {} matches {} images; using '{}'",
            fov,
            extra + 1,
            first
        );
    }
    Some(first)
}

/// Analyze every field of view of `table` in parallel and merge the
/// results back by row index.
///
/// Rows of failed fields keep an undefined cell id.
pub fn analyze_table(
    table: &mut DotTable,
    image_dir: &Path,
    images: &[String],
    config: &AnalysisConfig,
    segmenter: &dyn Segmenter,
    masks_dir: Option<&Path>,
) -> Result<Batch> {
    table.start_analysis(config.dilation);
    let tasks: Vec<FovTask> = table
        .fov_groups()
        .into_iter()
        .map(|(fov, indices)| FovTask {
            fov,
            image: match_image(fov, images).map(|n| image_dir.join(n)),
            dots: table.subset(&indices),
            indices,
        })
        .collect();

    let threads = config.effective_threads();
    tracing::info!("Analyzing {} fields of view on {} threads", tasks.len(), threads);
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Config(format!("cannot build thread pool: {}", e)))?;

    let results: Vec<(u32, Option<PathBuf>, std::result::Result<FovOutcome, FovError>)> =
        pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| {
                    let fov = task.fov;
                    let image = task.image.clone();
                    (
                        fov,
                        image,
                        analyze_field_of_view(task, config, segmenter, masks_dir),
                    )
                })
                .collect()
        });

    let mut batch = Batch {
        threads,
        ..Default::default()
    };
    for (fov, image, result) in results {
        match result {
            Ok(outcome) => {
                table.merge(&outcome.indices, outcome.dots);
                batch.fields.push(FieldSummary {
                    fov,
                    threshold: outcome.threshold,
                    dna_bg: outcome.dna_bg,
                    n_nuclei: outcome.nuclei.len(),
                });
                batch.registry.extend(outcome.nuclei);
                batch.processed.push(fov);
            }
            Err(e) => {
                tracing::error!("Field {} failed: {}", fov, e);
                batch.failures.push(FovFailure {
                    fov,
                    image,
                    error: e.to_string(),
                });
            }
        }
    }
    tracing::info!(
        "Processed {} fields, {} failed, {} nuclei",
        batch.processed.len(),
        batch.failures.len(),
        batch.registry.len()
    );
    Ok(batch)
}

/// Run the full analysis with the default segmenter.
pub fn run(paths: &RunPaths, config: &AnalysisConfig) -> Result<RunReport> {
    let segmenter = OtsuSegmenter::new(config.segmentation.clone());
    run_with_segmenter(paths, config, &segmenter)
}

/// Run the full analysis and write every output under `paths.out_dir`.
pub fn run_with_segmenter(
    paths: &RunPaths,
    config: &AnalysisConfig,
    segmenter: &dyn Segmenter,
) -> Result<RunReport> {
    config.validate()?;
    let mut table = DotTable::read(&paths.table, config.delimiter as u8)?;

    std::fs::create_dir_all(&paths.out_dir)?;
    let masks_dir = if config.no_plot {
        None
    } else {
        let dir = paths.out_dir.join("masks");
        std::fs::create_dir_all(&dir)?;
        Some(dir)
    };

    let images = list_images(&paths.image_dir)?;
    tracing::info!("Found {} images in {}", images.len(), paths.image_dir.display());

    let batch = analyze_table(
        &mut table,
        &paths.image_dir,
        &images,
        config,
        segmenter,
        masks_dir.as_deref(),
    )?;
    if config.fail_fast && !batch.failures.is_empty() {
        return Err(Error::FieldsFailed(
            batch.failures.iter().map(|f| f.fov).collect(),
        ));
    }

    let input_name = paths
        .table
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dots.tsv".to_string());
    let d = config.dilation;

    let mut gating = None;
    let mut nuclei_table = None;
    if config.select_g1 {
        let path = paths
            .out_dir
            .join(format!("nuclei.out.dilate{}.{}", d, input_name));
        batch.registry.write_summary_tsv(&path)?;
        nuclei_table = Some(path);

        let (selected, report) = select_g1(&batch.registry, &config.gating);
        flag_dots(table.records_mut(), &selected);
        table.set_gated(true);
        gating = Some(report);
    }

    add_allele(&mut table);

    let output = paths
        .out_dir
        .join(format!("wCentr.out.dilate{}.{}", d, input_name));
    table.write_tsv(&output)?;
    tracing::info!("Wrote {} dots to {}", table.len(), output.display());

    let report = RunReport {
        input: paths.table.clone(),
        output,
        nuclei_table,
        dilation: d,
        threads: batch.threads,
        n_dots: table.len(),
        n_assigned: table.records().iter().filter(|r| r.is_assigned()).count(),
        n_nuclei: batch.registry.len(),
        fovs_processed: batch.processed,
        fields: batch.fields,
        failures: batch.failures,
        gating,
    };
    let report_path = paths.out_dir.join("run_report.json");
    let file = std::fs::File::create(&report_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
    Ok(report)
}
