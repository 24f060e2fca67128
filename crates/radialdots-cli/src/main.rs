//! radialdots CLI: lamina distance and allele labels for FISH dot tables.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use radialdots::{AnalysisConfig, RunPaths, Spacing};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "radialdots")]
#[command(
    about = "Assign FISH dots to segmented nuclei and compute their radial position (lamina distance)"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a dot table against a directory of image stacks.
    Run(CliRunArgs),

    /// Print the default analysis configuration (JSON).
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct CliRunArgs {
    /// Dot coordinates table (delimited text with File, Channel, x, y, z).
    dot_table: PathBuf,

    /// Directory with one image stack per field of view.
    image_dir: PathBuf,

    /// Output directory.
    out_dir: PathBuf,

    /// JSON configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Physical voxel size, in Z Y X order.
    #[arg(short, long, num_args = 3, value_names = ["Z", "Y", "X"])]
    aspect: Option<Vec<f64>>,

    /// Input table delimiter.
    #[arg(short, long)]
    delim: Option<char>,

    /// Side of the cube used to dilate each nucleus (0 disables dilation).
    #[arg(long)]
    dilate: Option<usize>,

    /// Number of worker threads.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Flag dots in the dominant (G1) nuclear population.
    #[arg(short = 's', long = "select-g1")]
    select_g1: bool,

    /// Do not write mask PNGs.
    #[arg(long)]
    noplot: bool,

    /// Exit with an error if any field of view fails.
    #[arg(long)]
    fail_fast: bool,
}

impl CliRunArgs {
    fn to_config(&self) -> CliResult<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(aspect) = &self.aspect {
            let [z, y, x]: [f64; 3] = aspect
                .as_slice()
                .try_into()
                .map_err(|_| -> CliError { "--aspect takes exactly three values".into() })?;
            config.spacing = Spacing::new([z, y, x]);
        }
        if let Some(delim) = self.delim {
            config.delimiter = delim;
        }
        if let Some(dilate) = self.dilate {
            config.dilation = dilate;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.select_g1 |= self.select_g1;
        config.no_plot |= self.noplot;
        config.fail_fast |= self.fail_fast;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_analysis(&args),
        Commands::DefaultConfig => run_default_config(),
    }
}

fn run_default_config() -> CliResult<()> {
    let json = serde_json::to_string_pretty(&AnalysisConfig::default())?;
    println!("{}", json);
    Ok(())
}

fn run_analysis(args: &CliRunArgs) -> CliResult<()> {
    let config = args.to_config()?;
    let paths = RunPaths {
        table: args.dot_table.clone(),
        image_dir: args.image_dir.clone(),
        out_dir: args.out_dir.clone(),
    };

    tracing::info!(
        "Dot table: {} | images: {} | output: {}",
        paths.table.display(),
        paths.image_dir.display(),
        paths.out_dir.display()
    );
    tracing::info!(
        "Voxel aspect (Z, Y, X): {:?} | dilation: {} | G1 selection: {}",
        config.spacing.per_axis(),
        config.dilation,
        config.select_g1
    );

    let report = radialdots::run(&paths, &config)?;

    tracing::info!(
        "{} of {} dots assigned to {} nuclei",
        report.n_assigned,
        report.n_dots,
        report.n_nuclei
    );
    for failure in &report.failures {
        tracing::warn!("Field {} skipped: {}", failure.fov, failure.error);
    }
    tracing::info!("Results written to {}", report.output.display());
    Ok(())
}
