//! jerez-study - Jerez telemetry case study runner

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use jerez_telemetry::config::StudyConfig;
use jerez_telemetry::glicko::GlickoRun;
use jerez_telemetry::h1h2::H1h2Tables;
use jerez_telemetry::mdf4::{Mdf4File, Mdf4Header};
use jerez_telemetry::pipeline::{Pipeline, RunFlags, RunOptions};
use jerez_telemetry::storage::read_csv;
use jerez_telemetry::telemetry::generate_dataset;
use jerez_telemetry::verify::Verifier;
use jerez_telemetry::Error;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit status after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "jerez-study")]
#[command(about = "Synthetic MotoGP Jerez telemetry: dataset, tables, figures and MDF4 export")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// JSON config file (missing fields take defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output root, overrides the config
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors, no console tables
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct RunArgs {
    /// Generate the dataset only
    #[arg(long)]
    data_only: bool,

    /// Build tables from the existing dataset CSV
    #[arg(long)]
    tables_only: bool,

    /// Also render Figures 5 to 12
    #[arg(long)]
    with_figures: bool,

    /// Also export MDF4
    #[arg(long)]
    with_mdf4: bool,

    /// Dataset, tables, verification, figures and MDF4
    #[arg(long)]
    full: bool,

    /// Skip dataset verification
    #[arg(long)]
    skip_verify: bool,
}

impl From<&RunArgs> for RunFlags {
    fn from(a: &RunArgs) -> Self {
        Self {
            data_only: a.data_only,
            tables_only: a.tables_only,
            with_figures: a.with_figures,
            with_mdf4: a.with_mdf4,
            full: a.full,
            skip_verify: a.skip_verify,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a telemetry CSV
    Verify {
        /// CSV to check (defaults to the configured dataset)
        path: Option<PathBuf>,

        /// Skip the regenerate-and-compare check
        #[arg(long)]
        no_reproducibility: bool,
    },
    /// Run the reference Glicko tournament and motor sweep
    Glicko {
        /// Also write sample_data.csv and simulation_data.mf4
        #[arg(long)]
        export: bool,
    },
    /// Build the H1/H2 segmentation, latency and time-loss tables
    H1h2,
    /// Print the structure of an MDF4 file
    Inspect {
        /// MDF4 file
        path: PathBuf,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<StudyConfig> {
    let mut config = match &cli.config {
        Some(path) => StudyConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StudyConfig::default(),
    };
    if let Some(dir) = &cli.out_dir {
        config.output_dir.clone_from(dir);
    }
    Ok(config)
}

fn run_study(cli: &Cli, config: StudyConfig) -> anyhow::Result<ExitCode> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let options = RunOptions::from_flags(&RunFlags::from(&cli.run));
    if !cli.quiet {
        println!("{}", "=".repeat(60));
        println!("JEREZ GEARING CASE STUDY (seed {})", config.seed);
        println!("output: {}", config.output_dir.display());
        println!("{}", "=".repeat(60));
    }
    let pipeline = Pipeline::new(config, options)?.with_interrupt(interrupted);
    match pipeline.run() {
        Ok(summary) => {
            if !cli.quiet {
                if let Some(tables) = &summary.tables_text {
                    println!("{tables}");
                }
                if let Some(report) = &summary.verification {
                    println!("{}", report.render());
                }
            }
            println!("{}", summary.render());
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Ok(ExitCode::from(summary.exit_code() as u8))
        }
        Err(Error::Interrupted) => {
            eprintln!("interrupted");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let config = load_config(&cli)?;

    match &cli.command {
        None => run_study(&cli, config),
        Some(Commands::Verify {
            path,
            no_reproducibility,
        }) => {
            let path = path.clone().unwrap_or_else(|| config.dataset_csv_path());
            let report = Verifier::new(&config)
                .check_reproducibility(!no_reproducibility)
                .verify(&path);
            println!("{}", report.render());
            Ok(if report.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Some(Commands::Glicko { export }) => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let run = GlickoRun::simulate(&config.glicko, &mut rng);
            let dir = config.glicko_dir();
            let out = run.write_csv(&dir)?;
            println!(
                "{} rating records -> {}\n{} motor samples -> {}",
                out.matches,
                out.ratings_csv.display(),
                out.motor_samples,
                out.motor_csv.display()
            );
            if *export {
                let header = Mdf4Header::new(&config.mdf4, Utc::now())
                    .with_description("Reference motor acceleration sweep");
                let exported = run.export(&dir, &header)?;
                println!(
                    "{} sample rows -> {}\n{} bytes -> {}",
                    exported.sample_rows,
                    exported.sample_csv.display(),
                    exported.mdf4_bytes,
                    exported.mdf4.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::H1h2) => {
            let csv = config.dataset_csv_path();
            let dataset = if csv.is_file() {
                read_csv(&csv).with_context(|| format!("reading {}", csv.display()))?
            } else {
                generate_dataset(&config)?
            };
            let tables = H1h2Tables::compute(&config, &dataset)?;
            for path in tables.write_csv(&config.h1h2_dir())? {
                println!("wrote {}", path.display());
            }
            if !cli.quiet {
                println!("{}", tables.render());
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Inspect { path }) => {
            let file = Mdf4File::read(path)
                .with_context(|| format!("reading {}", path.display()))?;
            println!("{}", file.render());
            Ok(ExitCode::SUCCESS)
        }
    }
}
