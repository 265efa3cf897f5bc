use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lapdelta::{
    AnalysisConfig, LapDeltaError, TelemetryTrace,
    analysis::{
        GripAnalyzer, TraceAnalyzer, aggregate_style, compare_styles, driver_fingerprint, lap_consistency,
        segment_stints,
    },
    compare_laps,
    telemetry::loader::{load_laps_jsonl, load_trace_jsonl},
    writer::write_report,
};
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare two laps sample by sample and explain where the time went
    Compare {
        lap_a: PathBuf,
        lap_b: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Split a race into stints and report the pace of each one
    Stints {
        laps: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build a driving style profile from one or more laps of the same driver
    Style {
        #[arg(short, long)]
        driver: String,

        #[arg(required = true)]
        laps: Vec<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare the driving styles of two drivers
    CompareStyles {
        #[arg(long)]
        driver_a: String,

        #[arg(long, required = true, num_args = 1..)]
        laps_a: Vec<PathBuf>,

        #[arg(long)]
        driver_b: String,

        #[arg(long, required = true, num_args = 1..)]
        laps_b: Vec<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report how much of the available grip a lap uses
    Grip {
        lap: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score the lap-to-lap consistency of a run of laps
    Consistency {
        laps: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Describe how a driver's reference lap differs from their other laps
    Fingerprint {
        #[arg(short, long)]
        driver: String,

        reference: PathBuf,

        #[arg(required = true)]
        laps: Vec<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, LapDeltaError> {
    match path {
        Some(path) => AnalysisConfig::from_file(path),
        None => Ok(AnalysisConfig::from_local_file()?.unwrap_or_default()),
    }
}

fn load_lap(path: &Path, config: &AnalysisConfig) -> Result<TelemetryTrace, LapDeltaError> {
    let trace = load_trace_jsonl(path)?.with_brake_scale(config.telemetry.brake_scale);
    let collapsed = trace.collapse_duplicate_distances();
    if collapsed.len() != trace.len() {
        info!(
            "Collapsed {} duplicate distance samples in {:?}",
            trace.len() - collapsed.len(),
            path
        );
    }
    Ok(collapsed)
}

fn compare(lap_a: &Path, lap_b: &Path, config: &AnalysisConfig, output: Option<&Path>) -> Result<(), LapDeltaError> {
    let trace_a = load_lap(lap_a, config)?;
    let trace_b = load_lap(lap_b, config)?;
    let comparison = compare_laps(&trace_a, &trace_b, config)?;
    write_report(&comparison, output)
}

fn stints(laps: &Path, config: &AnalysisConfig, output: Option<&Path>) -> Result<(), LapDeltaError> {
    config.validate()?;
    let records = load_laps_jsonl(laps)?;
    let stints = segment_stints(&records, &config.stints);
    write_report(&stints, output)
}

fn load_laps(paths: &[PathBuf], config: &AnalysisConfig) -> Result<Vec<TelemetryTrace>, LapDeltaError> {
    paths.iter().map(|path| load_lap(path, config)).collect()
}

fn style(driver: &str, laps: &[PathBuf], config: &AnalysisConfig, output: Option<&Path>) -> Result<(), LapDeltaError> {
    config.validate()?;
    let traces = load_laps(laps, config)?;
    let profile = aggregate_style(driver, &traces, &config.style)?;
    write_report(&profile, output)
}

fn compare_driver_styles(
    (driver_a, laps_a): (&str, &[PathBuf]),
    (driver_b, laps_b): (&str, &[PathBuf]),
    config: &AnalysisConfig,
    output: Option<&Path>,
) -> Result<(), LapDeltaError> {
    config.validate()?;
    let profile_a = aggregate_style(driver_a, &load_laps(laps_a, config)?, &config.style)?;
    let profile_b = aggregate_style(driver_b, &load_laps(laps_b, config)?, &config.style)?;
    write_report(&compare_styles(&profile_a, &profile_b), output)
}

fn grip(lap: &Path, config: &AnalysisConfig, output: Option<&Path>) -> Result<(), LapDeltaError> {
    config.validate()?;
    let trace = load_lap(lap, config)?;
    let label = lap.display().to_string();
    let grip = GripAnalyzer::new(config.grip.clone()).with_label(&label).analyze(&trace)?;
    write_report(&grip, output)
}

fn consistency(laps: &Path, config: &AnalysisConfig, output: Option<&Path>) -> Result<(), LapDeltaError> {
    config.validate()?;
    let records = load_laps_jsonl(laps)?;
    write_report(&lap_consistency(&records, &config.consistency)?, output)
}

fn fingerprint(
    driver: &str,
    reference: &Path,
    laps: &[PathBuf],
    config: &AnalysisConfig,
    output: Option<&Path>,
) -> Result<(), LapDeltaError> {
    let reference = load_lap(reference, config)?;
    let others = load_laps(laps, config)?;
    write_report(&driver_fingerprint(driver, &reference, &others, config)?, output)
}

fn run(command: &Commands) -> Result<(), LapDeltaError> {
    match command {
        Commands::Compare {
            lap_a,
            lap_b,
            config,
            output,
        } => compare(lap_a, lap_b, &load_config(config.as_deref())?, output.as_deref()),
        Commands::Stints { laps, config, output } => {
            stints(laps, &load_config(config.as_deref())?, output.as_deref())
        }
        Commands::Style {
            driver,
            laps,
            config,
            output,
        } => style(driver, laps, &load_config(config.as_deref())?, output.as_deref()),
        Commands::CompareStyles {
            driver_a,
            laps_a,
            driver_b,
            laps_b,
            config,
            output,
        } => compare_driver_styles(
            (driver_a.as_str(), laps_a.as_slice()),
            (driver_b.as_str(), laps_b.as_slice()),
            &load_config(config.as_deref())?,
            output.as_deref(),
        ),
        Commands::Grip { lap, config, output } => grip(lap, &load_config(config.as_deref())?, output.as_deref()),
        Commands::Consistency { laps, config, output } => {
            consistency(laps, &load_config(config.as_deref())?, output.as_deref())
        }
        Commands::Fingerprint {
            driver,
            reference,
            laps,
            config,
            output,
        } => fingerprint(
            driver,
            reference,
            laps,
            &load_config(config.as_deref())?,
            output.as_deref(),
        ),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(&cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
