//! faultline - probabilistic risk analysis over fault-tree models.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use faultline_analysis::{analysis, report, Approximation, Settings};
use faultline_mef::{parser, validator, ErrorKind};

/// Probabilistic risk analysis: minimal cut sets, top-event probability,
/// importance and uncertainty analysis, and IEC 61508 SIL figures.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model Exchange Format input files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Configuration file (root element <faultline>)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the report here instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mission time in hours
    #[arg(long)]
    mission_time: Option<f64>,

    /// Top-probability approximation: exact, rare-event, or mcub
    #[arg(long)]
    approximation: Option<String>,

    /// Compute importance measures
    #[arg(long)]
    importance: bool,

    /// Run Monte-Carlo uncertainty analysis
    #[arg(long)]
    uncertainty: bool,

    /// Number of Monte-Carlo trials
    #[arg(long)]
    trials: Option<u32>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate PFDavg / PFH and the SIL band over the mission time
    #[arg(long)]
    sil: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("faultline: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Exit codes: 1 validation, 2 I/O, 3 internal.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(model_err) = err.downcast_ref::<faultline_mef::Error>() {
        return match model_err.kind() {
            ErrorKind::Io(_) => 2,
            ErrorKind::Logic(_) | ErrorKind::IllegalOperation(_) => 3,
            _ => 1,
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return 2;
    }
    1
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let settings = build_settings(cli)?;

    let mut reports = Vec::new();
    for input in &cli.inputs {
        let text = fs::read_to_string(input)
            .map_err(faultline_mef::Error::from)
            .with_context(|| format!("cannot read '{}'", input.display()))?;
        let file_name = input.display().to_string();

        let mut model = parser::parse_model(&text, &file_name)?;
        model.apply_ccf_groups()?;
        validator::validate(&model)?;
        info!(file = %file_name, "model validated");

        let results = analysis::analyze(&model, &settings)?;
        use faultline_mef::element::Named;
        reports.push(report::render(model.name(), &results));
    }

    let document = reports.concat();
    match &cli.output {
        Some(path) => fs::write(path, document)
            .with_context(|| format!("cannot write '{}'", path.display()))?,
        None => print!("{document}"),
    }
    Ok(())
}

fn build_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_config_file(path)
            .with_context(|| format!("cannot load '{}'", path.display()))?,
        None => Settings::default(),
    };
    if let Some(mission_time) = cli.mission_time {
        settings.mission_time = mission_time;
    }
    if let Some(name) = &cli.approximation {
        settings.approximation = Approximation::parse(name).ok_or_else(|| {
            anyhow::Error::from(faultline_mef::Error::new(ErrorKind::Settings(format!(
                "unknown approximation '{name}'"
            ))))
        })?;
    }
    if cli.importance {
        settings.importance_analysis = true;
    }
    if cli.uncertainty {
        settings.uncertainty_analysis = true;
    }
    if let Some(trials) = cli.trials {
        settings.num_trials = trials;
    }
    if cli.seed.is_some() {
        settings.seed = cli.seed;
    }
    if cli.sil {
        settings.sil_analysis = true;
    }
    settings.validate()?;
    Ok(settings)
}
