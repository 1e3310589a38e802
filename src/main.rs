//! Demographic Forecast CLI
//!
//! Calibrates and runs fertility or mortality rate forecasts from year-per-row
//! CSV tables, and simulates percentile bands around projected year effects.
//!
//! Usage:
//!   demographic_forecast fertility --counts births.csv --exposures women.csv
//!   demographic_forecast mortality --counts deaths_male.csv --exposures pop_male.csv --json
//!   demographic_forecast simulate --path kt.csv --std-dev 0.30 --lower -0.32 --upper 0.8

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nalgebra::DMatrix;
use serde::Serialize;

use demographic_forecast::rates::{load_matrix, write_matrix};
use demographic_forecast::simulation::{load_path, write_bands};
use demographic_forecast::{
    BilinearRateModel, CalibrationResult, Calibrator, ForecastConfig, ModelSpec, RateData,
    RateWarning, YearEffectSimulator,
};

#[derive(Parser)]
#[command(name = "demographic_forecast", version, about = "Bilinear fertility and mortality rate forecasts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Box-Cox fertility model; searches lambda unless one is given
    Fertility(FertilityArgs),
    /// Log mortality model with LOWESS smoothing
    Mortality(RateArgs),
    /// Truncated-normal percentile bands around a projected path
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct RateArgs {
    /// Year-per-row CSV of counts (births or deaths)
    #[arg(long)]
    counts: PathBuf,

    /// Year-per-row CSV of exposures, same layout as the counts
    #[arg(long)]
    exposures: PathBuf,

    /// Trailing years held out to score calibration candidates
    #[arg(long, default_value = "5")]
    holdout: usize,

    /// Years projected past the last observed year
    #[arg(long)]
    horizon: Option<usize>,

    /// Latent components kept from the decomposition
    #[arg(long)]
    components: Option<usize>,

    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Forecast CSV (historical fit followed by projected years)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write the projected year effects, one column per component
    #[arg(long)]
    year_effects: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct FertilityArgs {
    #[command(flatten)]
    rates: RateArgs,

    /// Fixed Box-Cox parameter; only phi is calibrated when set
    #[arg(long)]
    lambda: Option<f64>,

    /// Smooth the transformed rates before decomposition
    #[arg(long)]
    smooth: bool,
}

#[derive(Args)]
struct SimulateArgs {
    /// CSV with a year column and one or more path columns
    #[arg(long)]
    path: PathBuf,

    /// Path column to simulate; defaults to the first after `year`
    #[arg(long)]
    column: Option<String>,

    #[arg(long)]
    std_dev: f64,

    #[arg(long, allow_hyphen_values = true)]
    lower: f64,

    #[arg(long, allow_hyphen_values = true)]
    upper: f64,

    #[arg(long)]
    draws: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "kt_sim.csv")]
    output: PathBuf,

    #[arg(long)]
    json: bool,
}

/// Summary of one calibrated forecast run
#[derive(Serialize)]
struct RunSummary<'a> {
    spec: &'a ModelSpec,
    calibration: &'a CalibrationResult,
    explained_variance: Vec<f64>,
    first_year: i32,
    last_year: i32,
    warnings: &'a [RateWarning],
    output: String,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Fertility(args) => {
            let mut config = load_config(args.rates.config.as_deref())?;
            apply_overrides(&mut config, &args.rates);
            if args.smooth {
                config.smooth_fertility = true;
            }
            // the transform parameter is replaced by the grid when searching
            let base = config.fertility_spec(args.lambda.unwrap_or(1.0))?;
            run_model(&args.rates, &config, base, args.lambda.is_none(), "tfr_forecast.csv")
        }
        Command::Mortality(args) => {
            let mut config = load_config(args.config.as_deref())?;
            apply_overrides(&mut config, &args);
            let base = config.mortality_spec()?;
            run_model(&args, &config, base, false, "mort_forecast.csv")
        }
        Command::Simulate(args) => run_simulation(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<ForecastConfig> {
    match path {
        Some(path) => ForecastConfig::from_json_path(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => Ok(ForecastConfig::default()),
    }
}

fn apply_overrides(config: &mut ForecastConfig, args: &RateArgs) {
    if let Some(horizon) = args.horizon {
        config.horizon = horizon;
    }
    if let Some(components) = args.components {
        config.n_components = components;
    }
}

fn run_model(
    args: &RateArgs,
    config: &ForecastConfig,
    base: ModelSpec,
    search_lambda: bool,
    default_output: &str,
) -> Result<()> {
    let counts = load_matrix(&args.counts)
        .with_context(|| format!("failed to load counts from {}", args.counts.display()))?;
    let exposures = load_matrix(&args.exposures)
        .with_context(|| format!("failed to load exposures from {}", args.exposures.display()))?;
    let data = RateData::new(counts, exposures)?;

    let n_years = data.counts().n_years();
    if args.holdout == 0 || args.holdout + 2 > n_years {
        bail!(
            "holdout of {} years leaves too little history in {} observed years",
            args.holdout,
            n_years
        );
    }
    let fit_last_year = data.counts().last_year() - args.holdout as i32;

    let grid = config.grid(search_lambda)?;
    log::info!(
        "calibrating on {}-{} against {} held-out years, {} candidates",
        data.counts().first_year(),
        fit_last_year,
        args.holdout,
        grid.len()
    );
    let calibration = Calibrator::new(base, grid)
        .with_loss(config.loss)
        .calibrate_split(&data, fit_last_year)
        .context("calibration failed")?;

    let spec = calibration.apply_to(base);
    let model = BilinearRateModel::fit(&data, spec)?;
    let forecast = model.forecast(config.horizon, calibration.phi)?;

    let output = args.output.clone().unwrap_or_else(|| PathBuf::from(default_output));
    write_matrix(&output, &forecast.rates)
        .with_context(|| format!("failed to write forecast to {}", output.display()))?;

    if let Some(path) = &args.year_effects {
        let projected = model.project(config.horizon, calibration.phi)?;
        write_year_effects(path, forecast.rates.first_year(), &projected)
            .with_context(|| format!("failed to write year effects to {}", path.display()))?;
    }

    let summary = RunSummary {
        spec: &spec,
        calibration: &calibration,
        explained_variance: model.decomposition().explained_variance_ratio(),
        first_year: forecast.rates.first_year(),
        last_year: forecast.rates.last_year(),
        warnings: &forecast.warnings,
        output: output.display().to_string(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Calibration");
    println!("  Damping (phi):    {:.3}", summary.calibration.phi);
    if let Some(lambda) = summary.calibration.lambda {
        println!("  Box-Cox (lambda): {:.2}", lambda);
    }
    println!("  Held-out loss:    {:.6e}", summary.calibration.loss);
    println!("  Candidates:       {}", summary.calibration.scores.len());

    println!("\nExplained variance by component:");
    for (k, share) in summary.explained_variance.iter().enumerate() {
        println!("  {:>2}: {:>7.3}%", k + 1, share * 100.0);
    }

    println!(
        "\nForecast {}-{} written to: {}",
        summary.first_year, summary.last_year, summary.output
    );
    if !summary.warnings.is_empty() {
        println!("  {} cells are negative or undefined", summary.warnings.len());
    }
}

fn write_year_effects(path: &Path, first_year: i32, effects: &DMatrix<f64>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);

    let mut header = vec!["year".to_string()];
    header.extend((1..=effects.ncols()).map(|k| format!("k{}", k)));
    writer.write_record(&header)?;

    for (t, row) in effects.row_iter().enumerate() {
        let mut record = vec![(first_year + t as i32).to_string()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_simulation(args: &SimulateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let (years, path) = load_path(&args.path, args.column.as_deref())
        .with_context(|| format!("failed to load path from {}", args.path.display()))?;

    let simulator = YearEffectSimulator::new(
        args.draws.unwrap_or(config.draws),
        args.std_dev,
        args.lower,
        args.upper,
    )?
    .with_seed(args.seed.unwrap_or(config.seed));

    let bands = simulator.simulate(&years, &path)?;
    write_bands(&args.output, &bands)
        .with_context(|| format!("failed to write bands to {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&bands)?);
    } else {
        println!("{:>6} {:>10} {:>10} {:>10} {:>10}", "Year", "Mean", "p2.5", "p50", "p97.5");
        for band in &bands {
            println!(
                "{:>6} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                band.year, band.mean, band.percentiles[1], band.percentiles[3], band.percentiles[5]
            );
        }
        println!("\nBands written to: {}", args.output.display());
    }
    Ok(())
}
