use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn, Level};

use crate::cli::args::{Cli, Commands};
use crate::error::{ColocationError, Result};
use crate::models::{ColocatedResult, MODEL_ROW, OBS_ROW};
use crate::processors::{ColocationRunner, JobState, RunOutcome};
use crate::readers::ReaderCatalog;
use crate::setup::{ColocationSetup, SetupOverrides};
use crate::writers::ColocatedWriter;

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run {
            config,
            model_dir,
            obs_dir,
            model_id,
            obs_id,
            vars,
            basedir,
            reanalyse_existing,
            raise_exceptions,
            max_workers,
        } => {
            let setup = match config {
                Some(path) => ColocationSetup::load(&path)?,
                None => {
                    let (Some(model_id), Some(obs_id)) = (model_id.as_deref(), obs_id.as_deref()) else {
                        return Err(ColocationError::InvalidFormat(
                            "--model-id and --obs-id are required without --config".to_string(),
                        ));
                    };
                    ColocationSetup::new(model_id, obs_id, &[])
                }
            };

            let cpus = num_cpus::get();
            if max_workers.is_some_and(|n| n > cpus) {
                warn!("More workers requested than the {} available CPUs", cpus);
            }

            let setup = setup.with_overrides(SetupOverrides {
                model_id,
                obs_id,
                obs_vars: (!vars.is_empty()).then_some(vars),
                basedir_coldata: basedir,
                reanalyse_existing,
                raise_exceptions: raise_exceptions.then_some(true),
                max_workers,
                ..Default::default()
            })?;

            let mut catalog = ReaderCatalog::new();
            catalog.register_csv_root(&model_dir)?;
            let obs_dir = obs_dir.unwrap_or_else(|| model_dir.clone());
            if obs_dir != model_dir {
                catalog.register_csv_root(&obs_dir)?;
            }

            println!("Colocating {} with {}", setup.model_id, setup.obs_id);
            println!("Variables: {}", setup.obs_vars.join(", "));
            println!("Output directory: {}", setup.output_dir().display());
            println!("Workers: {} ({} CPUs)", setup.max_workers, cpus);

            let runner = ColocationRunner::new(setup, catalog).with_progress(true);
            let outcome = tokio::task::spawn_blocking(move || runner.run()).await??;
            print_outcome(&outcome);
        }

        Commands::Info { file, sample } => {
            println!("Analyzing colocated file: {}", file.display());

            let writer = ColocatedWriter::new();
            let file_info = writer.get_file_info(&file)?;
            let result = writer.read_result(&file)?;
            print_info(&result, sample);

            println!("\nFile Details:");
            println!("{}", file_info.summary());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    // A second init (e.g. from tests) leaves the existing subscriber in place
    let installed = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if installed.is_err() {
        warn!("Logging was already initialised");
    }
    info!("coloc-processor {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!("\nJobs:");
    for job in &outcome.jobs {
        let model_var = job.model_var.as_deref().unwrap_or("-");
        let status = match &job.state {
            JobState::Computed => format!(
                "written {}",
                job.output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            JobState::Skipped => "exists, skipped".to_string(),
            JobState::Failed(reason) => format!("FAILED: {}", reason),
            JobState::Unmatched => "no model variable".to_string(),
            JobState::Pending => "not run".to_string(),
        };
        println!("  {} vs {}: {}", model_var, job.obs_var, status);
    }

    for (var, result) in &outcome.results {
        let (times, locations) = result.shape();
        println!(
            "\n{}: {} times x {} locations, {} valid pairs",
            var,
            times,
            locations,
            result.num_valid_pairs()
        );
    }

    println!(
        "\n{} computed, {} skipped, {} failed",
        outcome.computed(),
        outcome.skipped(),
        outcome.failed()
    );
    println!("Run log: {}", outcome.log_path.display());
}

fn print_info(result: &ColocatedResult, sample: usize) {
    let meta = result.metadata();
    let (times, locations) = result.shape();

    println!("\nProvenance:");
    println!("  Model: {} / {} ({})", meta.model_id, meta.model_var, meta.units_model);
    println!("  Obs: {} / {} ({}, {:?})", meta.obs_id, meta.obs_var, meta.units_obs, meta.obs_kind);
    println!(
        "  Resolution: {} (model {}, obs {})",
        meta.ts_type, meta.ts_type_src_model, meta.ts_type_src_obs
    );
    println!("  Period: {} to {}", meta.start, meta.stop);
    println!("  Filter: {}", meta.filter_name);
    println!(
        "  Outliers removed: {}, units harmonised: {}",
        meta.outliers_removed, meta.units_harmonised
    );
    for note in &meta.notes {
        println!("  Note: {}", note);
    }

    println!("\nShape: {} times x {} locations", times, locations);
    println!("Valid pairs: {}", result.num_valid_pairs());
    println!("\n{}", result.statistics().summary());

    if sample == 0 {
        return;
    }
    println!("\nSample Records (showing up to {} records):", sample);
    let data = result.data();
    let rows = result
        .times()
        .iter()
        .enumerate()
        .flat_map(|(t, time)| result.locations().iter().enumerate().map(move |(l, loc)| (t, l, time, loc)))
        .filter(|(t, l, _, _)| !data[[MODEL_ROW, *t, *l]].is_nan() || !data[[OBS_ROW, *t, *l]].is_nan())
        .take(sample);
    for (i, (t, l, time, loc)) in rows.enumerate() {
        println!(
            "{}. {} at {} ({:.2}, {:.2}): model={:.4}, obs={:.4}",
            i + 1,
            loc.name,
            time,
            loc.latitude,
            loc.longitude,
            data[[MODEL_ROW, t, l]],
            data[[OBS_ROW, t, l]]
        );
    }
}
