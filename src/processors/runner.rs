use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::error::{ColocationError, Result};
use crate::models::{
    lowest_resolution, ColocatedResult, GriddedSeries, Region, StationCollection, TsType,
    VariableMatch,
};
use crate::processors::aligner::{AlignOptions, JobKey};
use crate::processors::cache_gate::{CacheDecision, CacheGate};
use crate::processors::gridded_aligner::GriddedAligner;
use crate::processors::run_log::{LogKind, RunLog};
use crate::processors::station_aligner::{native_obs_ts_type, StationAligner};
use crate::processors::var_matcher::VariableMatcher;
use crate::readers::{AuxRegistry, GriddedSource, ReadRequest, ReaderCatalog};
use crate::setup::ColocationSetup;
use crate::utils::filename::{run_log_path, SavenameKey};
use crate::utils::progress::ProgressReporter;
use crate::writers::ColocatedWriter;

/// Observation side of a sweep
enum ObsData {
    Gridded(GriddedSource),
    /// Read once for all matched variables
    Ungridded(StationCollection),
}

/// Observation input of a single job
enum ObsInput<'s> {
    Grid(GriddedSeries),
    Stations(&'s StationCollection),
}

impl ObsInput<'_> {
    fn native_ts_type(&self, obs_var: &str, region: &Region) -> Option<TsType> {
        match self {
            ObsInput::Grid(series) => Some(series.ts_type),
            ObsInput::Stations(stations) => native_obs_ts_type(stations, obs_var, region),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Not run because an earlier job failed in strict mode
    Pending,
    Skipped,
    Computed,
    Failed(String),
    /// No model variable available for the obs variable
    Unmatched,
}

/// What happened to one requested obs variable
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub obs_var: String,
    pub model_var: Option<String>,
    pub state: JobState,
    pub output: Option<PathBuf>,
}

/// Results of one sweep, keyed by model variable
#[derive(Debug)]
pub struct RunOutcome {
    pub results: BTreeMap<String, ColocatedResult>,
    pub jobs: Vec<JobReport>,
    pub log_path: PathBuf,
}

impl RunOutcome {
    fn count(&self, pred: impl Fn(&JobState) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.state)).count()
    }

    pub fn computed(&self) -> usize {
        self.count(|s| *s == JobState::Computed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == JobState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobState::Failed(_)))
    }
}

enum JobOutcome {
    Skipped,
    Computed {
        path: PathBuf,
        result: ColocatedResult,
    },
}

/// Everything shared by the jobs of one sweep
struct Sweep {
    model: GriddedSource,
    obs: ObsData,
    options: AlignOptions,
    gate: CacheGate,
    writer: ColocatedWriter,
    out_dir: PathBuf,
    log: RunLog,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Sweep {
    /// Lock serialising jobs that target the same output file
    fn lock_for(&self, savename: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(savename.to_string()).or_default().clone()
    }
}

/// Runs every (model variable, obs variable) job of a [`ColocationSetup`]
pub struct ColocationRunner {
    setup: ColocationSetup,
    catalog: ReaderCatalog,
    registry: AuxRegistry,
    show_progress: bool,
}

impl ColocationRunner {
    pub fn new(setup: ColocationSetup, catalog: ReaderCatalog) -> Self {
        Self {
            setup,
            catalog,
            registry: AuxRegistry::with_builtins(),
            show_progress: false,
        }
    }

    pub fn with_aux_registry(mut self, registry: AuxRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn setup(&self) -> &ColocationSetup {
        &self.setup
    }

    /// Run the sweep.
    ///
    /// Failing jobs are logged and reported while the rest continue, unless
    /// `raise_exceptions` is set, in which case the first failure (in
    /// variable order) is returned once the run log is closed.
    pub fn run(&self) -> Result<RunOutcome> {
        let setup = &self.setup;
        setup.check()?;

        let log_path = run_log_path(
            &setup.basedir_coldata,
            &setup.model_id,
            &setup.obs_id,
            Local::now().date_naive(),
        );
        let log = RunLog::open(&log_path, &setup.config_lines())?;
        info!(
            "Colocating {} with {} ({} variables), run log {}",
            setup.model_id,
            setup.obs_id,
            setup.obs_vars.len(),
            log_path.display()
        );

        let (model, obs, matches, unmatched) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(e) => return Err(abort(log, e)),
        };
        let (options, writer) = match self.sweep_settings(&log, &unmatched) {
            Ok(settings) => settings,
            Err(e) => return Err(abort(log, e)),
        };

        let sweep = Sweep {
            model,
            obs,
            options,
            gate: CacheGate::new(setup.reanalyse_existing),
            writer,
            out_dir: setup.output_dir(),
            log,
            locks: Mutex::new(HashMap::new()),
        };

        let outcomes = match self.execute(&sweep, &matches) {
            Ok(outcomes) => outcomes,
            Err(e) => return Err(abort(sweep.log, e)),
        };
        let mut first_err = None;
        let mut outcome = RunOutcome {
            results: BTreeMap::new(),
            jobs: Vec::with_capacity(setup.obs_vars.len()),
            log_path: log_path.clone(),
        };

        for (matched, result) in matches.iter().zip(outcomes) {
            let (state, output) = match result {
                None => (JobState::Pending, None),
                Some(Ok(JobOutcome::Skipped)) => (JobState::Skipped, None),
                Some(Ok(JobOutcome::Computed { path, result })) => {
                    outcome.results.insert(matched.model_var.clone(), result);
                    (JobState::Computed, Some(path))
                }
                Some(Err(e)) => {
                    if setup.raise_exceptions && first_err.is_none() {
                        first_err = Some(ColocationError::JobFailed {
                            model_id: setup.model_id.clone(),
                            model_var: matched.model_var.clone(),
                            obs_id: setup.obs_id.clone(),
                            obs_var: matched.obs_var.clone(),
                            reason: e.to_string(),
                        });
                    }
                    (JobState::Failed(e.to_string()), None)
                }
            };
            outcome.jobs.push(JobReport {
                obs_var: matched.obs_var.clone(),
                model_var: Some(matched.model_var.clone()),
                state,
                output,
            });
        }
        outcome.jobs.extend(unmatched.into_iter().map(|obs_var| JobReport {
            obs_var,
            model_var: None,
            state: JobState::Unmatched,
            output: None,
        }));

        sweep.log.close()?;
        if let Some(e) = first_err {
            return Err(e);
        }

        info!(
            "Finished {} vs {}: {} computed, {} skipped, {} failed",
            setup.model_id,
            setup.obs_id,
            outcome.computed(),
            outcome.skipped(),
            outcome.failed()
        );
        Ok(outcome)
    }

    /// Open the sources and match variables
    fn prepare(&self) -> Result<(GriddedSource, ObsData, Vec<VariableMatch>, Vec<String>)> {
        let setup = &self.setup;

        let mut model = GriddedSource::new(self.catalog.gridded(&setup.model_id)?);
        for (var_name, spec) in &setup.model_read_aux {
            model.add_aux_compute(var_name, spec, &self.registry)?;
        }

        let matcher = VariableMatcher::new(
            &setup.model_id,
            &setup.obs_id,
            &setup.model_use_vars,
            &setup.model_read_aux,
        );

        if let Some(reader) = self.catalog.ungridded(&setup.obs_id) {
            matcher.check_obs_support(&setup.obs_vars, &reader.supported_variables())?;
            let set = matcher.match_variables(&setup.obs_vars, &model.provides_variables())?;

            let obs_vars: Vec<String> = set
                .matches
                .iter()
                .map(|m| m.obs_var.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let stations = reader.read(&obs_vars, &setup.read_opts)?;
            info!(
                "Read {} stations of {} for {}",
                stations.station_count(),
                setup.obs_id,
                obs_vars.join(", ")
            );
            return Ok((model, ObsData::Ungridded(stations), set.matches, set.unmatched));
        }

        let obs = GriddedSource::new(self.catalog.gridded(&setup.obs_id)?);
        matcher.check_obs_support(&setup.obs_vars, &obs.provides_variables())?;
        let set = matcher.match_variables(&setup.obs_vars, &model.provides_variables())?;
        Ok((model, ObsData::Gridded(obs), set.matches, set.unmatched))
    }

    /// Record unmatched variables and build the per-sweep alignment and writer settings
    fn sweep_settings(&self, log: &RunLog, unmatched: &[String]) -> Result<(AlignOptions, ColocatedWriter)> {
        let setup = &self.setup;
        for obs_var in unmatched {
            log.entry(
                LogKind::Warning,
                &format!("{}: no matching variable in {}", obs_var, setup.model_id),
            )?;
        }
        let options = setup.align_options()?;
        let writer = ColocatedWriter::new().with_compression(&setup.compression)?;
        Ok((options, writer))
    }

    /// Run all jobs, sequentially or on a worker pool.
    ///
    /// `None` marks a job that was not started because an earlier one failed
    /// in strict mode.
    fn execute(
        &self,
        sweep: &Sweep,
        matches: &[VariableMatch],
    ) -> Result<Vec<Option<Result<JobOutcome>>>> {
        let halt = AtomicBool::new(false);
        let progress = ProgressReporter::new(
            matches.len() as u64,
            &format!("Colocating {} vs {}", self.setup.model_id, self.setup.obs_id),
            !self.show_progress,
        );

        let run_one = |matched: &VariableMatch| -> Option<Result<JobOutcome>> {
            if halt.load(Ordering::SeqCst) {
                return None;
            }
            let job = JobKey::new(
                &self.setup.model_id,
                &self.setup.obs_id,
                &matched.model_var,
                &matched.obs_var,
            );
            progress.set_message(&job.to_string());

            let result = self.run_job(sweep, &job);
            if let Err(e) = &result {
                error!("{}: {}", job, e);
                if let Err(log_err) = sweep.log.entry(LogKind::Error, &format!("{} in {}: {}", e.kind(), job, e)) {
                    warn!("Could not write to run log: {}", log_err);
                }
                if self.setup.raise_exceptions {
                    halt.store(true, Ordering::SeqCst);
                }
            }
            progress.increment(1);
            Some(result)
        };

        let outcomes = if self.setup.max_workers <= 1 || matches.len() <= 1 {
            matches.iter().map(run_one).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.setup.max_workers)
                .build()
                .map_err(|e| ColocationError::InvalidFormat(format!("Failed to build worker pool: {}", e)))?;
            pool.install(|| matches.par_iter().map(run_one).collect())
        };

        progress.finish_with_message("Colocation finished");
        Ok(outcomes)
    }

    fn run_job(&self, sweep: &Sweep, job: &JobKey) -> Result<JobOutcome> {
        let setup = &self.setup;
        let (start, stop) = setup.time_bounds();

        let request = ReadRequest::new(&job.model_var)
            .with_time_range(start, stop)
            .with_ts_type(
                Some(setup.model_ts_type_read.unwrap_or(setup.ts_type)),
                setup.flex_ts_type,
            );
        let model = sweep
            .model
            .read_first_available(&request, &setup.vert_candidates())?;

        let obs = match &sweep.obs {
            ObsData::Gridded(source) => {
                let request = ReadRequest::new(&job.obs_var)
                    .with_time_range(start, stop)
                    .with_ts_type(Some(setup.ts_type), true);
                ObsInput::Grid(source.read(&request)?)
            }
            ObsData::Ungridded(stations) => ObsInput::Stations(stations),
        };

        let (Some(start), Some(stop)) = (start.or(model.start()), stop.or(model.stop())) else {
            return Err(ColocationError::DataCoverage(format!(
                "{}: no model time steps for {}",
                job.model_id, job.model_var
            )));
        };
        let options = sweep.options.clone().with_time_range(Some(start), Some(stop));

        let natives: Vec<TsType> = std::iter::once(model.ts_type)
            .chain(obs.native_ts_type(&job.obs_var, &options.region))
            .collect();
        let savename = savename_for(job, &options, start, stop, lowest_resolution(setup.ts_type, &natives));

        let lock = sweep.lock_for(&savename);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        match sweep.gate.decide(&savename, &sweep.out_dir)? {
            CacheDecision::Skip => {
                sweep.log.entry(LogKind::Skip, &savename)?;
                return Ok(JobOutcome::Skipped);
            }
            CacheDecision::Recompute => sweep.log.entry(LogKind::Remove, &savename)?,
            CacheDecision::Run => {}
        }

        let result = match &obs {
            ObsInput::Grid(series) => GriddedAligner::new(&options).align(job, &model, series)?,
            ObsInput::Stations(stations) => StationAligner::new(&options).align(job, &model, stations)?,
        };

        let path = sweep.writer.write_result(&result, &sweep.out_dir)?;
        sweep.log.entry(LogKind::Write, &result.savename())?;
        info!("Wrote {}", path.display());
        Ok(JobOutcome::Computed { path, result })
    }
}

/// Write `err` to the run log, close it and hand the error back for propagation
fn abort(log: RunLog, err: ColocationError) -> ColocationError {
    error!("{}", err);
    let logged = log
        .entry(LogKind::Error, &format!("{}: {}", err.kind(), err))
        .and_then(|_| log.close());
    if let Err(log_err) = logged {
        warn!("Could not write to run log: {}", log_err);
    }
    err
}

fn savename_for(
    job: &JobKey,
    options: &AlignOptions,
    start: NaiveDateTime,
    stop: NaiveDateTime,
    ts_type: TsType,
) -> String {
    SavenameKey {
        var_name: job.model_var.clone(),
        obs_id: job.obs_id.clone(),
        model_id: job.model_id.clone(),
        start: start.date(),
        stop: stop.date(),
        ts_type,
        filter_name: options.region.name.clone(),
    }
    .savename()
}
