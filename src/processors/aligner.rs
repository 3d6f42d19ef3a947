use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

use crate::error::Result;
use crate::models::{
    ColocationMetadata, GriddedSeries, ObsKind, Region, TsType, MODEL_ROW, OBS_ROW,
};
use crate::processors::interpolation::Interpolation;
use crate::processors::outliers::{OutlierFilter, ValueRange};
use crate::processors::units::UnitConversion;
use crate::utils::constants::DEFAULT_MAX_BULK_POINTS;

/// Which timestamps survive pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeAlignment {
    /// Only cells where both model and obs are present
    #[default]
    Intersection,
    /// Cells where either side is present; the other stays NaN
    Union,
}

impl fmt::Display for TimeAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeAlignment::Intersection => f.write_str("intersection"),
            TimeAlignment::Union => f.write_str("union"),
        }
    }
}

impl TimeAlignment {
    /// Whether a cell with these presences is kept
    pub fn keeps(&self, model_present: bool, obs_present: bool) -> bool {
        match self {
            TimeAlignment::Intersection => model_present && obs_present,
            TimeAlignment::Union => model_present || obs_present,
        }
    }
}

/// Identity of one colocation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey {
    pub model_id: String,
    pub obs_id: String,
    pub model_var: String,
    pub obs_var: String,
}

impl JobKey {
    pub fn new(model_id: &str, obs_id: &str, model_var: &str, obs_var: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            obs_id: obs_id.to_string(),
            model_var: model_var.to_string(),
            obs_var: obs_var.to_string(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} vs {} / {}",
            self.model_id, self.model_var, self.obs_id, self.obs_var
        )
    }
}

/// Settings shared by both aligners
#[derive(Debug, Clone)]
pub struct AlignOptions {
    /// Requested output resolution
    pub ts_type: TsType,
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
    pub region: Region,
    pub remove_outliers: bool,
    pub outliers: OutlierFilter,
    pub harmonise_units: bool,
    pub regrid_res_deg: Option<f64>,
    pub interpolation: Interpolation,
    pub time_alignment: TimeAlignment,
    pub max_bulk_points: usize,
}

impl AlignOptions {
    pub fn new(ts_type: TsType, region: Region) -> Self {
        Self {
            ts_type,
            start: None,
            stop: None,
            region,
            remove_outliers: true,
            outliers: OutlierFilter::default(),
            harmonise_units: false,
            regrid_res_deg: None,
            interpolation: Interpolation::default(),
            time_alignment: TimeAlignment::default(),
            max_bulk_points: DEFAULT_MAX_BULK_POINTS,
        }
    }

    pub fn with_time_range(mut self, start: Option<NaiveDateTime>, stop: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn time_bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.start.unwrap_or(NaiveDateTime::MIN),
            self.stop.unwrap_or(NaiveDateTime::MAX),
        )
    }

    /// Coarsest of the requested and native resolutions, with a note if the
    /// request could not be honoured
    pub fn resolve_ts_type(&self, natives: &[TsType], notes: &mut Vec<String>) -> TsType {
        let resolved = crate::models::lowest_resolution(self.ts_type, natives);
        if resolved != self.ts_type {
            let note = format!(
                "Requested resolution {} is finer than the source data, using {}",
                self.ts_type, resolved
            );
            info!("{}", note);
            notes.push(note);
        }
        resolved
    }

    /// Valid range applied to both rows of the job, if outlier removal is on
    pub fn outlier_range(&self, job: &JobKey) -> Option<ValueRange> {
        if !self.remove_outliers {
            return None;
        }
        self.outliers.range_for_pair(&job.obs_var, &job.model_var)
    }

    /// Conversion of model values into the obs unit, if harmonisation is on
    pub fn unit_conversion(&self, model_units: &str, obs_units: &str) -> Result<Option<UnitConversion>> {
        if !self.harmonise_units {
            return Ok(None);
        }
        let conversion = UnitConversion::between(model_units, obs_units)?;
        Ok(Some(conversion))
    }
}

/// Mask outliers in the model field and convert it into the obs unit.
///
/// Returns the prepared field and whether units were converted.
pub(crate) fn prepare_model(
    model: &GriddedSeries,
    obs_units: &str,
    job: &JobKey,
    options: &AlignOptions,
) -> Result<(GriddedSeries, bool)> {
    let range = options.outlier_range(job);
    let conversion = options.unit_conversion(&model.units, obs_units)?;

    let prepared = model.map_values(|v| {
        let v = OutlierFilter::mask(v, range);
        conversion.map_or(v, |c| c.apply(v))
    });
    match conversion {
        Some(c) => Ok((prepared.with_units(obs_units), !c.is_identity())),
        None => Ok((prepared, false)),
    }
}

/// Remove cells not kept by `mode` so both rows stay co-indexed
pub(crate) fn apply_pairing(data: &mut Array3<f64>, mode: TimeAlignment) {
    let (_, nt, nl) = data.dim();
    for t in 0..nt {
        for l in 0..nl {
            let model = data[[MODEL_ROW, t, l]];
            let obs = data[[OBS_ROW, t, l]];
            if !mode.keeps(!model.is_nan(), !obs.is_nan()) {
                data[[MODEL_ROW, t, l]] = f64::NAN;
                data[[OBS_ROW, t, l]] = f64::NAN;
            }
        }
    }
}

/// Time indices at which at least one location is kept by `mode`
pub(crate) fn kept_times(data: &Array3<f64>, mode: TimeAlignment) -> Vec<usize> {
    let model = data.index_axis(Axis(0), MODEL_ROW);
    let obs = data.index_axis(Axis(0), OBS_ROW);
    (0..data.dim().1)
        .filter(|t| {
            model
                .row(*t)
                .iter()
                .zip(obs.row(*t).iter())
                .any(|(m, o)| mode.keeps(!m.is_nan(), !o.is_nan()))
        })
        .collect()
}

/// Sorted union of several time axes
pub(crate) fn merged_times<'a, I>(axes: I) -> Vec<NaiveDateTime>
where
    I: IntoIterator<Item = &'a [NaiveDateTime]>,
{
    axes.into_iter()
        .flat_map(|a| a.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Provenance record shared by both aligners
pub(crate) struct MetadataDraft<'a> {
    pub job: &'a JobKey,
    pub options: &'a AlignOptions,
    pub obs_kind: ObsKind,
    pub ts_type: TsType,
    pub ts_type_src_model: TsType,
    pub ts_type_src_obs: TsType,
    pub units_model: String,
    pub units_obs: String,
    pub units_harmonised: bool,
    pub times: &'a [NaiveDateTime],
    pub notes: Vec<String>,
}

impl MetadataDraft<'_> {
    pub fn build(self) -> ColocationMetadata {
        let first = self.times.first().map(|t| t.date()).unwrap_or(NaiveDate::MIN);
        let last = self.times.last().map(|t| t.date()).unwrap_or(first);
        ColocationMetadata {
            obs_var: self.job.obs_var.clone(),
            model_var: self.job.model_var.clone(),
            obs_id: self.job.obs_id.clone(),
            model_id: self.job.model_id.clone(),
            obs_kind: self.obs_kind,
            ts_type: self.ts_type,
            ts_type_src_model: self.ts_type_src_model,
            ts_type_src_obs: self.ts_type_src_obs,
            start: self.options.start.map(|t| t.date()).unwrap_or(first),
            stop: self.options.stop.map(|t| t.date()).unwrap_or(last),
            filter_name: self.options.region.name.clone(),
            units_model: self.units_model,
            units_obs: self.units_obs,
            outliers_removed: self.options.remove_outliers,
            units_harmonised: self.units_harmonised,
            notes: self.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_modes() {
        let mut data = Array3::from_elem((2, 1, 3), f64::NAN);
        data[[MODEL_ROW, 0, 0]] = 1.0;
        data[[OBS_ROW, 0, 0]] = 2.0;
        data[[MODEL_ROW, 0, 1]] = 3.0;

        let mut union = data.clone();
        apply_pairing(&mut union, TimeAlignment::Union);
        assert_eq!(union[[MODEL_ROW, 0, 1]], 3.0);
        assert!(union[[OBS_ROW, 0, 1]].is_nan());

        apply_pairing(&mut data, TimeAlignment::Intersection);
        assert_eq!(data[[OBS_ROW, 0, 0]], 2.0);
        assert!(data[[MODEL_ROW, 0, 1]].is_nan());
        assert_eq!(kept_times(&data, TimeAlignment::Intersection), vec![0]);
    }

    #[test]
    fn test_resolve_ts_type_notes_upgrade() {
        let region = Region::from_filter_name("WORLD").unwrap();
        let options = AlignOptions::new(TsType::Daily, region);
        let mut notes = Vec::new();
        assert_eq!(
            options.resolve_ts_type(&[TsType::Hourly, TsType::Monthly], &mut notes),
            TsType::Monthly
        );
        assert_eq!(notes.len(), 1);
        assert_eq!(options.resolve_ts_type(&[TsType::Daily], &mut notes), TsType::Daily);
        assert_eq!(notes.len(), 1);
    }
}
