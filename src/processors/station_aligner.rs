use chrono::NaiveDateTime;
use ndarray::{Array3, Axis};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::{ColocationError, Result};
use crate::models::{
    ColocatedLocation, ColocatedResult, GriddedSeries, ObsKind, Region, StationCollection,
    StationSeries, TsType, MODEL_ROW, OBS_ROW,
};
use crate::processors::aligner::{
    apply_pairing, kept_times, prepare_model, AlignOptions, JobKey, MetadataDraft,
};
use crate::processors::interpolation::interpolate_points;
use crate::processors::outliers::OutlierFilter;
use crate::processors::resampler::{resample_station, resample_values};

/// Resampled model and obs series of one station
struct StationPair<'s> {
    series: &'s StationSeries,
    model: (Vec<NaiveDateTime>, Vec<f64>),
    obs: (Vec<NaiveDateTime>, Vec<f64>),
}

impl StationPair<'_> {
    fn overlap_count(&self) -> usize {
        let model: BTreeSet<NaiveDateTime> = self
            .model
            .0
            .iter()
            .zip(&self.model.1)
            .filter(|(_, v)| !v.is_nan())
            .map(|(t, _)| *t)
            .collect();
        self.obs
            .0
            .iter()
            .zip(&self.obs.1)
            .filter(|(t, v)| !v.is_nan() && model.contains(t))
            .count()
    }
}

/// Native resolution of the obs side: the coarsest among the selected stations
pub fn native_obs_ts_type(stations: &StationCollection, obs_var: &str, region: &Region) -> Option<TsType> {
    stations
        .select(obs_var, region, &[])
        .into_iter()
        .map(|s| s.ts_type)
        .max()
}

/// Colocates a gridded model field with station time series by sampling the
/// grid at each station coordinate
pub struct StationAligner<'a> {
    options: &'a AlignOptions,
}

impl<'a> StationAligner<'a> {
    pub fn new(options: &'a AlignOptions) -> Self {
        Self { options }
    }

    pub fn align(
        &self,
        job: &JobKey,
        model: &GriddedSeries,
        stations: &StationCollection,
    ) -> Result<ColocatedResult> {
        let options = self.options;
        let region = &options.region;

        let selected = stations.select(&job.obs_var, region, &[]);
        if selected.is_empty() {
            return Err(ColocationError::DataExtraction(format!(
                "No {} stations of {} in region {}",
                job.obs_var, job.obs_id, region.name
            )));
        }

        let mut notes = Vec::new();
        let ts_type_src_model = model.ts_type;
        let ts_type_src_obs =
            native_obs_ts_type(stations, &job.obs_var, region).unwrap_or(ts_type_src_model);
        let ts_type = options.resolve_ts_type(&[ts_type_src_model, ts_type_src_obs], &mut notes);

        let (start, stop) = options.time_bounds();
        let model = model.crop_time(start, stop)?;

        let units_obs = selected[0].units.clone();
        if selected.iter().any(|s| s.units != units_obs) {
            warn!(
                "{} / {}: stations report different units, using {}",
                job.obs_id, job.obs_var, units_obs
            );
        }
        let (model, units_harmonised) = prepare_model(&model, &units_obs, job, options)?;
        let range = options.outlier_range(job);

        let points: Vec<(f64, f64)> = selected
            .iter()
            .map(|s| (s.station.latitude, s.station.longitude))
            .collect();
        let sampled = interpolate_points(&model, &points, options.interpolation, options.max_bulk_points);

        let mut pairs = Vec::with_capacity(selected.len());
        for (p, series) in selected.iter().enumerate() {
            let column: Vec<f64> = sampled.column(p).to_vec();
            let model_ts = resample_values(&model.times, &column, ts_type);

            let (obs_times, obs_values): (Vec<_>, Vec<_>) = series
                .times
                .iter()
                .zip(&series.values)
                .filter(|(t, _)| **t >= start && **t <= stop)
                .map(|(t, v)| (*t, OutlierFilter::mask(*v, range)))
                .unzip();
            let observed = resample_station(
                &StationSeries {
                    times: obs_times,
                    values: obs_values,
                    ..(*series).clone()
                },
                ts_type,
            )?;
            let obs_ts = (observed.times, observed.values);

            let pair = StationPair {
                series,
                model: model_ts,
                obs: obs_ts,
            };
            if pair.overlap_count() == 0 {
                debug!("{}: no overlapping data, dropped", series.station.station_name);
                notes.push(format!("{}: no data", series.station.station_name));
                continue;
            }
            pairs.push(pair);
        }

        if pairs.is_empty() {
            return Err(ColocationError::DataExtraction(format!(
                "None of the {} stations has data overlapping {} for {}",
                selected.len(),
                job.model_id,
                job
            )));
        }

        let times: Vec<NaiveDateTime> = pairs
            .iter()
            .flat_map(|p| p.model.0.iter().chain(p.obs.0.iter()).copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut data = Array3::from_elem((2, times.len(), pairs.len()), f64::NAN);
        for (l, pair) in pairs.iter().enumerate() {
            for (row, (ts, vs)) in [(MODEL_ROW, &pair.model), (OBS_ROW, &pair.obs)] {
                for (t, v) in ts.iter().zip(vs) {
                    if let Ok(k) = times.binary_search(t) {
                        data[[row, k, l]] = *v;
                    }
                }
            }
        }

        apply_pairing(&mut data, options.time_alignment);
        let keep = kept_times(&data, options.time_alignment);
        let data = data.select(Axis(1), &keep);
        let times: Vec<NaiveDateTime> = keep.iter().map(|k| times[*k]).collect();

        let locations = pairs
            .iter()
            .map(|p| ColocatedLocation {
                name: p.series.station.station_name.clone(),
                latitude: p.series.station.latitude,
                longitude: p.series.station.longitude,
                altitude: p.series.station.altitude,
            })
            .collect();

        let metadata = MetadataDraft {
            job,
            options,
            obs_kind: ObsKind::Ungridded,
            ts_type,
            ts_type_src_model,
            ts_type_src_obs,
            units_model: model.units.clone(),
            units_obs,
            units_harmonised,
            times: &times,
            notes,
        }
        .build();

        ColocatedResult::new(data, times, locations, metadata)
    }
}
