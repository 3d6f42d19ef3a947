use ndarray::{Array3, Axis};
use tracing::debug;

use crate::error::{ColocationError, Result};
use crate::models::{ColocatedLocation, ColocatedResult, GriddedSeries, ObsKind, MODEL_ROW, OBS_ROW};
use crate::processors::aligner::{
    apply_pairing, kept_times, merged_times, prepare_model, AlignOptions, JobKey, MetadataDraft,
};
use crate::processors::outliers::OutlierFilter;
use crate::processors::regrid::{regrid_res_deg, regrid_to};
use crate::processors::resampler::resample_gridded;

/// Colocates a gridded model field with a gridded observation field.
///
/// The observation grid is the reference; the model is regridded onto it when
/// the two grids differ.
pub struct GriddedAligner<'a> {
    options: &'a AlignOptions,
}

impl<'a> GriddedAligner<'a> {
    pub fn new(options: &'a AlignOptions) -> Self {
        Self { options }
    }

    pub fn align(&self, job: &JobKey, model: &GriddedSeries, obs: &GriddedSeries) -> Result<ColocatedResult> {
        let options = self.options;
        let mut notes = Vec::new();
        let (ts_type_src_model, ts_type_src_obs) = (model.ts_type, obs.ts_type);
        let ts_type = options.resolve_ts_type(&[ts_type_src_model, ts_type_src_obs], &mut notes);

        let (model, obs) = match options.regrid_res_deg {
            Some(res) => (regrid_res_deg(model, res)?, regrid_res_deg(obs, res)?),
            None => (model.clone(), obs.clone()),
        };

        let (start, stop) = options.time_bounds();
        let model = model.crop(&options.region, start, stop)?;
        let obs = obs.crop(&options.region, start, stop)?;

        let (model, units_harmonised) = prepare_model(&model, &obs.units, job, options)?;
        let range = options.outlier_range(job);
        let obs = obs.map_values(|v| OutlierFilter::mask(v, range));

        let model = resample_gridded(&model, ts_type)?;
        let obs = resample_gridded(&obs, ts_type)?;

        let model = if model.same_grid(&obs) {
            model
        } else {
            debug!(
                "Regridding {} / {} onto the {} grid",
                model.data_id, model.var_name, obs.data_id
            );
            regrid_to(&model, &obs.latitudes, &obs.longitudes)?
        };

        let times = merged_times([model.times.as_slice(), obs.times.as_slice()]);
        let (nlat, nlon) = (obs.latitudes.len(), obs.longitudes.len());
        let mut data = Array3::from_elem((2, times.len(), nlat * nlon), f64::NAN);

        for (row, series) in [(MODEL_ROW, &model), (OBS_ROW, &obs)] {
            for (k, time) in series.times.iter().enumerate() {
                let Ok(t) = times.binary_search(time) else {
                    continue;
                };
                for i in 0..nlat {
                    for j in 0..nlon {
                        data[[row, t, i * nlon + j]] = series.values[[k, i, j]];
                    }
                }
            }
        }

        apply_pairing(&mut data, options.time_alignment);
        let keep = kept_times(&data, options.time_alignment);
        if keep.is_empty() {
            return Err(ColocationError::DataExtraction(format!(
                "No overlapping valid data for {} in {} at {} resolution",
                job, options.region.name, ts_type
            )));
        }
        let data = data.select(Axis(1), &keep);
        let times: Vec<_> = keep.iter().map(|t| times[*t]).collect();

        let locations = obs
            .latitudes
            .iter()
            .flat_map(|lat| {
                obs.longitudes.iter().map(move |lon| ColocatedLocation {
                    name: format!("{:.3}_{:.3}", lat, lon),
                    latitude: *lat,
                    longitude: *lon,
                    altitude: None,
                })
            })
            .collect();

        let metadata = MetadataDraft {
            job,
            options,
            obs_kind: ObsKind::Gridded,
            ts_type,
            ts_type_src_model,
            ts_type_src_obs,
            units_model: model.units.clone(),
            units_obs: obs.units.clone(),
            units_harmonised,
            times: &times,
            notes,
        }
        .build();

        ColocatedResult::new(data, times, locations, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Region, TsType};
    use chrono::{NaiveDate, NaiveDateTime};

    fn month(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2010, m, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn grid(data_id: &str, units: &str, lats: Vec<f64>, lons: Vec<f64>, value: f64) -> GriddedSeries {
        let values = Array3::from_elem((3, lats.len(), lons.len()), value);
        GriddedSeries::new(
            data_id,
            "od550aer",
            units,
            TsType::Monthly,
            vec![month(1), month(2), month(3)],
            lats,
            lons,
            values,
        )
        .unwrap()
    }

    fn job() -> JobKey {
        JobKey::new("TM5", "MODIS", "od550aer", "od550aer")
    }

    #[test]
    fn test_same_grid_colocation() {
        let model = grid("TM5", "1", vec![-45.0, 45.0], vec![0.0, 90.0], 0.3);
        let mut obs = grid("MODIS", "1", vec![-45.0, 45.0], vec![0.0, 90.0], 0.2);
        obs.values[[1, 0, 0]] = f64::NAN;

        let options = AlignOptions::new(TsType::Monthly, Region::from_filter_name("WORLD").unwrap());
        let result = GriddedAligner::new(&options).align(&job(), &model, &obs).unwrap();

        assert_eq!(result.shape(), (3, 4));
        assert_eq!(result.obs_values()[[0, 3]], 0.2);
        assert_eq!(result.model_values()[[2, 1]], 0.3);
        // masked on both rows
        assert!(result.model_values()[[1, 0]].is_nan());
        assert_eq!(result.num_valid_pairs(), 11);
        assert_eq!(result.metadata().obs_kind, ObsKind::Gridded);
        assert_eq!(result.metadata().start, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
    }

    #[test]
    fn test_disjoint_regions_fail_extraction() {
        // model over the northern hemisphere, obs over the southern, filter over Europe
        let model = grid("TM5", "1", vec![50.0, 60.0], vec![0.0, 10.0], 0.3);
        let obs = grid("MODIS", "1", vec![-60.0, -50.0], vec![0.0, 10.0], 0.2);
        let options = AlignOptions::new(TsType::Monthly, Region::from_filter_name("EUROPE").unwrap());

        let err = GriddedAligner::new(&options).align(&job(), &model, &obs).unwrap_err();
        assert!(matches!(err, ColocationError::DataExtraction(_)));
    }

    #[test]
    fn test_model_is_regridded_onto_obs_grid() {
        let model = grid("TM5", "1", vec![-5.0, 5.0], vec![-5.0, 5.0], 0.4);
        let obs = grid("MODIS", "1", vec![0.0], vec![0.0], 0.1);
        let options = AlignOptions::new(TsType::Yearly, Region::from_filter_name("WORLD").unwrap());

        let result = GriddedAligner::new(&options).align(&job(), &model, &obs).unwrap();
        assert_eq!(result.shape(), (1, 1));
        assert!((result.model_values()[[0, 0]] - 0.4).abs() < 1e-12);
        assert_eq!(result.metadata().ts_type, TsType::Yearly);
        assert_eq!(result.metadata().ts_type_src_model, TsType::Monthly);
    }

    #[test]
    fn test_unit_harmonisation() {
        let model = grid("TM5", "ng m-3", vec![0.0], vec![0.0], 2500.0);
        let obs = grid("MODIS", "ug m-3", vec![0.0], vec![0.0], 2.0);
        let mut options = AlignOptions::new(TsType::Monthly, Region::from_filter_name("WORLD").unwrap());
        options.harmonise_units = true;
        options.remove_outliers = false;

        let result = GriddedAligner::new(&options).align(&job(), &model, &obs).unwrap();
        assert!((result.model_values()[[0, 0]] - 2.5).abs() < 1e-9);
        assert_eq!(result.metadata().units_model, "ug m-3");
        assert!(result.metadata().units_harmonised);

        let bad = grid("MODIS", "Mm-1", vec![0.0], vec![0.0], 2.0);
        let err = GriddedAligner::new(&options).align(&job(), &model, &bad).unwrap_err();
        assert!(matches!(err, ColocationError::UnitMismatch { .. }));
    }

    #[test]
    fn test_model_on_0_360_grid_pairs_every_obs_cell() {
        let model = grid("TM5", "1", vec![0.0], vec![45.0, 135.0, 225.0, 315.0], 0.3);
        let obs = grid("MODIS", "1", vec![0.0], vec![-135.0, -45.0, 45.0, 135.0], 0.2);
        let options = AlignOptions::new(TsType::Monthly, Region::from_filter_name("WORLD").unwrap());

        let result = GriddedAligner::new(&options).align(&job(), &model, &obs).unwrap();
        assert_eq!(result.shape(), (3, 4));
        assert_eq!(result.num_valid_pairs(), 12);
    }

    #[test]
    fn test_outliers_are_removed() {
        let mut model = grid("TM5", "1", vec![0.0], vec![0.0], 0.3);
        model.values[[0, 0, 0]] = 42.0;
        let obs = grid("MODIS", "1", vec![0.0], vec![0.0], 0.2);
        let options = AlignOptions::new(TsType::Monthly, Region::from_filter_name("WORLD").unwrap());

        let result = GriddedAligner::new(&options).align(&job(), &model, &obs).unwrap();
        // January holds no valid pair once the outlier is masked
        assert_eq!(result.shape(), (2, 1));
        assert_eq!(result.times(), &[month(2), month(3)][..]);
        assert_eq!(result.model_values()[[0, 0]], 0.3);
        assert_eq!(result.num_valid_pairs(), 2);
    }
}
