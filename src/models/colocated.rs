use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ColocationError, Result};
use crate::models::TsType;
use crate::utils::filename::SavenameKey;
use crate::writers::ColocatedWriter;

/// Row of the data array holding model values
pub const MODEL_ROW: usize = 0;
/// Row of the data array holding observation values
pub const OBS_ROW: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObsKind {
    Gridded,
    Ungridded,
}

/// One point of the location axis (a station or a grid cell centre)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocatedLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Provenance of a colocated result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColocationMetadata {
    pub obs_var: String,
    pub model_var: String,
    pub obs_id: String,
    pub model_id: String,
    pub obs_kind: ObsKind,
    /// Resolution actually used
    pub ts_type: TsType,
    pub ts_type_src_model: TsType,
    pub ts_type_src_obs: TsType,
    pub start: NaiveDate,
    pub stop: NaiveDate,
    pub filter_name: String,
    pub units_model: String,
    pub units_obs: String,
    pub outliers_removed: bool,
    pub units_harmonised: bool,
    pub notes: Vec<String>,
}

impl ColocationMetadata {
    pub fn savename_key(&self) -> SavenameKey {
        SavenameKey {
            var_name: self.model_var.clone(),
            obs_id: self.obs_id.clone(),
            model_id: self.model_id.clone(),
            start: self.start,
            stop: self.stop,
            ts_type: self.ts_type,
            filter_name: self.filter_name.clone(),
        }
    }
}

/// Paired (model, obs) values on a shared (time, location) index.
///
/// The data array has shape `(2, times, locations)`; row [`MODEL_ROW`] is the
/// model, row [`OBS_ROW`] the observation, and NaN marks absence. Instances are
/// immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ColocatedResult {
    data: Array3<f64>,
    times: Vec<NaiveDateTime>,
    locations: Vec<ColocatedLocation>,
    metadata: ColocationMetadata,
}

impl ColocatedResult {
    pub fn new(
        data: Array3<f64>,
        times: Vec<NaiveDateTime>,
        locations: Vec<ColocatedLocation>,
        metadata: ColocationMetadata,
    ) -> Result<Self> {
        let expected = (2, times.len(), locations.len());
        if data.dim() != expected {
            return Err(ColocationError::InvalidFormat(format!(
                "Colocated data shape {:?} does not match (2, times, locations) = {:?}",
                data.dim(),
                expected
            )));
        }
        if times.is_empty() || locations.is_empty() {
            return Err(ColocationError::DataExtraction(format!(
                "Colocated data for {} / {} is empty",
                metadata.model_var, metadata.obs_var
            )));
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ColocationError::InvalidFormat(
                "Colocated time axis must be strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            data,
            times,
            locations,
            metadata,
        })
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn model_values(&self) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), MODEL_ROW)
    }

    pub fn obs_values(&self) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), OBS_ROW)
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn locations(&self) -> &[ColocatedLocation] {
        &self.locations
    }

    pub fn metadata(&self) -> &ColocationMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.times.len(), self.locations.len())
    }

    pub fn savename(&self) -> String {
        self.metadata.savename_key().savename()
    }

    /// Number of (time, location) cells with both values present
    pub fn num_valid_pairs(&self) -> usize {
        self.model_values()
            .iter()
            .zip(self.obs_values().iter())
            .filter(|(m, o)| !m.is_nan() && !o.is_nan())
            .count()
    }

    pub fn statistics(&self) -> ColocatedStatistics {
        ColocatedStatistics::from_pairs(
            self.model_values()
                .iter()
                .zip(self.obs_values().iter())
                .filter(|(m, o)| !m.is_nan() && !o.is_nan())
                .map(|(m, o)| (*m, *o)),
        )
    }

    /// Write to `directory` under [`Self::savename`] with default writer settings
    pub fn write(&self, directory: &Path) -> Result<PathBuf> {
        ColocatedWriter::new().write_result(self, directory)
    }

    pub fn read(path: &Path) -> Result<Self> {
        ColocatedWriter::new().read_result(path)
    }
}

/// Summary statistics over valid (model, obs) pairs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColocatedStatistics {
    pub num_pairs: usize,
    pub mean_model: f64,
    pub mean_obs: f64,
    pub mean_bias: f64,
    pub rmse: f64,
    pub correlation: Option<f64>,
}

impl ColocatedStatistics {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: Iterator<Item = (f64, f64)>,
    {
        let pairs: Vec<(f64, f64)> = pairs.collect();
        let n = pairs.len();
        if n == 0 {
            return Self::default();
        }
        let nf = n as f64;
        let mean_model = pairs.iter().map(|(m, _)| m).sum::<f64>() / nf;
        let mean_obs = pairs.iter().map(|(_, o)| o).sum::<f64>() / nf;
        let rmse = (pairs.iter().map(|(m, o)| (m - o).powi(2)).sum::<f64>() / nf).sqrt();

        let cov: f64 = pairs
            .iter()
            .map(|(m, o)| (m - mean_model) * (o - mean_obs))
            .sum();
        let var_m: f64 = pairs.iter().map(|(m, _)| (m - mean_model).powi(2)).sum();
        let var_o: f64 = pairs.iter().map(|(_, o)| (o - mean_obs).powi(2)).sum();
        let correlation = if n > 1 && var_m > 0.0 && var_o > 0.0 {
            Some(cov / (var_m.sqrt() * var_o.sqrt()))
        } else {
            None
        };

        Self {
            num_pairs: n,
            mean_model,
            mean_obs,
            mean_bias: mean_model - mean_obs,
            rmse,
            correlation,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Pairs: {}\nMean model: {:.4}\nMean obs: {:.4}\nMean bias: {:.4}\nRMSE: {:.4}\nCorrelation: {}",
            self.num_pairs,
            self.mean_model,
            self.mean_obs,
            self.mean_bias,
            self.rmse,
            self.correlation
                .map(|r| format!("{:.4}", r))
                .unwrap_or_else(|| "n/a".to_string())
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_metadata() -> ColocationMetadata {
        ColocationMetadata {
            obs_var: "od550aer".to_string(),
            model_var: "od550aer".to_string(),
            obs_id: "AeronetSunV3L2Subset.daily".to_string(),
            model_id: "TM5-met2010_CTRL-TEST".to_string(),
            obs_kind: ObsKind::Ungridded,
            ts_type: TsType::Monthly,
            ts_type_src_model: TsType::Monthly,
            ts_type_src_obs: TsType::Daily,
            start: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            stop: NaiveDate::from_ymd_opt(2010, 12, 31).unwrap(),
            filter_name: "WORLD-wMOUNTAINS".to_string(),
            units_model: "1".to_string(),
            units_obs: "1".to_string(),
            outliers_removed: true,
            units_harmonised: false,
            notes: vec![],
        }
    }

    fn month(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2010, m, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn location(name: &str) -> ColocatedLocation {
        ColocatedLocation {
            name: name.to_string(),
            latitude: 10.0,
            longitude: 20.0,
            altitude: None,
        }
    }

    #[test]
    fn test_shape_is_checked() {
        let err = ColocatedResult::new(
            Array3::zeros((2, 2, 1)),
            vec![month(1)],
            vec![location("a")],
            sample_metadata(),
        );
        assert!(err.is_err());

        let empty = ColocatedResult::new(
            Array3::zeros((2, 0, 1)),
            vec![],
            vec![location("a")],
            sample_metadata(),
        );
        assert!(matches!(empty, Err(ColocationError::DataExtraction(_))));
    }

    #[test]
    fn test_rows_and_statistics() {
        let mut data = Array3::from_elem((2, 2, 2), f64::NAN);
        data[[MODEL_ROW, 0, 0]] = 0.2;
        data[[OBS_ROW, 0, 0]] = 0.1;
        data[[MODEL_ROW, 1, 1]] = 0.4;
        data[[OBS_ROW, 1, 1]] = 0.3;
        data[[MODEL_ROW, 1, 0]] = 0.9;

        let result = ColocatedResult::new(
            data,
            vec![month(1), month(2)],
            vec![location("a"), location("b")],
            sample_metadata(),
        )
        .unwrap();

        assert_eq!(result.shape(), (2, 2));
        assert_eq!(result.model_values()[[1, 1]], 0.4);
        assert_eq!(result.obs_values()[[0, 0]], 0.1);
        assert_eq!(result.num_valid_pairs(), 2);

        let stats = result.statistics();
        assert_eq!(stats.num_pairs, 2);
        assert!((stats.mean_bias - 0.1).abs() < 1e-12);
        assert!((stats.correlation.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_savename_uses_model_variable() {
        let mut meta = sample_metadata();
        meta.model_var = "ec550dryaer".to_string();
        meta.obs_var = "scatc550dryaer".to_string();
        assert_eq!(
            meta.savename_key().savename(),
            "ec550dryaer_REF-AeronetSunV3L2Subset.daily_MOD-TM5-met2010_CTRL-TEST_20100101_20101231_monthly_WORLD-wMOUNTAINS.parquet"
        );
    }
}
