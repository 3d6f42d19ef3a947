use chrono::NaiveDateTime;
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ColocationError, Result};
use crate::models::{Region, TsType};

/// Dense (time, latitude, longitude) field of one variable from one source.
///
/// Missing values are NaN. Every transform returns a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddedSeries {
    pub data_id: String,
    pub var_name: String,
    pub units: String,
    pub ts_type: TsType,
    pub times: Vec<NaiveDateTime>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Array3<f64>,
}

impl GriddedSeries {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_id: &str,
        var_name: &str,
        units: &str,
        ts_type: TsType,
        times: Vec<NaiveDateTime>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        values: Array3<f64>,
    ) -> Result<Self> {
        let expected = (times.len(), latitudes.len(), longitudes.len());
        if values.dim() != expected {
            return Err(ColocationError::InvalidFormat(format!(
                "{} / {}: data shape {:?} does not match coordinates {:?}",
                data_id,
                var_name,
                values.dim(),
                expected
            )));
        }
        if !is_strictly_increasing(&times) {
            return Err(ColocationError::InvalidFormat(format!(
                "{} / {}: time axis must be strictly increasing",
                data_id, var_name
            )));
        }
        if !is_strictly_increasing(&latitudes) || !is_strictly_increasing(&longitudes) {
            return Err(ColocationError::InvalidFormat(format!(
                "{} / {}: latitude and longitude axes must be strictly increasing",
                data_id, var_name
            )));
        }

        Ok(Self {
            data_id: data_id.to_string(),
            var_name: var_name.to_string(),
            units: units.to_string(),
            ts_type,
            times,
            latitudes,
            longitudes,
            values,
        })
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.times.first().copied()
    }

    pub fn stop(&self) -> Option<NaiveDateTime> {
        self.times.last().copied()
    }

    pub fn same_grid(&self, other: &GriddedSeries) -> bool {
        axes_equal(&self.latitudes, &other.latitudes)
            && axes_equal(&self.longitudes, &other.longitudes)
    }

    /// Restrict to timestamps in `[start, stop]`
    pub fn crop_time(&self, start: NaiveDateTime, stop: NaiveDateTime) -> Result<Self> {
        let keep: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= start && **t <= stop)
            .map(|(i, _)| i)
            .collect();

        if keep.is_empty() {
            return Err(ColocationError::DataExtraction(format!(
                "Failed to apply temporal cropping to {} / {}: no timestamps between {} and {}",
                self.data_id, self.var_name, start, stop
            )));
        }

        Ok(Self {
            times: keep.iter().map(|i| self.times[*i]).collect(),
            values: self.values.select(Axis(0), &keep),
            ..self.clone()
        })
    }

    /// Restrict to grid cells whose centre lies inside `region`
    pub fn crop_region(&self, region: &Region) -> Result<Self> {
        if region.is_global() {
            return Ok(self.clone());
        }

        let lat_idx: Vec<usize> = (0..self.latitudes.len())
            .filter(|i| region.contains_lat(self.latitudes[*i]))
            .collect();
        let lon_idx: Vec<usize> = (0..self.longitudes.len())
            .filter(|i| region.contains_lon(self.longitudes[*i]))
            .collect();

        if lat_idx.is_empty() || lon_idx.is_empty() {
            return Err(ColocationError::DataExtraction(format!(
                "Failed to apply spatial cropping: {} / {} does not intersect region {}",
                self.data_id, self.var_name, region.name
            )));
        }

        let values = self
            .values
            .select(Axis(1), &lat_idx)
            .select(Axis(2), &lon_idx);

        Ok(Self {
            latitudes: lat_idx.iter().map(|i| self.latitudes[*i]).collect(),
            longitudes: lon_idx.iter().map(|i| self.longitudes[*i]).collect(),
            values,
            ..self.clone()
        })
    }

    pub fn crop(&self, region: &Region, start: NaiveDateTime, stop: NaiveDateTime) -> Result<Self> {
        self.crop_region(region)?.crop_time(start, stop)
    }

    /// New instance with `f` applied to every value
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        Self {
            values: self.values.mapv(f),
            ..self.clone()
        }
    }

    pub fn with_var_name(mut self, var_name: &str) -> Self {
        self.var_name = var_name.to_string();
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }
}

fn is_strictly_increasing<T: PartialOrd>(values: &[T]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

fn axes_equal(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
}
