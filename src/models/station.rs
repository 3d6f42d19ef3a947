use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

use crate::error::{ColocationError, Result};
use crate::models::{Region, TsType};
use crate::utils::pattern::matches_any;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StationMetadata {
    #[validate(length(min = 1))]
    pub station_name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 360.0))]
    pub longitude: f64,

    pub altitude: Option<f64>,

    pub instrument: Option<String>,

    /// Provider / network the station record came from
    pub data_id: String,
}

impl StationMetadata {
    pub fn new(
        station_name: &str,
        latitude: f64,
        longitude: f64,
        altitude: Option<f64>,
        data_id: &str,
    ) -> Self {
        Self {
            station_name: station_name.to_string(),
            latitude,
            longitude,
            altitude,
            instrument: None,
            data_id: data_id.to_string(),
        }
    }

    pub fn with_instrument(mut self, instrument: &str) -> Self {
        self.instrument = Some(instrument.to_string());
        self
    }

    pub fn is_within(&self, region: &Region) -> bool {
        region.contains(self.latitude, self.longitude) && region.accepts_altitude(self.altitude)
    }
}

/// Irregular time series of one variable at one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSeries {
    pub station: StationMetadata,
    pub var_name: String,
    pub units: String,
    pub ts_type: TsType,
    pub times: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
}

impl StationSeries {
    /// Build a series; samples are sorted by time.
    pub fn new(
        station: StationMetadata,
        var_name: &str,
        units: &str,
        ts_type: TsType,
        samples: Vec<(NaiveDateTime, f64)>,
    ) -> Result<Self> {
        station.validate()?;

        let mut samples = samples;
        samples.sort_by_key(|(t, _)| *t);
        if samples.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(ColocationError::InvalidFormat(format!(
                "Duplicate timestamps in {} series of station {}",
                var_name, station.station_name
            )));
        }

        let (times, values) = samples.into_iter().unzip();
        Ok(Self {
            station,
            var_name: var_name.to_string(),
            units: units.to_string(),
            ts_type,
            times,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Ungridded observation dataset: station series for one or more variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationCollection {
    pub dataset_id: String,
    pub series: Vec<StationSeries>,
}

impl StationCollection {
    pub fn new(dataset_id: &str, series: Vec<StationSeries>) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            series,
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        self.series.iter().map(|s| s.var_name.clone()).collect()
    }

    pub fn station_count(&self) -> usize {
        self.series
            .iter()
            .map(|s| s.station.station_name.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Series of `var_name` inside `region` whose station name matches one of
    /// `name_patterns` (all stations if no patterns are given)
    pub fn select<'a>(
        &'a self,
        var_name: &str,
        region: &Region,
        name_patterns: &[String],
    ) -> Vec<&'a StationSeries> {
        self.series
            .iter()
            .filter(|s| s.var_name == var_name)
            .filter(|s| s.station.is_within(region))
            .filter(|s| matches_any(&s.station.station_name, name_patterns))
            .collect()
    }
}
