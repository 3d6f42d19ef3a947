pub mod aux;
pub mod catalog;
pub mod gridded_reader;
pub mod memory;
pub mod station_reader;

pub use aux::{AuxFn, AuxRegistry, GriddedSource};
pub use catalog::ReaderCatalog;
pub use gridded_reader::CsvGriddedReader;
pub use memory::{InMemoryGriddedReader, InMemoryUngriddedReader};
pub use station_reader::{CsvStationReader, StationReader};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ColocationError, Result};
use crate::models::{GriddedSeries, StationCollection, TsType};

/// What to read from a gridded source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequest {
    pub var_name: String,
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
    /// Preferred resolution; `None` reads the finest available
    pub ts_type: Option<TsType>,
    /// Fall back to the finest available resolution if `ts_type` is missing
    pub flex_ts_type: bool,
    /// Vertical type code, e.g. `Surface` or `ModelLevel`
    pub vert_which: Option<String>,
}

impl ReadRequest {
    pub fn new(var_name: &str) -> Self {
        Self {
            var_name: var_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_time_range(mut self, start: Option<NaiveDateTime>, stop: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn with_ts_type(mut self, ts_type: Option<TsType>, flex_ts_type: bool) -> Self {
        self.ts_type = ts_type;
        self.flex_ts_type = flex_ts_type;
        self
    }

    pub fn with_vert_which(mut self, vert_which: Option<String>) -> Self {
        self.vert_which = vert_which;
        self
    }

    /// Same request for another variable (used for auxiliary inputs)
    pub fn for_variable(&self, var_name: &str) -> Self {
        Self {
            var_name: var_name.to_string(),
            ..self.clone()
        }
    }

    /// Pick a resolution from those available for the variable
    pub fn select_ts_type(&self, available: &[TsType], data_id: &str) -> Result<TsType> {
        let finest = available.iter().min().copied();
        match (self.ts_type, finest) {
            (_, None) => Err(self.no_data(data_id)),
            (None, Some(finest)) => Ok(finest),
            (Some(wanted), Some(_)) if available.contains(&wanted) => Ok(wanted),
            (Some(_), Some(finest)) if self.flex_ts_type => Ok(finest),
            (Some(wanted), Some(_)) => Err(ColocationError::DataCoverage(format!(
                "{}: no {} data for {} (available: {})",
                data_id,
                wanted,
                self.var_name,
                available
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Crop `series` to the requested time range; an empty result means no
    /// data for the request
    pub fn crop_time(&self, series: GriddedSeries, data_id: &str) -> Result<GriddedSeries> {
        let start = self.start.unwrap_or(NaiveDateTime::MIN);
        let stop = self.stop.unwrap_or(NaiveDateTime::MAX);
        if self.start.is_none() && self.stop.is_none() {
            return Ok(series);
        }
        series.crop_time(start, stop).map_err(|_| {
            ColocationError::DataCoverage(format!(
                "{}: no {} data between {} and {}",
                data_id, self.var_name, start, stop
            ))
        })
    }

    pub fn no_data(&self, data_id: &str) -> ColocationError {
        let vert = self
            .vert_which
            .as_deref()
            .map(|v| format!(" ({})", v))
            .unwrap_or_default();
        ColocationError::DataCoverage(format!(
            "{}: no files found for variable {}{}",
            data_id, self.var_name, vert
        ))
    }
}

/// Filters applied when reading ungridded data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Wildcard patterns on station names; empty keeps all stations
    pub station_names: Vec<String>,
}

/// Source of gridded (model or gridded-obs) data
pub trait GriddedReader: Send + Sync {
    fn data_id(&self) -> &str;

    fn provides_variables(&self) -> BTreeSet<String>;

    fn read(&self, request: &ReadRequest) -> Result<GriddedSeries>;
}

/// Source of station (ungridded) observations
pub trait UngriddedReader: Send + Sync {
    fn dataset_id(&self) -> &str;

    fn supported_variables(&self) -> BTreeSet<String>;

    fn read(&self, var_names: &[String], options: &ReadOptions) -> Result<StationCollection>;
}

/// Parse timestamps written as `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` or
/// `YYYY-MM-DD HH:MM:SS`
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")?;
    Ok(date.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_ts_type() {
        let available = [TsType::Daily, TsType::Monthly];
        let req = ReadRequest::new("od550aer");
        assert_eq!(req.select_ts_type(&available, "TM5").unwrap(), TsType::Daily);

        let req = ReadRequest::new("od550aer").with_ts_type(Some(TsType::Monthly), false);
        assert_eq!(req.select_ts_type(&available, "TM5").unwrap(), TsType::Monthly);

        let req = ReadRequest::new("od550aer").with_ts_type(Some(TsType::Hourly), false);
        assert!(req
            .select_ts_type(&available, "TM5")
            .unwrap_err()
            .is_data_coverage());

        let req = ReadRequest::new("od550aer").with_ts_type(Some(TsType::Hourly), true);
        assert_eq!(req.select_ts_type(&available, "TM5").unwrap(), TsType::Daily);

        assert!(req.select_ts_type(&[], "TM5").is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2010, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2010-03-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2010-03-01 12:00:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2010-03-01").unwrap(),
            expected.date().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_timestamp("01/03/2010").is_err());
    }
}
