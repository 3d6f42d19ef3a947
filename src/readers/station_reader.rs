use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use validator::Validate;

use crate::error::{ColocationError, Result};
use crate::models::{StationCollection, StationMetadata, StationSeries, TsType};
use crate::readers::{parse_timestamp, ReadOptions, UngriddedReader};
use crate::utils::constants::{STATIONS_FILE, VARIABLES_FILE};
use crate::utils::coordinates::parse_coordinate;
use crate::utils::pattern::matches_any;

#[derive(Debug, Deserialize)]
struct StationRow {
    station_name: String,
    latitude: String,
    longitude: String,
    altitude: Option<String>,
    instrument: Option<String>,
    ts_type: String,
}

#[derive(Debug, Deserialize)]
struct SampleRow {
    station_name: String,
    time: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VariableRow {
    var_name: String,
    units: String,
}

/// Reads the `stations.csv` station table of a dataset
pub struct StationReader {
    data_id: String,
}

impl StationReader {
    pub fn new(data_id: &str) -> Self {
        Self {
            data_id: data_id.to_string(),
        }
    }

    /// Read station metadata and native resolutions, keyed by station name
    pub fn read_stations(&self, path: &Path) -> Result<BTreeMap<String, (StationMetadata, TsType)>> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let mut stations = BTreeMap::new();

        for row in reader.deserialize::<StationRow>() {
            let row = row?;
            let (station, ts_type) = self.parse_station(row)?;
            stations.insert(station.station_name.clone(), (station, ts_type));
        }

        Ok(stations)
    }

    fn parse_station(&self, row: StationRow) -> Result<(StationMetadata, TsType)> {
        let latitude = parse_coordinate(&row.latitude)?;
        let longitude = parse_coordinate(&row.longitude)?;

        // empty or -999 altitude means unknown
        let altitude = match row.altitude.as_deref().map(str::trim) {
            None | Some("") | Some("-999") => None,
            Some(alt) => Some(alt.parse::<f64>().map_err(|_| {
                ColocationError::InvalidFormat(format!("Invalid altitude: '{}'", alt))
            })?),
        };

        let mut station =
            StationMetadata::new(&row.station_name, latitude, longitude, altitude, &self.data_id);
        if let Some(instrument) = row.instrument.filter(|i| !i.is_empty()) {
            station = station.with_instrument(&instrument);
        }
        station.validate()?;

        let source = format!("{} station {}", self.data_id, row.station_name);
        let ts_type = TsType::from_code(&row.ts_type, &source)?;
        Ok((station, ts_type))
    }
}

/// Ungridded reader for `<root>/<dataset_id>/` directories holding
/// `stations.csv`, optional `variables.csv` and one `<var>.csv` per variable
pub struct CsvStationReader {
    dataset_id: String,
    dir: PathBuf,
}

impl CsvStationReader {
    pub fn new(root: &Path, dataset_id: &str) -> Result<Self> {
        let dir = root.join(dataset_id);
        if !dir.join(STATIONS_FILE).is_file() {
            return Err(ColocationError::DataCoverage(format!(
                "No {} found for dataset {} in {}",
                STATIONS_FILE,
                dataset_id,
                root.display()
            )));
        }
        Ok(Self {
            dataset_id: dataset_id.to_string(),
            dir,
        })
    }

    fn read_units(&self) -> Result<HashMap<String, String>> {
        let path = self.dir.join(VARIABLES_FILE);
        if !path.is_file() {
            return Ok(HashMap::new());
        }
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        reader
            .deserialize::<VariableRow>()
            .map(|row| row.map(|r| (r.var_name, r.units)).map_err(Into::into))
            .collect()
    }

    fn read_variable(
        &self,
        var_name: &str,
        units: &str,
        stations: &BTreeMap<String, (StationMetadata, TsType)>,
        options: &ReadOptions,
    ) -> Result<Vec<StationSeries>> {
        let path = self.dir.join(format!("{}.csv", var_name));
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&path)?;

        let mut samples: BTreeMap<String, Vec<(chrono::NaiveDateTime, f64)>> = BTreeMap::new();
        for row in reader.deserialize::<SampleRow>() {
            let row = row?;
            if !matches_any(&row.station_name, &options.station_names) {
                continue;
            }
            let time = parse_timestamp(&row.time)?;
            samples
                .entry(row.station_name)
                .or_default()
                .push((time, row.value.unwrap_or(f64::NAN)));
        }

        let mut series = Vec::with_capacity(samples.len());
        for (name, values) in samples {
            let Some((station, ts_type)) = stations.get(&name) else {
                warn!(
                    "{}: station {} in {} is not listed in {}, skipping",
                    self.dataset_id,
                    name,
                    path.display(),
                    STATIONS_FILE
                );
                continue;
            };
            series.push(StationSeries::new(
                station.clone(),
                var_name,
                units,
                *ts_type,
                values,
            )?);
        }
        Ok(series)
    }
}

impl UngriddedReader for CsvStationReader {
    fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    fn supported_variables(&self) -> BTreeSet<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| name != STATIONS_FILE && name != VARIABLES_FILE)
            .filter_map(|name| name.strip_suffix(".csv").map(str::to_string))
            .collect()
    }

    fn read(&self, var_names: &[String], options: &ReadOptions) -> Result<StationCollection> {
        let supported = self.supported_variables();
        if let Some(missing) = var_names.iter().find(|v| !supported.contains(*v)) {
            return Err(ColocationError::DataCoverage(format!(
                "{} does not provide variable {}",
                self.dataset_id, missing
            )));
        }

        let stations = StationReader::new(&self.dataset_id).read_stations(&self.dir.join(STATIONS_FILE))?;
        let units = self.read_units()?;

        let mut series = Vec::new();
        for var_name in var_names {
            let var_units = units.get(var_name).map(String::as_str).unwrap_or("1");
            let mut var_series = self.read_variable(var_name, var_units, &stations, options)?;
            debug!(
                "{}: read {} series of {}",
                self.dataset_id,
                var_series.len(),
                var_name
            );
            series.append(&mut var_series);
        }

        Ok(StationCollection::new(&self.dataset_id, series))
    }
}
