use ndarray::Array3;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ColocationError, Result};
use crate::models::{GriddedSeries, TsType};
use crate::readers::{parse_timestamp, GriddedReader, ReadRequest};
use crate::utils::constants::VARIABLES_FILE;

#[derive(Debug, Deserialize)]
struct GridRow {
    time: String,
    latitude: f64,
    longitude: f64,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VariableRow {
    var_name: String,
    units: String,
}

/// One data file: `<var>_<ts_type>[_<vert>].csv`
#[derive(Debug, Clone, PartialEq)]
struct GridFile {
    var_name: String,
    ts_type: TsType,
    vert_code: Option<String>,
    path: PathBuf,
}

impl GridFile {
    fn parse(path: &Path) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let tokens: Vec<&str> = stem.split('_').collect();
        // the resolution token separates the variable name from the vertical code
        let k = tokens
            .iter()
            .rposition(|t| TsType::from_code(t, "file name").is_ok())?;
        if k == 0 || tokens.len() > k + 2 {
            return None;
        }
        Some(Self {
            var_name: tokens[..k].join("_"),
            ts_type: TsType::from_code(tokens[k], "file name").ok()?,
            vert_code: tokens.get(k + 1).map(|v| v.to_string()),
            path: path.to_path_buf(),
        })
    }
}

/// Gridded reader for `<root>/<data_id>/` directories of long-format CSV files
/// (`time,latitude,longitude,value`), with units in `variables.csv`
pub struct CsvGriddedReader {
    data_id: String,
    dir: PathBuf,
}

impl CsvGriddedReader {
    pub fn new(root: &Path, data_id: &str) -> Result<Self> {
        let dir = root.join(data_id);
        if !dir.is_dir() {
            return Err(ColocationError::DataCoverage(format!(
                "No data directory for {} in {}",
                data_id,
                root.display()
            )));
        }
        Ok(Self {
            data_id: data_id.to_string(),
            dir,
        })
    }

    fn files(&self) -> Vec<GridFile> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<GridFile> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| GridFile::parse(&e.path()))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn units_for(&self, var_name: &str) -> Result<String> {
        let path = self.dir.join(VARIABLES_FILE);
        if !path.is_file() {
            return Ok("1".to_string());
        }
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let units: HashMap<String, String> = reader
            .deserialize::<VariableRow>()
            .map(|row| row.map(|r| (r.var_name, r.units)))
            .collect::<std::result::Result<_, csv::Error>>()?;
        Ok(units.get(var_name).cloned().unwrap_or_else(|| "1".to_string()))
    }

    fn read_file(&self, file: &GridFile) -> Result<GriddedSeries> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&file.path)?;

        let mut rows = Vec::new();
        for row in reader.deserialize::<GridRow>() {
            let row = row?;
            rows.push((parse_timestamp(&row.time)?, row.latitude, row.longitude, row.value));
        }

        let times = sorted_unique(rows.iter().map(|r| r.0).collect());
        let latitudes = sorted_unique_f64(rows.iter().map(|r| r.1).collect());
        let longitudes = sorted_unique_f64(rows.iter().map(|r| r.2).collect());

        let mut values = Array3::from_elem((times.len(), latitudes.len(), longitudes.len()), f64::NAN);
        for (time, lat, lon, value) in rows {
            let (Ok(t), Some(i), Some(j)) = (
                times.binary_search(&time),
                position(&latitudes, lat),
                position(&longitudes, lon),
            ) else {
                continue;
            };
            values[[t, i, j]] = value.unwrap_or(f64::NAN);
        }

        debug!(
            "{}: read {} ({} x {} x {})",
            self.data_id,
            file.path.display(),
            times.len(),
            latitudes.len(),
            longitudes.len()
        );

        GriddedSeries::new(
            &self.data_id,
            &file.var_name,
            &self.units_for(&file.var_name)?,
            file.ts_type,
            times,
            latitudes,
            longitudes,
            values,
        )
    }
}

fn sorted_unique<T: Ord>(mut values: Vec<T>) -> Vec<T> {
    values.sort();
    values.dedup();
    values
}

fn sorted_unique_f64(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn position(axis: &[f64], value: f64) -> Option<usize> {
    axis.binary_search_by(|v| v.total_cmp(&value)).ok()
}

impl GriddedReader for CsvGriddedReader {
    fn data_id(&self) -> &str {
        &self.data_id
    }

    fn provides_variables(&self) -> BTreeSet<String> {
        self.files().into_iter().map(|f| f.var_name).collect()
    }

    fn read(&self, request: &ReadRequest) -> Result<GriddedSeries> {
        let candidates: Vec<GridFile> = self
            .files()
            .into_iter()
            .filter(|f| f.var_name == request.var_name)
            .filter(|f| match (&request.vert_which, &f.vert_code) {
                (Some(wanted), Some(have)) => wanted == have,
                _ => true,
            })
            .collect();

        let available: Vec<TsType> = candidates.iter().map(|f| f.ts_type).collect();
        let ts_type = request.select_ts_type(&available, &self.data_id)?;
        let file = candidates
            .iter()
            .find(|f| f.ts_type == ts_type)
            .ok_or_else(|| request.no_data(&self.data_id))?;

        request.crop_time(self.read_file(file)?, &self.data_id)
    }
}
