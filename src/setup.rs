use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::{ColocationError, Result};
use crate::models::{AuxSpec, Region, TsType};
use crate::processors::aligner::{AlignOptions, TimeAlignment};
use crate::processors::interpolation::Interpolation;
use crate::processors::outliers::{OutlierFilter, ValueRange};
use crate::readers::ReadOptions;
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_FILTER_NAME, DEFAULT_MAX_BULK_POINTS,
};

fn default_ts_type() -> TsType {
    TsType::Daily
}

fn default_filter_name() -> String {
    DEFAULT_FILTER_NAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_bulk_points() -> usize {
    DEFAULT_MAX_BULK_POINTS
}

fn default_basedir() -> PathBuf {
    PathBuf::from("coldata")
}

fn default_max_workers() -> usize {
    1
}

fn default_compression() -> String {
    COMPRESSION_SNAPPY.to_string()
}

/// Analysis configuration of one (model, obs) colocation sweep.
///
/// Values are never changed in place; use [`ColocationSetup::with_overrides`]
/// to derive a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ColocationSetup {
    #[validate(length(min = 1))]
    pub model_id: String,

    #[validate(length(min = 1))]
    pub obs_id: String,

    #[serde(default)]
    pub obs_vars: Vec<String>,

    #[serde(default)]
    pub start: Option<NaiveDate>,

    #[serde(default)]
    pub stop: Option<NaiveDate>,

    /// Requested output resolution
    #[serde(default = "default_ts_type")]
    pub ts_type: TsType,

    /// Resolution to read model data at (finest available if unset)
    #[serde(default)]
    pub model_ts_type_read: Option<TsType>,

    #[serde(default = "default_true")]
    pub flex_ts_type: bool,

    #[serde(default = "default_filter_name")]
    pub filter_name: String,

    /// obs variable -> model variable
    #[serde(default)]
    pub model_use_vars: BTreeMap<String, String>,

    /// model variable -> how to compute it
    #[serde(default)]
    pub model_read_aux: BTreeMap<String, AuxSpec>,

    #[serde(default = "default_true")]
    pub remove_outliers: bool,

    #[serde(default)]
    pub var_outlier_ranges: BTreeMap<String, ValueRange>,

    #[serde(default)]
    pub harmonise_units: bool,

    #[validate(range(min = 0.1, max = 180.0))]
    #[serde(default)]
    pub regrid_res_deg: Option<f64>,

    #[serde(default)]
    pub obs_vert_type: Option<String>,

    #[serde(default)]
    pub obs_vert_type_alt: Option<String>,

    #[serde(default)]
    pub read_opts: ReadOptions,

    #[serde(default)]
    pub interpolation: Interpolation,

    #[serde(default)]
    pub time_alignment: TimeAlignment,

    #[validate(range(min = 1))]
    #[serde(default = "default_max_bulk_points")]
    pub max_bulk_points: usize,

    #[serde(default = "default_basedir")]
    pub basedir_coldata: PathBuf,

    #[serde(default = "default_true")]
    pub reanalyse_existing: bool,

    #[serde(default)]
    pub raise_exceptions: bool,

    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_compression")]
    pub compression: String,
}

/// Fields a caller may replace when deriving a new setup
#[derive(Debug, Clone, Default)]
pub struct SetupOverrides {
    pub model_id: Option<String>,
    pub obs_id: Option<String>,
    pub obs_vars: Option<Vec<String>>,
    pub start: Option<NaiveDate>,
    pub stop: Option<NaiveDate>,
    pub ts_type: Option<TsType>,
    pub filter_name: Option<String>,
    pub basedir_coldata: Option<PathBuf>,
    pub reanalyse_existing: Option<bool>,
    pub raise_exceptions: Option<bool>,
    pub max_workers: Option<usize>,
}

impl ColocationSetup {
    /// Setup with defaults for everything but the dataset ids and variables
    pub fn new(model_id: &str, obs_id: &str, obs_vars: &[&str]) -> Self {
        Self {
            model_id: model_id.to_string(),
            obs_id: obs_id.to_string(),
            obs_vars: obs_vars.iter().map(|v| v.to_string()).collect(),
            start: None,
            stop: None,
            ts_type: default_ts_type(),
            model_ts_type_read: None,
            flex_ts_type: true,
            filter_name: default_filter_name(),
            model_use_vars: BTreeMap::new(),
            model_read_aux: BTreeMap::new(),
            remove_outliers: true,
            var_outlier_ranges: BTreeMap::new(),
            harmonise_units: false,
            regrid_res_deg: None,
            obs_vert_type: None,
            obs_vert_type_alt: None,
            read_opts: ReadOptions::default(),
            interpolation: Interpolation::default(),
            time_alignment: TimeAlignment::default(),
            max_bulk_points: DEFAULT_MAX_BULK_POINTS,
            basedir_coldata: default_basedir(),
            reanalyse_existing: true,
            raise_exceptions: false,
            max_workers: default_max_workers(),
            compression: default_compression(),
        }
    }

    /// Load from a TOML, YAML or JSON file, with `COLOC__<FIELD>` environment
    /// variables layered on top
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("COLOC")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("obs_vars")
                    .try_parsing(true),
            )
            .build()?;

        let setup: Self = settings.try_deserialize()?;
        setup.check()?;
        Ok(setup)
    }

    /// Field validation plus the checks that span several fields
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        Region::from_filter_name(&self.filter_name)?;

        for aux in self.model_read_aux.values() {
            aux.validate()?;
        }

        match (self.start, self.stop) {
            (None, Some(_)) => {
                return Err(ColocationError::InvalidFormat(
                    "stop is set but start is not".to_string(),
                ))
            }
            (Some(start), Some(stop)) if stop < start => {
                return Err(ColocationError::InvalidFormat(format!(
                    "stop {} is before start {}",
                    stop, start
                )))
            }
            _ => {}
        }

        for (var, range) in &self.var_outlier_ranges {
            if range.low > range.high {
                return Err(ColocationError::InvalidFormat(format!(
                    "Invalid outlier range [{}, {}] for {}",
                    range.low, range.high, var
                )));
            }
        }

        let known = [
            COMPRESSION_SNAPPY,
            COMPRESSION_GZIP,
            COMPRESSION_LZ4,
            COMPRESSION_ZSTD,
            COMPRESSION_NONE,
        ];
        if !known.contains(&self.compression.to_lowercase().as_str()) {
            return Err(ColocationError::InvalidFormat(format!(
                "Unsupported compression: {}",
                self.compression
            )));
        }
        Ok(())
    }

    /// New setup with `overrides` applied; the original is left unchanged
    pub fn with_overrides(&self, overrides: SetupOverrides) -> Result<Self> {
        let mut setup = self.clone();
        if let Some(v) = overrides.model_id {
            setup.model_id = v;
        }
        if let Some(v) = overrides.obs_id {
            setup.obs_id = v;
        }
        if let Some(v) = overrides.obs_vars {
            setup.obs_vars = v;
        }
        if let Some(v) = overrides.start {
            setup.start = Some(v);
        }
        if let Some(v) = overrides.stop {
            setup.stop = Some(v);
        }
        if let Some(v) = overrides.ts_type {
            setup.ts_type = v;
        }
        if let Some(v) = overrides.filter_name {
            setup.filter_name = v;
        }
        if let Some(v) = overrides.basedir_coldata {
            setup.basedir_coldata = v;
        }
        if let Some(v) = overrides.reanalyse_existing {
            setup.reanalyse_existing = v;
        }
        if let Some(v) = overrides.raise_exceptions {
            setup.raise_exceptions = v;
        }
        if let Some(v) = overrides.max_workers {
            setup.max_workers = v;
        }
        setup.check()?;
        Ok(setup)
    }

    pub fn region(&self) -> Result<Region> {
        Region::from_filter_name(&self.filter_name)
    }

    /// Inclusive stop date: the configured one, or the end of the start year
    pub fn effective_stop(&self) -> Option<NaiveDate> {
        match (self.start, self.stop) {
            (_, Some(stop)) => Some(stop),
            (Some(start), None) => NaiveDate::from_ymd_opt(start.year(), 12, 31),
            (None, None) => None,
        }
    }

    /// Time range as timestamps; `None` means use whatever the data covers
    pub fn time_bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let start = self.start.map(|d| d.and_time(NaiveTime::MIN));
        let stop = self
            .effective_stop()
            .and_then(|d| d.and_hms_opt(23, 59, 59));
        (start, stop)
    }

    /// Vertical types to try when reading the model, in order
    pub fn vert_candidates(&self) -> Vec<String> {
        self.obs_vert_type
            .iter()
            .chain(self.obs_vert_type_alt.iter())
            .cloned()
            .collect()
    }

    /// Directory colocated files of this model are written to
    pub fn output_dir(&self) -> PathBuf {
        self.basedir_coldata.join(&self.model_id)
    }

    pub fn align_options(&self) -> Result<AlignOptions> {
        let (start, stop) = self.time_bounds();
        let mut options = AlignOptions::new(self.ts_type, self.region()?).with_time_range(start, stop);
        options.remove_outliers = self.remove_outliers;
        options.outliers = OutlierFilter::new(&self.var_outlier_ranges);
        options.harmonise_units = self.harmonise_units;
        options.regrid_res_deg = self.regrid_res_deg;
        options.interpolation = self.interpolation;
        options.time_alignment = self.time_alignment;
        options.max_bulk_points = self.max_bulk_points;
        Ok(options)
    }

    /// One `(key, value)` per field, for the run-log header
    pub fn config_lines(&self) -> Vec<(String, String)> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, value)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let setup = ColocationSetup::new("TM5", "AERONET", &["od550aer"]);
        assert!(setup.check().is_ok());
        assert_eq!(setup.ts_type, TsType::Daily);
        assert_eq!(setup.filter_name, "WORLD-wMOUNTAINS");
        assert_eq!(setup.output_dir(), PathBuf::from("coldata/TM5"));
        assert!(setup.vert_candidates().is_empty());
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
model_id = "TM5-met2010_CTRL-TEST"
obs_id = "AeronetSunV3L2Subset.daily"
obs_vars = ["od550aer", "ang4487aer"]
start = "2010-01-01"
ts_type = "monthly"
filter_name = "EUROPE-noMOUNTAINS"
obs_vert_type = "Column"
interpolation = "bilinear"

[model_use_vars]
ang4487aer = "ang4487aer_comp"

[model_read_aux.od550sum]
fun = "add_cubes"
vars_required = ["od550so4", "od550oa"]

[var_outlier_ranges.od550aer]
low = 0.0
high = 5.0
"#
        )
        .unwrap();

        let setup = ColocationSetup::load(file.path()).unwrap();
        assert_eq!(setup.model_id, "TM5-met2010_CTRL-TEST");
        assert_eq!(setup.obs_vars, vec!["od550aer".to_string(), "ang4487aer".to_string()]);
        assert_eq!(setup.ts_type, TsType::Monthly);
        assert_eq!(setup.interpolation, Interpolation::Bilinear);
        assert_eq!(setup.model_use_vars["ang4487aer"], "ang4487aer_comp");
        assert_eq!(setup.model_read_aux["od550sum"].fun, "add_cubes");
        assert_eq!(setup.var_outlier_ranges["od550aer"], ValueRange::new(0.0, 5.0));
        assert_eq!(setup.vert_candidates(), vec!["Column".to_string()]);
        assert_eq!(
            setup.effective_stop(),
            Some(NaiveDate::from_ymd_opt(2010, 12, 31).unwrap())
        );
        let region = setup.region().unwrap();
        assert_eq!(region.max_altitude, Some(1000.0));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let setup = ColocationSetup::new("TM5", "AERONET", &["od550aer"]);

        let bad_filter = setup.with_overrides(SetupOverrides {
            filter_name: Some("ATLANTIS".to_string()),
            ..Default::default()
        });
        assert!(matches!(bad_filter, Err(ColocationError::InvalidFilter(_))));

        let bad_range = setup.with_overrides(SetupOverrides {
            start: Some(NaiveDate::from_ymd_opt(2011, 1, 1).unwrap()),
            stop: Some(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()),
            ..Default::default()
        });
        assert!(bad_range.is_err());

        let bad_workers = setup.with_overrides(SetupOverrides {
            max_workers: Some(0),
            ..Default::default()
        });
        assert!(matches!(bad_workers, Err(ColocationError::Validation(_))));
    }

    #[test]
    fn test_with_overrides_returns_new_value() {
        let setup = ColocationSetup::new("TM5", "AERONET", &["od550aer"]);
        let derived = setup
            .with_overrides(SetupOverrides {
                obs_id: Some("EBASMC".to_string()),
                raise_exceptions: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(derived.obs_id, "EBASMC");
        assert!(derived.raise_exceptions);
        assert_eq!(setup.obs_id, "AERONET");
        assert!(!setup.raise_exceptions);
    }

    #[test]
    fn test_config_lines() {
        let setup = ColocationSetup::new("TM5", "AERONET", &["od550aer"]);
        let lines = setup.config_lines();
        assert!(lines.contains(&("model_id".to_string(), "TM5".to_string())));
        assert!(lines.contains(&("ts_type".to_string(), "daily".to_string())));
    }
}
