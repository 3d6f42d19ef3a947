use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::TsType;
use crate::utils::constants::{COLOCATED_FILE_EXTENSION, LOGFILES_DIR};

/// Inputs that identify one colocated output file; the savename is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavenameKey {
    pub var_name: String,
    pub obs_id: String,
    pub model_id: String,
    pub start: NaiveDate,
    pub stop: NaiveDate,
    pub ts_type: TsType,
    pub filter_name: String,
}

impl SavenameKey {
    /// `<var>_REF-<obs_id>_MOD-<model_id>_<start>_<stop>_<ts_type>_<filter>.parquet`
    pub fn savename(&self) -> String {
        format!(
            "{}_REF-{}_MOD-{}_{}_{}_{}_{}.{}",
            self.var_name,
            self.obs_id,
            self.model_id,
            to_datestring_yyyymmdd(self.start),
            to_datestring_yyyymmdd(self.stop),
            self.ts_type,
            self.filter_name,
            COLOCATED_FILE_EXTENSION
        )
    }
}

pub fn to_datestring_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Run log path: `<basedir>/logfiles/<model_id>/<obs_id>_<YYYYMMDD>.log`
pub fn run_log_path(basedir: &Path, model_id: &str, obs_id: &str, day: NaiveDate) -> PathBuf {
    basedir
        .join(LOGFILES_DIR)
        .join(model_id)
        .join(format!("{}_{}.log", obs_id, to_datestring_yyyymmdd(day)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SavenameKey {
        SavenameKey {
            var_name: "od550aer".to_string(),
            obs_id: "obs".to_string(),
            model_id: "model".to_string(),
            start: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            stop: NaiveDate::from_ymd_opt(2010, 12, 31).unwrap(),
            ts_type: TsType::Monthly,
            filter_name: "WORLD".to_string(),
        }
    }

    #[test]
    fn test_savename_format() {
        assert_eq!(
            key().savename(),
            "od550aer_REF-obs_MOD-model_20100101_20101231_monthly_WORLD.parquet"
        );
    }

    #[test]
    fn test_savename_is_deterministic() {
        assert_eq!(key().savename(), key().savename());
    }

    #[test]
    fn test_every_field_changes_savename() {
        let base = key().savename();
        let variants = [
            SavenameKey { var_name: "od550lt1aer".to_string(), ..key() },
            SavenameKey { obs_id: "obs2".to_string(), ..key() },
            SavenameKey { model_id: "model2".to_string(), ..key() },
            SavenameKey { start: NaiveDate::from_ymd_opt(2010, 2, 1).unwrap(), ..key() },
            SavenameKey { stop: NaiveDate::from_ymd_opt(2010, 11, 30).unwrap(), ..key() },
            SavenameKey { ts_type: TsType::Daily, ..key() },
            SavenameKey { filter_name: "EUROPE".to_string(), ..key() },
        ];
        for variant in variants {
            assert_ne!(variant.savename(), base, "{:?}", variant);
        }
    }

    #[test]
    fn test_run_log_path() {
        let path = run_log_path(
            Path::new("/data/coldata"),
            "TM5",
            "EBASMC",
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        );
        assert_eq!(path, PathBuf::from("/data/coldata/logfiles/TM5/EBASMC_20240305.log"));
    }
}
