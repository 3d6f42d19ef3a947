use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ColocationError, Result};

/// Temporal resolution code.
///
/// Variants are declared from finest to coarsest, so the derived `Ord` is the
/// resolution order: a greater value is a lower (coarser) resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum TsType {
    Hourly,
    ThreeHourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl TsType {
    pub const ALL: [TsType; 6] = [
        TsType::Hourly,
        TsType::ThreeHourly,
        TsType::Daily,
        TsType::Weekly,
        TsType::Monthly,
        TsType::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TsType::Hourly => "hourly",
            TsType::ThreeHourly => "3hourly",
            TsType::Daily => "daily",
            TsType::Weekly => "weekly",
            TsType::Monthly => "monthly",
            TsType::Yearly => "yearly",
        }
    }

    /// Position in the resolution order (0 = finest)
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Parse a resolution code, naming `source` in the error if unknown
    pub fn from_code(code: &str, source: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ts| ts.as_str() == code)
            .ok_or_else(|| {
                ColocationError::TemporalResolution(format!(
                    "Invalid temporal resolution '{}' in {}",
                    code, source
                ))
            })
    }

    pub fn is_coarser_than(&self, other: TsType) -> bool {
        *self > other
    }

    /// Start of the period of this resolution that contains `time`
    pub fn period_start(&self, time: NaiveDateTime) -> NaiveDateTime {
        let date = time.date();
        match self {
            TsType::Hourly => date.and_time(hour_start(time.hour())),
            TsType::ThreeHourly => date.and_time(hour_start(time.hour() - time.hour() % 3)),
            TsType::Daily => date.and_time(NaiveTime::MIN),
            TsType::Weekly => {
                let offset = date.weekday().num_days_from_monday() as i64;
                (date - chrono::Duration::days(offset)).and_time(NaiveTime::MIN)
            }
            TsType::Monthly => first_of_month(date.year(), date.month()).and_time(NaiveTime::MIN),
            TsType::Yearly => first_of_month(date.year(), 1).and_time(NaiveTime::MIN),
        }
    }
}

fn hour_start(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

impl fmt::Display for TsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsType {
    type Err = ColocationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s, "input")
    }
}

impl TryFrom<String> for TsType {
    type Error = ColocationError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_code(&value, "configuration")
    }
}

impl From<TsType> for String {
    fn from(value: TsType) -> Self {
        value.as_str().to_string()
    }
}

/// Coarsest resolution among the requested one and all native resolutions.
///
/// Output can never be finer than the native resolution of any contributing
/// source.
pub fn lowest_resolution(requested: TsType, natives: &[TsType]) -> TsType {
    natives.iter().copied().fold(requested, TsType::max)
}

/// Code-level variant of [`lowest_resolution`].
///
/// Each native entry is `(source, code)`; an unknown code fails with a
/// temporal resolution error naming the code and its source.
pub fn resolve_resolution(requested: &str, natives: &[(&str, &str)]) -> Result<TsType> {
    let requested = TsType::from_code(requested, "request")?;
    let natives = natives
        .iter()
        .map(|(source, code)| TsType::from_code(code, source))
        .collect::<Result<Vec<_>>>()?;
    Ok(lowest_resolution(requested, &natives))
}
