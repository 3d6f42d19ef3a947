use serde::{Deserialize, Serialize};

use crate::error::{ColocationError, Result};
use crate::utils::constants::{
    FILTER_NO_MOUNTAINS_SUFFIX, FILTER_WITH_MOUNTAINS_SUFFIX, MOUNTAIN_ALTITUDE_THRESHOLD,
};
use crate::utils::coordinates::normalize_longitude;

/// Built-in regions: (name, lat range, lon range)
const DEFAULT_REGIONS: &[(&str, (f64, f64), (f64, f64))] = &[
    ("WORLD", (-90.0, 90.0), (-180.0, 180.0)),
    ("EUROPE", (30.0, 80.0), (-20.0, 70.0)),
    ("NAMERICA", (10.0, 80.0), (-170.0, -50.0)),
    ("SAMERICA", (-60.0, 20.0), (-105.0, -30.0)),
    ("AFRICA", (-40.0, 40.0), (-20.0, 50.0)),
    ("ASIA", (0.0, 80.0), (70.0, 180.0)),
    ("AUSTRALIA", (-50.0, -10.0), (110.0, 160.0)),
];

/// Spatial filter applied before colocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,

    pub lat_range: (f64, f64),

    pub lon_range: (f64, f64),

    /// Stations above this altitude (m) are excluded
    pub max_altitude: Option<f64>,
}

impl Region {
    pub fn new(name: &str, lat_range: (f64, f64), lon_range: (f64, f64)) -> Result<Self> {
        let region = Self {
            name: name.to_string(),
            lat_range,
            lon_range,
            max_altitude: None,
        };
        region.check_bounds()?;
        Ok(region)
    }

    pub fn with_max_altitude(mut self, max_altitude: Option<f64>) -> Self {
        self.max_altitude = max_altitude;
        self
    }

    /// Resolve a filter name such as `WORLD`, `EUROPE-noMOUNTAINS` or
    /// `WORLD-wMOUNTAINS`.
    pub fn from_filter_name(filter_name: &str) -> Result<Self> {
        let (base, max_altitude) =
            if let Some(base) = filter_name.strip_suffix(FILTER_NO_MOUNTAINS_SUFFIX) {
                (base, Some(MOUNTAIN_ALTITUDE_THRESHOLD))
            } else if let Some(base) = filter_name.strip_suffix(FILTER_WITH_MOUNTAINS_SUFFIX) {
                (base, None)
            } else {
                (filter_name, None)
            };

        let (_, lat_range, lon_range) = DEFAULT_REGIONS
            .iter()
            .find(|(name, _, _)| *name == base)
            .ok_or_else(|| {
                ColocationError::InvalidFilter(format!(
                    "Unknown filter '{}' (available regions: {})",
                    filter_name,
                    Self::available_names().join(", ")
                ))
            })?;

        Ok(Self {
            name: filter_name.to_string(),
            lat_range: *lat_range,
            lon_range: *lon_range,
            max_altitude,
        })
    }

    pub fn available_names() -> Vec<&'static str> {
        DEFAULT_REGIONS.iter().map(|(name, _, _)| *name).collect()
    }

    fn check_bounds(&self) -> Result<()> {
        let (lat0, lat1) = self.lat_range;
        let (lon0, lon1) = self.lon_range;
        if !(-90.0..=90.0).contains(&lat0) || !(-90.0..=90.0).contains(&lat1) || lat0 > lat1 {
            return Err(ColocationError::InvalidFilter(format!(
                "Invalid latitude range [{}, {}] for region {}",
                lat0, lat1, self.name
            )));
        }
        if !(-180.0..=180.0).contains(&lon0) || !(-180.0..=180.0).contains(&lon1) || lon0 > lon1
        {
            return Err(ColocationError::InvalidFilter(format!(
                "Invalid longitude range [{}, {}] for region {}",
                lon0, lon1, self.name
            )));
        }
        Ok(())
    }

    pub fn contains_lat(&self, latitude: f64) -> bool {
        latitude >= self.lat_range.0 && latitude <= self.lat_range.1
    }

    pub fn contains_lon(&self, longitude: f64) -> bool {
        let lon = normalize_longitude(longitude);
        (lon >= self.lon_range.0 && lon <= self.lon_range.1)
            // 180 and -180 are the same meridian
            || (lon == -180.0 && self.lon_range.1 == 180.0)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.contains_lat(latitude) && self.contains_lon(longitude)
    }

    pub fn accepts_altitude(&self, altitude: Option<f64>) -> bool {
        match (self.max_altitude, altitude) {
            (Some(max), Some(alt)) => alt <= max,
            _ => true,
        }
    }

    pub fn is_global(&self) -> bool {
        self.lat_range == (-90.0, 90.0) && self.lon_range == (-180.0, 180.0)
    }
}
