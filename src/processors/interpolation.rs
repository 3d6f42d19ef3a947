use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::GriddedSeries;
use crate::utils::coordinates::{bracket, nearest_index, nearest_lon_index};

/// Scheme used to sample a grid at a station coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolation::Nearest => f.write_str("nearest"),
            Interpolation::Bilinear => f.write_str("bilinear"),
        }
    }
}

/// Grid cells and weights contributing to one point
type Stencil = Vec<(usize, usize, f64)>;

/// Express `longitude` in the convention of `axis` (0..360 or -180..180)
fn lon_in_axis_convention(axis: &[f64], longitude: f64) -> f64 {
    let wraps_east = axis.last().is_some_and(|v| *v > 180.0);
    if wraps_east {
        longitude.rem_euclid(360.0)
    } else if longitude >= 180.0 {
        longitude - 360.0
    } else {
        longitude
    }
}

fn stencil(series: &GriddedSeries, latitude: f64, longitude: f64, scheme: Interpolation) -> Stencil {
    match scheme {
        Interpolation::Nearest => vec![(
            nearest_index(&series.latitudes, latitude),
            nearest_lon_index(&series.longitudes, longitude),
            1.0,
        )],
        Interpolation::Bilinear => {
            let lon = lon_in_axis_convention(&series.longitudes, longitude);
            let (i0, i1, wy) = bracket(&series.latitudes, latitude);
            let (j0, j1, wx) = bracket(&series.longitudes, lon);
            vec![
                (i0, j0, (1.0 - wy) * (1.0 - wx)),
                (i0, j1, (1.0 - wy) * wx),
                (i1, j0, wy * (1.0 - wx)),
                (i1, j1, wy * wx),
            ]
        }
    }
}

/// Weighted mean over the stencil, renormalised over non-NaN cells
fn apply_stencil(field: ArrayView2<'_, f64>, stencil: &Stencil) -> f64 {
    let mut sum = 0.0;
    let mut weight = 0.0;
    for (i, j, w) in stencil {
        if *w <= 0.0 {
            continue;
        }
        let v = field[[*i, *j]];
        if !v.is_nan() {
            sum += v * w;
            weight += w;
        }
    }
    if weight > 0.0 {
        sum / weight
    } else {
        f64::NAN
    }
}

/// Model time series at one coordinate, on the grid's native time stamps
pub fn time_series_at(
    series: &GriddedSeries,
    latitude: f64,
    longitude: f64,
    scheme: Interpolation,
) -> Vec<f64> {
    let st = stencil(series, latitude, longitude, scheme);
    series
        .values
        .axis_iter(Axis(0))
        .map(|field| apply_stencil(field, &st))
        .collect()
}

/// Sample the grid at every `(latitude, longitude)` point.
///
/// Returns a `(time, point)` array. When `times * points` exceeds
/// `max_bulk_points` the points are processed one at a time instead of in a
/// single pass over all stencils; both paths give identical values.
pub fn interpolate_points(
    series: &GriddedSeries,
    points: &[(f64, f64)],
    scheme: Interpolation,
    max_bulk_points: usize,
) -> Array2<f64> {
    let nt = series.times.len();
    let np = points.len();

    if nt.saturating_mul(np) > max_bulk_points {
        debug!(
            "Interpolating {} points x {} times one station at a time",
            np, nt
        );
        let mut out = Array2::from_elem((nt, np), f64::NAN);
        for (p, (lat, lon)) in points.iter().enumerate() {
            let column = time_series_at(series, *lat, *lon, scheme);
            for (t, v) in column.into_iter().enumerate() {
                out[[t, p]] = v;
            }
        }
        return out;
    }

    let stencils: Vec<Stencil> = points
        .iter()
        .map(|(lat, lon)| stencil(series, *lat, *lon, scheme))
        .collect();
    let mut out = Array2::from_elem((nt, np), f64::NAN);
    for (t, field) in series.values.axis_iter(Axis(0)).enumerate() {
        for (p, st) in stencils.iter().enumerate() {
            out[[t, p]] = apply_stencil(field, st);
        }
    }
    out
}
