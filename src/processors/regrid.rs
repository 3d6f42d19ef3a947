use ndarray::Array3;

use crate::error::{ColocationError, Result};
use crate::models::GriddedSeries;
use crate::utils::coordinates::cell_bounds;

/// Centres of a regular global grid with `res_deg` spacing
pub fn regular_grid(res_deg: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    if !(res_deg > 0.0 && res_deg <= 180.0) {
        return Err(ColocationError::InvalidFormat(format!(
            "Invalid regrid resolution {} degrees",
            res_deg
        )));
    }
    let axis = |start: f64, stop: f64| {
        let n = ((stop - start) / res_deg).floor() as usize;
        (0..n)
            .map(|i| start + res_deg * (i as f64 + 0.5))
            .collect::<Vec<_>>()
    };
    Ok((axis(-90.0, 90.0), axis(-180.0, 180.0)))
}

fn overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.1.min(b.1) - a.0.max(b.0)).max(0.0)
}

/// Overlap of two longitude intervals on the circle, in degrees.
///
/// Intervals may use either the -180..180 or the 0..360 convention.
fn lon_overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    let shift = (b.0 - a.0 + 180.0).div_euclid(360.0) * 360.0;
    [-360.0, 0.0, 360.0]
        .iter()
        .map(|k| overlap((a.0 + shift + k, a.1 + shift + k), b))
        .sum::<f64>()
        .min((a.1 - a.0).min(b.1 - b.0))
}

/// Overlap of two latitude bands on the sphere, proportional to area
fn lat_band_overlap(a: (f64, f64), b: (f64, f64)) -> f64 {
    let lo = a.0.max(b.0).clamp(-90.0, 90.0);
    let hi = a.1.min(b.1).clamp(-90.0, 90.0);
    if hi <= lo {
        0.0
    } else {
        hi.to_radians().sin() - lo.to_radians().sin()
    }
}

/// For each target cell, the overlapping source cells and their area fractions
fn overlap_weights(source: &[f64], target: &[f64], spherical: bool) -> Vec<Vec<(usize, f64)>> {
    let src = cell_bounds(source);
    cell_bounds(target)
        .into_iter()
        .map(|t| {
            src.iter()
                .enumerate()
                .filter_map(|(i, s)| {
                    let w = if spherical {
                        lat_band_overlap(*s, t)
                    } else {
                        lon_overlap(*s, t)
                    };
                    (w > 0.0).then_some((i, w))
                })
                .collect()
        })
        .collect()
}

/// Area-weighted regrid of `series` onto the given cell centres.
///
/// Each target cell is the NaN-ignoring, overlap-area-weighted mean of the
/// source cells it intersects. Target cells outside the source grid are NaN.
/// Longitudes are matched on the circle, so the two grids may use different
/// longitude conventions.
pub fn regrid_to(series: &GriddedSeries, latitudes: &[f64], longitudes: &[f64]) -> Result<GriddedSeries> {
    if series.latitudes == latitudes && series.longitudes == longitudes {
        return Ok(series.clone());
    }

    let lat_w = overlap_weights(&series.latitudes, latitudes, true);
    let lon_w = overlap_weights(&series.longitudes, longitudes, false);

    if lat_w.iter().all(Vec::is_empty) || lon_w.iter().all(Vec::is_empty) {
        return Err(ColocationError::DataExtraction(format!(
            "Failed to regrid {} / {}: source and target grids do not intersect",
            series.data_id, series.var_name
        )));
    }

    let nt = series.times.len();
    let mut values = Array3::from_elem((nt, latitudes.len(), longitudes.len()), f64::NAN);

    for t in 0..nt {
        for (i, lat_cells) in lat_w.iter().enumerate() {
            for (j, lon_cells) in lon_w.iter().enumerate() {
                let mut sum = 0.0;
                let mut weight = 0.0;
                for (si, wi) in lat_cells {
                    for (sj, wj) in lon_cells {
                        let v = series.values[[t, *si, *sj]];
                        if !v.is_nan() {
                            sum += v * wi * wj;
                            weight += wi * wj;
                        }
                    }
                }
                if weight > 0.0 {
                    values[[t, i, j]] = sum / weight;
                }
            }
        }
    }

    Ok(GriddedSeries {
        latitudes: latitudes.to_vec(),
        longitudes: longitudes.to_vec(),
        values,
        ..series.clone()
    })
}

/// Regrid onto a regular global grid of `res_deg` spacing
pub fn regrid_res_deg(series: &GriddedSeries, res_deg: f64) -> Result<GriddedSeries> {
    let (latitudes, longitudes) = regular_grid(res_deg)?;
    regrid_to(series, &latitudes, &longitudes)
}
