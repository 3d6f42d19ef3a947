use crate::error::{ColocationError, Result};

/// Convert DMS (Degrees:Minutes:Seconds) format to decimal degrees
///
/// # Examples
/// ```
/// use coloc_processor::utils::dms_to_decimal;
///
/// let decimal = dms_to_decimal("50:30:15").unwrap();
/// assert!((decimal - 50.504167).abs() < 0.000001);
/// ```
pub fn dms_to_decimal(dms: &str) -> Result<f64> {
    let parts: Vec<&str> = dms.split(':').collect();

    if parts.len() != 3 {
        return Err(ColocationError::InvalidFormat(format!(
            "Invalid DMS format: '{}'. Expected format: 'DD:MM:SS'",
            dms
        )));
    }

    let is_negative = dms.starts_with('-');

    let parse = |value: &str, what: &str| {
        value.parse::<f64>().map_err(|_| {
            ColocationError::InvalidFormat(format!("Invalid {} value: '{}'", what, value))
        })
    };
    let degrees = parse(parts[0], "degrees")?;
    let minutes = parse(parts[1], "minutes")?;
    let seconds = parse(parts[2], "seconds")?;

    if !(0.0..60.0).contains(&minutes) {
        return Err(ColocationError::InvalidFormat(format!(
            "Minutes must be between 0 and 60, got: {}",
            minutes
        )));
    }

    if !(0.0..60.0).contains(&seconds) {
        return Err(ColocationError::InvalidFormat(format!(
            "Seconds must be between 0 and 60, got: {}",
            seconds
        )));
    }

    let decimal_value = degrees.abs() + minutes / 60.0 + seconds / 3600.0;

    if is_negative {
        Ok(-decimal_value)
    } else {
        Ok(decimal_value)
    }
}

/// Parse coordinate that might be in DMS or decimal format
pub fn parse_coordinate(coord_str: &str) -> Result<f64> {
    let trimmed = coord_str.trim();

    if !trimmed.contains(':') {
        trimmed.parse::<f64>().map_err(|_| {
            ColocationError::InvalidFormat(format!("Invalid coordinate value: '{}'", coord_str))
        })
    } else {
        dms_to_decimal(trimmed)
    }
}

/// Map a longitude onto [-180, 180)
pub fn normalize_longitude(longitude: f64) -> f64 {
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}

/// Index of the axis value closest to `value` (axis must be non-empty)
pub fn nearest_index(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, best_dist), (i, v)| {
            let dist = (v - value).abs();
            if dist < best_dist {
                (i, dist)
            } else {
                (best, best_dist)
            }
        })
        .0
}

/// Like [`nearest_index`] but compares longitudes on the circle
pub fn nearest_lon_index(axis: &[f64], longitude: f64) -> usize {
    let target = normalize_longitude(longitude);
    axis.iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, best_dist), (i, v)| {
            let diff = (normalize_longitude(*v) - target).abs();
            let dist = diff.min(360.0 - diff);
            if dist < best_dist {
                (i, dist)
            } else {
                (best, best_dist)
            }
        })
        .0
}

/// Bracketing indices and weight for linear interpolation on a sorted axis.
///
/// Returns `(i0, i1, w)` with `value ≈ axis[i0] * (1 - w) + axis[i1] * w`;
/// values outside the axis are clamped to the edge.
pub fn bracket(axis: &[f64], value: f64) -> (usize, usize, f64) {
    let n = axis.len();
    if n < 2 || value <= axis[0] {
        return (0, 0, 0.0);
    }
    if value >= axis[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    let upper = axis.partition_point(|v| *v <= value).min(n - 1);
    let lower = upper - 1;
    let span = axis[upper] - axis[lower];
    let weight = if span > 0.0 {
        (value - axis[lower]) / span
    } else {
        0.0
    };
    (lower, upper, weight)
}

/// Cell bounds from cell centres (midpoints, edges mirrored)
pub fn cell_bounds(centres: &[f64]) -> Vec<(f64, f64)> {
    let n = centres.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![(centres[0] - 0.5, centres[0] + 0.5)];
    }
    (0..n)
        .map(|i| {
            let lower = if i == 0 {
                centres[0] - (centres[1] - centres[0]) / 2.0
            } else {
                (centres[i - 1] + centres[i]) / 2.0
            };
            let upper = if i == n - 1 {
                centres[n - 1] + (centres[n - 1] - centres[n - 2]) / 2.0
            } else {
                (centres[i] + centres[i + 1]) / 2.0
            };
            (lower, upper)
        })
        .collect()
}
