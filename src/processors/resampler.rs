use chrono::NaiveDateTime;
use ndarray::{Array3, Axis};

use crate::error::{ColocationError, Result};
use crate::models::{GriddedSeries, StationSeries, TsType};

/// Group sorted timestamps by the period of `ts_type` they fall into.
///
/// Returns one `(period_start, indices)` entry per period, in time order.
pub fn period_groups(times: &[NaiveDateTime], ts_type: TsType) -> Vec<(NaiveDateTime, Vec<usize>)> {
    let mut groups: Vec<(NaiveDateTime, Vec<usize>)> = Vec::new();
    for (i, time) in times.iter().enumerate() {
        let start = ts_type.period_start(*time);
        match groups.last_mut() {
            Some((current, indices)) if *current == start => indices.push(i),
            _ => groups.push((start, vec![i])),
        }
    }
    groups
}

/// Arithmetic mean of the non-NaN values, NaN if there are none
pub fn nanmean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn check_direction(from: TsType, to: TsType, what: &str) -> Result<()> {
    if from.is_coarser_than(to) {
        return Err(ColocationError::TemporalResolution(format!(
            "Cannot resample {} from {} to finer resolution {}",
            what, from, to
        )));
    }
    Ok(())
}

/// Resample a gridded series to `to` by NaN-ignoring mean per period.
///
/// Timestamps of the result are period starts, so resampling to the native
/// resolution only normalises the time axis.
pub fn resample_gridded(series: &GriddedSeries, to: TsType) -> Result<GriddedSeries> {
    check_direction(
        series.ts_type,
        to,
        &format!("{} / {}", series.data_id, series.var_name),
    )?;

    let groups = period_groups(&series.times, to);
    let (_, nlat, nlon) = series.values.dim();
    let mut values = Array3::from_elem((groups.len(), nlat, nlon), f64::NAN);

    for (k, (_, indices)) in groups.iter().enumerate() {
        let block = series.values.select(Axis(0), indices);
        for i in 0..nlat {
            for j in 0..nlon {
                values[[k, i, j]] = nanmean(block.slice(ndarray::s![.., i, j]).iter().copied());
            }
        }
    }

    Ok(GriddedSeries {
        ts_type: to,
        times: groups.into_iter().map(|(t, _)| t).collect(),
        values,
        ..series.clone()
    })
}

/// Resample an irregular `(times, values)` series; returns period starts and means
pub fn resample_values(
    times: &[NaiveDateTime],
    values: &[f64],
    to: TsType,
) -> (Vec<NaiveDateTime>, Vec<f64>) {
    period_groups(times, to)
        .into_iter()
        .map(|(start, indices)| (start, nanmean(indices.iter().map(|i| values[*i]))))
        .unzip()
}

/// Resample a station series to `to`; fails when `to` is finer than the series
pub fn resample_station(series: &StationSeries, to: TsType) -> Result<StationSeries> {
    check_direction(
        series.ts_type,
        to,
        &format!("{} at {}", series.var_name, series.station.station_name),
    )?;

    let (times, values) = resample_values(&series.times, &series.values, to);
    Ok(StationSeries {
        ts_type: to,
        times,
        values,
        ..series.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StationMetadata;
    use chrono::NaiveDate;

    fn dt(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2010, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_nanmean() {
        assert_eq!(nanmean(vec![1.0, f64::NAN, 3.0]), 2.0);
        assert!(nanmean(vec![f64::NAN]).is_nan());
        assert!(nanmean(Vec::<f64>::new()).is_nan());
    }

    #[test]
    fn test_period_groups() {
        let times = vec![dt(1, 1, 0), dt(1, 15, 0), dt(2, 1, 0), dt(3, 31, 23)];
        let groups = period_groups(&times, TsType::Monthly);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], (dt(1, 1, 0), vec![0, 1]));
        assert_eq!(groups[2], (dt(3, 1, 0), vec![3]));
    }

    #[test]
    fn test_resample_gridded_daily_to_monthly() {
        let times = vec![dt(1, 1, 0), dt(1, 2, 0), dt(2, 1, 0)];
        let mut values = Array3::zeros((3, 1, 2));
        values[[0, 0, 0]] = 1.0;
        values[[1, 0, 0]] = 3.0;
        values[[2, 0, 0]] = 5.0;
        values[[0, 0, 1]] = f64::NAN;
        values[[1, 0, 1]] = 4.0;
        values[[2, 0, 1]] = f64::NAN;

        let series = GriddedSeries::new(
            "TM5",
            "od550aer",
            "1",
            TsType::Daily,
            times,
            vec![0.0],
            vec![0.0, 10.0],
            values,
        )
        .unwrap();

        let monthly = resample_gridded(&series, TsType::Monthly).unwrap();
        assert_eq!(monthly.ts_type, TsType::Monthly);
        assert_eq!(monthly.times, vec![dt(1, 1, 0), dt(2, 1, 0)]);
        assert_eq!(monthly.values[[0, 0, 0]], 2.0);
        assert_eq!(monthly.values[[0, 0, 1]], 4.0);
        assert!(monthly.values[[1, 0, 1]].is_nan());

        assert!(matches!(
            resample_gridded(&monthly, TsType::Daily),
            Err(ColocationError::TemporalResolution(_))
        ));
    }

    #[test]
    fn test_resample_station_hourly_to_daily() {
        let station = StationMetadata::new("Mace Head", 53.33, -9.9, Some(5.0), "EBASMC");
        let series = StationSeries::new(
            station,
            "conco3",
            "ug m-3",
            TsType::Hourly,
            vec![
                (dt(1, 1, 0), 10.0),
                (dt(1, 1, 12), 20.0),
                (dt(1, 2, 3), f64::NAN),
                (dt(1, 3, 6), 40.0),
            ],
        )
        .unwrap();

        let daily = resample_station(&series, TsType::Daily).unwrap();
        assert_eq!(daily.times, vec![dt(1, 1, 0), dt(1, 2, 0), dt(1, 3, 0)]);
        assert_eq!(daily.values[0], 15.0);
        assert!(daily.values[1].is_nan());
        assert_eq!(daily.values[2], 40.0);
    }
}
