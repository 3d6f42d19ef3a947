use std::collections::BTreeSet;

use crate::error::{ColocationError, Result};
use crate::models::{GriddedSeries, StationCollection, StationSeries};
use crate::readers::{GriddedReader, ReadOptions, ReadRequest, UngriddedReader};
use crate::utils::pattern::matches_any;

/// Gridded reader over fields held in memory.
///
/// Fields registered without a vertical code match any requested vertical
/// type.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGriddedReader {
    data_id: String,
    entries: Vec<(GriddedSeries, Option<String>)>,
}

impl InMemoryGriddedReader {
    pub fn new(data_id: &str) -> Self {
        Self {
            data_id: data_id.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with_series(mut self, series: GriddedSeries) -> Self {
        self.entries.push((series, None));
        self
    }

    pub fn with_vertical(mut self, series: GriddedSeries, vert_code: &str) -> Self {
        self.entries.push((series, Some(vert_code.to_string())));
        self
    }
}

impl GriddedReader for InMemoryGriddedReader {
    fn data_id(&self) -> &str {
        &self.data_id
    }

    fn provides_variables(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .map(|(s, _)| s.var_name.clone())
            .collect()
    }

    fn read(&self, request: &ReadRequest) -> Result<GriddedSeries> {
        let candidates: Vec<&GriddedSeries> = self
            .entries
            .iter()
            .filter(|(s, _)| s.var_name == request.var_name)
            .filter(|(_, vert)| match (&request.vert_which, vert) {
                (Some(wanted), Some(have)) => wanted == have,
                _ => true,
            })
            .map(|(s, _)| s)
            .collect();

        let available: Vec<_> = candidates.iter().map(|s| s.ts_type).collect();
        let ts_type = request.select_ts_type(&available, &self.data_id)?;

        let series = candidates
            .into_iter()
            .find(|s| s.ts_type == ts_type)
            .cloned()
            .ok_or_else(|| request.no_data(&self.data_id))?;
        request.crop_time(
            GriddedSeries {
                data_id: self.data_id.clone(),
                ..series
            },
            &self.data_id,
        )
    }
}

/// Ungridded reader over station series held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryUngriddedReader {
    collection: StationCollection,
}

impl InMemoryUngriddedReader {
    pub fn new(collection: StationCollection) -> Self {
        Self { collection }
    }
}

impl UngriddedReader for InMemoryUngriddedReader {
    fn dataset_id(&self) -> &str {
        &self.collection.dataset_id
    }

    fn supported_variables(&self) -> BTreeSet<String> {
        self.collection.variables()
    }

    fn read(&self, var_names: &[String], options: &ReadOptions) -> Result<StationCollection> {
        let supported = self.supported_variables();
        if let Some(missing) = var_names.iter().find(|v| !supported.contains(*v)) {
            return Err(ColocationError::DataCoverage(format!(
                "{} does not provide variable {}",
                self.collection.dataset_id, missing
            )));
        }

        let series: Vec<StationSeries> = self
            .collection
            .series
            .iter()
            .filter(|s| var_names.contains(&s.var_name))
            .filter(|s| matches_any(&s.station.station_name, &options.station_names))
            .cloned()
            .collect();
        Ok(StationCollection::new(&self.collection.dataset_id, series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StationMetadata, TsType};
    use chrono::{NaiveDate, NaiveDateTime};
    use ndarray::Array3;

    fn month(y: i32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn field(ts_type: TsType) -> GriddedSeries {
        GriddedSeries::new(
            "whatever",
            "od550aer",
            "1",
            ts_type,
            vec![month(2010, 1), month(2010, 2)],
            vec![0.0],
            vec![0.0],
            Array3::from_elem((2, 1, 1), 0.2),
        )
        .unwrap()
    }

    #[test]
    fn test_gridded_read() {
        let reader = InMemoryGriddedReader::new("TM5")
            .with_series(field(TsType::Monthly))
            .with_series(field(TsType::Daily));
        assert_eq!(reader.provides_variables().len(), 1);

        let series = reader.read(&ReadRequest::new("od550aer")).unwrap();
        assert_eq!(series.ts_type, TsType::Daily);
        assert_eq!(series.data_id, "TM5");

        let cropped = reader
            .read(
                &ReadRequest::new("od550aer")
                    .with_ts_type(Some(TsType::Monthly), false)
                    .with_time_range(Some(month(2010, 2)), Some(month(2010, 12))),
            )
            .unwrap();
        assert_eq!(cropped.times, vec![month(2010, 2)]);

        let outside = reader.read(
            &ReadRequest::new("od550aer").with_time_range(Some(month(2011, 1)), Some(month(2011, 12))),
        );
        assert!(outside.unwrap_err().is_data_coverage());
        assert!(reader.read(&ReadRequest::new("conco3")).unwrap_err().is_data_coverage());
    }

    #[test]
    fn test_ungridded_read_filters() {
        let mk = |name: &str, var: &str| {
            StationSeries::new(
                StationMetadata::new(name, 10.0, 10.0, None, "AERONET"),
                var,
                "1",
                TsType::Daily,
                vec![(month(2010, 1), 0.1)],
            )
            .unwrap()
        };
        let reader = InMemoryUngriddedReader::new(StationCollection::new(
            "AERONET",
            vec![
                mk("Palaiseau", "od550aer"),
                mk("Lille", "od550aer"),
                mk("Palaiseau", "ang4487aer"),
            ],
        ));

        let all = reader
            .read(&["od550aer".to_string()], &ReadOptions::default())
            .unwrap();
        assert_eq!(all.series.len(), 2);

        let options = ReadOptions {
            station_names: vec!["Pal*".to_string()],
        };
        let some = reader.read(&["od550aer".to_string()], &options).unwrap();
        assert_eq!(some.series.len(), 1);

        assert!(reader
            .read(&["conco3".to_string()], &ReadOptions::default())
            .unwrap_err()
            .is_data_coverage());
    }
}
