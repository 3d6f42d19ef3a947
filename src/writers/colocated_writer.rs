use crate::error::{ColocationError, Result};
use crate::models::{ColocatedLocation, ColocatedResult, ColocationMetadata, MODEL_ROW, OBS_ROW};
use crate::utils::constants::{COLOCATION_METADATA_KEY, DEFAULT_ROW_GROUP_SIZE};
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use ndarray::Array3;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// JSON document stored in the Parquet schema metadata
#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    metadata: ColocationMetadata,
    num_times: usize,
    num_locations: usize,
}

pub struct ColocatedWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ColocatedWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(ColocationError::InvalidFormat(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write `result` into `directory` under its savename and return the path.
    ///
    /// Data goes to a temporary file in the same directory which is renamed
    /// into place only once the writer has closed cleanly.
    pub fn write_result(&self, result: &ColocatedResult, directory: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(directory)?;
        let path = directory.join(result.savename());

        let schema = self.create_schema(result)?;
        let batch = self.result_to_batch(result, schema.clone())?;

        let tmp = NamedTempFile::new_in(directory)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(tmp.reopen()?, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        tmp.persist(&path).map_err(|e| ColocationError::Io(e.error))?;
        Ok(path)
    }

    fn create_schema(&self, result: &ColocatedResult) -> Result<Arc<Schema>> {
        let fields = vec![
            Field::new("time", DataType::Timestamp(TimeUnit::Second, None), false),
            Field::new("station_index", DataType::UInt32, false),
            Field::new("station_name", DataType::Utf8, false),
            Field::new("latitude", DataType::Float64, false),
            Field::new("longitude", DataType::Float64, false),
            Field::new("altitude", DataType::Float64, true),
            Field::new("model_value", DataType::Float64, false),
            Field::new("obs_value", DataType::Float64, false),
        ];

        let (num_times, num_locations) = result.shape();
        let header = FileHeader {
            metadata: result.metadata().clone(),
            num_times,
            num_locations,
        };
        let mut metadata = HashMap::new();
        metadata.insert(
            COLOCATION_METADATA_KEY.to_string(),
            serde_json::to_string(&header)?,
        );

        Ok(Arc::new(Schema::new(fields).with_metadata(metadata)))
    }

    /// One row per (time, location), time-major
    fn result_to_batch(&self, result: &ColocatedResult, schema: Arc<Schema>) -> Result<RecordBatch> {
        let (num_times, num_locations) = result.shape();
        let rows = num_times * num_locations;
        let model = result.model_values();
        let obs = result.obs_values();

        let mut times = Vec::with_capacity(rows);
        let mut indices = Vec::with_capacity(rows);
        let mut names = Vec::with_capacity(rows);
        let mut latitudes = Vec::with_capacity(rows);
        let mut longitudes = Vec::with_capacity(rows);
        let mut altitudes = Vec::with_capacity(rows);
        let mut model_values = Vec::with_capacity(rows);
        let mut obs_values = Vec::with_capacity(rows);

        for (t, time) in result.times().iter().enumerate() {
            for (j, location) in result.locations().iter().enumerate() {
                times.push(time.and_utc().timestamp());
                indices.push(j as u32);
                names.push(location.name.as_str());
                latitudes.push(location.latitude);
                longitudes.push(location.longitude);
                altitudes.push(location.altitude);
                model_values.push(model[[t, j]]);
                obs_values.push(obs[[t, j]]);
            }
        }

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampSecondArray::from(times)),
                Arc::new(UInt32Array::from(indices)),
                Arc::new(StringArray::from(names)),
                Arc::new(Float64Array::from(latitudes)),
                Arc::new(Float64Array::from(longitudes)),
                Arc::new(Float64Array::from(altitudes)),
                Arc::new(Float64Array::from(model_values)),
                Arc::new(Float64Array::from(obs_values)),
            ],
        )?;

        Ok(batch)
    }

    /// Read a colocated result previously written by [`Self::write_result`]
    pub fn read_result(&self, path: &Path) -> Result<ColocatedResult> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let header_json = builder
            .schema()
            .metadata()
            .get(COLOCATION_METADATA_KEY)
            .cloned()
            .ok_or_else(|| {
                ColocationError::InvalidFormat(format!(
                    "{} has no colocation metadata",
                    path.display()
                ))
            })?;
        let header: FileHeader = serde_json::from_str(&header_json)?;

        let (nt, nl) = (header.num_times, header.num_locations);
        let mut data = Array3::from_elem((2, nt, nl), f64::NAN);
        let mut times: Vec<Option<NaiveDateTime>> = vec![None; nt];
        let mut locations: Vec<Option<ColocatedLocation>> = vec![None; nl];

        let mut row = 0usize;
        for batch_result in builder.build()? {
            let batch = batch_result?;

            let time_col = column::<TimestampSecondArray>(&batch, 0, "time")?;
            let index_col = column::<UInt32Array>(&batch, 1, "station_index")?;
            let name_col = column::<StringArray>(&batch, 2, "station_name")?;
            let lat_col = column::<Float64Array>(&batch, 3, "latitude")?;
            let lon_col = column::<Float64Array>(&batch, 4, "longitude")?;
            let alt_col = column::<Float64Array>(&batch, 5, "altitude")?;
            let model_col = column::<Float64Array>(&batch, 6, "model_value")?;
            let obs_col = column::<Float64Array>(&batch, 7, "obs_value")?;

            for i in 0..batch.num_rows() {
                let t = row / nl.max(1);
                let j = index_col.value(i) as usize;
                if t >= nt || j >= nl {
                    return Err(ColocationError::InvalidFormat(format!(
                        "{}: row {} is outside the declared shape ({}, {})",
                        path.display(),
                        row,
                        nt,
                        nl
                    )));
                }

                if times[t].is_none() {
                    let time = DateTime::from_timestamp(time_col.value(i), 0)
                        .map(|dt| dt.naive_utc())
                        .ok_or_else(|| {
                            ColocationError::InvalidFormat(format!(
                                "Invalid timestamp {} in {}",
                                time_col.value(i),
                                path.display()
                            ))
                        })?;
                    times[t] = Some(time);
                }
                if locations[j].is_none() {
                    locations[j] = Some(ColocatedLocation {
                        name: name_col.value(i).to_string(),
                        latitude: lat_col.value(i),
                        longitude: lon_col.value(i),
                        altitude: if alt_col.is_null(i) {
                            None
                        } else {
                            Some(alt_col.value(i))
                        },
                    });
                }

                data[[MODEL_ROW, t, j]] = model_col.value(i);
                data[[OBS_ROW, t, j]] = obs_col.value(i);
                row += 1;
            }
        }

        if row != nt * nl {
            return Err(ColocationError::InvalidFormat(format!(
                "{}: expected {} rows, found {}",
                path.display(),
                nt * nl,
                row
            )));
        }

        let times = times.into_iter().flatten().collect();
        let locations = locations.into_iter().flatten().collect();
        ColocatedResult::new(data, times, locations, header.metadata)
    }

    /// Get file information
    pub fn get_file_info(&self, path: &Path) -> Result<FileInfo> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let metadata = builder.metadata();

        let total_rows = metadata.file_metadata().num_rows() as usize;
        let row_groups = metadata.num_row_groups();
        let file_size = std::fs::metadata(path)?.len();

        Ok(FileInfo {
            total_rows,
            row_groups,
            file_size,
            compression: format!("{:?}", self.compression),
        })
    }
}

impl Default for ColocatedWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize, name: &str) -> Result<&'a T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ColocationError::InvalidFormat(format!("Invalid {} column type", name)))
}

#[derive(Debug)]
pub struct FileInfo {
    pub total_rows: usize,
    pub row_groups: usize,
    pub file_size: u64,
    pub compression: String,
}

impl FileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Rows: {}\nRow groups: {}\nFile size: {:.2} MB\nCompression: {}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / (1024.0 * 1024.0),
            self.compression
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::colocated::tests::sample_metadata;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_result() -> ColocatedResult {
        let times = (1..=3)
            .map(|m| {
                NaiveDate::from_ymd_opt(2010, m, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            })
            .collect::<Vec<_>>();
        let locations = vec![
            ColocatedLocation {
                name: "Jungfraujoch".to_string(),
                latitude: 46.5475,
                longitude: 7.985,
                altitude: Some(3580.0),
            },
            ColocatedLocation {
                name: "Cape Point".to_string(),
                latitude: -34.353,
                longitude: 18.489,
                altitude: None,
            },
        ];
        let data = Array3::from_shape_fn((2, 3, 2), |(r, t, j)| {
            (r as f64 + 1.0) * 0.1 + t as f64 * 0.01 + j as f64 * 0.001
        });
        ColocatedResult::new(data, times, locations, sample_metadata()).unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let result = sample_result();

        let path = ColocatedWriter::new().write_result(&result, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap().to_string_lossy(), result.savename());

        let read = ColocatedWriter::new().read_result(&path).unwrap();
        assert_eq!(read, result);
    }

    #[test]
    fn test_missing_cells_survive_read_back() {
        let dir = TempDir::new().unwrap();
        let sample = sample_result();
        let mut data = sample.data().clone();
        data[[MODEL_ROW, 0, 1]] = f64::NAN;
        data[[OBS_ROW, 0, 1]] = f64::NAN;
        data[[OBS_ROW, 2, 0]] = f64::NAN;
        let result = ColocatedResult::new(
            data,
            sample.times().to_vec(),
            sample.locations().to_vec(),
            sample.metadata().clone(),
        )
        .unwrap();

        let path = ColocatedWriter::new().write_result(&result, dir.path()).unwrap();
        let read = ColocatedWriter::new().read_result(&path).unwrap();

        assert_eq!(read.shape(), result.shape());
        assert_eq!(read.times(), result.times());
        assert_eq!(read.metadata(), result.metadata());
        assert_eq!(read.num_valid_pairs(), 4);
        for (got, expected) in read.data().iter().zip(result.data().iter()) {
            assert!(
                (got.is_nan() && expected.is_nan()) || got == expected,
                "{} != {}",
                got,
                expected
            );
        }
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let result = sample_result();
        ColocatedWriter::new()
            .with_compression("zstd")
            .unwrap()
            .write_result(&result, dir.path())
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec![result.savename()]);
    }

    #[test]
    fn test_file_info() {
        let dir = TempDir::new().unwrap();
        let writer = ColocatedWriter::new().with_row_group_size(4);
        let path = writer.write_result(&sample_result(), dir.path()).unwrap();

        let info = writer.get_file_info(&path).unwrap();
        assert_eq!(info.total_rows, 6);
        assert_eq!(info.row_groups, 2);
    }

    #[test]
    fn test_unsupported_compression() {
        assert!(ColocatedWriter::new().with_compression("brotli9000").is_err());
    }
}
