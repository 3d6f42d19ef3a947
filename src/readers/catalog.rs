use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{ColocationError, Result};
use crate::readers::{CsvGriddedReader, CsvStationReader, GriddedReader, UngriddedReader};
use crate::utils::constants::STATIONS_FILE;

/// Readers registered by data id
#[derive(Clone, Default)]
pub struct ReaderCatalog {
    gridded: BTreeMap<String, Arc<dyn GriddedReader>>,
    ungridded: BTreeMap<String, Arc<dyn UngriddedReader>>,
}

impl ReaderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_gridded(&mut self, reader: Arc<dyn GriddedReader>) {
        self.gridded.insert(reader.data_id().to_string(), reader);
    }

    pub fn register_ungridded(&mut self, reader: Arc<dyn UngriddedReader>) {
        self.ungridded.insert(reader.dataset_id().to_string(), reader);
    }

    pub fn with_gridded(mut self, reader: Arc<dyn GriddedReader>) -> Self {
        self.register_gridded(reader);
        self
    }

    pub fn with_ungridded(mut self, reader: Arc<dyn UngriddedReader>) -> Self {
        self.register_ungridded(reader);
        self
    }

    pub fn is_ungridded(&self, data_id: &str) -> bool {
        self.ungridded.contains_key(data_id)
    }

    pub fn gridded(&self, data_id: &str) -> Result<Arc<dyn GriddedReader>> {
        self.gridded.get(data_id).cloned().ok_or_else(|| {
            ColocationError::DataCoverage(format!("No gridded reader registered for {}", data_id))
        })
    }

    pub fn ungridded(&self, data_id: &str) -> Option<Arc<dyn UngriddedReader>> {
        self.ungridded.get(data_id).cloned()
    }

    pub fn gridded_ids(&self) -> Vec<String> {
        self.gridded.keys().cloned().collect()
    }

    pub fn ungridded_ids(&self) -> Vec<String> {
        self.ungridded.keys().cloned().collect()
    }

    /// Register a CSV reader for every dataset directory under `root`.
    ///
    /// Directories with a `stations.csv` are station datasets, all others are
    /// gridded.
    pub fn register_csv_root(&mut self, root: &Path) -> Result<usize> {
        let mut count = 0;
        let mut dirs: Vec<_> = std::fs::read_dir(root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(id) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if dir.join(STATIONS_FILE).is_file() {
                self.register_ungridded(Arc::new(CsvStationReader::new(root, id)?));
            } else {
                self.register_gridded(Arc::new(CsvGriddedReader::new(root, id)?));
            }
            count += 1;
        }

        info!("Registered {} datasets from {}", count, root.display());
        Ok(count)
    }
}
