use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// No output exists yet
    Run,
    /// Output exists and is kept
    Skip,
    /// Output existed and was removed so it can be recomputed
    Recompute,
}

impl CacheDecision {
    pub fn should_run(&self) -> bool {
        !matches!(self, CacheDecision::Skip)
    }
}

/// Skip-or-recompute policy for colocated output files, keyed on the savename
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheGate {
    reanalyse_existing: bool,
}

impl CacheGate {
    pub fn new(reanalyse_existing: bool) -> Self {
        Self { reanalyse_existing }
    }

    pub fn decide(&self, savename: &str, directory: &Path) -> Result<CacheDecision> {
        let path = directory.join(savename);
        if !path.exists() {
            debug!("No colocated file {} yet", path.display());
            return Ok(CacheDecision::Run);
        }

        if !self.reanalyse_existing {
            info!("Colocated data {} exists, skipping", savename);
            return Ok(CacheDecision::Skip);
        }

        std::fs::remove_file(&path)?;
        info!("Removed existing colocated data {} for reanalysis", savename);
        Ok(CacheDecision::Recompute)
    }

    pub fn should_run(&self, savename: &str, directory: &Path) -> Result<bool> {
        Ok(self.decide(savename, directory)?.should_run())
    }
}
