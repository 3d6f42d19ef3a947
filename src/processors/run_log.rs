use chrono::Local;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::utils::constants::RUN_LOG_SEPARATOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Skip,
    Write,
    Remove,
    Error,
    Warning,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Skip => "SKIP",
            LogKind::Write => "WRITE",
            LogKind::Remove => "REMOVE",
            LogKind::Error => "ERROR",
            LogKind::Warning => "WARNING",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only text log of one (model, obs) sweep.
///
/// Shared by reference between workers; every entry is one line written
/// under the lock.
pub struct RunLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl RunLog {
    /// Open (or append to) the log at `path` and write a session header
    /// followed by one `key: value` line per configuration entry
    pub fn open(path: &Path, config: &[(String, String)]) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer)?;
        writeln!(writer, "{}", RUN_LOG_SEPARATOR)?;
        writeln!(writer, "Timestamp: {}", Local::now().format("%d-%m-%Y %H:%M"))?;
        writeln!(writer, "Analysis configuration")?;
        for (key, value) in config {
            writeln!(writer, "{}: {}", key, value)?;
        }
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, kind: LogKind, message: &str) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(
            writer,
            "[{}] {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            kind,
            message
        )?;
        writer.flush()?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        let mut writer = self.writer.into_inner().unwrap_or_else(|e| e.into_inner());
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_and_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logfiles/TM5/AERONET_20101019.log");
        let config = vec![("model_id".to_string(), "TM5".to_string())];

        let log = RunLog::open(&path, &config).unwrap();
        log.entry(LogKind::Write, "a.parquet").unwrap();
        log.entry(LogKind::Skip, "b.parquet").unwrap();
        log.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(RUN_LOG_SEPARATOR));
        assert!(content.contains("Timestamp: "));
        assert!(content.contains("model_id: TM5"));
        assert!(content.lines().any(|l| l.ends_with("] WRITE: a.parquet")));
        assert!(content.lines().any(|l| l.ends_with("] SKIP: b.parquet")));
    }

    #[test]
    fn test_reopen_appends_new_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");

        RunLog::open(&path, &[]).unwrap().close().unwrap();
        RunLog::open(&path, &[]).unwrap().close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(RUN_LOG_SEPARATOR).count(), 2);
    }
}
