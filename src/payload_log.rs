use crate::types::Snapshot;
use chrono::{SecondsFormat, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Local record of every snapshot, independent of the radio
pub trait SnapshotSink: Send {
    fn record(&mut self, snapshot: &Snapshot) -> io::Result<()>;
}

/// Append-only `<RFC 3339 time> <compact JSON>` lines
pub struct PayloadLog {
    path: PathBuf,
    file: Option<File>,
}

impl PayloadLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        PayloadLog {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            self.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "payload log not open"))
    }
}

impl SnapshotSink for PayloadLog {
    fn record(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let result = writeln!(self.file()?, "{} {}", stamp, json);
        if result.is_err() {
            // Reopen on the next snapshot
            self.file = None;
        }
        result
    }
}

/// Keeps snapshots in memory as JSON values
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSink for MemorySink {
    fn record(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let value = serde_json::to_value(snapshot)?;
        self.records
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorId;
    use chrono::DateTime;

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            reported_at: Utc::now(),
            sensors: SensorId::ALL.iter().map(|id| (*id, None)).collect(),
        }
    }

    #[test]
    fn test_payload_log_appends_stamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("payloads.log");
        let mut log = PayloadLog::new(&path);
        log.record(&empty_snapshot()).unwrap();
        log.record(&empty_snapshot()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let (stamp, json) = line.split_once(' ').unwrap();
            assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert!(value["sensors"]["neo6m"].is_null());
        }
    }

    #[test]
    fn test_payload_log_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payloads.log");
        fs::write(&path, "earlier\n").unwrap();
        PayloadLog::new(&path).record(&empty_snapshot()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("earlier\n"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_memory_sink_shares_records() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.record(&empty_snapshot()).unwrap();
        assert_eq!(sink.len(), 1);
        assert!(sink.records()[0]["reported_at"].is_string());
    }
}
