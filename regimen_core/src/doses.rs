//! Dose log: recorded intakes as JSON Lines, with file locking so several
//! processes can append at once.

use crate::{Dose, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Somewhere recorded doses can be appended
pub trait DoseSink {
    fn append(&mut self, dose: &Dose) -> Result<()>;
}

/// JSONL dose log with file locking
#[derive(Clone, Debug)]
pub struct JsonlDoseLog {
    path: PathBuf,
}

impl JsonlDoseLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> Result<Vec<Dose>> {
        read_doses(&self.path)
    }
}

impl DoseSink for JsonlDoseLog {
    fn append(&mut self, dose: &Dose) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        // One write per line so a crash can only tear the last line
        let mut line = serde_json::to_string(dose)?;
        line.push('\n');
        let mut writer = std::io::BufWriter::new(&file);
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended dose {} to {:?}", dose.id, self.path);
        Ok(())
    }
}

/// Read every dose in a log, oldest first.
///
/// Missing file means no doses. Lines that fail to parse are skipped with a
/// warning.
pub fn read_doses(path: &Path) -> Result<Vec<Dose>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut doses = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Dose>(&line) {
            Ok(dose) => doses.push(dose),
            Err(e) => {
                tracing::warn!("Skipping dose at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    doses.sort_by_key(|d| d.taken_at);
    tracing::debug!("Read {} doses from {:?}", doses.len(), path);
    Ok(doses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MedicationRef;
    use chrono::{Duration, Utc};

    fn dose(minutes_ago: i64) -> Dose {
        Dose::new(
            MedicationRef::Name("metformin".into()),
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_append_and_read_single_dose() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses.jsonl");

        let recorded = dose(5);
        let mut log = JsonlDoseLog::new(&path);
        log.append(&recorded).unwrap();

        let doses = log.read_all().unwrap();
        assert_eq!(doses, vec![recorded]);
    }

    #[test]
    fn test_read_sorts_by_time() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses.jsonl");

        let mut log = JsonlDoseLog::new(&path);
        for minutes_ago in [10, 30, 20] {
            log.append(&dose(minutes_ago)).unwrap();
        }

        let doses = read_doses(&path).unwrap();
        assert_eq!(doses.len(), 3);
        assert!(doses.windows(2).all(|w| w[0].taken_at <= w[1].taken_at));
    }

    #[test]
    fn test_read_missing_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let doses = read_doses(&temp_dir.path().join("nope.jsonl")).unwrap();
        assert!(doses.is_empty());
    }

    #[test]
    fn test_corrupted_lines_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doses.jsonl");

        let mut log = JsonlDoseLog::new(&path);
        log.append(&dose(1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ torn line").unwrap();
        log.append(&dose(2)).unwrap();

        assert_eq!(read_doses(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_append_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/deeper/doses.jsonl");

        JsonlDoseLog::new(&path).append(&dose(0)).unwrap();
        assert!(path.exists());
    }
}
