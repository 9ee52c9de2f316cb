//! CSV export of generated occurrences.

use crate::{Occurrence, Result, TimeSpec};
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    date: String,
    time: String,
    instant: String,
    index: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    event: Option<String>,
    when: Option<&'static str>,
}

impl From<&Occurrence> for CsvRow {
    fn from(occurrence: &Occurrence) -> Self {
        let (event, when) = match &occurrence.source {
            TimeSpec::Event { event, when } => (Some(event.clone()), Some(when.as_str())),
            TimeSpec::Exact { .. } => (None, None),
        };
        CsvRow {
            date: occurrence.date.to_string(),
            time: occurrence.local_time.to_string(),
            instant: occurrence.instant.to_rfc3339(),
            index: occurrence.index,
            kind: occurrence.source.kind(),
            event,
            when,
        }
    }
}

const HEADER: [&str; 7] = ["date", "time", "instant", "index", "type", "event", "when"];

/// Write occurrences as CSV with a header row; returns the row count
pub fn write_csv<W, I>(writer: W, occurrences: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Occurrence>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    // Written by hand so an empty export still carries the header
    writer.write_record(HEADER)?;

    let mut count = 0;
    for occurrence in occurrences {
        writer.serialize(CsvRow::from(&occurrence))?;
        count += 1;
    }
    writer.flush()?;

    tracing::debug!("Wrote {} occurrences as CSV", count);
    Ok(count)
}

/// Write occurrences to a CSV file, replacing it
pub fn export_to_path<I>(path: &Path, occurrences: I) -> Result<usize>
where
    I: IntoIterator<Item = Occurrence>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let count = write_csv(std::io::BufWriter::new(file), occurrences)?;
    tracing::info!("Exported {} occurrences to {:?}", count, path);
    Ok(count)
}
