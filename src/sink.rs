use crate::dedup::AuditEntry;
use crate::error::Result;
use crate::types::Table;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write a whole table to a CSV file, nulls as empty fields.
pub fn write_table_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer.flush()?;
    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Incremental duplicate-audit sink. Entries are appended and flushed as they
/// are discovered so a crash mid-run preserves the audit history gathered so
/// far; the header is written exactly once per run, lazily, so a clean run
/// leaves no file behind.
pub struct AuditSink {
    path: PathBuf,
    columns: Vec<String>,
    writer: Option<csv::Writer<File>>,
    written: usize,
}

impl AuditSink {
    pub fn new(path: PathBuf, columns: &[&str]) -> Self {
        Self {
            path,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            writer: None,
            written: 0,
        }
    }

    pub fn append(&mut self, entries: &[AuditEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.writer.is_none() {
            let mut writer = csv::Writer::from_path(&self.path)?;
            writer.write_record(
                self.columns
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once("duplicate_source")),
            )?;
            self.writer = Some(writer);
        }
        if let Some(writer) = self.writer.as_mut() {
            for entry in entries {
                writer.write_record(
                    entry
                        .row
                        .iter()
                        .map(|cell| cell.as_deref().unwrap_or(""))
                        .chain(std::iter::once(entry.source.as_str())),
                )?;
            }
            writer.flush()?;
        }
        self.written += entries.len();
        Ok(())
    }

    pub fn entries_written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DuplicateSource;
    use std::fs;

    #[test]
    fn audit_header_is_written_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash_duplicates.csv");
        let mut sink = AuditSink::new(path.clone(), &["collision_id", "borough"]);

        let entry = AuditEntry {
            row: vec![Some("100".to_string()), None],
            source: DuplicateSource::WithinBatch,
        };
        sink.append(std::slice::from_ref(&entry)).unwrap();
        sink.append(std::slice::from_ref(&entry)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "collision_id,borough,duplicate_source",
                "100,,within_batch",
                "100,,within_batch",
            ]
        );
        assert_eq!(sink.entries_written(), 2);
    }

    #[test]
    fn no_entries_means_no_audit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crash_duplicates.csv");
        let mut sink = AuditSink::new(path.clone(), &["collision_id"]);
        sink.append(&[]).unwrap();
        assert!(!path.exists());
    }
}
