use crate::error::{EtlError, Result};
use crate::types::{DedupPolicy, Row, Table};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Which condition flagged a row as duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateSource {
    /// The key occurs more than once inside the fetched batch.
    WithinBatch,
    /// The key already exists in the accumulated table. Takes precedence when
    /// both conditions hold: a re-delivery is the stronger signal.
    AgainstExisting,
}

impl DuplicateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateSource::WithinBatch => "within_batch",
            DuplicateSource::AgainstExisting => "against_existing",
        }
    }
}

/// A duplicate row captured with full content and provenance. Duplicates are
/// never silently dropped without one of these being emitted.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub row: Row,
    pub source: DuplicateSource,
}

/// Counts used for the per-batch duplicate log line.
pub fn audit_counts(entries: &[AuditEntry]) -> (usize, usize) {
    let within = entries
        .iter()
        .filter(|e| e.source == DuplicateSource::WithinBatch)
        .count();
    (within, entries.len() - within)
}

/// Merge one fetched batch into the accumulated table.
///
/// Under `LastWinsUnique` a row is duplicate if its key appears more than
/// once within the batch or already exists in the accumulation; all such rows
/// are returned as audit entries and, per key, the most recently processed
/// version wins (in place, so the accumulation keeps first-appearance order).
/// Under `AppendOnly` rows are appended as delivered with no auditing.
///
/// In both cases incoming rows are reindexed against the accumulated table's
/// declared columns, never concatenated raw.
pub fn reconcile(
    accumulated: Table,
    batch: &[Value],
    policy: DedupPolicy,
) -> Result<(Table, Vec<AuditEntry>)> {
    let mut table = accumulated;

    let key_column = match policy {
        DedupPolicy::AppendOnly => {
            for raw in batch {
                let row = table.reindex(raw);
                table.push_row(row);
            }
            return Ok((table, Vec::new()));
        }
        DedupPolicy::LastWinsUnique { key } => key,
    };

    let key_idx = table.column_index(key_column).ok_or_else(|| {
        EtlError::Schema(format!(
            "key column '{}' missing from declared schema",
            key_column
        ))
    })?;

    let rows: Vec<Row> = batch.iter().map(|raw| table.reindex(raw)).collect();

    let mut batch_counts: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        *batch_counts.entry(key_of(row, key_idx)).or_insert(0) += 1;
    }

    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        index_by_key.insert(key_of(row, key_idx), i);
    }
    // Snapshot of the keys accumulated before this batch; index_by_key keeps
    // growing as batch rows land and only tracks replacement positions.
    let existing: HashSet<String> = index_by_key.keys().cloned().collect();

    let mut audits = Vec::new();
    for row in rows {
        let key = key_of(&row, key_idx);
        let within_batch = batch_counts.get(&key).copied().unwrap_or(0) > 1;
        let against_existing = existing.contains(&key);

        if against_existing || within_batch {
            audits.push(AuditEntry {
                row: row.clone(),
                source: if against_existing {
                    DuplicateSource::AgainstExisting
                } else {
                    DuplicateSource::WithinBatch
                },
            });
        }

        match index_by_key.get(&key) {
            Some(&i) => table.replace_row(i, row),
            None => {
                index_by_key.insert(key, table.len());
                table.push_row(row);
            }
        }
    }

    Ok((table, audits))
}

fn key_of(row: &Row, key_idx: usize) -> String {
    row[key_idx]
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_string()
}
