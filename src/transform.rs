use crate::types::{Dataset, Row, Table};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;

/// Up to five repeated factor slots collapsed into one combined column.
#[derive(Debug, Clone)]
pub struct CombineRule {
    pub sources: Vec<&'static str>,
    pub target: &'static str,
}

/// Per-dataset normalization rules: one engine, three rule tables.
#[derive(Debug, Clone)]
pub struct TransformRules {
    pub drop: Vec<&'static str>,
    pub rename: Vec<(&'static str, &'static str)>,
    pub combine: Option<CombineRule>,
    pub date_columns: Vec<&'static str>,
    pub time_columns: Vec<&'static str>,
}

impl TransformRules {
    pub fn for_dataset(dataset: Dataset) -> Self {
        match dataset {
            // Vehicle types come from the vehicle table, and the composite
            // location field is redundant with latitude/longitude.
            Dataset::Crash => TransformRules {
                drop: vec![
                    "location",
                    "vehicle_type_code1",
                    "vehicle_type_code2",
                    "vehicle_type_code_3",
                    "vehicle_type_code_4",
                    "vehicle_type_code_5",
                ],
                rename: vec![],
                combine: Some(CombineRule {
                    sources: vec![
                        "contributing_factor_vehicle_1",
                        "contributing_factor_vehicle_2",
                        "contributing_factor_vehicle_3",
                        "contributing_factor_vehicle_4",
                        "contributing_factor_vehicle_5",
                    ],
                    target: "combined_collision_factors",
                }),
                date_columns: vec!["crash_date"],
                time_columns: vec!["crash_time"],
            },
            // Date/time live on the crash table; per-row identifiers and
            // factor columns get dataset-specific names so they survive the
            // join without colliding.
            Dataset::Vehicle => TransformRules {
                drop: vec!["crash_date", "crash_time"],
                rename: vec![
                    ("unique_id", "vehicle_unique_id"),
                    ("contributing_factor_1", "vehicle_contributing_factor_1"),
                    ("contributing_factor_2", "vehicle_contributing_factor_2"),
                ],
                combine: None,
                date_columns: vec![],
                time_columns: vec![],
            },
            Dataset::Person => TransformRules {
                drop: vec!["crash_date", "crash_time"],
                rename: vec![
                    ("unique_id", "person_unique_id"),
                    ("contributing_factor_1", "person_contributing_factor_1"),
                    ("contributing_factor_2", "person_contributing_factor_2"),
                ],
                combine: None,
                date_columns: vec![],
                time_columns: vec![],
            },
        }
    }

    fn renamed(&self, column: &str) -> Option<&'static str> {
        self.rename
            .iter()
            .find(|(from, _)| *from == column)
            .map(|(_, to)| *to)
    }
}

/// Normalize + combine + de-dupe factor values.
/// Drops missing/empty values and case-insensitive "unspecified"/"nan",
/// preserves first-occurrence order, joins with ", ".
pub fn combine_factors<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let Some(raw) = value else { continue };
        let s = raw.trim();
        if s.is_empty() {
            continue;
        }
        let lower = s.to_lowercase();
        if lower == "unspecified" || lower == "nan" {
            continue;
        }
        if seen.insert(s.to_string()) {
            out.push(s.to_string());
        }
    }
    out.join(", ")
}

/// Apply a dataset's rules to a table, producing a new table. Pure: the input
/// is untouched, and columns beyond the documented schema are never assumed
/// (a rule naming an absent column is simply inert).
pub fn apply(rules: &TransformRules, table: &Table) -> Table {
    let drop: HashSet<&str> = rules.drop.iter().copied().collect();

    let combine_sources: Vec<usize> = rules
        .combine
        .as_ref()
        .map(|c| {
            c.sources
                .iter()
                .filter_map(|name| table.column_index(name))
                .collect()
        })
        .unwrap_or_default();
    let combine_set: HashSet<usize> = combine_sources.iter().copied().collect();

    let date_set: HashSet<usize> = rules
        .date_columns
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    let time_set: HashSet<usize> = rules
        .time_columns
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();

    // Kept columns in declared order, then the synthesized column last.
    let mut keep: Vec<usize> = Vec::new();
    let mut out_columns: Vec<String> = Vec::new();
    for (i, column) in table.columns().iter().enumerate() {
        if drop.contains(column.as_str()) || combine_set.contains(&i) {
            continue;
        }
        keep.push(i);
        out_columns.push(
            rules
                .renamed(column)
                .map(|to| to.to_string())
                .unwrap_or_else(|| column.clone()),
        );
    }
    if let Some(combine) = &rules.combine {
        out_columns.push(combine.target.to_string());
    }

    let mut out = Table::from_columns(out_columns);
    for row in table.rows() {
        let mut new_row: Row = keep
            .iter()
            .map(|&i| {
                if date_set.contains(&i) {
                    coerce_date(row[i].as_deref())
                } else if time_set.contains(&i) {
                    coerce_time(row[i].as_deref())
                } else {
                    row[i].clone()
                }
            })
            .collect();

        if rules.combine.is_some() {
            let combined = combine_factors(combine_sources.iter().map(|&i| row[i].as_deref()));
            new_row.push(if combined.is_empty() {
                None
            } else {
                Some(combined)
            });
        }
        out.push_row(new_row);
    }
    out
}

/// Parse a calendar date in the formats the source is known to emit.
/// Unparseable values become an explicit null, never an error.
fn coerce_date(cell: Option<&str>) -> Option<String> {
    let s = cell?.trim();
    if s.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn coerce_time(cell: Option<&str>) -> Option<String> {
    let s = cell?.trim();
    if s.is_empty() {
        return None;
    }
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(s, format) {
            return Some(time.format("%H:%M").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup;
    use crate::types::DedupPolicy;
    use serde_json::json;

    #[test]
    fn combine_factors_filters_sentinels_and_preserves_order() {
        let combined = combine_factors(
            [
                Some("Unspecified"),
                Some("Driver Inattention"),
                Some("unspecified"),
                Some("Driver Inattention"),
                Some(""),
            ]
            .into_iter(),
        );
        assert_eq!(combined, "Driver Inattention");
    }

    #[test]
    fn combine_factors_joins_distinct_values_in_first_seen_order() {
        let combined = combine_factors(
            [
                None,
                Some("Following Too Closely"),
                Some("nan"),
                Some("Driver Inattention"),
            ]
            .into_iter(),
        );
        assert_eq!(combined, "Following Too Closely, Driver Inattention");
    }

    fn crash_table(rows: Vec<serde_json::Value>) -> Table {
        let table = Table::new(Dataset::Crash.columns());
        let (table, _) = dedup::reconcile(
            table,
            &rows,
            DedupPolicy::LastWinsUnique { key: "collision_id" },
        )
        .unwrap();
        table
    }

    #[test]
    fn crash_transform_coerces_combines_and_prunes() {
        let table = crash_table(vec![json!({
            "collision_id": "100",
            "crash_date": "2021-04-14T00:00:00.000",
            "crash_time": "5:32",
            "location": "{\"latitude\": \"40.6\"}",
            "latitude": "40.6",
            "contributing_factor_vehicle_1": "Unspecified",
            "contributing_factor_vehicle_2": "Driver Inattention",
            "contributing_factor_vehicle_3": "Driver Inattention",
            "vehicle_type_code1": "Sedan",
        })]);

        let rules = TransformRules::for_dataset(Dataset::Crash);
        let out = apply(&rules, &table);

        assert_eq!(out.cell(0, "crash_date"), Some("2021-04-14"));
        assert_eq!(out.cell(0, "crash_time"), Some("05:32"));
        assert_eq!(
            out.cell(0, "combined_collision_factors"),
            Some("Driver Inattention")
        );
        assert_eq!(out.column_index("location"), None);
        assert_eq!(out.column_index("vehicle_type_code1"), None);
        assert_eq!(out.column_index("contributing_factor_vehicle_1"), None);
        // Synthesized column lands last.
        assert_eq!(
            out.columns().last().map(String::as_str),
            Some("combined_collision_factors")
        );
    }

    #[test]
    fn unparseable_date_becomes_null_and_row_is_retained() {
        let table = crash_table(vec![json!({
            "collision_id": "100",
            "crash_date": "not a date",
            "crash_time": "99:99",
            "borough": "QUEENS",
        })]);

        let out = apply(&TransformRules::for_dataset(Dataset::Crash), &table);
        assert_eq!(out.len(), 1);
        assert_eq!(out.cell(0, "crash_date"), None);
        assert_eq!(out.cell(0, "crash_time"), None);
        assert_eq!(out.cell(0, "borough"), Some("QUEENS"));
    }

    #[test]
    fn vehicle_transform_renames_and_drops_redundant_columns() {
        let mut table = Table::new(Dataset::Vehicle.columns());
        let row = table.reindex(&json!({
            "unique_id": "19142351",
            "collision_id": "100",
            "crash_date": "2021-04-14T00:00:00.000",
            "crash_time": "5:32",
            "contributing_factor_1": "Backing Unsafely",
        }));
        table.push_row(row);

        let out = apply(&TransformRules::for_dataset(Dataset::Vehicle), &table);
        assert_eq!(out.cell(0, "vehicle_unique_id"), Some("19142351"));
        assert_eq!(
            out.cell(0, "vehicle_contributing_factor_1"),
            Some("Backing Unsafely")
        );
        assert_eq!(out.column_index("unique_id"), None);
        assert_eq!(out.column_index("crash_date"), None);
        assert_eq!(out.column_index("crash_time"), None);
    }

    #[test]
    fn person_transform_mirrors_vehicle_renames() {
        let out = apply(
            &TransformRules::for_dataset(Dataset::Person),
            &Table::new(Dataset::Person.columns()),
        );
        assert!(out.column_index("person_unique_id").is_some());
        assert!(out.column_index("person_contributing_factor_1").is_some());
        assert!(out.column_index("person_contributing_factor_2").is_some());
        assert_eq!(out.column_index("crash_date"), None);
    }
}
