use crate::error::{EtlError, Result};
use crate::types::{Table, NULL_SENTINEL};
use std::collections::HashMap;

/// Canonical join-side form of an identifier cell: trimmed, with
/// missing/blank values replaced by the shared sentinel so rows carrying no
/// id on either side still match each other.
fn canonical_id(cell: Option<&str>) -> &str {
    match cell.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => NULL_SENTINEL,
    }
}

/// Composite key for the person join: crash id + vehicle id.
fn composite_key(collision_id: Option<&str>, vehicle_id: Option<&str>) -> String {
    format!("{}_{}", canonical_id(collision_id), canonical_id(vehicle_id))
}

fn require_column(table: &Table, name: &str, side: &str) -> Result<usize> {
    table.column_index(name).ok_or_else(|| {
        EtlError::Schema(format!("column '{}' missing from {} table", name, side))
    })
}

/// Crash ⟕ Vehicle on collision_id.
///
/// Precondition: at most one crash row per collision_id, guaranteed upstream
/// by the last-wins reconciliation. A duplicate key surviving to this point
/// is a fatal schema violation reported with the offending keys, checked
/// before any join output is produced.
pub fn left_join_crash_vehicle(crash: &Table, vehicle: &Table) -> Result<Table> {
    let c_id = require_column(crash, "collision_id", "crash")?;
    let v_id = require_column(vehicle, "collision_id", "vehicle")?;

    let mut key_counts: HashMap<&str, usize> = HashMap::new();
    for row in crash.rows() {
        *key_counts.entry(canonical_id(row[c_id].as_deref())).or_insert(0) += 1;
    }
    let mut offenders: Vec<&str> = key_counts
        .iter()
        .filter(|(_, &n)| n > 1)
        .map(|(&k, _)| k)
        .collect();
    if !offenders.is_empty() {
        offenders.sort_unstable();
        return Err(EtlError::Schema(format!(
            "duplicate collision_id on crash side of join: {}",
            offenders.join(", ")
        )));
    }

    let mut vehicles_by_key: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in vehicle.rows().iter().enumerate() {
        vehicles_by_key
            .entry(canonical_id(row[v_id].as_deref()))
            .or_default()
            .push(i);
    }

    // Output: crash columns, then vehicle columns minus the join key.
    // A residual name collision gets a "_vehicle" suffix.
    let mut out_columns: Vec<String> = crash.columns().to_vec();
    let mut vehicle_keep: Vec<usize> = Vec::new();
    for (i, column) in vehicle.columns().iter().enumerate() {
        if i == v_id {
            continue;
        }
        vehicle_keep.push(i);
        out_columns.push(if out_columns.contains(column) {
            format!("{}_vehicle", column)
        } else {
            column.clone()
        });
    }

    let mut out = Table::from_columns(out_columns);
    for crash_row in crash.rows() {
        let key = canonical_id(crash_row[c_id].as_deref());
        match vehicles_by_key.get(key) {
            Some(matches) => {
                for &vi in matches {
                    let vehicle_row = &vehicle.rows()[vi];
                    let mut row = crash_row.clone();
                    row.extend(vehicle_keep.iter().map(|&i| vehicle_row[i].clone()));
                    out.push_row(row);
                }
            }
            None => {
                let mut row = crash_row.clone();
                row.extend(std::iter::repeat(None).take(vehicle_keep.len()));
                out.push_row(row);
            }
        }
    }
    Ok(out)
}

/// (Crash+Vehicle) ⟕ Person on the composite (collision_id, vehicle_id) key.
///
/// Blank vehicle ids are normalized to the sentinel on both sides before
/// matching, so crashes with no vehicle id still pick up person rows (e.g.
/// pedestrians) that likewise carry none. Person rows unmatched by any left
/// row are dropped by left-join semantics; left rows without a person match
/// keep null-filled person columns.
pub fn left_join_person(crash_vehicle: &Table, person: &Table) -> Result<Table> {
    let cv_cid = require_column(crash_vehicle, "collision_id", "crash+vehicle")?;
    let cv_vid = require_column(crash_vehicle, "vehicle_id", "crash+vehicle")?;
    let p_cid = require_column(person, "collision_id", "person")?;
    let p_vid = require_column(person, "vehicle_id", "person")?;

    let mut persons_by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in person.rows().iter().enumerate() {
        persons_by_key
            .entry(composite_key(row[p_cid].as_deref(), row[p_vid].as_deref()))
            .or_default()
            .push(i);
    }

    // Person's key components are already present on the left side; the rest
    // of its columns come over, suffixed on collision.
    let mut out_columns: Vec<String> = crash_vehicle.columns().to_vec();
    let mut person_keep: Vec<usize> = Vec::new();
    for (i, column) in person.columns().iter().enumerate() {
        if i == p_cid || i == p_vid {
            continue;
        }
        person_keep.push(i);
        out_columns.push(if out_columns.contains(column) {
            format!("{}_person", column)
        } else {
            column.clone()
        });
    }

    let mut out = Table::from_columns(out_columns);
    for left_row in crash_vehicle.rows() {
        let key = composite_key(left_row[cv_cid].as_deref(), left_row[cv_vid].as_deref());
        match persons_by_key.get(&key) {
            Some(matches) => {
                for &pi in matches {
                    let person_row = &person.rows()[pi];
                    let mut row = left_row.clone();
                    row.extend(person_keep.iter().map(|&i| person_row[i].clone()));
                    out.push_row(row);
                }
            }
            None => {
                let mut row = left_row.clone();
                row.extend(std::iter::repeat(None).take(person_keep.len()));
                out.push_row(row);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> Table {
        let mut t = Table::new(columns);
        for row in rows {
            t.push_row(row.into_iter().map(|c| c.map(str::to_string)).collect());
        }
        t
    }

    fn crash_100() -> Table {
        table(
            &["crash_date", "collision_id"],
            vec![vec![Some("2021-04-14"), Some("100")]],
        )
    }

    #[test]
    fn one_crash_two_vehicles_one_person_yields_two_rows() {
        let vehicle = table(
            &["vehicle_unique_id", "collision_id", "vehicle_id"],
            vec![
                vec![Some("v1"), Some("100"), Some("A")],
                vec![Some("v2"), Some("100"), Some("B")],
            ],
        );
        let person = table(
            &["person_unique_id", "collision_id", "vehicle_id", "person_id"],
            vec![vec![Some("p1"), Some("100"), Some("A"), Some("P-1")]],
        );

        let merged = left_join_crash_vehicle(&crash_100(), &vehicle).unwrap();
        assert_eq!(merged.len(), 2);

        let joined = left_join_person(&merged, &person).unwrap();
        assert_eq!(joined.len(), 2);
        // Vehicle A row is complete, vehicle B row has null person fields.
        assert_eq!(joined.cell(0, "vehicle_id"), Some("A"));
        assert_eq!(joined.cell(0, "person_id"), Some("P-1"));
        assert_eq!(joined.cell(1, "vehicle_id"), Some("B"));
        assert_eq!(joined.cell(1, "person_id"), None);
    }

    #[test]
    fn crash_without_vehicles_survives_with_null_vehicle_columns() {
        let vehicle = table(&["vehicle_unique_id", "collision_id", "vehicle_id"], vec![]);
        let merged = left_join_crash_vehicle(&crash_100(), &vehicle).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.cell(0, "collision_id"), Some("100"));
        assert_eq!(merged.cell(0, "vehicle_unique_id"), None);
    }

    #[test]
    fn blank_vehicle_ids_join_through_the_shared_sentinel() {
        let crash = table(
            &["crash_date", "collision_id"],
            vec![vec![Some("2021-04-14"), Some("200")]],
        );
        let vehicle = table(
            &["vehicle_unique_id", "collision_id", "vehicle_id"],
            vec![vec![Some("v1"), Some("200"), Some("  ")]],
        );
        let person = table(
            &["person_unique_id", "collision_id", "vehicle_id", "ped_role"],
            vec![vec![Some("p1"), Some("200"), None, Some("Pedestrian")]],
        );

        let merged = left_join_crash_vehicle(&crash, &vehicle).unwrap();
        let joined = left_join_person(&merged, &person).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.cell(0, "ped_role"), Some("Pedestrian"));
    }

    #[test]
    fn numeric_and_string_ids_match_after_trimming() {
        let crash = table(
            &["crash_date", "collision_id"],
            vec![vec![None, Some(" 100 ")]],
        );
        let vehicle = table(
            &["vehicle_unique_id", "collision_id", "vehicle_id"],
            vec![vec![Some("v1"), Some("100"), Some("A")]],
        );
        let merged = left_join_crash_vehicle(&crash, &vehicle).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.cell(0, "vehicle_unique_id"), Some("v1"));
    }

    #[test]
    fn duplicate_crash_key_is_a_fatal_schema_violation() {
        let crash = table(
            &["crash_date", "collision_id"],
            vec![
                vec![None, Some("300")],
                vec![None, Some("300")],
            ],
        );
        let vehicle = table(&["vehicle_unique_id", "collision_id", "vehicle_id"], vec![]);

        let err = left_join_crash_vehicle(&crash, &vehicle).unwrap_err();
        match err {
            EtlError::Schema(message) => assert!(message.contains("300")),
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn colliding_person_columns_get_a_suffix() {
        let merged = table(
            &["collision_id", "vehicle_id", "driver_sex"],
            vec![vec![Some("100"), Some("A"), Some("M")]],
        );
        let person = table(
            &["person_unique_id", "collision_id", "vehicle_id", "driver_sex"],
            vec![vec![Some("p1"), Some("100"), Some("A"), Some("F")]],
        );
        let joined = left_join_person(&merged, &person).unwrap();
        assert_eq!(joined.cell(0, "driver_sex"), Some("M"));
        assert_eq!(joined.cell(0, "driver_sex_person"), Some("F"));
    }
}
