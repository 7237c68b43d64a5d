use serde_json::Value;

/// Placeholder substituted for a missing/blank identifier so equality-based
/// joins still match (e.g. person rows not tied to a specific vehicle).
pub const NULL_SENTINEL: &str = "NULL";

// Declared column sets are kept constant to insulate the pipeline from
// upstream schema drift. Rows are reindexed against these on arrival:
// missing columns are padded with nulls, extra columns are dropped.

/// Crash dataset: one row per collision. Row id is collision_id.
pub const CRASH_COLUMNS: &[&str] = &[
    "crash_date",
    "crash_time",
    "borough",
    "zip_code",
    "latitude",
    "longitude",
    "location",
    "on_street_name",
    "off_street_name",
    "cross_street_name",
    "number_of_persons_injured",
    "number_of_persons_killed",
    "number_of_pedestrians_injured",
    "number_of_pedestrians_killed",
    "number_of_cyclist_injured",
    "number_of_cyclist_killed",
    "number_of_motorist_injured",
    "number_of_motorist_killed",
    "contributing_factor_vehicle_1",
    "contributing_factor_vehicle_2",
    "contributing_factor_vehicle_3",
    "contributing_factor_vehicle_4",
    "contributing_factor_vehicle_5",
    "collision_id",
    "vehicle_type_code1",
    "vehicle_type_code2",
    "vehicle_type_code_3",
    "vehicle_type_code_4",
    "vehicle_type_code_5",
];

/// Vehicle dataset: one row per motor vehicle involved in a crash.
pub const VEHICLE_COLUMNS: &[&str] = &[
    "unique_id",
    "collision_id",
    "crash_date",
    "crash_time",
    "vehicle_id",
    "state_registration",
    "vehicle_type",
    "vehicle_make",
    "vehicle_model",
    "vehicle_year",
    "travel_direction",
    "vehicle_occupants",
    "driver_sex",
    "driver_license_status",
    "driver_license_jurisdiction",
    "pre_crash",
    "point_of_impact",
    "vehicle_damage",
    "vehicle_damage_2",
    "vehicle_damage_3",
    "public_property_damage",
    "public_property_damage_type",
    "contributing_factor_1",
    "contributing_factor_2",
];

/// Person dataset: one row per person (driver, occupant, pedestrian,
/// bicyclist, ..) involved in a crash.
pub const PERSON_COLUMNS: &[&str] = &[
    "unique_id",
    "collision_id",
    "crash_date",
    "crash_time",
    "person_id",
    "person_type",
    "vehicle_id",
    "person_age",
    "ejection",
    "emotional_status",
    "bodily_injury",
    "position_in_vehicle",
    "safety_equipment",
    "ped_location",
    "ped_action",
    "complaint",
    "ped_role",
    "contributing_factor_1",
    "contributing_factor_2",
    "person_sex",
];

/// The three paginated sources this pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Crash,
    Vehicle,
    Person,
}

/// How a dataset's accumulation treats incoming batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Keep exactly one row per key, most recently fetched version wins.
    /// Every duplicate occurrence is audited.
    LastWinsUnique { key: &'static str },
    /// Rows are appended as delivered; identity is established later by the
    /// joiner's composite key.
    AppendOnly,
}

impl Dataset {
    pub fn all() -> [Dataset; 3] {
        [Dataset::Crash, Dataset::Vehicle, Dataset::Person]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Crash => "crashes",
            Dataset::Vehicle => "vehicles",
            Dataset::Person => "persons",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Dataset::Crash => CRASH_COLUMNS,
            Dataset::Vehicle => VEHICLE_COLUMNS,
            Dataset::Person => PERSON_COLUMNS,
        }
    }

    /// Only crash data carries its identity in the source feed; vehicle and
    /// person rows are an append-only log.
    pub fn policy(&self) -> DedupPolicy {
        match self {
            Dataset::Crash => DedupPolicy::LastWinsUnique { key: "collision_id" },
            Dataset::Vehicle | Dataset::Person => DedupPolicy::AppendOnly,
        }
    }

    pub fn raw_csv_name(&self) -> &'static str {
        match self {
            Dataset::Crash => "collision_crash.csv",
            Dataset::Vehicle => "collision_vehicle.csv",
            Dataset::Person => "collision_person.csv",
        }
    }

    pub fn transformed_csv_name(&self) -> &'static str {
        match self {
            Dataset::Crash => "transformed_collision_crash.csv",
            Dataset::Vehicle => "transformed_collision_vehicle.csv",
            Dataset::Person => "transformed_collision_person.csv",
        }
    }

    /// Parse a user-facing dataset name (CLI argument).
    pub fn from_arg(arg: &str) -> Option<Dataset> {
        match arg.trim().to_lowercase().as_str() {
            "crash" | "crashes" => Some(Dataset::Crash),
            "vehicle" | "vehicles" => Some(Dataset::Vehicle),
            "person" | "persons" => Some(Dataset::Person),
            _ => None,
        }
    }
}

/// One row, aligned to its table's declared columns. `None` is an explicit
/// null (missing in the source payload, or an unparseable date/time).
pub type Row = Vec<Option<String>>;

/// A column-ordered table of optional string cells. This is the unit of
/// accumulation: owned by the orchestrator, passed into and returned from
/// each reconcile step, and consumed by the transformer and joiner.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn replace_row(&mut self, index: usize, row: Row) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows[index] = row;
    }

    /// Align a raw JSON row to this table's declared columns: missing columns
    /// padded with null, extra columns dropped.
    pub fn reindex(&self, raw: &Value) -> Row {
        self.columns
            .iter()
            .map(|c| raw.get(c.as_str()).and_then(json_to_cell))
            .collect()
    }

    pub fn cell<'a>(&'a self, row: usize, column: &str) -> Option<&'a str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }
}

/// Canonical string form of a JSON cell. Numbers keep their JSON rendering so
/// numeric and string representations of the same id compare equal after
/// trimming.
pub fn json_to_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reindex_pads_missing_and_drops_extra_columns() {
        let table = Table::new(&["a", "b"]);
        let row = table.reindex(&json!({"b": "2", "z": "ignored"}));
        assert_eq!(row, vec![None, Some("2".to_string())]);
    }

    #[test]
    fn json_numbers_get_canonical_string_form() {
        assert_eq!(json_to_cell(&json!(4456123)), Some("4456123".to_string()));
        assert_eq!(json_to_cell(&json!("4456123")), Some("4456123".to_string()));
        assert_eq!(json_to_cell(&json!(null)), None);
    }

    #[test]
    fn dataset_from_arg_accepts_singular_and_plural() {
        assert_eq!(Dataset::from_arg("crash"), Some(Dataset::Crash));
        assert_eq!(Dataset::from_arg("Vehicles"), Some(Dataset::Vehicle));
        assert_eq!(Dataset::from_arg("persons"), Some(Dataset::Person));
        assert_eq!(Dataset::from_arg("bogus"), None);
    }
}
