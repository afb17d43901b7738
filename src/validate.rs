use crate::record::{CharacterRecord, Gender, Status};

/// Fields checked for completeness: name, gender, status.
const CHECKED_FIELDS: usize = 3;

/// Count of missing values among name, gender and status.
///
/// An `Unknown` placeholder counts as missing.
pub fn missing_fields(record: &CharacterRecord) -> usize {
    let name_missing = record
        .name
        .as_deref()
        .map_or(true, |n| n.trim().is_empty());
    [
        name_missing,
        record.gender == Gender::Unknown,
        record.status == Status::Unknown,
    ]
    .iter()
    .filter(|missing| **missing)
    .count()
}

/// Keep/drop decision for a freshly extracted record. `name` is mandatory.
pub fn accept(record: &CharacterRecord) -> bool {
    let has_name = record
        .name
        .as_deref()
        .is_some_and(|n| !n.trim().is_empty());
    has_name && missing_fields(record) < CHECKED_FIELDS
}
