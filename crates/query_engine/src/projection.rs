use common::domain::{FieldName, Reading};
use std::collections::BTreeSet;

/// Copies of `readings` holding only the requested fields.
///
/// Readings left without any field are kept so the time axis stays intact.
pub fn project_readings(readings: &[Reading], fields: &BTreeSet<FieldName>) -> Vec<Reading> {
    readings.iter().map(|reading| reading.project(fields)).collect()
}
