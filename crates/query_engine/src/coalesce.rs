use chrono::{DateTime, Utc};
use common::domain::{Reading, SensorId};
use std::collections::HashMap;

/// Merge partial readings sharing sensor id and timestamp, then sort by
/// ascending timestamp.
///
/// Later rows win when the same field appears twice. The sort is stable, so
/// readings of different sensors at the same instant keep arrival order.
pub fn coalesce_readings(rows: Vec<Reading>) -> Vec<Reading> {
    let mut merged: Vec<Reading> = Vec::with_capacity(rows.len());
    let mut positions: HashMap<(SensorId, DateTime<Utc>), usize> = HashMap::new();

    for row in rows {
        match positions.get(&(row.sensor_id, row.timestamp)) {
            Some(&position) => merged[position].fields.extend(row.fields),
            None => {
                positions.insert((row.sensor_id, row.timestamp), merged.len());
                merged.push(row);
            }
        }
    }

    merged.sort_by_key(|reading| reading.timestamp);
    merged
}
