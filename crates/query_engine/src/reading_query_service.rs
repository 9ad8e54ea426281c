use crate::{build_query, coalesce_readings, downsample, project_readings, ReadingQueryRequest};
use chrono::{DateTime, Utc};
use common::domain::{DomainResult, Reading, ReadingRepository, SensorId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read side: filter, fetch, coalesce, project and downsample
pub struct ReadingQueryService {
    repository: Arc<dyn ReadingRepository>,
}

impl ReadingQueryService {
    pub fn new(repository: Arc<dyn ReadingRepository>) -> Self {
        Self { repository }
    }

    pub async fn query_readings(
        &self,
        sensor_id: SensorId,
        request: &ReadingQueryRequest,
    ) -> DomainResult<Vec<Reading>> {
        self.query_readings_at(sensor_id, request, Utc::now()).await
    }

    /// Same as [`Self::query_readings`] with an explicit "now" for the
    /// default time range
    #[instrument(skip(self, request, now), fields(sensor_id = %sensor_id))]
    pub async fn query_readings_at(
        &self,
        sensor_id: SensorId,
        request: &ReadingQueryRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Reading>> {
        let query = build_query(sensor_id, request, now)?;

        let rows = self.repository.query_readings(&query.filter).await?;
        let row_count = rows.len();

        let readings = coalesce_readings(rows);
        let projected = project_readings(&readings, &query.filter.fields);
        let result = downsample(&projected, query.downsample.max_points);

        debug!(
            rows = row_count,
            readings = readings.len(),
            returned = result.len(),
            max_points = ?query.downsample.max_points,
            "reading query completed"
        );
        Ok(result)
    }

    /// Query rendered as flat JSON objects `{sensorId, timeStamp, <field>...}`
    pub async fn query_json(
        &self,
        sensor_id: SensorId,
        request: &ReadingQueryRequest,
    ) -> DomainResult<Vec<serde_json::Value>> {
        let readings = self.query_readings(sensor_id, request).await?;
        Ok(readings
            .iter()
            .map(|reading| serde_json::Value::Object(reading.to_json_map()))
            .collect())
    }
}
