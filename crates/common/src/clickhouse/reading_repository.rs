use crate::clickhouse::ClickHouseClient;
use crate::domain::{
    DomainError, DomainResult, FieldName, Reading, ReadingFilter, ReadingRepository, SensorId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

/// One stored field value. Readings are kept in long format, one row per field.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct ReadingFieldRow {
    pub sensor_id: String,
    pub field: String,
    pub value: f64,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub recorded_at: DateTime<Utc>,
}

impl ReadingFieldRow {
    /// Split a reading into its per-field rows
    pub fn from_reading(reading: &Reading) -> Vec<ReadingFieldRow> {
        reading
            .fields
            .iter()
            .map(|(field, value)| ReadingFieldRow {
                sensor_id: reading.sensor_id.to_string(),
                field: field.to_string(),
                value: *value,
                recorded_at: reading.timestamp,
            })
            .collect()
    }
}

impl TryFrom<ReadingFieldRow> for Reading {
    type Error = DomainError;

    /// A row becomes a partial reading carrying a single field
    fn try_from(row: ReadingFieldRow) -> DomainResult<Self> {
        let sensor_id = SensorId::parse_str(&row.sensor_id).map_err(|e| {
            DomainError::RepositoryError(anyhow::anyhow!(
                "stored sensor id '{}' is not a UUID: {}",
                row.sensor_id,
                e
            ))
        })?;

        Ok(Reading::new(sensor_id, row.recorded_at).with_field(FieldName::from(row.field), row.value))
    }
}

/// ClickHouse implementation of ReadingRepository
#[derive(Clone)]
pub struct ClickHouseReadingRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseReadingRepository {
    pub fn new(client: ClickHouseClient, table: String) -> Self {
        Self { client, table }
    }

    /// Create the readings table when it does not exist yet
    pub async fn ensure_table(&self) -> DomainResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                sensor_id String,
                field LowCardinality(String),
                value Float64,
                recorded_at DateTime64(3, 'UTC')
            ) ENGINE = MergeTree ORDER BY (sensor_id, recorded_at, field)",
            self.table
        );

        self.client
            .get_client()
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| {
                error!("Failed to create readings table: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        debug!(table = %self.table, "readings table ready");
        Ok(())
    }
}

#[async_trait]
impl ReadingRepository for ClickHouseReadingRepository {
    #[instrument(skip(self, reading), fields(sensor_id = %reading.sensor_id, table = %self.table))]
    async fn store_reading(&self, reading: &Reading) -> DomainResult<()> {
        let rows = ReadingFieldRow::from_reading(reading);
        if rows.is_empty() {
            debug!("Reading has no fields, skipping");
            return Ok(());
        }

        let mut insert = self
            .client
            .get_client()
            .insert::<ReadingFieldRow>(&self.table)
            .await
            .map_err(|e| {
                error!("Failed to create ClickHouse inserter: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        for row in &rows {
            insert.write(row).await.map_err(|e| {
                error!("Failed to write row to ClickHouse: {}", e);
                DomainError::RepositoryError(e.into())
            })?;
        }

        insert.end().await.map_err(|e| {
            error!("Failed to finalize ClickHouse insert: {}", e);
            DomainError::RepositoryError(e.into())
        })?;

        debug!(rows_inserted = rows.len(), "stored reading");
        Ok(())
    }

    #[instrument(skip(self, filter), fields(sensor_id = %filter.sensor_id, table = %self.table))]
    async fn query_readings(&self, filter: &ReadingFilter) -> DomainResult<Vec<Reading>> {
        let fields: Vec<String> = filter.fields.iter().map(|f| f.to_string()).collect();
        let sql = format!(
            "SELECT ?fields FROM {} \
             WHERE sensor_id = ? \
               AND recorded_at >= fromUnixTimestamp64Milli(?) \
               AND recorded_at < fromUnixTimestamp64Milli(?) \
               AND has(?, field) \
             ORDER BY recorded_at",
            self.table
        );

        let rows = self
            .client
            .get_client()
            .query(&sql)
            .bind(filter.sensor_id.to_string())
            .bind(filter.start.timestamp_millis())
            .bind(filter.end.timestamp_millis())
            .bind(fields)
            .fetch_all::<ReadingFieldRow>()
            .await
            .map_err(|e| {
                error!("Failed to query readings from ClickHouse: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        debug!(rows = rows.len(), "fetched reading rows");
        rows.into_iter().map(Reading::try_from).collect()
    }
}
