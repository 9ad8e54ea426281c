use chrono::{DateTime, Duration, TimeZone, Utc};
use common::domain::{
    DomainError, FieldName, InMemoryReadingRepository, Reading, ReadingRepository, SensorId,
};
use query_engine::{ReadingQueryRequest, ReadingQueryService};
use std::sync::Arc;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

async fn seeded_repository(sensor_id: SensorId, points: i64) -> Arc<InMemoryReadingRepository> {
    let repository = Arc::new(InMemoryReadingRepository::new());
    for i in 0..points {
        let reading = Reading::new(sensor_id, base() + Duration::minutes(i))
            .with_field(FieldName::Temperature, 10.0 + i as f64)
            .with_field(FieldName::Humidity, 40.0)
            .with_field(FieldName::Pressure, 1000.0);
        repository.store_reading(&reading).await.unwrap();
    }
    repository
}

#[tokio::test]
async fn test_query_with_request_parameters() {
    let sensor_id = SensorId::new_v4();
    let repository = seeded_repository(sensor_id, 100).await;
    let service = ReadingQueryService::new(repository);

    let request = ReadingQueryRequest::from_params([
        ("start", "2024-03-01T00:10:00Z"),
        ("end", "2024-03-01T00:30:00Z"),
        ("humidity", "false"),
        ("pressure", "false"),
        ("co2level", "false"),
        ("maxDataPoints", "4"),
    ])
    .unwrap();

    let readings = service.query_readings(sensor_id, &request).await.unwrap();

    // 20 points in range reduced to 4: source indices 0, 5, 10, 15
    let temperatures: Vec<f64> = readings
        .iter()
        .map(|r| r.fields[&FieldName::Temperature])
        .collect();
    assert_eq!(temperatures, vec![20.0, 25.0, 30.0, 35.0]);
    assert!(readings.iter().all(|r| r.fields.len() == 1));
}

#[tokio::test]
async fn test_other_sensors_are_not_returned() {
    let sensor_id = SensorId::new_v4();
    let repository = seeded_repository(sensor_id, 5).await;
    repository
        .store_reading(
            &Reading::new(SensorId::new_v4(), base()).with_field(FieldName::Temperature, 99.0),
        )
        .await
        .unwrap();
    let service = ReadingQueryService::new(repository);

    let request = ReadingQueryRequest::from_params([
        ("start", "2024-02-28T00:00:00Z"),
        ("end", "2024-03-02T00:00:00Z"),
    ])
    .unwrap();
    let readings = service.query_readings(sensor_id, &request).await.unwrap();

    assert_eq!(readings.len(), 5);
    assert!(readings.iter().all(|r| r.sensor_id == sensor_id));
    assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_disabling_every_field_is_rejected() {
    let service = ReadingQueryService::new(Arc::new(InMemoryReadingRepository::new()));
    let request = ReadingQueryRequest::from_params([
        ("temperature", "false"),
        ("humidity", "false"),
        ("pressure", "false"),
        ("co2level", "false"),
    ])
    .unwrap();

    let result = service.query_readings(SensorId::new_v4(), &request).await;
    assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
}
