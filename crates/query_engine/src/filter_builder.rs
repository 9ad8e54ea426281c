use chrono::{DateTime, Duration, Utc};
use common::domain::{DomainError, DomainResult, FieldName, ReadingFilter, SensorId};
use std::collections::BTreeSet;

/// Queries without an explicit start look back this far from now
pub const DEFAULT_QUERY_WINDOW_DAYS: i64 = 14;

pub const START_PARAM: &str = "start";
pub const END_PARAM: &str = "end";
pub const MAX_POINTS_PARAM: &str = "maxDataPoints";

/// Logical query as requested by a client, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingQueryRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    /// `None` selects every known field
    pub fields: Option<BTreeSet<FieldName>>,
    pub max_points: Option<i64>,
}

impl ReadingQueryRequest {
    /// Map request parameters onto a query.
    ///
    /// `<field>=<bool>` toggles start from the full field set and switch
    /// single fields on or off. Toggles whose value is not a boolean and
    /// parameters naming unknown fields are ignored.
    pub fn from_params<'a, I>(params: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut request = ReadingQueryRequest::default();

        for (key, value) in params {
            match key {
                START_PARAM => request.start = non_empty(value),
                END_PARAM => request.end = non_empty(value),
                MAX_POINTS_PARAM if !value.is_empty() => {
                    let max_points = value.trim().parse::<i64>().map_err(|_| {
                        DomainError::InvalidArgument(format!(
                            "{} must be an integer, got '{}'",
                            MAX_POINTS_PARAM, value
                        ))
                    })?;
                    request.max_points = Some(max_points);
                }
                _ => {
                    if let (Some(field), Some(enabled)) =
                        (FieldName::parse_known(key), parse_bool_flag(value))
                    {
                        let fields = request.fields.get_or_insert_with(FieldName::known_set);
                        if enabled {
                            fields.insert(field);
                        } else {
                            fields.remove(&field);
                        }
                    }
                }
            }
        }

        Ok(request)
    }

    pub fn with_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = FieldName>,
    {
        self.fields = Some(fields.into_iter().collect());
        self
    }

    pub fn with_max_points(mut self, max_points: i64) -> Self {
        self.max_points = Some(max_points);
        self
    }
}

/// How many points the caller wants at most. `None` keeps every point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownsampleSpec {
    pub max_points: Option<usize>,
}

impl DownsampleSpec {
    /// Zero or negative limits mean no reduction
    pub fn from_requested(max_points: Option<i64>) -> Self {
        Self {
            max_points: max_points
                .filter(|max| *max > 0)
                .and_then(|max| usize::try_from(max).ok()),
        }
    }
}

/// Validated query ready for the store adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingQuery {
    pub filter: ReadingFilter,
    pub downsample: DownsampleSpec,
}

/// Validate a request and translate it into a store filter
pub fn build_query(
    sensor_id: SensorId,
    request: &ReadingQueryRequest,
    now: DateTime<Utc>,
) -> DomainResult<ReadingQuery> {
    let start = match &request.start {
        Some(start) => parse_timestamp(START_PARAM, start)?,
        None => now - Duration::days(DEFAULT_QUERY_WINDOW_DAYS),
    };
    let end = match &request.end {
        Some(end) => parse_timestamp(END_PARAM, end)?,
        None => now,
    };

    if start >= end {
        return Err(DomainError::InvalidArgument(format!(
            "start {} must be before end {}",
            start.to_rfc3339(),
            end.to_rfc3339()
        )));
    }

    let fields = request.fields.clone().unwrap_or_else(FieldName::known_set);
    if fields.is_empty() {
        return Err(DomainError::InvalidArgument(
            "at least one field must be selected".to_string(),
        ));
    }

    Ok(ReadingQuery {
        filter: ReadingFilter {
            sensor_id,
            start,
            end,
            fields,
        },
        downsample: DownsampleSpec::from_requested(request.max_points),
    })
}

fn parse_timestamp(name: &str, value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DomainError::InvalidArgument(format!("invalid {} '{}': {}", name, value, e)))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Accepts the usual spellings of a boolean flag
fn parse_bool_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_to_last_fourteen_days_and_all_fields() {
        let sensor_id = SensorId::new_v4();
        let query = build_query(sensor_id, &ReadingQueryRequest::default(), now()).unwrap();

        assert_eq!(query.filter.sensor_id, sensor_id);
        assert_eq!(query.filter.end, now());
        assert_eq!(query.filter.start, now() - Duration::days(14));
        assert_eq!(query.filter.fields, FieldName::known_set());
        assert_eq!(query.downsample, DownsampleSpec::default());
    }

    #[test]
    fn test_explicit_range() {
        let request = ReadingQueryRequest::from_params([
            ("start", "2024-06-01T00:00:00Z"),
            ("end", "2024-06-02T00:00:00+02:00"),
        ])
        .unwrap();

        let query = build_query(SensorId::new_v4(), &request, now()).unwrap();
        assert_eq!(query.filter.start, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(query.filter.end, Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_timestamp_is_invalid_argument() {
        let request = ReadingQueryRequest::from_params([("start", "yesterday")]).unwrap();
        let result = build_query(SensorId::new_v4(), &request, now());
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn test_inverted_range_is_invalid_argument() {
        let request = ReadingQueryRequest::from_params([
            ("start", "2024-06-02T00:00:00Z"),
            ("end", "2024-06-01T00:00:00Z"),
        ])
        .unwrap();
        let result = build_query(SensorId::new_v4(), &request, now());
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn test_field_toggles_start_from_all_fields() {
        let request = ReadingQueryRequest::from_params([
            ("humidity", "false"),
            ("co2level", "0"),
            ("pressure", "maybe"),
            ("wind", "true"),
        ])
        .unwrap();

        let fields = request.fields.unwrap();
        assert_eq!(
            fields,
            [FieldName::Temperature, FieldName::Pressure]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn test_all_fields_disabled_is_invalid_argument() {
        let request = ReadingQueryRequest::default().with_fields(Vec::<FieldName>::new());
        let result = build_query(SensorId::new_v4(), &request, now());
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn test_max_points_parsing() {
        let request = ReadingQueryRequest::from_params([("maxDataPoints", "25")]).unwrap();
        assert_eq!(request.max_points, Some(25));

        let result = ReadingQueryRequest::from_params([("maxDataPoints", "lots")]);
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }

    #[test]
    fn test_non_positive_max_points_means_no_reduction() {
        assert_eq!(DownsampleSpec::from_requested(Some(0)).max_points, None);
        assert_eq!(DownsampleSpec::from_requested(Some(-1)).max_points, None);
        assert_eq!(DownsampleSpec::from_requested(None).max_points, None);
        assert_eq!(DownsampleSpec::from_requested(Some(7)).max_points, Some(7));
    }
}
