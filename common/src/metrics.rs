use serde::Deserialize;

use crate::types::MetricsError;

/// InfluxDB query response envelope. Only the first row of the first series
/// of the first result set is ever consumed.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<QuerySeries>,
}

#[derive(Debug, Deserialize)]
pub struct QuerySeries {
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Pulls the aggregate out of `results[0].series[0].values[0][1]` and floors
/// it. A truncated envelope is reported as a recoverable error, never a
/// panic.
pub fn extract_temperature(body: &str) -> Result<i32, MetricsError> {
    let envelope: QueryResponse = serde_json::from_str(body)?;

    let row = envelope
        .results
        .first()
        .and_then(|result| result.series.first())
        .and_then(|series| series.values.first())
        .ok_or(MetricsError::MissingValue("results[0].series[0].values[0]"))?;

    let aggregate = row.get(1).ok_or(MetricsError::MissingValue("values[0][1]"))?;
    let number = aggregate.as_f64().ok_or(MetricsError::NotANumber)?;

    Ok(number.floor() as i32)
}

/// Line-protocol point for the battery gauge, one per cycle when a gauge is
/// fitted.
pub fn battery_line(location: &str, voltage: f32) -> String {
    format!("battery,location={location} voltage={voltage:.2}\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn extracts_and_floors_the_aggregate() {
        let body = r#"{"results":[{"series":[{"values":[[0, 55.7]]}]}]}"#;

        assert_eq!(extract_temperature(body).unwrap(), 55);
    }

    #[test]
    fn floors_toward_negative_infinity() {
        let body = r#"{"results":[{"series":[{"values":[[0, -0.4]]}]}]}"#;

        assert_eq!(extract_temperature(body).unwrap(), -1);
    }

    #[test]
    fn only_the_first_row_is_read() {
        let body = r#"{"results":[{"series":[{"values":[[10, 71.2],[20, 9000.0]]}]}]}"#;

        assert_eq!(extract_temperature(body).unwrap(), 71);
    }

    #[test]
    fn invalid_json_is_recoverable() {
        assert!(matches!(
            extract_temperature("<html>502</html>"),
            Err(MetricsError::Json(_))
        ));
    }

    #[test]
    fn empty_series_is_recoverable() {
        let body = r#"{"results":[{"series":[]}]}"#;

        assert!(matches!(
            extract_temperature(body),
            Err(MetricsError::MissingValue(_))
        ));
    }

    #[test]
    fn short_row_is_recoverable() {
        let body = r#"{"results":[{"series":[{"values":[[1700000000]]}]}]}"#;

        assert!(matches!(
            extract_temperature(body),
            Err(MetricsError::MissingValue("values[0][1]"))
        ));
    }

    #[test]
    fn non_numeric_aggregate_is_recoverable() {
        let body = r#"{"results":[{"series":[{"values":[[0, "warm"]]}]}]}"#;

        assert!(matches!(
            extract_temperature(body),
            Err(MetricsError::NotANumber)
        ));
    }

    #[test]
    fn battery_point_uses_line_protocol() {
        assert_eq!(
            battery_line("outside", 3.8712),
            "battery,location=outside voltage=3.87\n"
        );
    }
}
