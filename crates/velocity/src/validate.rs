use serde_json::{Map, Value};

use crate::error::InvalidReading;
use crate::model::{Capabilities, Reading};

pub const DEVICE_ID_FIELD: &str = "device_id";
pub const X_FIELD: &str = "x_axis";
pub const Y_FIELD: &str = "y_axis";
pub const BATTERY_FIELD: &str = "battery";
pub const LONGITUDE_FIELD: &str = "longitude";
pub const LATITUDE_FIELD: &str = "latitude";

/// `device_id`, `x_axis`, `y_axis` and `battery` are required; `null` counts
/// as absent. Geo fields are optional and only read when the geo capability
/// is on. All problems are collected before failing.
pub fn parse_reading(payload: &Value, capabilities: Capabilities) -> Result<Reading, InvalidReading> {
    let object = payload.as_object().ok_or_else(InvalidReading::not_an_object)?;

    let mut problems = InvalidReading::default();
    let device_id = required_device_id(object, &mut problems);
    let x = required_number(object, X_FIELD, &mut problems);
    let y = required_number(object, Y_FIELD, &mut problems);
    let battery = required_number(object, BATTERY_FIELD, &mut problems);

    let (longitude, latitude) = if capabilities.geo {
        (
            optional_number(object, LONGITUDE_FIELD, &mut problems),
            optional_number(object, LATITUDE_FIELD, &mut problems),
        )
    } else {
        (None, None)
    };

    match (device_id, x, y, battery) {
        (Some(device_id), Some(x), Some(y), Some(battery)) if problems.is_empty() => Ok(Reading {
            device_id,
            x,
            y,
            battery,
            longitude,
            latitude,
        }),
        _ => Err(problems),
    }
}

fn required_device_id(object: &Map<String, Value>, problems: &mut InvalidReading) -> Option<String> {
    match object.get(DEVICE_ID_FIELD) {
        None | Some(Value::Null) => {
            problems.missing.push(DEVICE_ID_FIELD);
            None
        }
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
        Some(_) => {
            problems.malformed.push(DEVICE_ID_FIELD);
            None
        }
    }
}

fn required_number(
    object: &Map<String, Value>,
    field: &'static str,
    problems: &mut InvalidReading,
) -> Option<f64> {
    match object.get(field) {
        None | Some(Value::Null) => {
            problems.missing.push(field);
            None
        }
        Some(value) => finite(value, field, problems),
    }
}

fn optional_number(
    object: &Map<String, Value>,
    field: &'static str,
    problems: &mut InvalidReading,
) -> Option<f64> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => finite(value, field, problems),
    }
}

fn finite(value: &Value, field: &'static str, problems: &mut InvalidReading) -> Option<f64> {
    match value.as_f64() {
        Some(number) if number.is_finite() => Some(number),
        _ => {
            problems.malformed.push(field);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn geo() -> Capabilities {
        Capabilities::default()
    }

    #[test]
    fn accepts_full_geo_payload() {
        let reading = parse_reading(
            &json!({
                "device_id": "d1",
                "x_axis": 3,
                "y_axis": 4.5,
                "battery": 90,
                "longitude": -122.4,
                "latitude": 37.7
            }),
            geo(),
        )
        .expect("payload should validate");

        assert_eq!(reading.device_id, "d1");
        assert_eq!(reading.x, 3.0);
        assert_eq!(reading.y, 4.5);
        assert_eq!(reading.battery, 90.0);
        assert_eq!(reading.longitude, Some(-122.4));
        assert_eq!(reading.latitude, Some(37.7));
    }

    #[test]
    fn geo_fields_are_optional() {
        let reading = parse_reading(
            &json!({"device_id": "d2", "x_axis": 1, "y_axis": 1, "battery": 50}),
            geo(),
        )
        .expect("geo fields should be optional");
        assert_eq!(reading.longitude, None);
        assert_eq!(reading.latitude, None);
    }

    #[test]
    fn geo_fields_are_ignored_without_capability() {
        let caps = Capabilities {
            geo: false,
            side_table: false,
        };
        let reading = parse_reading(
            &json!({
                "device_id": "d2",
                "x_axis": 1,
                "y_axis": 1,
                "battery": 50,
                "longitude": "not a number"
            }),
            caps,
        )
        .expect("geo fields should not be inspected");
        assert_eq!(reading.longitude, None);
    }

    #[test]
    fn reports_every_missing_field() {
        let err = parse_reading(&json!({"x_axis": 1, "battery": null}), geo())
            .expect_err("should reject");
        assert_eq!(err.missing, vec!["device_id", "y_axis", "battery"]);
        assert!(err.malformed.is_empty());
    }

    #[test]
    fn rejects_wrong_types() {
        let err = parse_reading(
            &json!({"device_id": 7, "x_axis": "1", "y_axis": 1, "battery": 5, "latitude": true}),
            geo(),
        )
        .expect_err("should reject");
        let message = err.to_string();
        assert!(message.contains("malformed fields: device_id, x_axis, latitude"));
    }

    #[test]
    fn rejects_blank_device_id_and_non_objects() {
        assert!(parse_reading(
            &json!({"device_id": "  ", "x_axis": 1, "y_axis": 1, "battery": 5}),
            geo()
        )
        .is_err());

        let err = parse_reading(&json!([1, 2, 3]), geo()).expect_err("array is not a reading");
        assert!(err.not_an_object);
        assert_eq!(err.to_string(), "payload must be a JSON object");
    }
}
