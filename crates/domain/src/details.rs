//! Structured details attached to audit events.
//!
//! Payloads are ordered JSON objects. Key order survives encoding because the
//! workspace enables `serde_json`'s `preserve_order` feature.

use pipeaudit_core::{AppError, AppResult};
use serde_json::{Map, Value};

/// Ordered key/value details payload.
pub type DetailsPayload = Map<String, Value>;

/// Payload keys that hold record counts, in lookup precedence.
pub const COUNT_FIELDS: &[&str] = &[
    "record_count",
    "rows_loaded",
    "output_record_count",
    "records_processed",
    "row_count",
    "total_records",
];

/// Payload keys that hold non-count row metrics which must not be negative.
pub const ROW_METRIC_FIELDS: &[&str] = &[
    "rows_read",
    "rows_rejected",
    "rows_skipped",
    "rows_discarded",
    "input_record_count",
];

/// Payload keys that hold control totals, in lookup precedence.
pub const AMOUNT_FIELDS: &[&str] = &["control_total", "total_amount", "amount"];

/// Encodes a payload into its storage text form.
pub fn encode_details(payload: &DetailsPayload) -> AppResult<String> {
    serde_json::to_string(payload).map_err(|error| {
        AppError::Serialization(format!("failed to encode details payload: {error}"))
    })
}

/// Decodes a stored payload text back into an ordered payload.
pub fn decode_details(text: &str) -> AppResult<DetailsPayload> {
    serde_json::from_str::<DetailsPayload>(text).map_err(|error| {
        AppError::Serialization(format!("failed to decode details payload: {error}"))
    })
}

/// Returns the first count-like field value present in the payload.
#[must_use]
pub fn record_count(payload: &DetailsPayload) -> Option<u64> {
    COUNT_FIELDS
        .iter()
        .find_map(|key| payload.get(*key).and_then(count_value))
}

/// Returns the first amount-like field value present in the payload.
#[must_use]
pub fn control_total(payload: &DetailsPayload) -> Option<f64> {
    AMOUNT_FIELDS
        .iter()
        .find_map(|key| payload.get(*key).and_then(numeric_value))
}

/// Returns the names of count, row-metric or amount fields holding negative numbers.
#[must_use]
pub fn negative_metric_fields(payload: &DetailsPayload) -> Vec<String> {
    COUNT_FIELDS
        .iter()
        .chain(ROW_METRIC_FIELDS)
        .chain(AMOUNT_FIELDS)
        .filter(|key| {
            payload
                .get(**key)
                .and_then(numeric_value)
                .is_some_and(|value| value < 0.0)
        })
        .map(|key| (*key).to_owned())
        .collect()
}

/// Reads a JSON number or numeric string as `f64`.
#[must_use]
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|value| value.is_finite()),
        _ => None,
    }
}

fn count_value(value: &Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }

    numeric_value(value)
        .filter(|number| *number >= 0.0 && number.fract() == 0.0 && *number <= u64::MAX as f64)
        .map(|number| number as u64)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::{
        DetailsPayload, control_total, decode_details, encode_details, negative_metric_fields,
        record_count,
    };

    fn payload(value: Value) -> DetailsPayload {
        match value {
            Value::Object(map) => map,
            _ => DetailsPayload::new(),
        }
    }

    #[test]
    fn encoding_preserves_key_order() {
        let details = payload(json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}}));
        let encoded = encode_details(&details).unwrap_or_default();
        assert_eq!(encoded, r#"{"zeta":1,"alpha":2,"mid":{"b":1,"a":2}}"#);
    }

    #[test]
    fn record_count_follows_precedence() {
        let details = payload(json!({"rows_loaded": 990, "record_count": 1000}));
        assert_eq!(record_count(&details), Some(1000));

        let loader = payload(json!({"rows_read": 1000, "rows_loaded": "990"}));
        assert_eq!(record_count(&loader), Some(990));

        let none = payload(json!({"file_name": "a.dat"}));
        assert_eq!(record_count(&none), None);
    }

    #[test]
    fn record_count_ignores_fractional_and_negative_values() {
        assert_eq!(record_count(&payload(json!({"record_count": 10.5}))), None);
        assert_eq!(record_count(&payload(json!({"record_count": -3}))), None);
        assert_eq!(record_count(&payload(json!({"record_count": 12.0}))), Some(12));
    }

    #[test]
    fn control_total_reads_numbers_and_numeric_strings() {
        assert_eq!(
            control_total(&payload(json!({"control_total": "1520.75"}))),
            Some(1520.75)
        );
        assert_eq!(
            control_total(&payload(json!({"total_amount": 99}))),
            Some(99.0)
        );
        assert_eq!(control_total(&payload(json!({"amount": "n/a"}))), None);
    }

    #[test]
    fn negative_metrics_are_reported() {
        let details = payload(json!({
            "rows_read": 10,
            "rows_rejected": -1,
            "control_total": -5.5,
            "note": -7
        }));
        assert_eq!(
            negative_metric_fields(&details),
            vec!["rows_rejected".to_owned(), "control_total".to_owned()]
        );
    }

    #[test]
    fn decode_rejects_non_object_text() {
        assert!(decode_details("[1,2,3]").is_err());
        assert!(decode_details("{not json").is_err());
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            (-1.0e12_f64..1.0e12_f64).prop_map(Value::from),
            "[a-zA-Z0-9 _.-]{0,16}".prop_map(Value::from),
        ]
    }

    fn tree() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z_]{1,8}", inner), 0..6).prop_map(|entries| {
                    Value::Object(entries.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn payload_roundtrips_through_text(
            entries in prop::collection::vec(("[a-z_]{1,10}", tree()), 0..8)
        ) {
            let details: DetailsPayload = entries.into_iter().collect();
            let encoded = encode_details(&details);
            prop_assert!(encoded.is_ok());
            let decoded = decode_details(encoded.unwrap_or_default().as_str());
            prop_assert!(decoded.is_ok());
            prop_assert_eq!(decoded.unwrap_or_default(), details);
        }
    }
}
