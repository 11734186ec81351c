//! OTLP value conversion helpers

use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use serde_json::{Map, Value as JsonValue};

/// Resource attribute carrying the emitting service name
pub const SERVICE_NAME_ATTR: &str = "service.name";

/// Convert AnyValue to JSON value (preserves native types)
pub fn any_value_to_json(value: &AnyValue) -> JsonValue {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => JsonValue::from(s.as_str()),
        Some(any_value::Value::BoolValue(b)) => JsonValue::from(*b),
        Some(any_value::Value::IntValue(i)) => JsonValue::from(*i),
        Some(any_value::Value::DoubleValue(d)) => JsonValue::from(*d),
        Some(any_value::Value::ArrayValue(arr)) => {
            JsonValue::Array(arr.values.iter().map(any_value_to_json).collect())
        }
        Some(any_value::Value::KvlistValue(kvlist)) => attributes_to_json(&kvlist.values),
        Some(any_value::Value::BytesValue(b)) => JsonValue::from(hex::encode(b)),
        None => JsonValue::Null,
    }
}

/// Build a JSON object from OTLP key/value attributes.
///
/// Attributes without a value are dropped.
pub fn attributes_to_json(attrs: &[KeyValue]) -> JsonValue {
    let map: Map<String, JsonValue> = attrs
        .iter()
        .filter_map(|kv| {
            kv.value
                .as_ref()
                .map(|v| (kv.key.clone(), any_value_to_json(v)))
        })
        .collect();
    JsonValue::Object(map)
}

/// Find a string attribute by key
pub fn find_string_attr<'a>(attrs: &'a [KeyValue], key: &str) -> Option<&'a str> {
    attrs.iter().find(|kv| kv.key == key).and_then(|kv| {
        match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
            Some(any_value::Value::StringValue(s)) => Some(s.as_str()),
            _ => None,
        }
    })
}

pub fn span_kind_name(kind: i32) -> &'static str {
    match kind {
        0 => "UNSPECIFIED",
        1 => "INTERNAL",
        2 => "SERVER",
        3 => "CLIENT",
        4 => "PRODUCER",
        5 => "CONSUMER",
        _ => "UNKNOWN",
    }
}

pub fn status_code_name(code: i32) -> &'static str {
    match code {
        0 => "UNSET",
        1 => "OK",
        2 => "ERROR",
        _ => "UNKNOWN",
    }
}
