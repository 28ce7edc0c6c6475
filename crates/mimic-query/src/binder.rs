//! Payload to bound-parameter conversion.
//!
//! Values are never interpolated into statement text. Each declared parameter
//! is looked up in the JSON payload, coerced to its declared type and emitted
//! as a [`BoundParameter`] in template order.

use mimic_warehouse::{BoundParameter, ScalarType, ScalarValue, parse_timestamp};
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::template::{Presence, QueryTemplate};

/// Binds a JSON payload against a template.
///
/// # Errors
///
/// - `MalformedPayload` if `payload` is not a JSON object
/// - `ImmutableField` if the payload carries one of the template's identity fields
/// - `MissingField` for an absent or null required field, or an all-null `require_any` group
/// - `TypeMismatch` for a value that cannot be coerced to its declared type
pub fn bind(template: &QueryTemplate, payload: &Value) -> Result<Vec<BoundParameter>, QueryError> {
    bind_fields(template, as_object(payload)?, None)
}

/// Binds a payload plus an identity value taken from the request path.
///
/// The immutability check runs against the caller's payload only; the
/// identity is merged in afterwards under `identity_field`.
///
/// # Errors
///
/// Same as [`bind`].
pub fn bind_with_identity(
    template: &QueryTemplate,
    payload: &Value,
    identity_field: &str,
    identity: Value,
) -> Result<Vec<BoundParameter>, QueryError> {
    bind_fields(template, as_object(payload)?, Some((identity_field, &identity)))
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, QueryError> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(QueryError::malformed_payload(format!(
            "expected a JSON object, got {}",
            json_kind(other)
        ))),
    }
}

fn bind_fields(
    template: &QueryTemplate,
    payload: &Map<String, Value>,
    identity: Option<(&str, &Value)>,
) -> Result<Vec<BoundParameter>, QueryError> {
    if let Some(field) = template.immutable.iter().find(|f| payload.contains_key(**f)) {
        return Err(QueryError::immutable_field(*field));
    }

    let lookup = |name: &str| -> Option<&Value> {
        match identity {
            Some((field, value)) if field == name => Some(value),
            _ => payload.get(name),
        }
    };

    let mut bound = Vec::with_capacity(template.parameters.len());
    for param in &template.parameters {
        let value = match lookup(param.name) {
            None | Some(Value::Null) => match param.presence {
                Presence::Required => return Err(QueryError::missing_field(param.name)),
                Presence::Nullable => ScalarValue::Null,
            },
            Some(raw) => coerce(param.name, param.ty, raw)?,
        };
        bound.push(BoundParameter::new(param.name, param.ty, value));
    }

    if let Some(first) = template.require_any.first() {
        let any_present = bound
            .iter()
            .any(|p| template.require_any.contains(&p.name.as_str()) && !p.value.is_null());
        if !any_present {
            return Err(QueryError::missing_field(*first));
        }
    }

    Ok(bound)
}

/// Coerces one raw JSON value to `ty`.
pub fn coerce(field: &str, ty: ScalarType, raw: &Value) -> Result<ScalarValue, QueryError> {
    let mismatch = |detail: String| QueryError::type_mismatch(field, ty, detail);

    match (ty, raw) {
        (ScalarType::Int64, Value::Number(n)) => n
            .as_i64()
            .map(ScalarValue::Int64)
            .ok_or_else(|| mismatch(format!("{n} is not a 64-bit integer"))),
        // Identifiers taken from the URL path arrive as strings.
        (ScalarType::Int64, Value::String(s)) => s
            .parse::<i64>()
            .map(ScalarValue::Int64)
            .map_err(|_| mismatch(format!("{s:?} is not an integer"))),
        (ScalarType::String, Value::String(s)) => Ok(ScalarValue::String(s.clone())),
        (ScalarType::Timestamp, Value::String(s)) => parse_timestamp(s)
            .map(ScalarValue::Timestamp)
            .ok_or_else(|| mismatch(format!("{s:?} is not a valid timestamp"))),
        (_, other) => Err(mismatch(format!("got {}", json_kind(other)))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{DatasetRef, Operation, TemplateRegistry};
    use serde_json::json;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::new(DatasetRef::new("proj", "MIMIC")).unwrap()
    }

    fn ts(raw: &str) -> ScalarValue {
        ScalarValue::Timestamp(parse_timestamp(raw).unwrap())
    }

    #[test]
    fn test_bind_create_patient_in_template_order() {
        let registry = registry();
        let params = bind(
            registry.lookup(Operation::CreatePatient),
            &json!({"gender": "F", "dob": "1980-01-01T00:00:00Z", "subject_id": 42}),
        )
        .unwrap();

        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["row_id", "subject_id", "gender", "dob"]);
        assert_eq!(params[0].value, ScalarValue::Null);
        assert_eq!(params[0].ty, ScalarType::Int64);
        assert_eq!(params[1].value, ScalarValue::Int64(42));
        assert_eq!(params[2].value, ScalarValue::String("F".into()));
        assert_eq!(params[3].value, ts("1980-01-01T00:00:00Z"));
    }

    #[test]
    fn test_missing_required_field() {
        let registry = registry();
        let err = bind(
            registry.lookup(Operation::CreateAdmission),
            &json!({"subject_id": 1, "hadm_id": 1001, "admission_location": "EMERGENCY ROOM ADMIT"}),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::MissingField { ref field } if field == "admittime"));
    }

    #[test]
    fn test_null_required_field_is_missing() {
        let registry = registry();
        let err = bind(
            registry.lookup(Operation::CreateQuestion),
            &json!({"id": 1, "patient_id": 42, "message": null}),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::MissingField { ref field } if field == "message"));
    }

    #[test]
    fn test_type_mismatches() {
        let registry = registry();
        let template = registry.lookup(Operation::CreatePatient);

        let err = bind(
            template,
            &json!({"subject_id": "forty-two", "gender": "F", "dob": "1980-01-01"}),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { ref field, .. } if field == "subject_id"));

        let err = bind(
            template,
            &json!({"subject_id": 42, "gender": "F", "dob": "yesterday"}),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { ref field, .. } if field == "dob"));

        let err = bind(template, &json!({"subject_id": 4.2, "gender": "F", "dob": "1980-01-01"}))
            .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { .. }));

        let err = bind(template, &json!({"subject_id": 42, "gender": 1, "dob": "1980-01-01"}))
            .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { ref field, .. } if field == "gender"));
    }

    #[test]
    fn test_engine_native_timestamp_literal() {
        let value = coerce("dob", ScalarType::Timestamp, &json!("1980-01-01 00:00:00 UTC")).unwrap();
        assert_eq!(value, ts("1980-01-01T00:00:00Z"));
        let value = coerce("dob", ScalarType::Timestamp, &json!("1980-01-01 02:00:00+02:00")).unwrap();
        assert_eq!(value, ts("1980-01-01T00:00:00Z"));
    }

    #[test]
    fn test_identity_fields_are_immutable() {
        let registry = registry();
        let template = registry.lookup(Operation::UpdatePatient);

        for payload in [
            json!({"gender": "M", "dob": "1970-01-01T00:00:00Z", "subject_id": 7}),
            json!({"gender": "M", "dob": "1970-01-01T00:00:00Z", "row_id": 1}),
        ] {
            let err = bind_with_identity(template, &payload, "subject_id", json!("42")).unwrap_err();
            assert!(matches!(err, QueryError::ImmutableField { .. }));
        }

        let params = bind_with_identity(
            template,
            &json!({"gender": "M", "dob": "1970-01-01T00:00:00Z"}),
            "subject_id",
            json!("42"),
        )
        .unwrap();
        assert_eq!(params[2].name, "subject_id");
        assert_eq!(params[2].value, ScalarValue::Int64(42));
    }

    #[test]
    fn test_update_admission_requires_any_time() {
        let registry = registry();
        let template = registry.lookup(Operation::UpdateAdmission);

        let err = bind_with_identity(template, &json!({}), "hadm_id", json!("1001")).unwrap_err();
        assert!(matches!(err, QueryError::MissingField { ref field } if field == "dischtime"));

        let params = bind_with_identity(
            template,
            &json!({"deathtime": "2024-03-01T10:00:00Z"}),
            "hadm_id",
            json!("1001"),
        )
        .unwrap();
        assert_eq!(params[0].value, ScalarValue::Null);
        assert_eq!(params[0].ty, ScalarType::Timestamp);
        assert_eq!(params[1].value, ts("2024-03-01T10:00:00Z"));
        assert_eq!(params[2].value, ScalarValue::Int64(1001));
    }

    #[test]
    fn test_non_object_payload() {
        let registry = registry();
        let err = bind(registry.lookup(Operation::CreateAnswer), &json!([1, 2])).unwrap_err();
        assert!(matches!(err, QueryError::MalformedPayload { .. }));
    }
}
