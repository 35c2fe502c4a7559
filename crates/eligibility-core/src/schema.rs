//! JSON Schema validation for inbound requests.
//!
//! The schema only checks structure and JSON types. Value rules (digit
//! counts, dates, known codes) live in [`crate::validation`].

use std::sync::OnceLock;

use crate::validation::{FieldViolation, ValidationError};

/// Embedded request schema (loaded at compile time).
const REQUEST_SCHEMA_JSON: &str = include_str!("../schema/eligibility_request.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, ValidationError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(REQUEST_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(ValidationError::single("$schema", e.clone())),
    }
}

/// Validate a raw request document against the schema.
pub fn validate_request_schema(request_json: &serde_json::Value) -> Result<(), ValidationError> {
    let validator = get_validator()?;

    let violations: Vec<FieldViolation> = validator
        .iter_errors(request_json)
        .map(|e| {
            let pointer = e.instance_path.to_string();
            FieldViolation {
                field: if pointer.is_empty() {
                    "$".to_string()
                } else {
                    pointer
                },
                message: e.to_string(),
            }
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}
