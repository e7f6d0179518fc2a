// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-Schema compilation and argument validation. Schemas are compiled
//! once at registration; validation failures surface `invalid_arguments`
//! with the first violation's path and message.

use serde_json::Value;

use crate::error::{DispatchError, ErrorCode};

/// Compile a tool input schema.
pub fn compile(schema: &Value) -> anyhow::Result<jsonschema::Validator> {
    jsonschema::validator_for(schema)
        .map_err(|e| anyhow::anyhow!("invalid tool input schema: {e}"))
}

/// Validate arguments against a compiled schema.
pub fn validate(validator: &jsonschema::Validator, arguments: &Value) -> Result<(), DispatchError> {
    match validator.validate(arguments) {
        Ok(()) => Ok(()),
        Err(err) => {
            let path = err.instance_path.to_string();
            let detail = if path.is_empty() {
                err.to_string()
            } else {
                format!("{path}: {err}")
            };
            Err(DispatchError::new(ErrorCode::InvalidArguments, detail))
        }
    }
}

/// Schema for a tool that takes no arguments (an empty object).
pub fn empty_object() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
