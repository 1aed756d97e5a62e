//! Payload schema validation seam

use destroyclaim_core::{Error, Result};
use serde_json::Value;

/// Checks an element payload against the schema registered for its extension.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, payload: &Value, schema: &Value) -> Result<()>;
}

/// Default validator backed by the `jsonschema` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, payload: &Value, schema: &Value) -> Result<()> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            Error::schema_validation("extension schema could not be compiled", vec![e.to_string()])
        })?;
        let errors: Vec<String> = validator.iter_errors(payload).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::schema_validation("extension payload not valid", errors))
        }
    }
}
