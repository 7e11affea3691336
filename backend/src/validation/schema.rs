//! JSON Schema validation for import definitions.
//!
//! Import definition files are checked against an embedded Draft 7 schema
//! (`schemas/import-config.json`) before they are deserialized, so a typo in
//! a key is reported instead of being ignored.

use serde_json::Value;

const IMPORT_CONFIG_SCHEMA: &str = include_str!("../../schemas/import-config.json");

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use sheetload::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["model"],
///     "properties": { "model": { "type": "string" } }
/// });
///
/// assert!(validate(&schema, &json!({ "model": "users" })).is_ok());
/// assert!(validate(&schema, &json!({ "model": 1 })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check: returns just true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate against the import definition schema.
pub fn validate_import_config(data: &Value) -> Result<(), Vec<String>> {
    let schema: Value = serde_json::from_str(IMPORT_CONFIG_SCHEMA)
        .map_err(|e| vec![format!("Invalid embedded schema: {}", e)])?;
    validate(&schema, data)
}
