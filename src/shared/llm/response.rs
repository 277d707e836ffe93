use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Structured model output with a degraded fallback.
///
/// Implementors carry an `is_llm_success` flag (skipped from the schema)
/// so callers can tell a real answer from the default.
pub trait LlmResponse: DeserializeOwned + Default + JsonSchema {
    /// Flag this value as a fallback produced after `error_message`
    fn mark_as_fallback(&mut self, error_message: String);

    fn is_success(&self) -> bool;

    /// Default value already marked as a fallback
    fn fallback(error_message: String) -> Self {
        let mut value = Self::default();
        value.mark_as_fallback(error_message);
        value
    }

    /// JSON schema of the response, inlined and without the `$schema`
    /// keyword, as accepted by structured-output APIs
    fn json_schema_value() -> Value {
        let settings = SchemaSettings::draft07().with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        });
        let schema = settings.into_generator().into_root_schema_for::<Self>();

        let mut value = serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(Default::default()));
        if let Value::Object(map) = &mut value {
            map.remove("$schema");
            map.remove("title");
            map.remove("definitions");
        }
        value
    }

    /// Pretty-printed schema for embedding into prompts
    fn json_schema_string() -> String {
        serde_json::to_string_pretty(&Self::json_schema_value()).unwrap_or_else(|_| "{}".to_string())
    }
}
