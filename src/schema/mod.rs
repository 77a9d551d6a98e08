//! Metadata Schema Registry (§4.4): a declarative catalogue of NWB/DANDI
//! fields used to generate LLM extraction prompts, validate completeness of
//! the effective metadata map, and provide deterministic normalization when
//! the LLM gateway is unavailable.

mod normalize;
mod registry;

pub use registry::{registry, FieldSpec, RequirementLevel};

use rustc_hash::FxHashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::MetadataValue;

/// One field extracted by the LLM gateway from free-form user text.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub confidence: u8,
    pub reasoning: String,
}

/// Output schema for `generate_extraction_prompt`'s `complete_structured`
/// call.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResult {
    pub fields: Vec<ExtractedField>,
}

/// A `(system, user, schema)` triple ready for
/// [`crate::llm::LlmGateway::complete_structured`].
pub struct ExtractionPrompt {
    pub system: String,
    pub user: String,
    pub schema: Value,
}

/// Builds the extraction prompt for free-form metadata text.
///
/// `already_known` lists field names already present in `effective`, so the
/// model is not asked to re-derive them.
pub fn generate_extraction_prompt(user_text: &str, already_known: &[String]) -> ExtractionPrompt {
    let fields_catalog = registry()
        .iter()
        .filter(|f| !already_known.iter().any(|k| k == f.name))
        .map(|f| format!("- {} ({:?}): {}. Hints: {}", f.name, f.requirement, f.description, f.hints.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You extract structured NWB/DANDI metadata fields from free-form text. \
         Only extract fields from this catalogue, normalizing each value, and \
         score your confidence 0-100 per field with a short reasoning string:\n{fields_catalog}"
    );

    let schema = serde_json::to_value(schemars::schema_for!(ExtractionResult))
        .unwrap_or_else(|_| json!({}));

    ExtractionPrompt {
        system,
        user: user_text.to_string(),
        schema,
    }
}

/// Deterministic fallback normalization for `field`, used when the LLM
/// gateway is unavailable. Unknown field names pass through unchanged.
pub fn normalize(field: &str, raw: &str) -> String {
    match registry().iter().find(|f| f.name == field) {
        Some(spec) => (spec.normalize)(raw),
        None => raw.trim().to_string(),
    }
}

/// `is_complete` iff every `RequiredNwb`/`RequiredDandi` field is present and
/// non-empty in `effective`.
pub fn validate(effective: &FxHashMap<String, MetadataValue>) -> (bool, Vec<&'static str>) {
    let missing: Vec<&'static str> = registry()
        .iter()
        .filter(|f| matches!(f.requirement, RequirementLevel::RequiredNwb | RequirementLevel::RequiredDandi))
        .filter(|f| !effective.get(f.name).is_some_and(|v| !v.value.trim().is_empty()))
        .map(|f| f.name)
        .collect();
    (missing.is_empty(), missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MetadataSource;

    fn value(v: &str) -> MetadataValue {
        MetadataValue {
            value: v.to_string(),
            confidence: 100,
            source: MetadataSource::UserProvided,
        }
    }

    #[test]
    fn validate_reports_missing_required_fields() {
        let effective = FxHashMap::default();
        let (complete, missing) = validate(&effective);
        assert!(!complete);
        assert!(missing.contains(&"subject_id"));
    }

    #[test]
    fn validate_is_complete_when_all_required_fields_present() {
        let mut effective = FxHashMap::default();
        for field in registry() {
            if matches!(field.requirement, RequirementLevel::RequiredNwb | RequirementLevel::RequiredDandi) {
                effective.insert(field.name.to_string(), value("x"));
            }
        }
        let (complete, missing) = validate(&effective);
        assert!(complete);
        assert!(missing.is_empty());
    }

    #[test]
    fn extraction_prompt_omits_already_known_fields() {
        let prompt = generate_extraction_prompt("test", &["subject_id".to_string()]);
        assert!(!prompt.system.contains("- subject_id"));
        assert!(prompt.system.contains("- experimenter"));
    }

    #[test]
    fn normalize_is_idempotent_for_every_field() {
        for field in registry() {
            let once = normalize(field.name, "P60 male MIT Jane Smith mouse");
            let twice = normalize(field.name, &once);
            assert_eq!(once, twice, "field {} is not idempotent", field.name);
        }
    }

    #[test]
    fn normalize_passes_through_unknown_field() {
        assert_eq!(normalize("not_a_real_field", "  raw  "), "raw");
    }
}
