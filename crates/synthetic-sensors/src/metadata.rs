//! Metadata Handler (spec §4.7, C7). Rewrites every `metadata(ref,'key')`
//! call in a formula's text into a bare sentinel identifier wrapped by
//! the `metadata_result` identity builtin, so the Expression Engine
//! never needs direct access to the evaluation environment — sentinel
//! values are injected into the context ahead of time via `unified_set`.

use once_cell::sync::Lazy;
use regex::Regex;

use synthetic_sensors_common::{EngineError, EngineErrorKind, Value};

use crate::context::{HierarchicalContext, ReferenceValue};
use crate::providers::{MetadataProvider, StateProvider};

static METADATA_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)metadata\(\s*([A-Za-z_][A-Za-z0-9_.]*)\s*,\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
});

/// One rewritten call site: the sentinel name substituted into the
/// formula, and the resolved value to inject into the context under
/// that name before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadataCall {
    pub sentinel: String,
    pub reference: String,
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRewrite {
    pub formula: String,
    pub calls: Vec<ResolvedMetadataCall>,
}

/// Resolves every `metadata(ref,'key')` call site in `formula` and
/// rewrites it to `metadata_result(_metadata_<n>)`. `state` as the
/// first argument refers to the sensor's own last-published entity and
/// is looked up through `state_provider` rather than `metadata_provider`
/// (spec §6 — the two providers disagree only on who owns `state`).
pub fn rewrite_metadata_calls(
    formula: &str,
    metadata_provider: &dyn MetadataProvider,
    state_provider: &dyn StateProvider,
) -> Result<MetadataRewrite, EngineError> {
    let mut calls = Vec::new();
    let mut error: Option<EngineError> = None;

    let rewritten = METADATA_CALL.replace_all(formula, |caps: &regex::Captures| {
        if error.is_some() {
            return String::new();
        }
        let reference = caps[1].to_string();
        let key = caps[2].to_string();
        let resolved = if reference == "state" {
            state_provider.get_attribute(&reference, &key)
        } else {
            metadata_provider.get_metadata(&reference, &key)
        };
        let value = match resolved {
            Some(v) => v,
            None => {
                error = Some(
                    EngineError::new(EngineErrorKind::Name)
                        .with_name(format!("{reference}.{key}"))
                        .with_message("unknown metadata key or reference"),
                );
                return String::new();
            }
        };
        let sentinel = format!("_metadata_{}", calls.len());
        let call_text = format!("metadata_result({sentinel})");
        calls.push(ResolvedMetadataCall { sentinel, reference, key, value });
        call_text
    });

    if let Some(err) = error {
        return Err(err);
    }

    Ok(MetadataRewrite { formula: rewritten.into_owned(), calls })
}

/// Injects every resolved sentinel into the current layer of `ctx` via
/// `unified_set`, so the rewritten formula's `Identifier` lookups
/// resolve normally.
pub fn inject_sentinels(ctx: &mut HierarchicalContext, rewrite: &MetadataRewrite) {
    for call in &rewrite.calls {
        let reference = format!("metadata:{}:{}", call.reference, call.key);
        ctx.unified_set(&call.sentinel, ReferenceValue::new(reference, call.value.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderLookup;

    struct FixedMetadata;
    impl MetadataProvider for FixedMetadata {
        fn get_metadata(&self, entity_id: &str, key: &str) -> Option<Value> {
            match (entity_id, key) {
                ("power", "last_changed") => Some(Value::Text("2026-07-30T00:00:00".to_string())),
                _ => None,
            }
        }
    }

    struct NoState;
    impl StateProvider for NoState {
        fn get_state(&self, _entity_id: &str) -> ProviderLookup {
            ProviderLookup::missing()
        }
        fn enumerate(&self, _selector: &str) -> Vec<String> {
            Vec::new()
        }
        fn get_attribute(&self, _entity_id: &str, _key: &str) -> Option<Value> {
            None
        }
    }

    #[test]
    fn rewrites_a_single_call_site() {
        let rewrite = rewrite_metadata_calls(
            "minutes_between(metadata(power, 'last_changed'), now()) < 60",
            &FixedMetadata,
            &NoState,
        )
        .unwrap();
        assert_eq!(rewrite.calls.len(), 1);
        assert!(rewrite.formula.contains("metadata_result(_metadata_0)"));
        assert_eq!(rewrite.calls[0].value, Value::Text("2026-07-30T00:00:00".to_string()));
    }

    #[test]
    fn unknown_reference_is_a_name_error() {
        let err = rewrite_metadata_calls("metadata(missing, 'last_changed')", &FixedMetadata, &NoState).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Name);
    }

    #[test]
    fn rewrites_multiple_call_sites_with_distinct_sentinels() {
        let rewrite = rewrite_metadata_calls(
            "metadata(power, 'last_changed') == metadata(power, 'last_changed')",
            &FixedMetadata,
            &NoState,
        )
        .unwrap();
        assert_eq!(rewrite.calls.len(), 2);
        assert!(rewrite.formula.contains("_metadata_0"));
        assert!(rewrite.formula.contains("_metadata_1"));
    }
}
