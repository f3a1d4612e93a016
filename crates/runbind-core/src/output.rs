// Output propagation
//
// After a step finishes, its output is stored under the output parameter key,
// aliased under the block label, and pushed into every context parameter that
// takes its value from that output.

use serde_json::Value;
use tracing::{error, warn};

use crate::error::{ResolutionError, Result};
use crate::parameter::{OutputParameter, ParameterKind};
use crate::store::ParameterStore;

/// Status value that marks a step output as finished
pub const COMPLETED_STATUS: &str = "completed";

const EXTRACTED_INFORMATION: &str = "extracted_information";

/// Store a step output and propagate it to dependent parameters
pub fn record_output(
    store: &mut ParameterStore,
    output: &OutputParameter,
    value: Value,
) -> Result<()> {
    if store.has_value(&output.key) {
        warn!(key = %output.key, "Output parameter already has a value, overwriting");
    }

    store.set_value(output.key.clone(), value.clone());
    alias_block_output(store, output, &value);
    propagate_to_context_parameters(store, output, &value)
}

/// Make `<label>_output` reachable as `<label>`, with `output` mirroring
/// `extracted_information`. Existing object entries under the label win.
fn alias_block_output(store: &mut ParameterStore, output: &OutputParameter, value: &Value) {
    let Some(label) = output.block_label() else {
        return;
    };

    let mut alias = value.clone();
    if let Value::Object(map) = &mut alias {
        if let Some(extracted) = map.get(EXTRACTED_INFORMATION).cloned() {
            map.insert("output".to_string(), extracted);
        }
    }

    match (store.value(label), &mut alias) {
        (Some(Value::Object(current)), Value::Object(pending)) => {
            for (key, existing) in current {
                pending.insert(key.clone(), existing.clone());
            }
        }
        (Some(_), _) => {
            warn!(label = %label, "Block label already has a value, overwriting");
        }
        (None, _) => {}
    }

    store.set_value(label, alias);
}

fn propagate_to_context_parameters(
    store: &mut ParameterStore,
    output: &OutputParameter,
    value: &Value,
) -> Result<()> {
    let dependents: Vec<String> = store
        .context_parameters_sourced_from(ParameterKind::Output, &output.key)
        .map(|p| p.key.clone())
        .collect();

    for key in dependents {
        if is_unfinished(value) {
            continue;
        }

        if has_errors(value) {
            error!(
                output_key = %output.key,
                key = %key,
                "Output parameter has errors, setting context parameter to null"
            );
            store.set_value(key, Value::Null);
            continue;
        }

        let effective = match value {
            Value::Object(map) if map.contains_key(EXTRACTED_INFORMATION) => {
                &map[EXTRACTED_INFORMATION]
            }
            other => other,
        };

        let resolved = match effective {
            Value::Object(map) => map.get(&key).cloned().unwrap_or(Value::Null),
            Value::Array(_) => effective.clone(),
            _ => {
                return Err(ResolutionError::NonCollectionOutput {
                    key,
                    output_key: output.key.clone(),
                })
            }
        };

        if store.value(&key).is_some_and(|v| !v.is_null()) {
            warn!(key = %key, "Context parameter already has a value, overwriting");
        }
        store.set_value(key, resolved);
    }

    Ok(())
}

/// Output that reports a status other than completed alongside extracted data
fn is_unfinished(value: &Value) -> bool {
    match value {
        Value::Object(map) if map.contains_key(EXTRACTED_INFORMATION) => map
            .get("status")
            .is_some_and(|status| status.as_str() != Some(COMPLETED_STATUS)),
        _ => false,
    }
}

fn has_errors(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|map| map.get("errors"))
        .is_some_and(is_truthy)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
