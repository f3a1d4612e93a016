// Parameter store
//
// Definitions (by key) and resolved values (by key) for one run. A key has at
// most one definition and at most one value at any time. Values of secret
// parameters are handles or maps of handles, never cleartext.

use std::collections::HashMap;

use serde_json::Value;

use crate::parameter::{ContextParameter, Parameter, ParameterKind};

/// Definitions and resolved values of one run
#[derive(Debug, Default, Clone)]
pub struct ParameterStore {
    definitions: HashMap<String, Parameter>,
    values: HashMap<String, Value>,
}

impl ParameterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition, returning the replaced one
    pub fn define(&mut self, parameter: Parameter) -> Option<Parameter> {
        self.definitions
            .insert(parameter.key().to_string(), parameter)
    }

    pub fn definition(&self, key: &str) -> Option<&Parameter> {
        self.definitions.get(key)
    }

    pub fn is_defined(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set a value, returning the replaced one
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Context parameter definitions whose source is the given parameter
    pub fn context_parameters_sourced_from<'a>(
        &'a self,
        kind: ParameterKind,
        key: &'a str,
    ) -> impl Iterator<Item = &'a ContextParameter> + 'a {
        self.definitions
            .values()
            .filter_map(Parameter::as_context)
            .filter(move |p| p.source.kind == kind && p.source.key == key)
    }

    /// A context parameter is pending when it is defined, has no value yet, and
    /// its value is computed at step registration (not by output propagation)
    pub fn is_pending_context(&self, key: &str) -> bool {
        match self.definitions.get(key) {
            Some(Parameter::Context(p)) => {
                p.source.kind != ParameterKind::Output && !self.values.contains_key(key)
            }
            _ => false,
        }
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
