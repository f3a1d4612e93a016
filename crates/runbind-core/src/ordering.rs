// Registration ordering for a step's parameters
//
// A context parameter reads its source's already-resolved value, so:
// 1. every non-context parameter goes first,
// 2. then context parameters fed by a non-context source,
// 3. then context parameters fed by another context parameter, each placed
//    after its source when that source is in the same list.
// Ordering is stable: ties keep declaration order.

use std::collections::HashSet;

use crate::error::{ResolutionError, Result};
use crate::parameter::{Parameter, ParameterKind};

/// Registration tier of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistrationPriority {
    /// Not a context parameter
    Immediate,
    /// Context parameter whose source is a workflow or output parameter
    ContextFromNonContext,
    /// Context parameter whose source is another context parameter
    ContextFromContext,
}

impl RegistrationPriority {
    pub fn of(parameter: &Parameter) -> Self {
        match parameter {
            Parameter::Context(p) if p.source.kind == ParameterKind::Context => {
                RegistrationPriority::ContextFromContext
            }
            Parameter::Context(_) => RegistrationPriority::ContextFromNonContext,
            Parameter::Workflow(_)
            | Parameter::Output(_)
            | Parameter::Credential(_)
            | Parameter::ExternalSecret(_) => RegistrationPriority::Immediate,
        }
    }
}

/// Order a step's parameters for registration.
///
/// Fails with `ContextDependencyCycle` when context parameters in the list
/// source each other in a loop.
pub fn registration_order(mut parameters: Vec<Parameter>) -> Result<Vec<Parameter>> {
    parameters.sort_by_key(RegistrationPriority::of);

    let chained_from = parameters
        .iter()
        .position(|p| RegistrationPriority::of(p) == RegistrationPriority::ContextFromContext)
        .unwrap_or(parameters.len());
    let chained = parameters.split_off(chained_from);

    parameters.extend(order_context_chain(chained)?);
    Ok(parameters)
}

/// Stable topological pass: repeatedly take the first parameter whose source
/// is not still waiting in the list.
fn order_context_chain(mut pending: Vec<Parameter>) -> Result<Vec<Parameter>> {
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = {
            let waiting: HashSet<&str> = pending.iter().map(Parameter::key).collect();
            pending.iter().position(|p| match p {
                Parameter::Context(c) => !waiting.contains(c.source.key.as_str()),
                _ => true,
            })
        };

        match ready {
            Some(index) => ordered.push(pending.remove(index)),
            None => {
                let keys: Vec<&str> = pending.iter().map(Parameter::key).collect();
                return Err(ResolutionError::ContextDependencyCycle(keys.join(", ")));
            }
        }
    }

    Ok(ordered)
}
