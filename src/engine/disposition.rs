// src/engine/disposition.rs

//! Decide what to do with a step before any handler runs.
//!
//! The decision depends on whether the document understands preconditions:
//! older documents fail steps that carry preconditions or have no handler,
//! newer ones skip them. This split is kept for backward compatibility.

use crate::contracts::{PluginResult, Preconditions};
use crate::platform::PlatformType;

/// The only precondition key understood today.
pub const PLATFORM_TYPE_PRECONDITION: &str = "platformType";

/// What the engine does with a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Invoke the handler.
    Execute,
    /// Do not run; report `Skipped` with this message.
    Skip(String),
    /// Do not run; report `Failed` with this message.
    Fail(String),
    /// Handler cannot run on this platform (legacy documents only).
    Unsupported(String),
    /// Preconditions name keys this agent does not understand.
    UnrecognizedPrecondition(Vec<String>),
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Execute => "execute",
            Disposition::Skip(_) => "skip",
            Disposition::Fail(_) => "fail",
            Disposition::Unsupported(_) => "unsupported",
            Disposition::UnrecognizedPrecondition(_) => "unrecognized-precondition",
        }
    }

    /// Result for every disposition except `Execute`.
    pub fn to_result(&self) -> Option<PluginResult> {
        match self {
            Disposition::Execute => None,
            Disposition::Skip(message) => Some(PluginResult::skipped(message.clone())),
            Disposition::Fail(message) | Disposition::Unsupported(message) => {
                Some(PluginResult::failed(1, message.clone()))
            }
            Disposition::UnrecognizedPrecondition(keys) => Some(PluginResult::failed(
                1,
                format!(
                    "Unrecognized precondition(s): '{}', please update agent to latest version",
                    keys.join(", ")
                ),
            )),
        }
    }
}

/// Inputs to [`resolve_disposition`].
#[derive(Debug, Clone)]
pub struct StepFacts<'a> {
    /// Step type name.
    pub step_name: &'a str,
    pub step_id: &'a str,
    pub preconditions: &'a Preconditions,
    pub preconditions_enabled: bool,
    pub handler_found: bool,
    /// `Err(detail)` when the handler declares this platform unsupported.
    pub platform_support: Result<(), String>,
    pub platform: PlatformType,
}

/// Evaluate preconditions against `platform`.
///
/// Returns whether the step is allowed on this platform and the sorted list
/// of keys that are not understood.
pub fn evaluate_preconditions(
    preconditions: &Preconditions,
    platform: PlatformType,
) -> (bool, Vec<String>) {
    let mut allowed = true;
    let mut unrecognized = Vec::new();

    for (key, value) in preconditions {
        if key == PLATFORM_TYPE_PRECONDITION {
            if !platform.matches(value) {
                allowed = false;
            }
        } else {
            unrecognized.push(key.clone());
        }
    }

    (allowed, unrecognized)
}

pub fn resolve_disposition(facts: &StepFacts<'_>) -> Disposition {
    let name = facts.step_name;
    let id = facts.step_id;
    let has_preconditions = !facts.preconditions.is_empty();

    if !facts.preconditions_enabled {
        if let Err(detail) = &facts.platform_support {
            return Disposition::Unsupported(format!(
                "Plugin with name {name} is not supported on this platform. {detail}"
            ));
        }
        if !facts.handler_found {
            return Disposition::Fail(format!("Plugin with name {name} not found"));
        }
        if has_preconditions {
            return Disposition::Fail(format!(
                "Preconditions are not supported by this document version. Step name: {id}"
            ));
        }
        return Disposition::Execute;
    }

    if !has_preconditions {
        if !facts.handler_found {
            return Disposition::Skip(format!(
                "Step execution skipped: plugin with name {name} not found. Step name: {id}"
            ));
        }
        if let Err(detail) = &facts.platform_support {
            return Disposition::Skip(format!(
                "Step execution skipped: plugin {name} is not supported on this platform. {detail} Step name: {id}"
            ));
        }
        return Disposition::Execute;
    }

    let (allowed, unrecognized) = evaluate_preconditions(facts.preconditions, facts.platform);

    if !allowed || facts.platform_support.is_err() || !facts.handler_found {
        return Disposition::Skip(format!(
            "Step execution skipped due to unsatisfied preconditions: '{}'. Step name: {id}",
            describe(facts.preconditions)
        ));
    }

    if !unrecognized.is_empty() {
        return Disposition::UnrecognizedPrecondition(unrecognized);
    }

    Disposition::Execute
}

fn describe(preconditions: &Preconditions) -> String {
    preconditions
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
