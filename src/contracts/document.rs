// src/contracts/document.rs

//! Persisted document state.
//!
//! A document is an ordered list of steps ([`PluginState`]) plus bookkeeping
//! about who sent it and how far it got. The executor mutates this in place
//! as steps complete and saves it through a `DocumentStore`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contracts::result::{PluginResult, PluginResults, ResultStatus};

/// Step id, unique within a document.
pub type StepId = String;

/// Declared step preconditions: condition name -> expected value.
///
/// Only `platformType` is understood today; other keys are reported back as
/// unrecognized.
pub type Preconditions = BTreeMap<String, String>;

/// Step configuration handed to the handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Free-form handler input.
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub output_s3_bucket_name: String,
    #[serde(default)]
    pub output_s3_key_prefix: String,
    /// Directory where this step writes its stdout/stderr files.
    #[serde(default)]
    pub orchestration_directory: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub book_keeping_file_name: String,
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_id: StepId,
    #[serde(default)]
    pub preconditions: Preconditions,
    /// Set for documents whose schema understands preconditions. Older
    /// documents fail steps that carry preconditions instead of skipping.
    #[serde(default)]
    pub is_preconditions_enabled: bool,
    #[serde(default)]
    pub default_working_directory: String,
}

/// One step of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginState {
    /// Step type name, used to resolve the handler.
    pub name: String,
    /// Step id.
    pub id: StepId,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default)]
    pub result: PluginResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentType {
    #[default]
    SendCommand,
    Association,
}

/// Who sent the document and where it stands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub document_id: String,
    #[serde(default)]
    pub command_id: String,
    #[serde(default)]
    pub association_id: Option<String>,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub document_version: String,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub document_status: ResultStatus,
    #[serde(default)]
    pub run_count: u32,
    /// Last step that reported a result, if any.
    #[serde(default)]
    pub last_step: Option<StepId>,
}

/// The persisted unit the executor loads and saves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub document_information: DocumentInfo,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub instance_plugins_information: Vec<PluginState>,
}

impl DocumentState {
    pub fn document_id(&self) -> &str {
        &self.document_information.document_id
    }

    pub fn step_count(&self) -> usize {
        self.instance_plugins_information.len()
    }

    /// Copy `results` back into the matching steps.
    pub fn apply_results(&mut self, results: &PluginResults) {
        for step in self.instance_plugins_information.iter_mut() {
            if let Some(result) = results.get(&step.id) {
                step.result = result.clone();
            }
        }
    }

    /// Current results of every step, keyed by step id.
    pub fn results(&self) -> PluginResults {
        self.instance_plugins_information
            .iter()
            .map(|step| (step.id.clone(), step.result.clone()))
            .collect()
    }
}
