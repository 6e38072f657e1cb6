#![allow(dead_code)]

use docagent::contracts::{
    Configuration, DocumentInfo, DocumentState, PluginResult, PluginState, ResultStatus,
};
use serde_json::Value;

/// Builder for a single step (`PluginState`).
pub struct StepBuilder {
    step: PluginState,
}

impl StepBuilder {
    /// Step `id` resolved through plugin `name`.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            step: PluginState {
                name: name.to_string(),
                id: id.to_string(),
                configuration: Configuration {
                    plugin_id: id.to_string(),
                    plugin_name: name.to_string(),
                    ..Configuration::default()
                },
                result: PluginResult::default(),
            },
        }
    }

    pub fn preconditions_enabled(mut self) -> Self {
        self.step.configuration.is_preconditions_enabled = true;
        self
    }

    pub fn precondition(mut self, key: &str, value: &str) -> Self {
        self.step
            .configuration
            .preconditions
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn properties(mut self, properties: Value) -> Self {
        self.step.configuration.properties = properties;
        self
    }

    pub fn s3_output(mut self, bucket: &str, prefix: &str) -> Self {
        self.step.configuration.output_s3_bucket_name = bucket.to_string();
        self.step.configuration.output_s3_key_prefix = prefix.to_string();
        self
    }

    /// Prior result with `status`, as left by an earlier pass.
    pub fn with_status(mut self, status: ResultStatus) -> Self {
        self.step.result = PluginResult::new(status, 0);
        self.step.result.output = format!("previous {status}");
        self
    }

    pub fn build(self) -> PluginState {
        self.step
    }
}

/// Builder for `DocumentState`.
pub struct DocumentBuilder {
    state: DocumentState,
}

impl DocumentBuilder {
    pub fn new(document_id: &str) -> Self {
        Self {
            state: DocumentState {
                document_information: DocumentInfo {
                    document_id: document_id.to_string(),
                    command_id: document_id.to_string(),
                    document_name: "TestDocument".to_string(),
                    document_version: "1".to_string(),
                    instance_id: "i-0123456789abcdef0".to_string(),
                    ..DocumentInfo::default()
                },
                schema_version: "2.2".to_string(),
                ..DocumentState::default()
            },
        }
    }

    pub fn step(mut self, step: PluginState) -> Self {
        self.state.instance_plugins_information.push(step);
        self
    }

    pub fn association(mut self, association_id: &str) -> Self {
        self.state.document_information.association_id = Some(association_id.to_string());
        self
    }

    pub fn run_count(mut self, run_count: u32) -> Self {
        self.state.document_information.run_count = run_count;
        self
    }

    pub fn build(self) -> DocumentState {
        self.state
    }
}
