// src/contracts/result.rs

//! Step results and document-level status aggregation.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::document::StepId;

/// Marker appended to stdout/stderr/output that exceeded the size bound.
pub const OUTPUT_TRUNCATED_SUFFIX: &str = "\n---Output truncated---";

/// Status of a step (and, aggregated, of a document).
///
/// A step moves `NotStarted -> InProgress -> <terminal>`. `SuccessAndReboot`
/// is terminal for the current pass only: the next pass resets it to
/// `InProgress` so the step can finish after the reboot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ResultStatus {
    #[default]
    #[serde(alias = "")]
    NotStarted,
    InProgress,
    Success,
    SuccessAndReboot,
    Failed,
    Cancelled,
    TimedOut,
    Skipped,
}

impl ResultStatus {
    /// Statuses a pass may (re)enter a step from.
    pub fn is_pending(self) -> bool {
        matches!(self, ResultStatus::NotStarted | ResultStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }

    pub fn is_reboot(self) -> bool {
        self == ResultStatus::SuccessAndReboot
    }

    /// Higher wins when merging statuses of several steps.
    fn merge_rank(self) -> u8 {
        match self {
            ResultStatus::NotStarted => 0,
            ResultStatus::Skipped => 1,
            ResultStatus::Success => 2,
            ResultStatus::TimedOut => 3,
            ResultStatus::Cancelled => 4,
            ResultStatus::Failed => 5,
            ResultStatus::InProgress => 6,
            ResultStatus::SuccessAndReboot => 7,
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultStatus::NotStarted => "NotStarted",
            ResultStatus::InProgress => "InProgress",
            ResultStatus::Success => "Success",
            ResultStatus::SuccessAndReboot => "SuccessAndReboot",
            ResultStatus::Failed => "Failed",
            ResultStatus::Cancelled => "Cancelled",
            ResultStatus::TimedOut => "TimedOut",
            ResultStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// Worst of two statuses.
pub fn merge_status(current: ResultStatus, new: ResultStatus) -> ResultStatus {
    if new.merge_rank() > current.merge_rank() {
        new
    } else {
        current
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    /// Step id within the document.
    #[serde(default)]
    pub plugin_id: StepId,
    /// Step type name (what handler ran it).
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub standard_output: String,
    #[serde(default)]
    pub standard_error: String,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_s3_bucket_name: Option<String>,
    #[serde(default)]
    pub output_s3_key_prefix: Option<String>,
}

impl PluginResult {
    pub fn new(status: ResultStatus, code: i32) -> Self {
        Self {
            status,
            code,
            ..Self::default()
        }
    }

    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::new(ResultStatus::Success, 0)
        }
    }

    pub fn failed(code: i32, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            output: error.clone(),
            error: Some(error),
            ..Self::new(ResultStatus::Failed, code)
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            ..Self::new(ResultStatus::Skipped, 0)
        }
    }

    /// Bound `output`, `standard_output` and `standard_error` to `max_len`
    /// characters each.
    pub fn truncate(&mut self, max_len: usize) {
        self.output = truncate_output(&self.output, max_len);
        self.standard_output = truncate_output(&self.standard_output, max_len);
        self.standard_error = truncate_output(&self.standard_error, max_len);
    }
}

/// Results keyed by step id.
pub type PluginResults = HashMap<StepId, PluginResult>;

/// Count of steps per status.
pub type StatusCounts = BTreeMap<ResultStatus, usize>;

/// Truncate `text` to at most `max_len` characters, appending
/// [`OUTPUT_TRUNCATED_SUFFIX`] when anything was cut.
pub fn truncate_output(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len).collect();
    out.push_str(OUTPUT_TRUNCATED_SUFFIX);
    out
}

/// Aggregate step results into a document status.
///
/// - The worst status wins (see [`merge_status`]).
/// - While fewer than `total_steps` results are terminal and no step asked
///   for a reboot, the document is still `InProgress`.
/// - A document whose steps were all skipped counts as `Success`.
pub fn aggregate_document_status(
    results: &PluginResults,
    total_steps: usize,
) -> (ResultStatus, StatusCounts) {
    let mut counts = StatusCounts::new();
    let mut merged = ResultStatus::NotStarted;
    let mut finished = 0usize;

    for result in results.values() {
        *counts.entry(result.status).or_insert(0) += 1;
        merged = merge_status(merged, result.status);
        if result.status.is_terminal() {
            finished += 1;
        }
    }

    let status = if merged.is_reboot() {
        ResultStatus::SuccessAndReboot
    } else if finished < total_steps || merged == ResultStatus::InProgress {
        ResultStatus::InProgress
    } else if merged == ResultStatus::Skipped || merged == ResultStatus::NotStarted {
        ResultStatus::Success
    } else {
        merged
    };

    (status, counts)
}

/// Document-level report emitted by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub document_id: String,
    pub document_name: String,
    pub document_version: String,
    pub association_id: Option<String>,
    pub message_id: String,
    pub status: ResultStatus,
    pub plugin_results: PluginResults,
    pub status_counts: StatusCounts,
    pub run_count: u32,
    pub total_steps: usize,
}
