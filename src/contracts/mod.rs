// src/contracts/mod.rs

//! Data model shared by the engine, the document executor and the stores.
//!
//! - [`result`] holds `ResultStatus`, `PluginResult` and status aggregation.
//! - [`document`] holds the persisted document / step shapes.

pub mod document;
pub mod result;

pub use document::{
    Configuration, DocumentInfo, DocumentState, DocumentType, PluginState, Preconditions,
    StepId,
};
pub use result::{
    DocumentResult, OUTPUT_TRUNCATED_SUFFIX, PluginResult, PluginResults, ResultStatus,
    StatusCounts, aggregate_document_status, merge_status, truncate_output,
};
