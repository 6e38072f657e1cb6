// src/exec/mod.rs

//! Document execution layer.
//!
//! - [`executor`] runs one pass of a document through the engine and reports
//!   progress on a channel.
//! - [`store`] provides the `DocumentStore` trait plus file and in-memory
//!   implementations.

pub mod executor;
pub mod store;

pub use executor::{
    AssociationReporter, DocumentProgress, Executor, LoggingAssociationReporter,
};
pub use store::{DocumentStore, FileDocumentStore, MemoryDocumentStore};
