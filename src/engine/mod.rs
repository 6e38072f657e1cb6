// src/engine/mod.rs

//! Step Execution Engine.
//!
//! - [`disposition`] is the pure decision table (execute / skip / fail /
//!   unsupported / unrecognized precondition).
//! - [`runner`] walks a step list, applies the disposition, invokes handlers
//!   with crash isolation and reports progress through callbacks.

pub mod disposition;
pub mod runner;

pub use disposition::{
    Disposition, PLATFORM_TYPE_PRECONDITION, StepFacts, evaluate_preconditions,
    resolve_disposition,
};
pub use runner::{SendReply, StepEngine, UpdateAssociation, noop_association, noop_reply};
