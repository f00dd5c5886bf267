//! The reflect chain — a sequential draft → critique → final pass.
//!
//! Modeled as an explicit finite-state machine with a typed state enum and
//! an ordered, append-only step-record log, rather than callback-chained
//! continuations. Step N+1 never begins before step N's output is fully
//! materialized, so the critique always observes the complete draft.

pub mod reflect;
pub mod run;

pub use reflect::{ChainOutcome, ReflectChainController};
pub use run::{ChainFailure, ChainKind, ChainRun, ChainState, StepRecord};
