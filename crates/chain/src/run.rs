//! Chain run state: the typed state enum and the append-only step log.

use chrono::{DateTime, Utc};
use preflight_core::error::DispatchError;
use preflight_core::error::ProviderError;
use preflight_core::message::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which chain to run for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// One dispatch, no reflection.
    Single,
    /// Draft → critique → final.
    Reflect,
}

impl ChainKind {
    /// Parse a configured chain name. Unknown names fall back to Single.
    pub fn parse(name: &str) -> Self {
        match name {
            "reflect" => Self::Reflect,
            _ => Self::Single,
        }
    }
}

/// A reflect chain state. Transitions run strictly forward:
/// Draft → Critique → Final → Done, with Failed reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainState {
    Draft,
    Critique,
    Final,
    Done,
    Failed,
}

impl ChainState {
    /// Position in the forward order. Terminal states share the last slot.
    fn order(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Critique => 1,
            Self::Final => 2,
            Self::Done | Self::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One completed step: the exact input sent and the output produced.
/// Outputs are immutable once written — the log only ever appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: ChainState,
    pub input: Vec<Message>,
    pub output: String,
    pub completed_at: DateTime<Utc>,
}

/// One reflect invocation: current state plus the ordered step log.
///
/// Created when the chain starts and discarded once it reaches a terminal
/// state; the records stay available for audit and diagnostics either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRun {
    pub id: String,
    state: ChainState,
    records: Vec<StepRecord>,
}

impl ChainRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: ChainState::Draft,
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// The ordered step log. Read-only — records cannot be rewritten.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Append a completed step and move to `next`. The run only moves
    /// forward; a backward transition is a programming error.
    pub(crate) fn record(
        &mut self,
        step: ChainState,
        input: Vec<Message>,
        output: String,
        next: ChainState,
    ) {
        debug_assert!(step.order() >= self.state.order(), "chain moved backward");
        debug_assert!(!self.state.is_terminal(), "chain already terminal");
        self.records.push(StepRecord {
            step,
            input,
            output,
            completed_at: Utc::now(),
        });
        self.state = next;
    }

    /// Terminate the run as failed.
    pub(crate) fn fail(&mut self) {
        self.state = ChainState::Failed;
    }

    /// The output of a given step, if that step completed.
    pub fn output_of(&self, step: ChainState) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.output.as_str())
    }
}

impl Default for ChainRun {
    fn default() -> Self {
        Self::new()
    }
}

/// A chain that terminated in `Failed`, carrying which step failed and the
/// partial step history for diagnostics.
#[derive(Debug, Error)]
#[error("reflect chain failed at {step:?} step: {source}")]
pub struct ChainFailure {
    pub step: ChainState,
    #[source]
    pub source: DispatchError,
    pub run: ChainRun,
}

impl ChainFailure {
    /// True when the failure was a client-side cancellation rather than an
    /// upstream error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source.source, ProviderError::Cancelled(_))
    }
}
