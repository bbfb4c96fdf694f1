//! Computation cycles and everything they drive.
//!
//! # Cycle
//!
//! A [`SingleComputationCycle`] performs one valuation pass of a view at a fixed
//! [`ValuationTime`](crate::ValuationTime).
//! It moves through a one-way state machine:
//!
//! ```text
//! Created -> InputsPrepared -> Executing -> Finished ---------------> Cleaned
//!                                       \-> ExecutionInterrupted --/
//! ```
//!
//! *   [`prepare_inputs`](SingleComputationCycle::prepare_inputs) allocates one cache per
//!     calculation configuration and fans live data out into all of them.
//! *   [`compute_delta`](SingleComputationCycle::compute_delta) (optional) compares live data
//!     against a finished previous cycle and carries over outputs of nodes whose live data did not
//!     change.
//! *   [`execute_plans`](SingleComputationCycle::execute_plans) submits what is left of every
//!     graph to a [`DependencyGraphExecutor`] and waits until all of it is done.
//! *   [`populate_result_model`](SingleComputationCycle::populate_result_model) copies reported
//!     outputs out of caches into the result model.
//! *   [`release_resources`](SingleComputationCycle::release_resources) lets go of live data
//!     snapshot and caches.
//!
//! Calling a method in the wrong state is a programmer error reported as
//! [`CycleError::InvalidState`].
//!
//! # Waiting and interruption
//!
//! `execute_plans` is the only place a cycle suspends.
//! It waits on each execution handle for at most the configured poll interval and puts handles
//! which did not complete yet back at the end of the queue.
//! This keeps the cycle responsive to an [`Interrupter`]: once interrupted, the cycle cancels every
//! outstanding handle and reports [`CycleError::Interrupted`].
//! Values which already landed in caches stay there.
//!
//! # Node state
//!
//! Which nodes were executed or failed in a cycle is tracked by [`NodeExecutionState`], one per
//! calculation configuration, shared with the executor running that configuration's graph.
//! Executed nodes are never submitted again for the same configuration within a cycle.
//! Failed nodes are retried in the next cycle.

use crate::wire::DecodeError;

mod cycle;
mod delta;
mod executor;
mod query;
mod state;
mod stats;

pub use cycle::{CycleState, Interrupter, SingleComputationCycle};
pub use delta::{DeltaResult, LiveDataDeltaCalculator};
pub use executor::{
    DependencyGraphExecutor, ExecutionHandle, ExecutionRequest, LocalDependencyGraphExecutor,
};
pub use query::ComputationCycleQuery;
pub use state::NodeExecutionState;
pub use stats::{
    DiscardingStatisticsGatherer, GraphExecutorStatisticsGatherer, GraphStatistics,
    TotallingStatisticsGatherer,
};

/// Errors reported by computation cycles.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Method called in a state it is not allowed in.
    #[error("cannot {operation} while cycle is {actual}, expected one of {expected:?}")]
    InvalidState {
        /// Offending method.
        operation: &'static str,
        /// States the method is allowed in.
        expected: &'static [CycleState],
        /// State the cycle was in.
        actual: CycleState,
    },

    /// Argument is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Execution was interrupted through an [`Interrupter`].
    #[error("cycle execution was interrupted")]
    Interrupted,

    /// Executing graph of a configuration failed.
    #[error("execution of calculation configuration `{configuration}` failed")]
    Execution {
        /// Name of the configuration.
        configuration: String,
        /// Underlying failure.
        #[source]
        source: ExecutionError,
    },

    /// View has no configuration under given name.
    #[error("unknown calculation configuration `{0}`")]
    UnknownConfiguration(String),
}

/// Failure of a whole graph execution.
///
/// Failure of an individual function is not one of those: it only marks the node failed.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// Execution was cancelled before completion.
    #[error("execution was cancelled")]
    Cancelled,

    /// Execution task panicked.
    #[error("execution panicked: {0}")]
    Panicked(String),

    /// Job could not be shipped to or understood by a calculation node.
    #[error("failed to dispatch job: {0}")]
    Dispatch(String),
}

impl From<DecodeError> for ExecutionError {
    fn from(e: DecodeError) -> Self {
        ExecutionError::Dispatch(e.to_string())
    }
}

/// Failure to write a diagnostic cache dump.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Writing failed.
    #[error("failed to write cache dump: {0}")]
    Io(#[from] std::io::Error),

    /// Dump was written, but could not be kept.
    #[error("failed to persist cache dump: {0}")]
    Persist(#[from] tempfile::PathPersistError),
}
