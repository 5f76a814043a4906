//! Error types for the Blockflow simulation engine.
//!
//! This module provides a unified error type [`FlowError`] that covers
//! all error conditions that can occur while building a model, evaluating
//! the dataflow graph, and advancing a simulation in time.

use std::fmt;

use thiserror::Error;

use crate::signal::SignalKind;

/// Result type alias using [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;

/// Which side of a block a port list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// A block left unprocessed once the scheduler reached its fixed point.
#[derive(Debug, Clone, PartialEq)]
pub struct UnprocessedBlock {
    /// Full hierarchical name of the block
    pub block: String,
    /// Full names of the dependency signals that were still unassigned
    pub unassigned: Vec<String>,
}

/// Diagnostic detail for a graph that could not be fully evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlockReport {
    /// Simulation time of the failed pass
    pub time: f64,
    /// Every block that never became ready
    pub blocks: Vec<UnprocessedBlock>,
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unprocessed block(s) at t = {}", self.blocks.len(), self.time)?;
        for block in &self.blocks {
            write!(f, "\n  - {}", block.block)?;
            for signal in &block.unassigned {
                write!(f, "\n    - waiting on {signal}")?;
            }
        }
        Ok(())
    }
}

/// Unified error type for all Blockflow operations.
#[derive(Error, Debug)]
pub enum FlowError {
    // ============ Construction Errors ============
    /// A block was connected twice
    #[error("Illegal attempt to reconnect block '{block}'")]
    AlreadyConnected { block: String },

    /// A block was inserted but never connected
    #[error("Block '{block}' was never connected to its signals")]
    NotConnected { block: String },

    /// A leaf block was used where a parent was expected
    #[error("Block '{block}' is not a parent and cannot own children")]
    NotAParent { block: String },

    /// Block handle does not belong to this model
    #[error("Unknown block id {id}")]
    UnknownBlock { id: usize },

    /// Wrong number of signals bound to a block
    #[error("Block '{block}' requires {expected} {direction} signal(s), got {actual}")]
    ArityMismatch {
        block: String,
        direction: PortDirection,
        expected: usize,
        actual: usize,
    },

    /// Block-specific configuration problem
    #[error("Invalid block '{block}': {message}")]
    InvalidBlock { block: String, message: String },

    /// A signal name was registered twice
    #[error("Signal '{name}' is already registered")]
    DuplicateSignal { name: String },

    /// Signal handle does not belong to this registry
    #[error("Unknown signal id {id}")]
    UnknownSignal { id: usize },

    /// A state variable was linked to an incompatible derivative
    #[error("Cannot link state variable '{state}' to derivative '{derivative}': {message}")]
    StateLinkMismatch {
        state: String,
        derivative: String,
        message: String,
    },

    // ============ Evaluation Errors ============
    /// A signal was read before being written in the current pass
    #[error("Attempt to read the unassigned value of signal '{signal}'")]
    UnassignedValue { signal: String },

    /// A signal was written twice in the current pass
    #[error("Re-assignment prohibited for signal '{signal}'")]
    Reassignment { signal: String },

    /// A value of the wrong kind was written to or read from a signal
    #[error("Signal '{signal}' holds {expected} values, got {found}")]
    TypeMismatch {
        signal: String,
        expected: SignalKind,
        found: SignalKind,
    },

    /// A bus was accessed as if it held a value
    #[error("Signal '{signal}' is a bus and carries no value")]
    NotAValue { signal: String },

    /// The scheduler could not evaluate every block
    #[error("Graph deadlock: {0}")]
    Deadlock(DeadlockReport),

    // ============ Run Loop Errors ============
    /// `run` was called with a time before the previous one
    #[error("Simulation cannot go back in time (current time = {time}, previous time = {previous})")]
    TimeRegression { time: f64, previous: f64 },

    /// The model has state variables but no stepper was given
    #[error("Model has {states} state variable element(s) but no stepper was provided")]
    MissingStepper { states: usize },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidConfig { message: String },

    // ============ I/O Errors ============
    /// Error writing exported history
    #[error("Failed to write '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FlowError {
    /// Create an arity mismatch error
    pub fn arity(block: impl Into<String>, direction: PortDirection, expected: usize, actual: usize) -> Self {
        Self::ArityMismatch {
            block: block.into(),
            direction,
            expected,
            actual,
        }
    }

    /// Create an invalid block error
    pub fn invalid_block(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBlock {
            block: block.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a state link mismatch error
    pub fn state_link(state: impl Into<String>, derivative: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateLinkMismatch {
            state: state.into(),
            derivative: derivative.into(),
            message: message.into(),
        }
    }
}
