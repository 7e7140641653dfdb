//! Error type for simulation operations.

use flowsim_common::config::ConfigError;
use thiserror::Error;

/// Errors returned by plant, entity and runner operations.
///
/// Faults of the simulated equipment are not errors; they live in the
/// [`ErrorTree`](crate::fault::ErrorTree).
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Positioning drive already moving to a target
    #[error("Drive busy: {0}")]
    DriveBusy(String),

    /// Segment holds an item or a trailing tail
    #[error("Segment occupied: {0}")]
    SegmentOccupied(String),

    /// No entity with this name or key
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// No tag with this name
    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    /// Tag write rejected by its write policy
    #[error("Write denied: {0}")]
    WriteDenied(String),

    /// Error node already has a parent
    #[error("Error node already linked: {0}")]
    AlreadyLinked(String),

    /// Error node carries faults and cannot be linked
    #[error("Error node has active faults: {0}")]
    LinkAfterFault(String),

    /// Parent link would close a cycle
    #[error("Error node link would form a cycle: {0}")]
    LinkCycle(String),

    /// Invalid entity parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Runner lifecycle misuse
    #[error("Runner error: {0}")]
    Runner(String),
}
