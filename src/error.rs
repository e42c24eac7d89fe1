use thiserror::Error;

/// Errors produced by the conversational analysis core.
///
/// Variants map to distinct failure classes so callers can decide what is a
/// client error, what is recoverable, and what is an internal fault without
/// string matching.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller broke a hard precondition (e.g. both message and intent
    /// supplied, or a final answer requested without results). Fatal to the
    /// turn, reported as a client error.
    #[error("precondition violation: {0}")]
    PreconditionViolation(String),

    /// An argument was structurally invalid (e.g. empty conversation id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced dataset has no catalog (ingestion has not run).
    #[error("not found: {0}")]
    NotFound(String),

    /// A generated SQL plan failed the safety validator. Recovered locally by
    /// degrading to a clarification; the reason stays human-readable.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// External assistance was requested but is not configured, or the
    /// completion service failed. Recovered into a terminal answer.
    #[error("external service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    /// The completion service broke its contract: it tried to ask a
    /// clarification question, or returned content that stayed unparseable
    /// after best-effort cleanup. Internal error, never user input.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
