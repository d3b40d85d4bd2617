use thiserror::Error;

/// Domain error kinds for the Action Orchestrator (spec §7).
///
/// None of these ever escape the Queue as a failed executor: `run_loop`
/// converts every `Err` into a logged, neutral completion. They exist so
/// each Window Protocol can reason about *why* it stopped without resorting
/// to string matching.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("watchdog fired after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol desync: expected {expected}, saw {actual}")]
    ProtocolDesync { expected: &'static str, actual: String },

    #[error("schema rejected: {0}")]
    SchemaRejected(String),

    #[error("control-link transport lost")]
    TransportLost,

    #[error("rate limited, retry after {0:?}")]
    RateLimited(std::time::Duration),

    #[error("insufficient resource: {0}")]
    InsufficientResource(&'static str),

    #[error("executor aborted: {0}")]
    ExecutorAborted(String),

    #[error("preempted by higher priority item")]
    Preempted,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
