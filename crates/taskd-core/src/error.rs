use thiserror::Error;

/// Error taxonomy for the task lifecycle. Each kind maps to
/// a pause reason, a terminal failure, or a logged-and-continue outcome;
/// see `state_machine::apply_stage_outcome` for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    SessionLimitExceeded,
    UsageLimitExceeded,
    BudgetExhausted,
    DependencyUnmet,
    UserCancelled,
    StageRetryable,
    StageFatal,
    ResumeExhausted,
    StoreError,
    WorkspaceError,
}

#[derive(Debug, Error)]
pub enum TaskdError {
    #[error("session limit exceeded: {0}")]
    SessionLimit(String),

    #[error("usage limit exceeded: {0}")]
    UsageLimit(String),

    #[error("daily budget exhausted: spent {spent:.4} of {limit:.4}")]
    BudgetExhausted { spent: f64, limit: f64 },

    #[error("dependency unmet: {0}")]
    DependencyUnmet(String),

    #[error("task was cancelled by user request")]
    UserCancelled,

    #[error("retryable stage error: {0}")]
    StageRetryable(String),

    #[error("fatal stage error: {0}")]
    StageFatal(String),

    #[error("resume attempts exhausted: {attempts} > {max}")]
    ResumeExhausted { attempts: u32, max: u32 },

    #[error("store error: {0}")]
    StoreError(String),

    #[error("workspace error: {0}")]
    WorkspaceError(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cycle detected: adding {child} under {parent} would create a parent/child cycle")]
    CycleDetected { parent: String, child: String },
}

impl TaskdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskdError::SessionLimit(_) => ErrorKind::SessionLimitExceeded,
            TaskdError::UsageLimit(_) => ErrorKind::UsageLimitExceeded,
            TaskdError::BudgetExhausted { .. } => ErrorKind::BudgetExhausted,
            TaskdError::DependencyUnmet(_) => ErrorKind::DependencyUnmet,
            TaskdError::UserCancelled => ErrorKind::UserCancelled,
            TaskdError::StageRetryable(_) => ErrorKind::StageRetryable,
            TaskdError::StageFatal(_) => ErrorKind::StageFatal,
            TaskdError::ResumeExhausted { .. } => ErrorKind::ResumeExhausted,
            TaskdError::StoreError(_) => ErrorKind::StoreError,
            TaskdError::WorkspaceError(_) => ErrorKind::WorkspaceError,
            // Programming/config errors, treated like StageFatal for
            // the purposes of pause-reason mapping.
            TaskdError::InvalidTransition(_) | TaskdError::InvalidConfig(_) => ErrorKind::StageFatal,
            TaskdError::CycleDetected { .. } => ErrorKind::StageFatal,
        }
    }
}
