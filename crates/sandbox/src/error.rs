use thiserror::Error;

/// Errors internal to an executor, as distinct from a nonzero exit code
/// (which is a normal [`crate::ExecResult`], not an error). Grounded on the
/// teacher's per-crate `thiserror` enum convention.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("failed to apply sandbox policy: {0}")]
    Policy(String),

    #[error("container executor error: {0}")]
    Container(String),

    #[error("executor is closed")]
    Closed,
}
