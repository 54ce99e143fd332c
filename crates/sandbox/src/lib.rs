//! Sandboxed command execution for kubeagent: local, OS-confined, and
//! containerized executor variants behind a single [`Executor`] contract,
//! plus the streaming-command deadline wrapper shared by all three.

pub mod confined;
pub mod error;
pub mod executor;
pub mod local;
pub mod pod;
pub mod streaming;

pub use confined::{ConfinedExecutor, SandboxPolicy};
pub use error::ExecutorError;
pub use executor::{ExecCtx, ExecResult, Executor, StreamType};
pub use local::LocalExecutor;
pub use pod::{PodExecClient, PodExecutor};
