//! Relay daemon: update orchestrator, HTTP trigger listener, control socket
//! and log handling.

mod error;
pub mod http;
pub mod log_rotation;
pub mod orchestrator;
pub mod project_lock;
pub mod protocol;
mod runtime;
pub mod vcs;

pub use error::DaemonError;
pub use orchestrator::{
    LastRun, Orchestrator, Phase, ProjectSlot, RunError, RunGuard, RunOutcome, RunState,
    StatusSink,
};
pub use project_lock::{LockError, LockHolder, ProjectLock, LOCK_FILE};
pub use protocol::{request_status, request_stop, send_command, ControlCommand, ControlReply};
pub use runtime::{init_tracing, run, start_blocking, LogFormat, ROTATION_INTERVAL};
pub use vcs::{GitVcs, PullOutput, Vcs, VcsError};
