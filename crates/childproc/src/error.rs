//! Structured error taxonomy for the crate, per the fault-phase breakdown
//! a caller needs to distinguish "my options were bad" from "the kernel
//! refused" from "the child died before exec".

use std::fmt;

/// The phase in which a child-side setup or spawn failure occurred.
///
/// Mirrors the fault phases a fork/exec implementation must distinguish:
/// configuring the child's environment, the `fork` itself, the final
/// `execve`, any post-fork-pre-exec setup (process group, suspend,
/// parent-death link), working-directory changes, and fd duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPhase {
    Configuration,
    Fork,
    Exec,
    PostFork,
    Cwd,
    Dup,
}

impl fmt::Display for ExecPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecPhase::Configuration => "configuration",
            ExecPhase::Fork => "fork",
            ExecPhase::Exec => "exec",
            ExecPhase::PostFork => "postfork",
            ExecPhase::Cwd => "cwd",
            ExecPhase::Dup => "dup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing/empty executable path, empty argv, or a flag combination the
    /// platform cannot honor.
    #[error("invalid process configuration: {0}")]
    SpawnConfig(String),

    /// Out of file descriptors/handles, memory, or process slots.
    #[error("operating system resource exhausted")]
    OsResource(#[source] std::io::Error),

    /// The child reported a setup/exec failure over the synchronization
    /// path before (or in place of) a successful `execve`/`CreateProcess`.
    #[error("child failed during {phase} (errno {errno})")]
    ChildExec { errno: i32, phase: ExecPhase },

    /// A requested capability is absent on this platform (e.g. non-SIGKILL
    /// signals on Windows, suspended start on a kernel without the support).
    #[error("unsupported on this platform: {0}")]
    PlatformUnsupported(&'static str),

    /// `resume` on a non-suspended/already-resumed handle, or similar
    /// process-identity invariant violation.
    #[error("invalid process state: {0}")]
    InvalidState(&'static str),

    /// Any other I/O failure surfaced while draining pipes or interacting
    /// with the OS.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
