//! Platform abstraction layer (C1): the atomic spawn contract.
//!
//! `spawn` takes a fully-validated [`StartOptions`](crate::options::StartOptions)
//! plus the three resolved stdio endpoints and produces, in one atomic step,
//! either a fully-formed [`SpawnOutcome`] or a typed [`Error`](crate::error::Error)
//! describing exactly which phase failed. "Atomic" here means: there is no
//! observable state where the OS process exists but this module has not yet
//! decided success or failure — either the returned `tokio::process::Child`
//! is live and tracked, or no process was left behind (modulo the kernel's
//! own fork-then-exec-fails window, which is reported via the exec-phase
//! synchronization channel rather than left for the caller to discover).

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod job_object;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::spawn;
#[cfg(windows)]
pub use job_object::JobObject;
#[cfg(windows)]
pub use windows::spawn;
#[cfg(windows)]
pub(crate) use windows::{resume, suspend};

use crate::handle::OwnedHandle;

/// What the PAL hands back for a freshly spawned child.
pub struct SpawnOutcome {
    pub child: tokio::process::Child,
    pub pid: u32,
    /// Windows only: the job this child (and any descendants it spawns) was
    /// assigned to. Holding it keeps `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE`
    /// armed so `kill` tears down the whole tree deterministically; as a
    /// side effect, closing it when this process exits abnormally also
    /// approximates `KillOnParentDeath` with no extra mechanism.
    #[cfg(windows)]
    pub job_object: Option<job_object::JobObject>,
}

/// The resolved stdio configuration handed to the PAL, one
/// [`ResolvedEndpoint`] per standard stream slot.
pub struct ResolvedStdio {
    pub stdin: ResolvedEndpoint,
    pub stdout: ResolvedEndpoint,
    pub stderr: ResolvedEndpoint,
}

/// A stdio slot resolved down to something `std`/`tokio`'s `Command` can
/// consume directly: either pass through to the child as-is, or use one end
/// of a pipe this process already created and owns the other end of.
pub enum ResolvedEndpoint {
    Inherit,
    Null,
    /// Ask the PAL to create an ordinary stdio pipe and keep our end
    /// (`tokio::process::Command::stdout`/`stderr`'s usual `Stdio::piped()`
    /// path); used by capture/streaming operations.
    Piped,
    /// The child-visible end of a pipe this process already created and
    /// whose other end it retains or has handed to a second child (used for
    /// `RedirectToFiles` and for piping one child's output into another's
    /// input).
    PipeEnd(OwnedHandle),
}
