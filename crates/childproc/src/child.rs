//! Child process handle and lifecycle state machine (C4).
//!
//! Grounded in `turborepo-process::child`'s `ChildHandle`/`Child` pair:
//! a thin wrapper around `tokio::process::Child`
//! that owns the live OS process, exposes `wait`/`kill` in both blocking and
//! async forms, and folds platform-specific teardown (Job Object tree-kill on
//! Windows, process-group signaling on Unix) behind one API.

use std::time::Duration;

use tracing::{debug, instrument, trace};

use crate::{
    deadline::MaybeDeadline,
    error::{Error, Result},
    pal::SpawnOutcome,
};

/// Where a [`ChildProcessHandle`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The process is running normally.
    Running,
    /// The process was started with `CreateSuspended` and has not yet been
    /// resumed.
    Suspended,
    /// The process has exited; its status has been collected.
    Exited,
    /// `dispose` was called; no further operations are valid.
    Disposed,
}

/// How a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Ordinary exit with the given code.
    Code(i32),
    /// Unix only: terminated by the given signal number.
    Signaled(i32),
    /// The library killed the child itself, because a deadline or
    /// cancellation tripped before the child exited on its own.
    Canceled,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(c) => Some(*c),
            ExitStatus::Signaled(_) | ExitStatus::Canceled => None,
        }
    }

    /// Whether this status resulted from the library killing the child on
    /// deadline/cancellation rather than the child terminating on its own.
    pub fn canceled(&self) -> bool {
        matches!(self, ExitStatus::Canceled)
    }
}

fn convert(status: std::process::ExitStatus) -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return ExitStatus::Signaled(sig);
        }
    }
    // `code()` is `None` only for a signal-terminated process on Unix,
    // already handled above; on Windows it is always `Some`.
    ExitStatus::Code(status.code().unwrap_or(-1))
}

/// A signal a caller can request be delivered to the child.
///
/// On Windows only `Interrupt` (`CTRL_C_EVENT`) and `Quit` (`CTRL_BREAK_EVENT`)
/// are deliverable this way; `Terminate` and `Kill` both map to `kill`
/// (`TerminateProcess`), since Windows has no notion of a catchable
/// termination request distinct from an uncatchable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Interrupt,
    Quit,
    Terminate,
    Kill,
}

/// An owned, live child process.
///
/// Not `Clone`: exactly one `ChildProcessHandle` exists per OS process, the
/// same single-ownership discipline as the handles in
/// [`crate::handle`].
pub struct ChildProcessHandle {
    child: tokio::process::Child,
    pid: u32,
    state: State,
    #[cfg(windows)]
    job_object: Option<crate::pal::JobObject>,
}

impl ChildProcessHandle {
    pub(crate) fn new(outcome: SpawnOutcome, started_suspended: bool) -> Self {
        Self {
            child: outcome.child,
            pid: outcome.pid,
            state: if started_suspended {
                State::Suspended
            } else {
                State::Running
            },
            #[cfg(windows)]
            job_object: outcome.job_object,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Takes ownership of the child's stdout pipe, if it was spawned with
    /// one. Used by the composition layer to hand the pipe to the output
    /// reader while this handle retains `wait`/`kill`/`signal`.
    pub(crate) fn take_stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        self.child.stdout.take()
    }

    pub(crate) fn take_stderr(&mut self) -> Option<tokio::process::ChildStderr> {
        self.child.stderr.take()
    }

    pub(crate) fn take_stdin(&mut self) -> Option<tokio::process::ChildStdin> {
        self.child.stdin.take()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Resumes a process started with `CreateSuspended`.
    ///
    /// Returns [`Error::InvalidState`] if the process is not currently
    /// suspended (resuming twice, or resuming a process that was never
    /// suspended, is a caller bug rather than something to silently ignore).
    #[instrument(skip(self), fields(pid = self.pid))]
    pub fn resume(&mut self) -> Result<()> {
        if self.state != State::Suspended {
            return Err(Error::InvalidState("resume called on a non-suspended process"));
        }
        #[cfg(unix)]
        {
            // SAFETY: raw syscall; `self.pid` names a process this handle
            // owns and has not yet reaped.
            let rc = unsafe { libc::kill(self.pid as libc::pid_t, libc::SIGCONT) };
            if rc != 0 {
                return Err(Error::Io(std::io::Error::last_os_error()));
            }
        }
        #[cfg(windows)]
        {
            use std::os::windows::io::AsRawHandle;
            crate::pal::resume(self.child.as_raw_handle()).map_err(Error::OsResource)?;
        }
        self.state = State::Running;
        debug!("process resumed");
        Ok(())
    }

    /// Non-blocking poll: `Ok(None)` if the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        match self.child.try_wait().map_err(Error::Io)? {
            Some(status) => {
                self.state = State::Exited;
                Ok(Some(convert(status)))
            }
            None => Ok(None),
        }
    }

    /// Awaits exit, optionally bounded by `deadline`. Returns
    /// [`Error::InvalidState`] (not a timeout) if `deadline` has already
    /// expired when called; callers that want "check once, don't block"
    /// should use [`try_wait`](Self::try_wait) instead.
    #[instrument(skip(self, deadline), fields(pid = self.pid))]
    pub async fn wait_async(&mut self, deadline: MaybeDeadline) -> Result<ExitStatus> {
        let status = match deadline.remaining() {
            Some(remaining) => tokio::time::timeout(remaining, self.child.wait())
                .await
                .map_err(|_| Error::InvalidState("wait timed out"))?
                .map_err(Error::Io)?,
            None if deadline.is_expired() => {
                return Err(Error::InvalidState("deadline already elapsed"));
            }
            None => self.child.wait().await.map_err(Error::Io)?,
        };
        self.state = State::Exited;
        trace!(?status, "process exited");
        Ok(convert(status))
    }

    /// Blocking equivalent of [`wait_async`](Self::wait_async) for callers
    /// outside an async context.
    pub fn wait(&mut self, deadline: MaybeDeadline) -> Result<ExitStatus> {
        futures::executor::block_on(self.wait_async(deadline))
    }

    /// Waits up to `deadline`; if it elapses first, kills the process (and,
    /// on Windows, its whole job-tracked tree), reaps it, and reports
    /// [`ExitStatus::Canceled`] rather than whatever raw status the kill
    /// produced.
    #[instrument(skip(self, deadline), fields(pid = self.pid))]
    pub async fn wait_or_kill_async(&mut self, deadline: MaybeDeadline) -> Result<ExitStatus> {
        match self.wait_async(deadline).await {
            Ok(status) => Ok(status),
            Err(Error::InvalidState(_)) => {
                debug!("deadline elapsed, killing");
                self.kill().await?;
                self.wait_async(MaybeDeadline::NONE).await?;
                Ok(ExitStatus::Canceled)
            }
            Err(e) => Err(e),
        }
    }

    pub fn wait_or_kill(&mut self, deadline: MaybeDeadline) -> Result<ExitStatus> {
        futures::executor::block_on(self.wait_or_kill_async(deadline))
    }

    /// Forcibly terminates the process. On Windows this also closes the
    /// associated Job Object, tearing down any descendants the child
    /// spawned; on Unix only the named pid is signaled; descendants surive
    /// unless they were also placed in the same process group and
    /// [`signal_process_group`](Self::signal_process_group) is used instead.
    #[instrument(skip(self), fields(pid = self.pid))]
    pub async fn kill(&mut self) -> Result<()> {
        self.child.start_kill().map_err(Error::Io)?;
        #[cfg(windows)]
        {
            // Dropping the job here (rather than waiting for `Drop`) makes
            // the tree-kill take effect immediately rather than whenever
            // this handle happens to be dropped.
            self.job_object.take();
        }
        Ok(())
    }

    /// Delivers `signal` to the process only.
    #[instrument(skip(self), fields(pid = self.pid, ?signal))]
    pub fn signal(&mut self, signal: ProcessSignal) -> Result<()> {
        self.deliver(self.pid, signal)
    }

    /// Delivers `signal` to the whole process group the child leads.
    /// Requires the child to have been started with
    /// `CreateNewProcessGroup`; otherwise returns
    /// [`Error::InvalidState`].
    #[instrument(skip(self), fields(pid = self.pid, ?signal))]
    pub fn signal_process_group(&mut self, signal: ProcessSignal) -> Result<()> {
        #[cfg(unix)]
        {
            // A negative pid targets the process group headed by that pid,
            // which `setsid()` in the PAL made equal to this child's pid.
            self.deliver(0u32.wrapping_sub(self.pid), signal)
        }
        #[cfg(windows)]
        {
            self.deliver(self.pid, signal)
        }
    }

    #[cfg(unix)]
    fn deliver(&self, target: u32, signal: ProcessSignal) -> Result<()> {
        let sig = match signal {
            ProcessSignal::Interrupt => libc::SIGINT,
            ProcessSignal::Quit => libc::SIGQUIT,
            ProcessSignal::Terminate => libc::SIGTERM,
            ProcessSignal::Kill => libc::SIGKILL,
        };
        // SAFETY: raw syscall with a pid this handle is responsible for (or
        // its negated process-group form).
        let rc = unsafe { libc::kill(target as i32, sig) };
        if rc != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(windows)]
    fn deliver(&self, pid: u32, signal: ProcessSignal) -> Result<()> {
        use windows_sys::Win32::System::Console::{
            GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT, CTRL_C_EVENT,
        };
        let event = match signal {
            ProcessSignal::Interrupt => CTRL_C_EVENT,
            ProcessSignal::Quit => CTRL_BREAK_EVENT,
            ProcessSignal::Terminate | ProcessSignal::Kill => {
                return Err(Error::PlatformUnsupported(
                    "Terminate/Kill are not catchable signals on Windows; use kill()",
                ));
            }
        };
        // SAFETY: FFI call with plain integer arguments; no pointers involved.
        let ok = unsafe { GenerateConsoleCtrlEvent(event, pid) };
        if ok == 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Releases this handle's interest in the process without waiting for
    /// it to exit (used for fire-and-forget composition). The OS process
    /// itself is left running; only this handle's bookkeeping ends.
    pub fn dispose(mut self) {
        self.state = State::Disposed;
        #[cfg(windows)]
        {
            // A fire-and-forget child should outlive this handle. Disarm
            // the kill-on-close limit before dropping the job, otherwise
            // closing its last handle would terminate the very process
            // this call is supposed to leave running.
            if let Some(job) = self.job_object.take() {
                let _ = job.disarm();
            }
        }
    }
}

impl std::fmt::Debug for ChildProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessHandle")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .finish()
    }
}

/// Convenience default used by callers that only care about "no deadline".
pub fn no_deadline() -> MaybeDeadline {
    MaybeDeadline::NONE
}

/// Convenience constructor mirroring `Deadline::after` for callers who only
/// import `child`.
pub fn deadline_after(timeout: Duration) -> MaybeDeadline {
    MaybeDeadline::from_timeout(Some(timeout))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exit_status_success_only_for_zero_code() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(1).success());
        assert!(!ExitStatus::Signaled(9).success());
        assert!(!ExitStatus::Canceled.success());
    }

    #[test]
    fn exit_status_code_none_for_signal_or_canceled() {
        assert_eq!(ExitStatus::Signaled(9).code(), None);
        assert_eq!(ExitStatus::Code(3).code(), Some(3));
        assert_eq!(ExitStatus::Canceled.code(), None);
    }

    #[test]
    fn exit_status_canceled_flag() {
        assert!(ExitStatus::Canceled.canceled());
        assert!(!ExitStatus::Code(0).canceled());
        assert!(!ExitStatus::Signaled(9).canceled());
    }
}
