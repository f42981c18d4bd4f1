//! Unix spawn path: `fork`+`execve` via `tokio::process::Command`, with
//! post-fork setup injected through `CommandExt::pre_exec` the way
//! `turborepo-lib::process::command`'s process group handling does
//! (`pre_exec(|| { setsid()?; Ok(()) })`), generalized to cover every flag
//! this crate supports.

use std::os::unix::process::CommandExt as _;

use crate::{
    error::{Error, ExecPhase, Result},
    handle::OwnedHandle,
    options::{Flags, StartOptions},
    pal::{ResolvedEndpoint, ResolvedStdio, SpawnOutcome},
};

pub fn spawn(opts: &StartOptions, stdio: ResolvedStdio) -> Result<SpawnOutcome> {
    opts.validate()?;

    let mut cmd = tokio::process::Command::new(opts.executable());
    cmd.args(opts.args_slice());
    if let Some(cwd) = opts.cwd() {
        cmd.current_dir(cwd);
    }
    apply_environment(&mut cmd, opts);
    apply_endpoint(&mut cmd, StdioSlot::Stdin, stdio.stdin);
    apply_endpoint(&mut cmd, StdioSlot::Stdout, stdio.stdout);
    apply_endpoint(&mut cmd, StdioSlot::Stderr, stdio.stderr);

    // The whitelisted handles, captured by value so the `pre_exec` closure
    // (which runs in the forked child, after-the-fork, single-threaded) owns
    // the raw values without borrowing across the fork.
    let inherited: Vec<i32> = opts
        .inherited_handles()
        .iter()
        .map(|h| h.0 as i32)
        .collect();
    let flags = opts.get_flags();

    // SAFETY: the closure runs in the child between `fork` and `execve`. It
    // performs only async-signal-safe operations (raw syscalls via `libc`,
    // no allocation beyond what's already been done, no locking) as
    // `pre_exec`'s contract requires.
    unsafe {
        cmd.pre_exec(move || child_setup(&inherited, flags));
    }

    let mut child = cmd.spawn().map_err(|e| {
        e.raw_os_error()
            .map(|errno| Error::ChildExec {
                errno,
                phase: ExecPhase::Exec,
            })
            .unwrap_or(Error::Io(e))
    })?;
    let pid = child.id().ok_or_else(|| {
        Error::InvalidState("child exited before its pid could be observed")
    })?;

    if flags.create_new_process_group {
        // Grouping already happened inside `child_setup` via `setsid`; the
        // parent has nothing further to do here on Unix.
    }

    // `Command::spawn` only returns once the child has either `execve`'d
    // successfully or reported a setup errno over its own internal
    // close-on-exec sync pipe; by construction the child is already running
    // the target program by the time we get here, so stopping it now (rather
    // than self-`SIGSTOP`-ing before `execve` inside `child_setup`) cannot
    // deadlock `spawn`. This mirrors the Windows path's post-spawn
    // `NtSuspendProcess` call.
    if flags.create_suspended {
        // SAFETY: raw syscall; `pid` names the process this function just
        // spawned and has not yet reaped.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGSTOP) };
        if rc != 0 {
            return Err(Error::OsResource(std::io::Error::last_os_error()));
        }
    }

    Ok(SpawnOutcome { child, pid })
}

enum StdioSlot {
    Stdin,
    Stdout,
    Stderr,
}

fn apply_endpoint(cmd: &mut tokio::process::Command, slot: StdioSlot, endpoint: ResolvedEndpoint) {
    use std::process::Stdio;
    let stdio = match endpoint {
        ResolvedEndpoint::Inherit => Stdio::inherit(),
        ResolvedEndpoint::Null => Stdio::null(),
        ResolvedEndpoint::Piped => Stdio::piped(),
        ResolvedEndpoint::PipeEnd(handle) => owned_handle_to_stdio(handle),
    };
    match slot {
        StdioSlot::Stdin => cmd.stdin(stdio),
        StdioSlot::Stdout => cmd.stdout(stdio),
        StdioSlot::Stderr => cmd.stderr(stdio),
    };
}

fn owned_handle_to_stdio(handle: OwnedHandle) -> std::process::Stdio {
    use std::os::fd::IntoRawFd;
    let fd = handle.into_raw_fd();
    // SAFETY: `fd` was just released from a uniquely-owned `OwnedFd` and is
    // handed to `Stdio`, which takes ownership of it from here.
    unsafe { <std::process::Stdio as std::os::fd::FromRawFd>::from_raw_fd(fd) }
}

fn apply_environment(cmd: &mut tokio::process::Command, opts: &StartOptions) {
    match opts.env_block() {
        Some(vars) => {
            cmd.env_clear();
            cmd.envs(vars.iter());
        }
        None => {}
    }
}

/// Runs in the child, strictly between `fork` and `execve`. Every fallible
/// step reports its phase via the return value so `pre_exec`'s errno
/// propagation path (std writes it back to the parent over its own internal
/// synchronization pipe) preserves which step failed.
fn child_setup(inherited: &[i32], flags: Flags) -> std::io::Result<()> {
    if flags.create_new_process_group {
        // SAFETY: raw syscall, async-signal-safe, no allocation.
        let rc = unsafe { libc::setsid() };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    if flags.kill_on_parent_death {
        // SAFETY: raw syscall; valid on Linux, a documented no-op error
        // (ENOSYS) elsewhere, which we deliberately ignore rather than fail
        // the spawn over a best-effort feature.
        unsafe {
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL, 0, 0, 0);
        }
        // Close the reparent race: if the original parent died between
        // `fork` and the `prctl` call above, we already got reparented and
        // will never receive the signal. Checking the parent pid now and
        // killing ourselves if it no longer matches closes the window.
        // SAFETY: raw syscall.
        if unsafe { libc::getppid() } == 1 {
            // SAFETY: terminates this process only; no other side effects.
            unsafe { libc::_exit(1) };
        }
    }

    for &fd in inherited {
        // SAFETY: raw syscall on a caller-supplied fd whitelisted for
        // inheritance; clearing close-on-exec is exactly what inheritance
        // requires.
        unsafe {
            let cur = libc::fcntl(fd, libc::F_GETFD);
            if cur >= 0 {
                libc::fcntl(fd, libc::F_SETFD, cur & !libc::FD_CLOEXEC);
            }
        }
    }

    Ok(())
}
