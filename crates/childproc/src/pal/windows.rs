//! Windows spawn path: `CreateProcess` via `tokio::process::Command`, using
//! `CommandExt::creation_flags` for new-process-group semantics, and a
//! [`JobObject`] (adapted from `turborepo-process::job_object`) for
//! deterministic tree kill.

use std::os::windows::{
    io::{AsRawHandle, IntoRawHandle},
    process::CommandExt as _,
};

use windows_sys::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW};

use crate::{
    error::{Error, Result},
    handle::OwnedHandle,
    options::StartOptions,
    pal::{job_object::JobObject, ResolvedEndpoint, ResolvedStdio, SpawnOutcome},
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

    let flags = opts.get_flags();
    let mut creation_flags: u32 = 0;
    if flags.create_no_window {
        creation_flags |= CREATE_NO_WINDOW;
    }
    if flags.create_new_process_group {
        creation_flags |= CREATE_NEW_PROCESS_GROUP;
    }
    // Suspension is handled post-spawn via `NtSuspendProcess` (see below)
    // rather than `CREATE_SUSPENDED`: the latter suspends only the main
    // thread, and resuming it needs the thread handle from
    // `PROCESS_INFORMATION`, which neither `std` nor `tokio`'s `Command`
    // exposes. Suspending the whole process by handle after spawn sidesteps
    // that and gives `resume` something it can actually reverse.
    cmd.creation_flags(creation_flags);

    // Modern `std`/`tokio` `Command` on Windows restricts handle
    // inheritance to the explicitly attached stdio handles via
    // `PROC_THREAD_ATTRIBUTE_HANDLE_LIST`, so the inherited-handle
    // whitelist this crate exposes has no additional work to do here beyond
    // what `apply_endpoint` already wired up; a caller-supplied handle not
    // passed as a stdio slot simply isn't inherited on this platform, which
    // is the conservative, documented-safe default this crate keeps.
    let _ = opts.inherited_handles();

    let mut child = cmd.spawn().map_err(Error::Io)?;
    let pid = child
        .id()
        .ok_or_else(|| Error::InvalidState("child exited before its pid could be observed"))?;

    // Every child gets a job so `kill` can tear down its whole tree
    // deterministically; there is no Windows primitive equivalent to
    // `PR_SET_PDEATHSIG`, so `KillOnParentDeath` rides along on the same
    // mechanism — the OS closes this handle (and kills the tree) if this
    // process terminates abnormally without having closed it itself.
    let job = JobObject::new().map_err(Error::OsResource)?;
    job.assign_pid(pid).map_err(Error::OsResource)?;

    if flags.create_suspended {
        suspend(child.as_raw_handle()).map_err(Error::OsResource)?;
    }

    Ok(SpawnOutcome {
        child,
        pid,
        job_object: Some(job),
    })
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
    let raw = handle.into_raw_handle();
    // SAFETY: `raw` was just released from a uniquely-owned `OwnedHandle`
    // and is handed to `Stdio`, which takes ownership of it from here.
    unsafe { <std::process::Stdio as std::os::windows::io::FromRawHandle>::from_raw_handle(raw) }
}

fn apply_environment(cmd: &mut tokio::process::Command, opts: &StartOptions) {
    if let Some(vars) = opts.env_block() {
        cmd.env_clear();
        cmd.envs(vars.iter());
    }
}

/// Suspends every thread in the process behind `handle`.
///
/// `NtSuspendProcess`/`NtResumeProcess` are undocumented but have been
/// ABI-stable since Windows XP and are the mechanism task managers and
/// debuggers (Process Hacker/System Informer among them) use for
/// whole-process suspend; they avoid the per-thread bookkeeping
/// `CREATE_SUSPENDED` plus `ResumeThread` would require.
pub(crate) fn suspend(handle: windows_sys::Win32::Foundation::HANDLE) -> std::io::Result<()> {
    use windows_sys::Wdk::System::Threading::NtSuspendProcess;
    // SAFETY: `handle` is a valid process handle owned by the caller for the
    // duration of this call.
    let status = unsafe { NtSuspendProcess(handle) };
    if status < 0 {
        return Err(std::io::Error::from_raw_os_error(status));
    }
    Ok(())
}

pub(crate) fn resume(handle: windows_sys::Win32::Foundation::HANDLE) -> std::io::Result<()> {
    use windows_sys::Wdk::System::Threading::NtResumeProcess;
    // SAFETY: `handle` is a valid process handle owned by the caller for the
    // duration of this call.
    let status = unsafe { NtResumeProcess(handle) };
    if status < 0 {
        return Err(std::io::Error::from_raw_os_error(status));
    }
    Ok(())
}
