//! Windows Job Object wrapper used to make child-tree kill deterministic.
//!
//! Killing a process on Windows does not cascade to its children. Assigning
//! each spawned process to a Job Object configured with
//! `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE` ensures the entire tree is
//! terminated when the job handle is dropped, which is what `kill`/
//! `wait_or_kill` rely on for tree-wide determinism on this platform.

use std::io;

use tracing::debug;
use windows_sys::Win32::{
    Foundation::{CloseHandle, HANDLE},
    System::{
        JobObjects::{
            AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
            SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
            JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
        },
        Threading::{OpenProcess, PROCESS_SET_QUOTA, PROCESS_TERMINATE},
    },
};

pub struct JobObject {
    handle: HANDLE,
}

// SAFETY: job object handles may be used from any thread.
unsafe impl Send for JobObject {}
unsafe impl Sync for JobObject {}

impl JobObject {
    pub fn new() -> io::Result<Self> {
        // SAFETY: both arguments are valid null pointers, which
        // `CreateJobObjectW` documents as "anonymous, default security".
        let handle = unsafe { CreateJobObjectW(std::ptr::null(), std::ptr::null()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: `info` is zero-initialized then only its documented
        // `LimitFlags` field is set before being passed by pointer with the
        // matching size.
        let result = unsafe {
            let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
            info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
            SetInformationJobObject(
                handle,
                JobObjectExtendedLimitInformation,
                &info as *const _ as *const _,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
        };
        if result == 0 {
            let err = io::Error::last_os_error();
            // SAFETY: `handle` was just created above and not yet shared.
            unsafe { CloseHandle(handle) };
            return Err(err);
        }

        Ok(Self { handle })
    }

    /// Clears `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE` so a subsequent drop
    /// simply closes the handle without terminating anything still assigned
    /// to this job. Used when releasing interest in a process that should
    /// keep running after this handle goes away (fire-and-forget).
    pub fn disarm(&self) -> io::Result<()> {
        // SAFETY: `info` is zero-initialized then only its documented
        // `LimitFlags` field is set before being passed by pointer with the
        // matching size.
        let result = unsafe {
            let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
            info.BasicLimitInformation.LimitFlags = 0;
            SetInformationJobObject(
                self.handle,
                JobObjectExtendedLimitInformation,
                &info as *const _ as *const _,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
        };
        if result == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Assigns the process identified by `pid` to this job. Once assigned,
    /// the process and any children it spawns afterward are terminated when
    /// this `JobObject` is dropped.
    pub fn assign_pid(&self, pid: u32) -> io::Result<()> {
        // SAFETY: `pid` is a process id this caller just spawned, still
        // alive by construction (the caller holds its `Child` handle).
        unsafe {
            let process_handle = OpenProcess(PROCESS_SET_QUOTA | PROCESS_TERMINATE, 0, pid);
            if process_handle.is_null() {
                let err = io::Error::last_os_error();
                debug!("failed to open process {pid} for job assignment: {err}");
                return Err(err);
            }

            let result = AssignProcessToJobObject(self.handle, process_handle);
            CloseHandle(process_handle);

            if result == 0 {
                let err = io::Error::last_os_error();
                debug!("failed to assign process {pid} to job object: {err}");
                return Err(err);
            }

            Ok(())
        }
    }
}

impl Drop for JobObject {
    fn drop(&mut self) {
        // SAFETY: `self.handle` is owned exclusively by this struct.
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
