//! Owning and borrowed OS handle/descriptor types.
//!
//! `OwnedHandle` has exclusive ownership of a single descriptor and closes it
//! exactly once on drop; it can be moved but never aliased. `BorrowedHandle`
//! is a weak, non-owning view used both for endpoints the spawner duplicates
//! (it does not consume the caller's handle) and for membership checks in an
//! inherited-handle set — holding one never extends the referent's lifetime.
//!
//! Rather than reinventing fd/HANDLE ownership, this wraps the equivalent
//! `std::os::fd`/`std::os::windows::io` types, which already provide exactly
//! these guarantees (single-owner, `AsRawFd`/`AsRawHandle`, no aliasing).

#[cfg(unix)]
pub use std::os::fd::{AsFd, AsRawFd, BorrowedFd as BorrowedHandle, OwnedFd as OwnedHandle};

#[cfg(windows)]
pub use std::os::windows::io::{
    AsHandle, AsRawHandle, BorrowedHandle, OwnedHandle,
};

/// A raw, platform-specific descriptor value used purely for de-duplication
/// bookkeeping (e.g. comparing an inherited-handle-set entry against the
/// three stdio slots). It carries no ownership semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawHandleValue(pub isize);

#[cfg(unix)]
pub fn raw_value(h: BorrowedHandle<'_>) -> RawHandleValue {
    RawHandleValue(h.as_raw_fd() as isize)
}

#[cfg(windows)]
pub fn raw_value(h: BorrowedHandle<'_>) -> RawHandleValue {
    RawHandleValue(h.as_raw_handle() as isize)
}

/// Duplicates a borrowed handle into a new, independently-owned one, for
/// handing a caller-retained handle (e.g. an open output file) to a child
/// without consuming the caller's original.
#[cfg(unix)]
pub fn duplicate(h: BorrowedHandle<'_>) -> std::io::Result<OwnedHandle> {
    use std::os::fd::FromRawFd;
    // SAFETY: `libc::dup` on a valid, open fd returns a new fd the caller
    // owns exclusively, or -1 on error.
    let new_fd = unsafe { libc::dup(h.as_raw_fd()) };
    if new_fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `new_fd` was just returned by `dup` and is owned solely here.
    Ok(unsafe { OwnedHandle::from_raw_fd(new_fd) })
}

#[cfg(windows)]
pub fn duplicate(h: BorrowedHandle<'_>) -> std::io::Result<OwnedHandle> {
    use std::os::windows::io::FromRawHandle;
    use windows_sys::Win32::Foundation::DUPLICATE_SAME_ACCESS;
    use windows_sys::Win32::System::Threading::GetCurrentProcess;
    let mut dup: windows_sys::Win32::Foundation::HANDLE = std::ptr::null_mut();
    // SAFETY: `h` is a valid handle for the duration of this call;
    // `GetCurrentProcess` returns a pseudo-handle valid for the call.
    let ok = unsafe {
        windows_sys::Win32::Foundation::DuplicateHandle(
            GetCurrentProcess(),
            h.as_raw_handle() as _,
            GetCurrentProcess(),
            &mut dup,
            0,
            0,
            DUPLICATE_SAME_ACCESS,
        )
    };
    if ok == 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `dup` is a just-duplicated, uniquely-owned handle.
    Ok(unsafe { OwnedHandle::from_raw_handle(dup as _) })
}
