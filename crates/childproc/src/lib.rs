//! Cross-platform child-process spawning, supervision, and output capture.
//!
//! This crate wraps `tokio::process` with the pieces a process supervisor
//! actually needs and the standard library leaves to the caller: a typed
//! error taxonomy distinguishing configuration mistakes from OS failures
//! from child-side exec failures, close-on-exec-correct pipe handling,
//! suspended-start/resume, process-group signaling, Windows Job-Object tree
//! kill, and an output reader that tells the difference between "the pipe
//! hit EOF" and "the process we spawned actually exited".
//!
//! # Layout
//!
//! - [`options`] — the builder callers configure a spawn with.
//! - [`pal`] — the platform abstraction layer: the atomic spawn contract.
//! - [`child`] — the live process handle and its lifecycle state machine.
//! - [`reader`] — output draining, line splitting, and capture.
//! - [`ops`] — the small set of named spawn shapes built from the above.
//! - [`handle`], [`pipe`] — OS handle ownership and pipe primitives.
//! - [`deadline`] — absolute-time accounting shared by blocking/async waits.
//! - [`error`] — the crate's error and result types.

pub mod child;
pub mod deadline;
pub mod error;
pub mod handle;
mod ops;
pub mod options;
mod pal;
pub mod pipe;
pub mod reader;

pub use child::{ChildProcessHandle, ExitStatus, ProcessSignal, State};
pub use deadline::{Deadline, MaybeDeadline};
pub use error::{Error, Result};
pub use ops::{
    spawn_capture, spawn_capture_combined, spawn_discard, spawn_discard_handle,
    spawn_fire_and_forget, spawn_inherit, spawn_inherit_handle, spawn_piped_pair,
    spawn_redirect_to_files, spawn_redirect_to_files_handle, stream_lines, LineStream,
};
pub use options::{Flags, StartOptions};
pub use reader::{CapturedOutput, CombinedOutput, OutputLine, Stream};
