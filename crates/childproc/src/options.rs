//! Structured configuration consumed by the PAL (C7).
//!
//! The builder shape mirrors `turborepo-lib::process::command::Command`
//! (`.args()`, `.current_dir()`, `.envs()`, `.env()`, methods returning
//! `&mut Self`), generalized with a flag set and an inherited-handle
//! whitelist that narrower command builder does not need.

use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use crate::handle::{raw_value, BorrowedHandle, RawHandleValue};

/// Flags controlling how the child is created.
///
/// Standard-stream wiring is intentionally not configured here: it is fixed
/// by which [`ops`](crate::ops) function a caller uses (inherit, discard,
/// capture, ...), so `StartOptions` only ever needs to describe the
/// process itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Suppress console window creation (Windows only; ignored elsewhere).
    pub create_no_window: bool,
    /// Best-effort: terminate the child if this process dies.
    pub kill_on_parent_death: bool,
    /// Start the child stopped; caller must call `resume`.
    pub create_suspended: bool,
    /// Make the child the leader of a new process group.
    pub create_new_process_group: bool,
}

/// Immutable-after-spawn process configuration.
#[derive(Debug, Clone)]
pub struct StartOptions {
    executable: PathBuf,
    args: Vec<OsString>,
    /// `None` means "inherit the parent's live environment"; `Some` is an
    /// explicit, fully-specified environment block.
    env: Option<BTreeMap<OsString, OsString>>,
    cwd: Option<PathBuf>,
    inherited_handles: Vec<RawHandleValue>,
    flags: Flags,
}

impl StartOptions {
    /// `executable` must be non-empty; this is checked at spawn time, not
    /// construction time, so a builder can be assembled incrementally before
    /// any validation runs.
    pub fn new(executable: impl AsRef<OsStr>) -> Self {
        Self {
            executable: PathBuf::from(executable.as_ref()),
            args: Vec::new(),
            env: None,
            cwd: None,
            inherited_handles: Vec::new(),
            flags: Flags::default(),
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets a single environment variable, materializing the environment
    /// block if this is the first reference to it (prior to this call the
    /// child inherits the parent's live environment).
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.as_ref().to_os_string(), val.as_ref().to_os_string());
        self
    }

    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let map = self.env.get_or_insert_with(BTreeMap::new);
        for (k, v) in vars {
            map.insert(k.as_ref().to_os_string(), v.as_ref().to_os_string());
        }
        self
    }

    /// Clears any inherited environment: the child starts with exactly the
    /// variables subsequently set via `env`/`envs`.
    pub fn env_clear(&mut self) -> &mut Self {
        self.env = Some(BTreeMap::new());
        self
    }

    /// Adds a handle to the whitelist of descriptors the child may inherit
    /// beyond the three stdio slots. De-duplicated automatically; an entry
    /// that collides with a stdio slot is superseded by that slot at spawn
    /// time, since the stdio endpoints are resolved independently by the
    /// composition layer.
    pub fn inherit_handle(&mut self, handle: BorrowedHandle<'_>) -> &mut Self {
        let v = raw_value(handle);
        if !self.inherited_handles.contains(&v) {
            self.inherited_handles.push(v);
        }
        self
    }

    pub fn flags(&mut self, flags: Flags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args_slice(&self) -> &[OsString] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_block(&self) -> Option<&BTreeMap<OsString, OsString>> {
        self.env.as_ref()
    }

    pub fn inherited_handles(&self) -> &[RawHandleValue] {
        &self.inherited_handles
    }

    pub fn get_flags(&self) -> Flags {
        self.flags
    }

    /// Validates the invariants required before a spawn attempt: a non-empty
    /// executable, and (implicitly, via the PAL) that `CreateSuspended`
    /// combined with `KillOnParentDeath` still closes the reparent race
    /// window rather than silently dropping one guarantee for the other.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(crate::error::Error::SpawnConfig(
                "executable path must not be empty".into(),
            ));
        }
        Ok(())
    }
}
