//! Host-side lifecycle of one expansion.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::abi::{ApiVersionFn, LifecycleFn, TriggeredFn, SUPPORTED_API_VERSIONS};
use crate::buffer::SharedBuffer;
use crate::error::{ExpansionError, Result};

use super::loader::LibraryHandle;

/// Where an expansion is in its lifecycle. The expansion can't reject a
/// misordered call, so the host tracks this and refuses on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Loaded and version-checked, `on_init` not called yet.
    Unloaded,
    Initialized,
    Deinitialized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Deinitialized => "deinitialized",
        };
        f.write_str(name)
    }
}

/// The four resolved entry points of an expansion.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub api_version: ApiVersionFn,
    pub on_init: LifecycleFn,
    pub on_deinit: LifecycleFn,
    pub triggered: TriggeredFn,
}

/// Identifies a loaded expansion and the version negotiated with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionDescriptor {
    pub name: String,
    /// Library the expansion was loaded from, if it came from one.
    pub path: Option<PathBuf>,
    pub api_version: usize,
}

/// Checks a reported version against the versions this host supports.
pub fn negotiate(name: &str, found: usize) -> Result<usize> {
    if SUPPORTED_API_VERSIONS.contains(&found) {
        Ok(found)
    } else {
        Err(ExpansionError::ApiVersionMismatch {
            name: name.to_string(),
            expected: SUPPORTED_API_VERSIONS.to_vec(),
            found,
        })
    }
}

/// A version-checked expansion driven through its lifecycle by the host.
///
/// Dropping an initialized instance deinitializes it before the library it
/// came from is released.
pub struct ExpansionInstance {
    descriptor: ExpansionDescriptor,
    entry_points: EntryPoints,
    state: LifecycleState,
    triggers: u64,
    // Declared last: must outlive every call through `entry_points`.
    _library: Option<LibraryHandle>,
}

impl ExpansionInstance {
    /// Performs the version handshake and returns an instance that has not
    /// been initialized yet.
    ///
    /// # Safety
    ///
    /// The entry points must implement the expansion ABI and stay callable
    /// for as long as the returned instance exists.
    pub unsafe fn from_entry_points(
        name: impl Into<String>,
        entry_points: EntryPoints,
    ) -> Result<Self> {
        let name = name.into();
        let found = unsafe { (entry_points.api_version)() };
        let api_version = negotiate(&name, found)?;

        debug!("Expansion '{}' speaks API version {}", name, api_version);

        Ok(Self {
            descriptor: ExpansionDescriptor {
                name,
                path: None,
                api_version,
            },
            entry_points,
            state: LifecycleState::Unloaded,
            triggers: 0,
            _library: None,
        })
    }

    #[cfg(feature = "dynamic-loading")]
    pub(crate) fn with_library(mut self, path: PathBuf, library: LibraryHandle) -> Self {
        self.descriptor.path = Some(path);
        self._library = Some(library);
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ExpansionDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Version agreed during the handshake.
    pub fn negotiated_version(&self) -> usize {
        self.descriptor.api_version
    }

    /// Asks the expansion for its version again. Valid in every state.
    pub fn api_version(&self) -> usize {
        unsafe { (self.entry_points.api_version)() }
    }

    /// Number of triggers delivered since the instance was created.
    pub fn trigger_count(&self) -> u64 {
        self.triggers
    }

    fn invalid_state(&self, operation: &'static str) -> ExpansionError {
        ExpansionError::InvalidState {
            name: self.descriptor.name.clone(),
            operation,
            state: self.state,
        }
    }

    /// Starts a lifecycle. Allowed once after loading, and again after a
    /// completed `deinit`.
    pub fn init(&mut self) -> Result<()> {
        if self.state == LifecycleState::Initialized {
            return Err(self.invalid_state("initialize"));
        }
        unsafe { (self.entry_points.on_init)() };
        self.state = LifecycleState::Initialized;
        debug!("Initialized expansion '{}'", self.descriptor.name);
        Ok(())
    }

    /// Lends `buffer` to the expansion for exactly one trigger call.
    pub fn trigger(&mut self, buffer: &mut SharedBuffer) -> Result<()> {
        if self.state != LifecycleState::Initialized {
            return Err(self.invalid_state("trigger"));
        }
        // The pointer is derived from the exclusive borrow and not kept.
        unsafe { (self.entry_points.triggered)(buffer.as_mut_ptr()) };
        self.triggers += 1;
        trace!(
            "Triggered expansion '{}' ({} so far)",
            self.descriptor.name,
            self.triggers
        );
        Ok(())
    }

    /// Ends the current lifecycle.
    pub fn deinit(&mut self) -> Result<()> {
        if self.state != LifecycleState::Initialized {
            return Err(self.invalid_state("deinitialize"));
        }
        unsafe { (self.entry_points.on_deinit)() };
        self.state = LifecycleState::Deinitialized;
        debug!("Deinitialized expansion '{}'", self.descriptor.name);
        Ok(())
    }
}

impl Drop for ExpansionInstance {
    fn drop(&mut self) {
        if self.state == LifecycleState::Initialized {
            warn!(
                "Expansion '{}' dropped while initialized, deinitializing",
                self.descriptor.name
            );
            unsafe { (self.entry_points.on_deinit)() };
            self.state = LifecycleState::Deinitialized;
        }
    }
}

impl fmt::Debug for ExpansionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionInstance")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("triggers", &self.triggers)
            .field("has_library", &self._library.is_some())
            .finish()
    }
}
