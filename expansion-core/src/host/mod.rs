//! Host side of the expansion ABI.
//!
//! Control flow is always host-initiated:
//!
//! 1. [`ExpansionLoader::load`] opens the library and checks `api_version`
//! 2. [`ExpansionInstance::init`] calls `on_init`
//! 3. [`ExpansionInstance::trigger`] lends a [`SharedBuffer`](crate::SharedBuffer)
//!    for one `triggered` call, as often as needed
//! 4. [`ExpansionInstance::deinit`] calls `on_deinit` (or dropping the
//!    instance does it)
//!
//! Calls are synchronous and must not overlap for one instance.

pub mod instance;
pub mod loader;

pub use instance::{negotiate, EntryPoints, ExpansionDescriptor, ExpansionInstance, LifecycleState};
pub use loader::{expansion_name, ExpansionLoader};
