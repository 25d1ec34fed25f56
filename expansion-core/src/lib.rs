//! Expansion ABI for SVC16 hosts.
//!
//! A host loads an expansion from a dynamic library, checks its API version,
//! initializes it, triggers it with a shared buffer of word-sized slots and
//! finally deinitializes it. [`guest`] is the expansion-side half of that
//! contract, [`host`] the loader and lifecycle driver.

pub mod abi;
pub mod buffer;
pub mod error;
pub mod guest;
pub mod host;
pub mod settings;

pub use abi::{Slot, API_VERSION, BUFFER_SLOTS};
pub use buffer::{ResponseView, SharedBuffer};
pub use error::ExpansionError;
pub use guest::{Expansion, ExpansionCell};
pub use host::{ExpansionInstance, ExpansionLoader, LifecycleState};
pub use settings::HostSettings;
