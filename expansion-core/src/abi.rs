//! ABI definitions shared by expansions and the host that loads them.
//!
//! An expansion is a dynamic library exporting four C functions:
//!
//! ```c
//! // Revision of this ABI the expansion implements.
//! size_t svc16_expansion_api_version();
//!
//! // Lifecycle hooks, called once each per lifecycle.
//! void svc16_expansion_on_init();
//! void svc16_expansion_on_deinit();
//!
//! // Called once per event with a host-owned buffer of BUFFER_SLOTS words.
//! void svc16_expansion_triggered(size_t *buffer);
//! ```
//!
//! The buffer is made of word-sized slots, not bytes. Text crosses the
//! boundary as one Unicode code point per slot.

/// Current ABI version. Bump it whenever an entry point is added, removed or
/// changes signature.
pub const API_VERSION: usize = 1;

/// Every API version this host knows how to drive.
pub const SUPPORTED_API_VERSIONS: &[usize] = &[API_VERSION];

/// Number of slots in the shared response buffer.
pub const BUFFER_SLOTS: usize = 1 << 16;

/// One element of the shared response buffer. Always the platform word
/// width, so the host and the expansion agree on layout without any byte
/// order conventions.
pub type Slot = usize;

/// Exported symbol names, nul-terminated for `dlsym`.
pub const API_VERSION_SYMBOL: &[u8] = b"svc16_expansion_api_version\0";
pub const ON_INIT_SYMBOL: &[u8] = b"svc16_expansion_on_init\0";
pub const ON_DEINIT_SYMBOL: &[u8] = b"svc16_expansion_on_deinit\0";
pub const TRIGGERED_SYMBOL: &[u8] = b"svc16_expansion_triggered\0";

/// Function signature for `svc16_expansion_api_version`.
pub type ApiVersionFn = unsafe extern "C" fn() -> usize;

/// Function signature for `svc16_expansion_on_init` and
/// `svc16_expansion_on_deinit`.
pub type LifecycleFn = unsafe extern "C" fn();

/// Function signature for `svc16_expansion_triggered`.
///
/// The pointer references at least [`BUFFER_SLOTS`] writable slots for the
/// duration of the call and must not be used after it returns.
pub type TriggeredFn = unsafe extern "C" fn(*mut Slot);

/// Returns true if the host can drive an expansion reporting `version`.
pub fn is_supported(version: usize) -> bool {
    SUPPORTED_API_VERSIONS.contains(&version)
}

/// Human readable form of a symbol name (without the trailing nul).
pub fn symbol_name(symbol: &[u8]) -> String {
    let trimmed = symbol.strip_suffix(b"\0").unwrap_or(symbol);
    String::from_utf8_lossy(trimmed).into_owned()
}
