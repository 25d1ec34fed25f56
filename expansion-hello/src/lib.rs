//! Reference expansion: answers every trigger with "Hello", one code point
//! per slot in slots 0 to 4. Every other slot is left as the host set it.
//!
//! Build it as a `cdylib` and hand the library to any host that speaks API
//! version 1.

use expansion_core::guest::Expansion;
use expansion_core::ResponseView;
use tracing::debug;

pub const GREETING: &str = "Hello";

/// Context created by `on_init`. The counter is only used for logging, the
/// output never depends on it.
pub struct Hello {
    triggers: u64,
}

impl Expansion for Hello {
    fn on_init() -> Self {
        Hello { triggers: 0 }
    }

    fn on_deinit(self) {
        debug!("hello expansion shutting down after {} triggers", self.triggers);
    }

    fn triggered(&mut self, response: &mut ResponseView<'_>) {
        self.triggers += 1;
        response.write_text(0, GREETING);
    }
}

expansion_core::export_expansion!(Hello);
