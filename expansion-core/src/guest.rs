//! Expansion-side SDK.
//!
//! An expansion implements [`Expansion`] and hands the type to
//! [`export_expansion!`](crate::export_expansion), which emits the four C entry
//! points. The value returned by [`Expansion::on_init`] is the expansion's
//! whole process-wide context: it is created by `on_init`, lent to every
//! trigger and consumed by `on_deinit`.
//!
//! ```rust,ignore
//! use expansion_core::guest::Expansion;
//! use expansion_core::ResponseView;
//!
//! struct Greeter;
//!
//! impl Expansion for Greeter {
//!     fn on_init() -> Self { Greeter }
//!     fn triggered(&mut self, response: &mut ResponseView<'_>) {
//!         response.write_text(0, "Hi");
//!     }
//! }
//!
//! expansion_core::export_expansion!(Greeter);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::abi::Slot;
use crate::buffer::ResponseView;

/// Behaviour of an expansion. The host drives it through the exported
/// entry points; nothing here is called directly by expansion authors.
pub trait Expansion: Send + Sized + 'static {
    /// Builds the context that lives until `on_deinit`.
    fn on_init() -> Self;

    /// Releases the context. Dropping it is enough unless the expansion
    /// holds resources that need explicit teardown.
    fn on_deinit(self) {}

    /// Handles one trigger. Only the slots written here change; the rest keep
    /// whatever the host put there.
    fn triggered(&mut self, response: &mut ResponseView<'_>);
}

/// Holder for the context of an exported expansion.
///
/// The ABI is single-threaded, the mutex only makes the static sound.
pub struct ExpansionCell<E> {
    state: Mutex<Option<E>>,
}

impl<E: Expansion> ExpansionCell<E> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    pub fn init(&self) {
        let mut state = self.lock();
        if state.is_some() {
            warn!("on_init called while already initialized, keeping existing context");
            return;
        }
        *state = Some(E::on_init());
        debug!("Expansion initialized");
    }

    pub fn deinit(&self) {
        // Take the context out first so on_deinit runs without the lock held.
        let context = self.lock().take();
        match context {
            Some(context) => {
                context.on_deinit();
                debug!("Expansion deinitialized");
            }
            None => warn!("on_deinit called without a matching on_init"),
        }
    }

    /// Runs the trigger handler. The buffer is left untouched when the cell
    /// isn't initialized.
    pub fn trigger(&self, response: &mut ResponseView<'_>) {
        match self.lock().as_mut() {
            Some(context) => context.triggered(response),
            None => warn!("triggered called outside the initialized state, ignoring"),
        }
    }

    /// Entry for the exported `triggered` symbol.
    ///
    /// # Safety
    ///
    /// `buffer` must be null or satisfy the contract of
    /// [`ResponseView::from_raw`] for the duration of this call.
    pub unsafe fn trigger_raw(&self, buffer: *mut Slot) {
        match unsafe { ResponseView::from_raw(buffer) } {
            Some(mut response) => self.trigger(&mut response),
            None => warn!("triggered called with a null buffer, ignoring"),
        }
    }
}

impl<E: Expansion> Default for ExpansionCell<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exports an [`Expansion`] implementation as the four ABI entry points.
///
/// Use it once per `cdylib`.
#[macro_export]
macro_rules! export_expansion {
    ($expansion:ty) => {
        static __EXPANSION_CELL: $crate::guest::ExpansionCell<$expansion> =
            $crate::guest::ExpansionCell::new();

        #[no_mangle]
        pub extern "C" fn svc16_expansion_api_version() -> usize {
            $crate::abi::API_VERSION
        }

        #[no_mangle]
        pub extern "C" fn svc16_expansion_on_init() {
            __EXPANSION_CELL.init();
        }

        #[no_mangle]
        pub extern "C" fn svc16_expansion_on_deinit() {
            __EXPANSION_CELL.deinit();
        }

        /// # Safety
        ///
        /// `buffer` must point to at least `BUFFER_SLOTS` writable slots that
        /// stay valid, and are not otherwise accessed, until this returns.
        #[no_mangle]
        pub unsafe extern "C" fn svc16_expansion_triggered(buffer: *mut $crate::abi::Slot) {
            unsafe { __EXPANSION_CELL.trigger_raw(buffer) }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SharedBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Once;

    static TRACING_INIT: Once = Once::new();

    fn setup_tracing() {
        TRACING_INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::DEBUG)
                .try_init();
        });
    }

    struct Counter {
        triggers: Slot,
    }

    impl Expansion for Counter {
        fn on_init() -> Self {
            Counter { triggers: 0 }
        }

        fn triggered(&mut self, response: &mut ResponseView<'_>) {
            self.triggers += 1;
            *response.get_mut(0).unwrap() = self.triggers;
        }
    }

    static INITS: AtomicUsize = AtomicUsize::new(0);
    static DEINITS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked;

    impl Expansion for Tracked {
        fn on_init() -> Self {
            INITS.fetch_add(1, Ordering::SeqCst);
            Tracked
        }

        fn on_deinit(self) {
            DEINITS.fetch_add(1, Ordering::SeqCst);
        }

        fn triggered(&mut self, response: &mut ResponseView<'_>) {
            response.write_text(0, "ok");
        }
    }

    #[test]
    fn test_cell_lifecycle() {
        setup_tracing();
        let cell = ExpansionCell::<Tracked>::new();
        let mut buffer = SharedBuffer::filled(99);

        // Not initialized: the buffer must stay as the host left it.
        cell.trigger(&mut buffer.view());
        assert_eq!(buffer.count_changed(99), 0);
        assert!(!cell.is_initialized());

        cell.init();
        cell.init();
        assert!(cell.is_initialized());
        assert_eq!(INITS.load(Ordering::SeqCst), 1);

        cell.trigger(&mut buffer.view());
        assert_eq!(buffer.as_slice()[..2], ['o' as Slot, 'k' as Slot]);
        assert_eq!(buffer.count_changed(99), 2);

        cell.deinit();
        cell.deinit();
        assert!(!cell.is_initialized());
        assert_eq!(DEINITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reinit_starts_fresh_context() {
        setup_tracing();
        let cell = ExpansionCell::<Counter>::new();
        let mut buffer = SharedBuffer::new();

        cell.init();
        cell.trigger(&mut buffer.view());
        cell.trigger(&mut buffer.view());
        cell.deinit();

        cell.init();
        cell.trigger(&mut buffer.view());
        assert_eq!(buffer.as_slice()[0], 1);
        cell.deinit();
    }

    #[test]
    fn test_trigger_raw_ignores_null() {
        setup_tracing();
        let cell = ExpansionCell::<Counter>::new();
        cell.init();
        unsafe { cell.trigger_raw(std::ptr::null_mut()) };
        assert!(cell.is_initialized());
        cell.deinit();
    }
}
