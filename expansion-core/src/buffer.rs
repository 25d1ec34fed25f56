//! The shared response buffer, seen from both sides of the boundary.
//!
//! The host owns a [`SharedBuffer`] and lends it to exactly one trigger call.
//! Inside the expansion the same memory is a [`ResponseView`], whose lifetime
//! is tied to that call, so the borrow can't outlive it.

use std::fmt;

use crate::abi::{Slot, BUFFER_SLOTS};

/// Bounded, call-scoped mutable view of the host's buffer.
///
/// Always exactly [`BUFFER_SLOTS`] long. Every write method stops at the
/// bound instead of touching memory past it.
pub struct ResponseView<'call> {
    slots: &'call mut [Slot],
}

impl<'call> ResponseView<'call> {
    /// Wraps a buffer of the correct size.
    pub fn new(slots: &'call mut [Slot; BUFFER_SLOTS]) -> Self {
        Self { slots }
    }

    /// Builds a view from the raw pointer handed over the ABI. Returns `None`
    /// for a null pointer.
    ///
    /// # Safety
    ///
    /// `buffer` must be null or point to at least [`BUFFER_SLOTS`] writable,
    /// initialized slots that nothing else accesses for `'call`.
    pub unsafe fn from_raw(buffer: *mut Slot) -> Option<Self> {
        if buffer.is_null() {
            return None;
        }
        let slots = unsafe { std::slice::from_raw_parts_mut(buffer, BUFFER_SLOTS) };
        Some(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    /// Copies `values` starting at `offset`, truncating at the end of the
    /// buffer. Returns the number of slots written.
    pub fn write_slots(&mut self, offset: usize, values: &[Slot]) -> usize {
        let Some(tail) = self.slots.get_mut(offset..) else {
            return 0;
        };
        let written = tail.len().min(values.len());
        tail[..written].copy_from_slice(&values[..written]);
        written
    }

    /// Writes `text` one code point per slot starting at `offset`, truncating
    /// at the end of the buffer. Returns the number of slots written.
    pub fn write_text(&mut self, offset: usize, text: &str) -> usize {
        let Some(tail) = self.slots.get_mut(offset..) else {
            return 0;
        };
        let mut written = 0;
        for (slot, ch) in tail.iter_mut().zip(text.chars()) {
            *slot = ch as Slot;
            written += 1;
        }
        written
    }

    pub fn as_mut_slice(&mut self) -> &mut [Slot] {
        self.slots
    }
}

impl fmt::Debug for ResponseView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseView")
            .field("len", &self.slots.len())
            .finish()
    }
}

/// Host-owned storage for the response buffer.
///
/// Heap allocated, since 64Ki words is too large for the stack.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedBuffer {
    slots: Vec<Slot>,
}

impl SharedBuffer {
    /// A zeroed buffer.
    pub fn new() -> Self {
        Self::filled(0)
    }

    /// A buffer with every slot set to `sentinel`.
    pub fn filled(sentinel: Slot) -> Self {
        Self {
            slots: vec![sentinel; BUFFER_SLOTS],
        }
    }

    pub fn fill(&mut self, value: Slot) {
        self.slots.fill(value);
    }

    /// Zeroes every slot. The expansion never does this for the host.
    pub fn reset(&mut self) {
        self.fill(0);
    }

    pub fn as_slice(&self) -> &[Slot] {
        &self.slots
    }

    /// Borrows the buffer as the view an expansion would receive.
    pub fn view(&mut self) -> ResponseView<'_> {
        ResponseView {
            slots: &mut self.slots,
        }
    }

    /// Number of slots whose value differs from `sentinel`.
    pub fn count_changed(&self, sentinel: Slot) -> usize {
        self.slots.iter().filter(|&&slot| slot != sentinel).count()
    }

    /// Narrows the leading code points back into a `String`, stopping at the
    /// first zero slot.
    pub fn text(&self) -> String {
        decode_text(&self.slots, 0)
    }

    /// Like [`text`](Self::text) but stops at the first slot equal to
    /// `terminator`, for buffers that were filled with a sentinel.
    pub fn text_until(&self, terminator: Slot) -> String {
        decode_text(&self.slots, terminator)
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut Slot {
        self.slots.as_mut_ptr()
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("text", &self.text())
            .finish()
    }
}

/// Decodes code point slots up to the first `terminator` (or the end). Slots
/// that aren't a Unicode scalar value become U+FFFD.
pub fn decode_text(slots: &[Slot], terminator: Slot) -> String {
    slots
        .iter()
        .take_while(|&&slot| slot != terminator)
        .map(|&slot| {
            u32::try_from(slot)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}
