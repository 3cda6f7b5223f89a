// src/engine/shared.rs

//! Process-wide state shared by all SDI-12 instances.
//!
//! Only one instance can receive at a time, so the receive buffer, the
//! character reconstructor and the record of which instance is active live
//! here rather than in each instance. Typically placed in a `static` and
//! handed to every instance by reference:
//!
//! ```ignore
//! static BUS: SharedBus = SharedBus::new();
//! let mut sdi12 = Sdi12::with_pin(&BUS, pin, timer, delay, Sdi12Config::default());
//! ```
//!
//! Field ownership between the two execution contexts:
//!
//! * `rx` follows the single-producer / single-consumer rules of [`RingBuffer`],
//! * `receiver` is advanced by the edge interrupt and reset or expired by the
//!   foreground, always inside a critical section,
//! * `active` is changed only by activation and release, inside a critical section.

use super::receiver::CharReceiver;
use super::ring_buffer::{RingBuffer, SDI12_BUFFER_SIZE};
use crate::common::frame::LineLevel;
use core::cell::Cell;
use critical_section::Mutex;

/// Identity of one SDI-12 instance registered with a [`SharedBus`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InstanceId(u16);

impl InstanceId {
    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }
}

pub struct SharedBus<const N: usize = SDI12_BUFFER_SIZE> {
    rx: RingBuffer<N>,
    receiver: Mutex<Cell<CharReceiver>>,
    /// Instance currently allowed to react to edge interrupts.
    active: Mutex<Cell<Option<InstanceId>>>,
    next_id: Mutex<Cell<u16>>,
}

impl<const N: usize> SharedBus<N> {
    pub const fn new() -> Self {
        SharedBus {
            rx: RingBuffer::new(),
            receiver: Mutex::new(Cell::new(CharReceiver::new())),
            active: Mutex::new(Cell::new(None)),
            next_id: Mutex::new(Cell::new(0)),
        }
    }

    /// The receive buffer filled by whichever instance is active.
    #[inline]
    pub fn buffer(&self) -> &RingBuffer<N> {
        &self.rx
    }

    /// Feeds one edge of the data line to the character reconstructor.
    ///
    /// This is the interrupt-context entry point. `source` names the instance
    /// whose pin produced the edge; edges from any instance other than the
    /// active one are rejected and `false` is returned, in which case the
    /// caller should disarm that pin's interrupt. Never blocks.
    pub fn on_edge(&self, source: InstanceId, level: LineLevel, now: u32, ticks_per_bit: u32) -> bool {
        critical_section::with(|cs| {
            if self.active.borrow(cs).get() != Some(source) {
                return false;
            }
            let cell = self.receiver.borrow(cs);
            let mut receiver = cell.get();
            receiver.on_edge(level, now, ticks_per_bit, &self.rx);
            cell.set(receiver);
            true
        })
    }

    /// Snapshot of the reconstructor.
    pub fn receiver(&self) -> CharReceiver {
        critical_section::with(|cs| self.receiver.borrow(cs).get())
    }

    /// `true` if the last character received failed its parity check.
    pub fn parity_failure(&self) -> bool {
        self.receiver().parity_failure()
    }

    pub(crate) fn reset_receiver(&self) {
        critical_section::with(|cs| {
            let cell = self.receiver.borrow(cs);
            let mut receiver = cell.get();
            receiver.reset();
            cell.set(receiver);
        })
    }

    /// Abandons a half-received character older than `timeout_ticks`.
    ///
    /// `now` is sampled inside the critical section, so no edge can be
    /// stamped after it.
    pub(crate) fn expire_receiver(&self, now: impl FnOnce() -> u32, timeout_ticks: u32) -> bool {
        critical_section::with(|cs| {
            let cell = self.receiver.borrow(cs);
            let mut receiver = cell.get();
            let expired = receiver.expire(now(), timeout_ticks);
            cell.set(receiver);
            expired
        })
    }

    /// Hands out a fresh identity for a new instance.
    pub(crate) fn register(&self) -> InstanceId {
        critical_section::with(|cs| {
            let cell = self.next_id.borrow(cs);
            let id = cell.get();
            cell.set(id.wrapping_add(1));
            InstanceId(id)
        })
    }

    /// The instance currently receiving, if any.
    pub fn active(&self) -> Option<InstanceId> {
        critical_section::with(|cs| self.active.borrow(cs).get())
    }

    #[inline]
    pub fn is_active(&self, id: InstanceId) -> bool {
        self.active() == Some(id)
    }

    /// Makes `id` the active instance and returns the one it replaced.
    pub(crate) fn replace_active(&self, id: InstanceId) -> Option<InstanceId> {
        critical_section::with(|cs| self.active.borrow(cs).replace(Some(id)))
    }

    /// Clears the active slot, but only if `id` holds it.
    ///
    /// Returns `true` if `id` was active. Another instance's status is never touched.
    pub(crate) fn release(&self, id: InstanceId) -> bool {
        critical_section::with(|cs| {
            let cell = self.active.borrow(cs);
            if cell.get() == Some(id) {
                cell.set(None);
                true
            } else {
                false
            }
        })
    }
}

impl<const N: usize> Default for SharedBus<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for SharedBus<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedBus")
            .field("rx", &self.rx)
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_hands_out_distinct_ids() {
        let bus = SharedBus::<4>::new();
        let a = bus.register();
        let b = bus.register();
        assert_ne!(a, b);
        assert_eq!(bus.active(), None);
    }

    #[test]
    fn test_replace_active_returns_previous() {
        let bus = SharedBus::<4>::new();
        let a = bus.register();
        let b = bus.register();
        assert_eq!(bus.replace_active(a), None);
        assert!(bus.is_active(a));
        assert_eq!(bus.replace_active(b), Some(a));
        assert!(bus.is_active(b));
        assert!(!bus.is_active(a));
    }

    #[test]
    fn test_release_only_clears_own_status() {
        let bus = SharedBus::<4>::new();
        let a = bus.register();
        let b = bus.register();
        bus.replace_active(b);
        assert!(!bus.release(a));
        assert!(bus.is_active(b));
        assert!(bus.release(b));
        assert_eq!(bus.active(), None);
    }

    #[test]
    fn test_on_edge_only_accepts_active_instance() {
        let bus = SharedBus::<4>::new();
        let a = bus.register();
        let b = bus.register();
        assert!(!bus.on_edge(a, LineLevel::SPACING, 0, 833));
        assert!(bus.receiver().is_idle());

        bus.replace_active(a);
        assert!(!bus.on_edge(b, LineLevel::SPACING, 0, 833));
        assert!(bus.receiver().is_idle());
        assert!(bus.on_edge(a, LineLevel::SPACING, 0, 833));
        assert_eq!(bus.receiver().state(), 0);

        bus.reset_receiver();
        assert!(bus.receiver().is_idle());
    }

    #[test]
    fn test_expire_receiver() {
        let bus = SharedBus::<4>::new();
        let a = bus.register();
        bus.replace_active(a);
        bus.on_edge(a, LineLevel::SPACING, 100, 833);
        assert!(!bus.expire_receiver(|| 1_000, 9_993));
        assert!(bus.expire_receiver(|| 20_000, 9_993));
        assert!(bus.receiver().is_idle());
        assert!(bus.buffer().is_empty());
    }

    #[test]
    fn test_static_placement() {
        static BUS: SharedBus = SharedBus::new();
        assert_eq!(BUS.buffer().capacity(), SDI12_BUFFER_SIZE);
    }
}
