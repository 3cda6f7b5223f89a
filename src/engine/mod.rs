// src/engine/mod.rs

//! The SDI-12 link-layer engine.
//!
//! One [`Sdi12`] instance drives one data pin. Any number of instances can
//! share a [`SharedBus`], but only the active one receives.

pub mod arbitration;
pub mod line_state;
pub mod receiver;
pub mod ring_buffer;
pub mod sequencer;
pub mod shared;
pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

pub use line_state::LineState;
pub use receiver::CharReceiver;
pub use ring_buffer::{RingBuffer, SDI12_BUFFER_SIZE};
pub use shared::{InstanceId, SharedBus};
pub use stream::ByteSource;

use crate::common::{
    config::Sdi12Config,
    error::Sdi12Error,
    frame::PinMode,
    hal_traits::{Sdi12Pin, Sdi12Timer},
};
use embedded_hal::delay::DelayNs;
use log::debug;

/// An SDI-12 protocol engine bound to (at most) one data pin.
///
/// * `P` is the data pin and its edge interrupt,
/// * `T` the free-running timer used to time edges,
/// * `D` the blocking delay used for bus timing.
///
/// The edge interrupt handler either calls [`Sdi12::handle_interrupt`] on the
/// instance, or samples the pin itself and calls [`SharedBus::on_edge`] with
/// [`Sdi12::id`].
pub struct Sdi12<'a, P, T, D, const N: usize = SDI12_BUFFER_SIZE>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    bus: &'a SharedBus<N>,
    id: InstanceId,
    pin: Option<P>,
    timer: T,
    delay: D,
    state: LineState,
    config: Sdi12Config,
    overflow_reported: bool,
}

impl<'a, P, T, D, const N: usize> Sdi12<'a, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    /// Creates an instance with no data pin. Assign one with
    /// [`set_data_pin`](Self::set_data_pin) or [`begin_with_pin`](Self::begin_with_pin).
    pub fn new(bus: &'a SharedBus<N>, timer: T, delay: D, config: Sdi12Config) -> Self {
        let id = bus.register();
        debug!("SDI-12 instance {} created", id.get());
        Sdi12 {
            bus,
            id,
            pin: None,
            timer,
            delay,
            state: LineState::Disabled,
            config,
            overflow_reported: false,
        }
    }

    pub fn with_pin(bus: &'a SharedBus<N>, pin: P, timer: T, delay: D, config: Sdi12Config) -> Self {
        let mut sdi12 = Self::new(bus, timer, delay, config);
        sdi12.pin = Some(pin);
        sdi12
    }

    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[inline]
    pub fn bus(&self) -> &'a SharedBus<N> {
        self.bus
    }

    /// An instance left listening after another one became active reports
    /// `Enabled`, since its edges are no longer accepted.
    #[inline]
    pub fn state(&self) -> LineState {
        if self.state == LineState::Listening && !self.bus.is_active(self.id) {
            LineState::Enabled
        } else {
            self.state
        }
    }

    #[inline]
    pub fn config(&self) -> &Sdi12Config {
        &self.config
    }

    /// The data pin, or `None` if no pin has been assigned.
    #[inline]
    pub fn data_pin(&self) -> Option<&P> {
        self.pin.as_ref()
    }

    /// Assigns a new data pin and returns the previous one.
    ///
    /// The old pin's interrupt is disarmed and released to input, and the
    /// instance goes back to `Disabled`; call [`begin`](Self::begin) again to
    /// use the new pin.
    pub fn set_data_pin(&mut self, pin: P) -> Result<Option<P>, Sdi12Error<P::Error>> {
        let old = self.release_pin()?;
        self.pin = Some(pin);
        Ok(old)
    }

    /// Disarms, releases and hands back the data pin.
    pub fn release_pin(&mut self) -> Result<Option<P>, Sdi12Error<P::Error>> {
        if let Some(pin) = self.pin.as_mut() {
            pin.set_edge_interrupt(false).map_err(Sdi12Error::Io)?;
            pin.set_mode(PinMode::Input).map_err(Sdi12Error::Io)?;
        }
        self.state = LineState::Disabled;
        Ok(self.pin.take())
    }

    /// Sets the value returned by timed reads that run out of time.
    #[inline]
    pub fn set_timeout_value(&mut self, value: i16) {
        self.config.timeout_value = value;
    }

    #[inline]
    pub fn timeout_value(&self) -> i16 {
        self.config.timeout_value
    }

    /// Parity result of the most recent character on the shared bus.
    #[inline]
    pub fn parity_failure(&self) -> bool {
        self.bus.parity_failure()
    }

    /// Makes this instance active, holding the line low and ready to send.
    ///
    /// Clears the shared buffer. Succeeds even if the instance was already
    /// active, in which case it is put back into `Holding`.
    pub fn begin(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        if self.pin.is_none() {
            return Err(Sdi12Error::PinNotConfigured);
        }
        if !self.set_active()? {
            self.force_hold()?;
        }
        self.bus.buffer().clear();
        self.overflow_reported = false;
        debug!("SDI-12 instance {} started", self.id.get());
        Ok(())
    }

    pub fn begin_with_pin(&mut self, pin: P) -> Result<(), Sdi12Error<P::Error>> {
        self.set_data_pin(pin)?;
        self.begin()
    }

    /// Shuts the instance down: releases the line, disarms the interrupt
    /// and gives up active status if held. No other instance is promoted.
    pub fn end(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        self.set_state(LineState::Disabled)?;
        if self.bus.release(self.id) {
            debug!("SDI-12 instance {} released the bus", self.id.get());
        }
        Ok(())
    }

    /// Edge interrupt entry point.
    ///
    /// Feeds the edge to the shared reconstructor if this instance is active
    /// and listening. Otherwise the edge is stray (another instance took over,
    /// or the line is being driven) and this pin's interrupt is disarmed.
    pub fn handle_interrupt(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        let now = self.timer.now();
        let Some(pin) = self.pin.as_mut() else {
            return Ok(());
        };
        if self.state == LineState::Listening {
            let level = pin.level().map_err(Sdi12Error::Io)?;
            if self.bus.on_edge(self.id, level, now, self.timer.ticks_per_bit()) {
                return Ok(());
            }
            // Another instance was activated since we started listening.
            self.state = LineState::Enabled;
        }
        pin.set_edge_interrupt(false).map_err(Sdi12Error::Io)
    }

    /// Disarms the pin of an instance that was still listening when another
    /// one became active, and drops it back to `Enabled`.
    pub(crate) fn drop_stale_listen(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        if self.state != LineState::Listening || self.bus.is_active(self.id) {
            return Ok(());
        }
        if let Some(pin) = self.pin.as_mut() {
            pin.set_edge_interrupt(false).map_err(Sdi12Error::Io)?;
        }
        self.state = LineState::Enabled;
        debug!("SDI-12 instance {} lost the bus, stopped listening", self.id.get());
        Ok(())
    }

    /// Bus operations need this instance to be the active one.
    pub(crate) fn ensure_active(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        if self.bus.is_active(self.id) {
            return Ok(());
        }
        self.drop_stale_listen()?;
        Err(Sdi12Error::NotActive)
    }
}

impl<P, T, D, const N: usize> core::fmt::Debug for Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sdi12")
            .field("id", &self.id)
            .field("has_pin", &self.pin.is_some())
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

impl<P, T, D, const N: usize> Drop for Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    fn drop(&mut self) {
        if let Some(pin) = self.pin.as_mut() {
            // Best effort: nothing can be reported from drop.
            let _ = pin.set_edge_interrupt(false);
            let _ = pin.set_mode(PinMode::Input);
        }
        self.bus.release(self.id);
    }
}
