// src/engine/arbitration.rs

//! Choosing which instance owns the receiver.
//!
//! Several instances (each on its own data pin) may share one [`SharedBus`],
//! but edges are only accepted from the active one. The previously active
//! instance is owned elsewhere and never touched directly. A listening one
//! reports `Enabled` from then on, and its interrupt is disarmed on its next
//! foreground call, or on its next stray edge by [`Sdi12::handle_interrupt`]
//! (or by the caller, when [`SharedBus::on_edge`] returns `false`).
//!
//! [`SharedBus`]: super::SharedBus
//! [`SharedBus::on_edge`]: super::SharedBus::on_edge

use super::{LineState, Sdi12};
use crate::common::{
    error::Sdi12Error,
    hal_traits::{Sdi12Pin, Sdi12Timer},
};
use embedded_hal::delay::DelayNs;
use log::debug;

impl<P, T, D, const N: usize> Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    /// Makes this the active instance and puts it into `Holding`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if active status was taken over.
    /// * `Ok(false)` if this instance already was active; nothing changes.
    /// * `Err(Sdi12Error::PinNotConfigured)` without a data pin.
    pub fn set_active(&mut self) -> Result<bool, Sdi12Error<P::Error>> {
        if self.bus.is_active(self.id) {
            return Ok(false);
        }
        if self.pin.is_none() {
            return Err(Sdi12Error::PinNotConfigured);
        }
        // Nothing changes on the bus if the pin refuses the new state.
        self.set_state(LineState::Holding)?;
        let previous = self.bus.replace_active(self.id);
        debug!(
            "SDI-12 instance {} active, replacing {:?}",
            self.id.get(),
            previous.map(|id| id.get())
        );
        Ok(true)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.bus.is_active(self.id)
    }

    /// Gives up active status without promoting any other instance.
    ///
    /// The pin interrupt is disarmed; a listening instance drops back to
    /// `Enabled`. Returns `false` if this instance was not active.
    pub fn deactivate(&mut self) -> Result<bool, Sdi12Error<P::Error>> {
        if !self.bus.release(self.id) {
            return Ok(false);
        }
        debug!("SDI-12 instance {} deactivated", self.id.get());
        if let Some(pin) = self.pin.as_mut() {
            pin.set_edge_interrupt(false).map_err(Sdi12Error::Io)?;
        }
        if self.state == LineState::Listening {
            self.state = LineState::Enabled;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::common::config::Sdi12Config;
    use crate::engine::ByteSource;
    use crate::common::error::Sdi12Error;
    use crate::engine::mock::{attach, simulated};
    use crate::engine::LineState;

    #[test]
    fn test_only_one_instance_is_active() {
        let (mut a, _la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());

        assert!(a.set_active().unwrap());
        assert!(a.is_active());
        assert!(!b.is_active());

        assert!(b.set_active().unwrap());
        assert!(!a.is_active());
        assert!(b.is_active());
        assert_eq!(b.state(), LineState::Holding);
    }

    #[test]
    fn test_set_active_twice_is_noop() {
        let (mut a, _la) = simulated(Sdi12Config::default());
        assert!(a.set_active().unwrap());
        a.force_listen().unwrap();
        assert!(!a.set_active().unwrap());
        assert_eq!(a.state(), LineState::Listening);
    }

    #[test]
    fn test_edges_from_previous_instance_rejected() {
        let (mut a, la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());
        a.set_active().unwrap();
        a.force_listen().unwrap();
        b.set_active().unwrap();
        // Edges from the old pin are rejected
        assert!(!a
            .bus()
            .on_edge(a.id(), crate::common::frame::LineLevel::High, 0, 833));
    }

    #[test]
    fn test_previous_listener_stops_listening() {
        let (mut a, la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());
        a.begin().unwrap();
        a.force_listen().unwrap();
        b.set_active().unwrap();
        assert_eq!(a.state(), LineState::Enabled);

        // The next foreground call disarms the old pin
        assert!(la.borrow().armed);
        assert_eq!(a.available().unwrap(), 0);
        assert!(!la.borrow().armed);
        assert_eq!(a.state(), LineState::Enabled);
        assert!(b.is_active());
    }

    #[test]
    fn test_rejected_bus_call_disarms_previous_listener() {
        let (mut a, la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());
        a.begin().unwrap();
        a.force_listen().unwrap();
        b.begin().unwrap();
        assert!(matches!(a.write_byte(b'0'), Err(Sdi12Error::NotActive)));
        assert!(!la.borrow().armed);
    }

    #[test]
    fn test_previous_holder_keeps_holding() {
        let (mut a, la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());
        a.begin().unwrap();
        b.set_active().unwrap();
        assert_eq!(a.state(), LineState::Holding);
        assert_eq!(la.borrow().mode, crate::common::frame::PinMode::Output);
    }

    #[test]
    fn test_failed_set_active_keeps_previous_instance() {
        let (mut a, _la) = simulated(Sdi12Config::default());
        let (mut b, lb) = attach(a.bus(), Sdi12Config::default());
        a.begin().unwrap();
        lb.borrow_mut().fail = true;
        assert!(matches!(b.set_active(), Err(Sdi12Error::Io(_))));
        assert!(a.is_active());
        assert!(!b.is_active());
        assert_eq!(b.state(), LineState::Disabled);

        lb.borrow_mut().fail = false;
        assert!(b.set_active().unwrap());
        assert!(!a.is_active());
    }

    #[test]
    fn test_set_active_requires_pin() {
        let (mut a, _la) = simulated(Sdi12Config::default());
        a.release_pin().unwrap();
        assert!(matches!(a.set_active(), Err(Sdi12Error::PinNotConfigured)));
        assert_eq!(a.bus().active(), None);
    }

    #[test]
    fn test_deactivate() {
        let (mut a, la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());
        a.set_active().unwrap();
        a.force_listen().unwrap();

        assert!(!b.deactivate().unwrap());
        assert!(a.is_active());

        assert!(a.deactivate().unwrap());
        assert_eq!(a.bus().active(), None);
        assert!(!la.borrow().armed);
        assert_eq!(a.state(), LineState::Enabled);
        assert!(!a.deactivate().unwrap());
    }

    #[test]
    fn test_bus_operations_need_active_instance() {
        let (mut a, _la) = simulated(Sdi12Config::default());
        let (mut b, _lb) = attach(a.bus(), Sdi12Config::default());
        a.begin().unwrap();
        b.begin().unwrap();
        assert!(matches!(a.send_command(b"0!", 0), Err(Sdi12Error::NotActive)));
        assert!(matches!(a.write_byte(b'0'), Err(Sdi12Error::NotActive)));
        assert!(b.send_command(b"0!", 0).is_ok());
    }
}
