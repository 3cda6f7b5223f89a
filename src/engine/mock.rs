// src/engine/mock.rs

//! Simulated data line for unit tests.
//!
//! [`MockPin`], [`MockTimer`] and [`MockDelay`] share one [`MockLine`]. Time
//! only moves inside the delay, and incoming edges scheduled on the line are
//! delivered to the shared bus as the clock passes them, as long as the pin
//! is listening with its interrupt armed.

use super::{InstanceId, Sdi12, SharedBus};
use crate::common::{
    config::Sdi12Config,
    frame::{CharFrame, LineLevel, PinMode},
    hal_traits::{Sdi12Pin, Sdi12Timer},
};
use crate::engine::{receiver::CharReceiver, ring_buffer::RingBuffer};
use embedded_hal::delay::DelayNs;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

/// Ticks per bit of the simulated 1 MHz timer.
pub(crate) const TICKS_PER_BIT: u32 = 833;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MockPinError;

#[derive(Debug)]
pub(crate) struct MockLine {
    now_ns: u64,
    pub mode: PinMode,
    /// Level driven by the pin while it is an output.
    pub output: LineLevel,
    /// Level produced by the other side of the bus.
    pub input: LineLevel,
    pub armed: bool,
    /// Every `set_level` call, with its time in microseconds.
    pub driven: Vec<(u64, LineLevel)>,
    /// Names of the pin calls, in order.
    pub calls: Vec<&'static str>,
    /// Makes every pin call fail.
    pub fail: bool,
    scheduled: VecDeque<(LineLevel, u32)>,
    bus: &'static SharedBus,
    listener: Option<InstanceId>,
}

pub(crate) type Line = Rc<RefCell<MockLine>>;
pub(crate) type MockSdi12 = Sdi12<'static, MockPin, MockTimer, MockDelay>;

impl MockLine {
    fn new(bus: &'static SharedBus) -> Self {
        MockLine {
            now_ns: 0,
            mode: PinMode::Input,
            output: LineLevel::MARKING,
            input: LineLevel::MARKING,
            armed: false,
            driven: Vec::new(),
            calls: Vec::new(),
            fail: false,
            scheduled: VecDeque::new(),
            bus,
            listener: None,
        }
    }

    pub fn now_us(&self) -> u64 {
        self.now_ns / 1_000
    }

    /// Queues incoming edges as `(level, time in us)`.
    pub fn schedule(&mut self, edges: &[(LineLevel, u32)]) {
        self.scheduled.extend(edges.iter().copied());
    }

    pub fn advance_us(&mut self, us: u64) {
        self.advance_ns(us * 1_000);
    }

    fn advance_ns(&mut self, ns: u64) {
        self.now_ns += ns;
        let now = self.now_us();
        while let Some(&(level, at)) = self.scheduled.front() {
            if u64::from(at) > now {
                break;
            }
            self.scheduled.pop_front();
            self.input = level;
            if self.armed && self.mode == PinMode::Input {
                if let Some(id) = self.listener {
                    // What the interrupt handler would do, stamped with the edge time.
                    self.bus.on_edge(id, level, at, TICKS_PER_BIT);
                }
            }
        }
    }

    /// The level most recently driven at or before `at_us`.
    pub fn driven_level_at(&self, at_us: u64) -> Option<LineLevel> {
        self.driven
            .iter()
            .take_while(|(t, _)| *t <= at_us)
            .last()
            .map(|&(_, level)| level)
    }

    fn check(&mut self, call: &'static str) -> Result<(), MockPinError> {
        self.calls.push(call);
        if self.fail {
            Err(MockPinError)
        } else {
            Ok(())
        }
    }
}

pub(crate) struct MockPin {
    line: Line,
}

impl MockPin {
    pub fn new(line: &Line) -> Self {
        MockPin { line: line.clone() }
    }
}

impl Sdi12Pin for MockPin {
    type Error = MockPinError;

    fn set_mode(&mut self, mode: PinMode) -> Result<(), Self::Error> {
        let mut line = self.line.borrow_mut();
        line.check("mode")?;
        line.mode = mode;
        Ok(())
    }

    fn set_level(&mut self, level: LineLevel) -> Result<(), Self::Error> {
        let mut line = self.line.borrow_mut();
        line.check("level")?;
        line.output = level;
        let now = line.now_us();
        line.driven.push((now, level));
        Ok(())
    }

    fn level(&mut self) -> Result<LineLevel, Self::Error> {
        let mut line = self.line.borrow_mut();
        line.check("read")?;
        Ok(match line.mode {
            PinMode::Input => line.input,
            PinMode::Output => line.output,
        })
    }

    fn set_edge_interrupt(&mut self, enabled: bool) -> Result<(), Self::Error> {
        let mut line = self.line.borrow_mut();
        line.check(if enabled { "irq_on" } else { "irq_off" })?;
        line.armed = enabled;
        Ok(())
    }
}

pub(crate) struct MockTimer {
    line: Line,
}

impl Sdi12Timer for MockTimer {
    fn now(&self) -> u32 {
        self.line.borrow().now_us() as u32
    }

    fn ticks_per_bit(&self) -> u32 {
        TICKS_PER_BIT
    }
}

pub(crate) struct MockDelay {
    line: Line,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.line.borrow_mut().advance_ns(u64::from(ns));
    }
}

/// A new instance with its own pin on `bus`.
pub(crate) fn attach(bus: &'static SharedBus, config: Sdi12Config) -> (MockSdi12, Line) {
    let line = Rc::new(RefCell::new(MockLine::new(bus)));
    let sdi12 = Sdi12::with_pin(
        bus,
        MockPin::new(&line),
        MockTimer { line: line.clone() },
        MockDelay { line: line.clone() },
        config,
    );
    line.borrow_mut().listener = Some(sdi12.id());
    (sdi12, line)
}

/// A new instance on a bus of its own.
pub(crate) fn simulated(config: Sdi12Config) -> (MockSdi12, Line) {
    let bus: &'static SharedBus = Box::leak(Box::new(SharedBus::new()));
    attach(bus, config)
}

/// Edges a sender produces for `bytes`, as `(level after edge, time)`.
///
/// Characters follow each other after `gap_bits` of marking. `jitter` shifts
/// the n-th edge by the returned number of ticks.
pub(crate) fn line_edges(
    bytes: &[u8],
    start: u32,
    ticks_per_bit: u32,
    gap_bits: u32,
    jitter: impl Fn(usize) -> i32,
) -> Vec<(LineLevel, u32)> {
    let mut edges = Vec::new();
    let mut current = LineLevel::MARKING;
    let mut bit = 0u32;
    for &byte in bytes {
        let frame = CharFrame::new(byte);
        for level in frame.levels() {
            if level != current {
                let at = start
                    .wrapping_add(bit * ticks_per_bit)
                    .wrapping_add_signed(jitter(edges.len()));
                edges.push((level, at));
                current = level;
            }
            bit += 1;
        }
        bit += gap_bits;
    }
    edges
}

/// Drops repeated levels from a `driven` log, keeping the actual transitions.
pub(crate) fn transitions(driven: &[(u64, LineLevel)]) -> Vec<(u64, LineLevel)> {
    let mut out: Vec<(u64, LineLevel)> = Vec::new();
    for &(t, level) in driven {
        if out.last().map(|&(_, l)| l) != Some(level) {
            out.push((t, level));
        }
    }
    out
}

/// Decodes transitions (starting at a start bit) with a fresh receiver.
pub(crate) fn decode_driven(edges: &[(u64, LineLevel)]) -> Vec<u8> {
    let sink = RingBuffer::<128>::new();
    let mut rx = CharReceiver::new();
    for &(t, level) in edges {
        rx.on_edge(level, t as u32, TICKS_PER_BIT, &sink);
    }
    if let Some(&(t, _)) = edges.last() {
        if !rx.is_idle() {
            // Close a character whose last bits were all marking.
            rx.on_edge(LineLevel::SPACING, t as u32 + 12 * TICKS_PER_BIT, TICKS_PER_BIT, &sink);
        }
    }
    core::iter::from_fn(|| sink.read()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_edges_for_single_character() {
        // '0' = 0110000: start(H) 0 0 0 0(H) 1 1(L) 0(H) parity 0(H) stop(L)
        let edges = line_edges(b"0", 0, 10, 0, |_| 0);
        assert_eq!(
            edges,
            vec![
                (LineLevel::High, 0),
                (LineLevel::Low, 50),
                (LineLevel::High, 70),
                (LineLevel::Low, 90),
            ]
        );
    }

    #[test]
    fn test_delay_delivers_scheduled_edges_only_when_armed() {
        let (sdi12, line) = simulated(Sdi12Config::default());
        line.borrow_mut().schedule(&[(LineLevel::High, 10)]);
        line.borrow_mut().advance_us(20);
        assert_eq!(line.borrow().input, LineLevel::High);
        assert!(sdi12.bus().receiver().is_idle());
    }

    #[test]
    fn test_transitions_dedup() {
        let driven = [
            (0, LineLevel::Low),
            (5, LineLevel::Low),
            (9, LineLevel::High),
            (12, LineLevel::High),
            (15, LineLevel::Low),
        ];
        assert_eq!(
            transitions(&driven),
            vec![(0, LineLevel::Low), (9, LineLevel::High), (15, LineLevel::Low)]
        );
    }
}
