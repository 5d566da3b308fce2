// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

#[derive(Debug, Default)]
struct LineState {
    level: AtomicBool,
    pulses: AtomicU64,
}

/// Interrupt output of a peripheral.
///
/// Clones share the same line: the peripheral drives one handle and the host
/// observes another. Timers [`blink`](InterruptLine::blink) it, the UART drives a
/// level with [`set`](InterruptLine::set).
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    state: Arc<LineState>,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, high: bool) {
        let previous = self.state.level.swap(high, Ordering::SeqCst);
        if previous != high {
            tracing::trace!("IRQ line -> {:?}", DigitalLevel::from(high));
        }
    }

    /// Momentary assertion; the level stays low.
    pub fn blink(&self) {
        self.state.pulses.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("IRQ line pulsed");
    }

    pub fn level(&self) -> DigitalLevel {
        self.state.level.load(Ordering::SeqCst).into()
    }

    pub fn is_set(&self) -> bool {
        self.state.level.load(Ordering::SeqCst)
    }

    pub fn pulse_count(&self) -> u64 {
        self.state.pulses.load(Ordering::SeqCst)
    }

    /// Returns and clears the number of pulses seen since the last call.
    pub fn take_pulses(&self) -> u64 {
        self.state.pulses.swap(0, Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.state.level.store(false, Ordering::SeqCst);
        self.state.pulses.store(0, Ordering::SeqCst);
    }
}

/// Capability to restart the whole modeled machine.
pub trait ResetRequester: Debug + Send + Sync {
    fn request_reset(&self, source: &str);
}

/// [`ResetRequester`] that records requests for the host to act on.
#[derive(Debug, Clone, Default)]
pub struct ResetLine {
    pending: Arc<AtomicU64>,
}

impl ResetLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) != 0
    }

    /// Returns and clears the number of outstanding requests.
    pub fn take(&self) -> u64 {
        self.pending.swap(0, Ordering::SeqCst)
    }
}

impl ResetRequester for ResetLine {
    fn request_reset(&self, source: &str) {
        tracing::info!("{} requested a system reset", source);
        self.pending.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_shared_between_clones() {
        let irq = InterruptLine::new();
        let observer = irq.clone();
        assert_eq!(observer.level(), DigitalLevel::Low);
        irq.set(true);
        assert!(observer.is_set());
        irq.set(false);
        assert!(!observer.is_set());
    }

    #[test]
    fn test_blink_does_not_hold_level() {
        let irq = InterruptLine::new();
        irq.blink();
        irq.blink();
        assert!(!irq.is_set());
        assert_eq!(irq.take_pulses(), 2);
        assert_eq!(irq.pulse_count(), 0);
    }

    #[test]
    fn test_reset_line_counts_requests() {
        let line = ResetLine::new();
        let requester: Arc<dyn ResetRequester> = Arc::new(line.clone());
        assert!(!line.is_pending());
        requester.request_reset("wdog");
        assert!(line.is_pending());
        assert_eq!(line.take(), 1);
        assert!(!line.is_pending());
    }
}
