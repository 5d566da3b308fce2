// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::InterruptLine;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Mutex;

/// Trait representing a generic interrupt controller.
///
/// The host wires each peripheral's [`InterruptLine`] to a controller input through
/// an [`InterruptBridge`].
pub trait InterruptController: Debug + Send + Sync {
    /// Signal the controller that an interrupt line has changed.
    fn set_interrupt_pending(&self, irq: u32, pending: bool);

    /// Check if a specific interrupt is pending.
    fn is_interrupt_active(&self, irq: u32) -> bool;

    /// Acknowledge the highest-priority pending interrupt.
    fn acknowledge_interrupt(&self) -> Option<u32>;

    /// Complete an interrupt, usually called by the CPU after an ISR finishes.
    fn complete_interrupt(&self, irq: u32);
}

/// A bridge that connects `InterruptLine` signals to an `InterruptController`.
pub struct InterruptBridge<'a> {
    controller: &'a dyn InterruptController,
}

impl<'a> InterruptBridge<'a> {
    pub fn new(controller: &'a dyn InterruptController) -> Self {
        Self { controller }
    }

    /// Latches a pending interrupt for a pulse or a high level. A low level never
    /// clears a latched interrupt.
    pub fn update(&self, irq: u32, line: &InterruptLine) -> bool {
        let pulsed = line.take_pulses() > 0;
        if pulsed || line.is_set() {
            self.controller.set_interrupt_pending(irq, true);
            return true;
        }
        false
    }
}

/// Pending-set controller; lower numbers win on acknowledge.
#[derive(Debug, Default)]
pub struct PendingInterrupts {
    pending: Mutex<BTreeSet<u32>>,
}

impl PendingInterrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<u32> {
        self.pending
            .lock()
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut set) = self.pending.lock() {
            set.clear();
        }
    }
}

impl InterruptController for PendingInterrupts {
    fn set_interrupt_pending(&self, irq: u32, pending: bool) {
        if let Ok(mut set) = self.pending.lock() {
            if pending {
                set.insert(irq);
            } else {
                set.remove(&irq);
            }
        }
    }

    fn is_interrupt_active(&self, irq: u32) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains(&irq))
            .unwrap_or(false)
    }

    fn acknowledge_interrupt(&self) -> Option<u32> {
        let mut set = self.pending.lock().ok()?;
        let irq = set.iter().next().copied()?;
        set.remove(&irq);
        Some(irq)
    }

    fn complete_interrupt(&self, irq: u32) {
        tracing::trace!("IRQ {} complete", irq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_latches_pending() {
        let nvic = PendingInterrupts::new();
        let bridge = InterruptBridge::new(&nvic);
        let line = InterruptLine::new();

        line.blink();
        assert!(bridge.update(15, &line));
        // The pulse was consumed but the interrupt stays latched.
        assert!(!bridge.update(15, &line));
        assert!(nvic.is_interrupt_active(15));
        assert_eq!(nvic.acknowledge_interrupt(), Some(15));
        assert!(!nvic.is_interrupt_active(15));
    }

    #[test]
    fn test_level_keeps_repending() {
        let nvic = PendingInterrupts::new();
        let bridge = InterruptBridge::new(&nvic);
        let line = InterruptLine::new();
        line.set(true);

        bridge.update(28, &line);
        bridge.update(44, &line);
        assert_eq!(nvic.pending(), vec![28, 44]);
        assert_eq!(nvic.acknowledge_interrupt(), Some(28));
        bridge.update(28, &line);
        assert!(nvic.is_interrupt_active(28));
    }
}
