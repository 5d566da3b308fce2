// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::{lock, SharedPeripheral};
use crate::Peripheral;

const MICROS_PER_SECOND: u64 = 1_000_000;

struct ClockEntry {
    name: String,
    dev: SharedPeripheral,
    /// Partial tick carried between advances, in Hz * microseconds.
    carry: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockReport {
    pub ticks: u64,
    pub expiries: u64,
}

/// Virtual time source. Each registered peripheral is ticked at its own
/// [`tick_frequency`](crate::Peripheral::tick_frequency).
#[derive(Default)]
pub struct VirtualClock {
    now_us: u64,
    entries: Vec<ClockEntry>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, dev: SharedPeripheral) {
        self.entries.push(ClockEntry {
            name: name.to_string(),
            dev,
            carry: 0,
        });
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Advances virtual time. Each tick is delivered under the peripheral's lock.
    pub fn advance(&mut self, micros: u64) -> ClockReport {
        self.now_us = self.now_us.saturating_add(micros);
        let mut report = ClockReport::default();

        for entry in &mut self.entries {
            let mut dev = lock(&entry.dev);
            let Some(frequency) = dev.tick_frequency() else {
                continue;
            };
            let total = micros
                .saturating_mul(u64::from(frequency))
                .saturating_add(entry.carry);
            let ticks = total / MICROS_PER_SECOND;
            entry.carry = total % MICROS_PER_SECOND;

            report.ticks += ticks;
            for _ in 0..ticks {
                if dev.tick().expired {
                    tracing::debug!("{} expired at {} us", entry.name, self.now_us);
                    report.expiries += 1;
                }
            }
        }

        report
    }

    /// Drops partial ticks, as after a machine reset.
    pub fn clear_carry(&mut self) {
        for entry in &mut self.entries {
            entry.carry = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::systick::SysTick;
    use crate::signals::ResetLine;
    use crate::AccessWidth;
    use std::sync::{Arc, Mutex};

    fn shared(dev: Box<dyn Peripheral>) -> SharedPeripheral {
        Arc::new(Mutex::new(dev))
    }

    #[test]
    fn test_ticks_follow_frequency() {
        let line = ResetLine::new();
        let st = shared(Box::new(SysTick::with_timer(1000, 1_000_000, Arc::new(line))));
        lock(&st).write(0x0, AccessWidth::DoubleWord, 1).unwrap();

        let mut clock = VirtualClock::new();
        clock.register("systick", st.clone());
        assert_eq!(clock.advance(10_000).ticks, 10);
        // 1.5 ticks worth, twice: the half tick is carried.
        assert_eq!(clock.advance(1_500).ticks, 1);
        assert_eq!(clock.advance(1_500).ticks, 2);
        assert_eq!(clock.now_us(), 13_000);
    }

    #[test]
    fn test_expiry_reported() {
        let line = ResetLine::new();
        let st = shared(Box::new(SysTick::with_timer(1000, 5, Arc::new(line.clone()))));
        lock(&st).write(0x0, AccessWidth::DoubleWord, 1).unwrap();

        let mut clock = VirtualClock::new();
        clock.register("systick", st);
        assert_eq!(clock.advance(4_000).expiries, 0);
        assert_eq!(clock.advance(1_000).expiries, 1);
        assert_eq!(line.take(), 1);
    }

    #[test]
    fn test_disabled_timer_gets_no_ticks() {
        let line = ResetLine::new();
        let st = shared(Box::new(SysTick::with_timer(1000, 5, Arc::new(line.clone()))));
        let mut clock = VirtualClock::new();
        clock.register("systick", st);
        assert_eq!(clock.advance(100_000), ClockReport::default());
        assert!(!line.is_pending());
    }

    #[test]
    fn test_large_advance_does_not_overflow() {
        let line = ResetLine::new();
        let st = shared(Box::new(SysTick::with_timer(1000, 5, Arc::new(line.clone()))));
        let mut clock = VirtualClock::new();
        clock.register("systick", st);
        clock.advance(u64::MAX);
        assert_eq!(clock.advance(u64::MAX), ClockReport::default());
        assert_eq!(clock.now_us(), u64::MAX);
    }
}
