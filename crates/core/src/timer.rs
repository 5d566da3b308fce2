// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountDirection {
    #[default]
    Ascending,
    Descending,
}

/// Counter that moves one step per tick toward a limit and reports reaching it.
///
/// Ascending timers count 0..=limit, descending ones limit..=0. After expiry the
/// counter restarts, so each tick reports at most one expiry.
#[derive(Debug, Clone, Serialize)]
pub struct LimitTimer {
    name: &'static str,
    frequency: u32,
    limit: u64,
    #[serde(skip)]
    default_limit: u64,
    value: u64,
    enabled: bool,
    direction: CountDirection,
}

impl LimitTimer {
    pub fn new(name: &'static str, frequency: u32, limit: u64, direction: CountDirection) -> Self {
        let limit = limit.max(1);
        let mut timer = Self {
            name,
            frequency,
            limit,
            default_limit: limit,
            value: 0,
            enabled: false,
            direction,
        };
        timer.restart();
        timer
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::debug!(
                "{} timer {}",
                self.name,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.enabled = enabled;
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Ascending values stay below the limit, descending ones above zero.
    pub fn set_value(&mut self, value: u64) {
        self.value = match self.direction {
            CountDirection::Ascending => value.min(self.limit - 1),
            CountDirection::Descending => value.clamp(1, self.limit),
        };
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Sets a new limit and restarts the count. Zero is treated as one.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit.max(1);
        self.restart();
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Number of ticks left before the next expiry.
    pub fn remaining(&self) -> u64 {
        match self.direction {
            CountDirection::Ascending => self.limit.saturating_sub(self.value),
            CountDirection::Descending => self.value,
        }
    }

    /// Moves the counter back to its starting point without touching enablement.
    pub fn restart(&mut self) {
        self.value = match self.direction {
            CountDirection::Ascending => 0,
            CountDirection::Descending => self.limit,
        };
    }

    /// Restores construction defaults: disabled, default limit.
    pub fn reset(&mut self) {
        self.enabled = false;
        self.limit = self.default_limit;
        self.restart();
    }

    /// Advances one step. Returns `true` when the limit was reached.
    pub fn tick(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.direction {
            CountDirection::Ascending => self.value = self.value.saturating_add(1),
            CountDirection::Descending => self.value = self.value.saturating_sub(1),
        }
        if self.remaining() == 0 {
            tracing::trace!("{} timer reached its limit", self.name);
            self.restart();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_after_exactly_limit_ticks() {
        for direction in [CountDirection::Ascending, CountDirection::Descending] {
            let mut timer = LimitTimer::new("t", 1000, 5, direction);
            timer.set_enabled(true);
            let fired: Vec<bool> = (0..5).map(|_| timer.tick()).collect();
            assert_eq!(fired, vec![false, false, false, false, true]);
        }
    }

    #[test]
    fn test_no_expiry_before_limit() {
        let mut timer = LimitTimer::new("t", 1000, 10, CountDirection::Descending);
        timer.set_enabled(true);
        for _ in 0..9 {
            assert!(!timer.tick());
        }
        assert_eq!(timer.value(), 1);
        assert!(timer.tick());
        assert_eq!(timer.value(), 10);
    }

    #[test]
    fn test_disabled_timer_never_expires() {
        let mut timer = LimitTimer::new("t", 1000, 3, CountDirection::Ascending);
        timer.set_enabled(true);
        timer.tick();
        timer.set_enabled(false);
        for _ in 0..10 {
            assert!(!timer.tick());
        }
        assert_eq!(timer.value(), 1);
    }

    #[test]
    fn test_descending_value_at_zero_expires_on_next_tick() {
        let mut timer = LimitTimer::new("t", 1000, 10, CountDirection::Descending);
        timer.set_enabled(true);
        timer.set_value(0);
        assert_eq!(timer.value(), 1);
        assert!(timer.tick());
        assert_eq!(timer.value(), 10);
    }

    #[test]
    fn test_ascending_value_at_limit_expires_on_next_tick() {
        let mut timer = LimitTimer::new("t", 250, 10, CountDirection::Ascending);
        timer.set_enabled(true);
        timer.set_value(10);
        assert_eq!(timer.value(), 9);
        assert_eq!(timer.remaining(), 1);
        assert!(timer.tick());
        assert_eq!(timer.value(), 0);

        timer.set_value(u64::MAX);
        assert!(timer.tick());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut timer = LimitTimer::new("t", 250, 8, CountDirection::Ascending);
        timer.set_enabled(true);
        timer.set_limit(0);
        assert_eq!(timer.limit(), 1);
        timer.reset();
        assert!(!timer.enabled());
        assert_eq!(timer.limit(), 8);
        assert_eq!(timer.frequency(), 250);
        assert_eq!(timer.value(), 0);
    }
}
