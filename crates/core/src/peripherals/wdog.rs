// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::access::{self, NativeAccess};
use crate::registers::{Field, FieldSpan, FieldWrite, Register, RegisterFile};
use crate::signals::{InterruptLine, ResetRequester};
use crate::timer::{CountDirection, LimitTimer};
use crate::{AccessWidth, PeripheralTickResult, SimResult};
use serde::Serialize;
use std::sync::Arc;

const CS1: u64 = 0x0;
const CS2: u64 = 0x1;
const CNTH: u64 = 0x2;
const CNTL: u64 = 0x3;
const TOVALH: u64 = 0x4;
const TOVALL: u64 = 0x5;
const WINH: u64 = 0x6;
const WINL: u64 = 0x7;

const EN: FieldSpan = FieldSpan::flag(CS1, 7);
const INT: FieldSpan = FieldSpan::flag(CS1, 6);
const UPDATE: FieldSpan = FieldSpan::flag(CS1, 5);
const TST: FieldSpan = FieldSpan::bits(CS1, 3, 2);
const WIN: FieldSpan = FieldSpan::flag(CS2, 7);
const PRES: FieldSpan = FieldSpan::flag(CS2, 4);
const CLK: FieldSpan = FieldSpan::bits(CS2, 0, 2);

/// Reset values applied through the write path, so the watchdog runs out of reset.
const CS1_DEFAULT: u32 = 0x80;
const CS2_DEFAULT: u32 = 0x01;

const REFRESH_KEYS: (u16, u16) = (0x02A6, 0x80B4);
const UNLOCK_KEYS: (u16, u16) = (0x20C5, 0x28D9);

pub const DEFAULT_FREQUENCY: u32 = 250;
pub const DEFAULT_LIMIT: u64 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchdogClock {
    BusClock = 0b00,
    /// Low power oscillator, 1 kHz.
    LpoClock1kHz = 0b01,
    /// ICS internal reference, 32 kHz.
    IcsIrClock32kHz = 0b10,
    ExternalClock = 0b11,
}

impl From<u32> for WatchdogClock {
    fn from(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => WatchdogClock::BusClock,
            0b01 => WatchdogClock::LpoClock1kHz,
            0b10 => WatchdogClock::IcsIrClock32kHz,
            _ => WatchdogClock::ExternalClock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchdogTest {
    TestModeDisabled = 0b00,
    UserModeEnabled = 0b01,
    TestModeEnabledLowByte = 0b10,
    TestModeEnabledHighByte = 0b11,
}

impl From<u32> for WatchdogTest {
    fn from(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => WatchdogTest::TestModeDisabled,
            0b01 => WatchdogTest::UserModeEnabled,
            0b10 => WatchdogTest::TestModeEnabledLowByte,
            _ => WatchdogTest::TestModeEnabledHighByte,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Enable,
    CounterHigh,
    CounterLow,
}

/// KE02Z watchdog (WDOG).
///
/// Byte-native; 16-bit accesses to the counter, timeout and window pairs are
/// split high byte first. Expiry pulses the IRQ when CS1.INT is set and always
/// requests a machine reset.
#[derive(Debug)]
pub struct Watchdog {
    regs: RegisterFile<Hook>,
    timer: LimitTimer,
    irq: InterruptLine,
    reset: Arc<dyn ResetRequester>,
    last_key: Option<u16>,
}

fn registers() -> RegisterFile<Hook> {
    use AccessWidth::Byte;
    RegisterFile::new(Byte)
        .with_register(
            CS1,
            Register::new("WDOG_CS1", Byte)
                .with_field(Field::flag("EN", 7).on_write(Hook::Enable))
                .with_flag(6, "INT")
                .with_flag(5, "UPDATE")
                .with_value(3, 2, "TST")
                .with_tagged_flag("DBG", 2)
                .with_tagged_flag("WAIT", 1)
                .with_tagged_flag("STOP", 0),
        )
        .with_register(
            CS2,
            Register::new("WDOG_CS2", Byte)
                .with_flag(7, "WIN")
                .with_flag(6, "FLG")
                .with_flag(4, "PRES")
                .with_value(2, 2, "ZEROS")
                .with_value(0, 2, "CLK"),
        )
        .with_register(
            CNTH,
            Register::new("WDOG_CNTH", Byte)
                .with_field(Field::value("CNTHIGH", 0, 8).duplex(Hook::CounterHigh)),
        )
        .with_register(
            CNTL,
            Register::new("WDOG_CNTL", Byte)
                .with_field(Field::value("CNTLOW", 0, 8).duplex(Hook::CounterLow)),
        )
        .with_register(
            TOVALH,
            Register::new("WDOG_TOVALH", Byte).with_value(0, 8, "TOVALHIGH"),
        )
        .with_register(
            TOVALL,
            Register::new("WDOG_TOVALL", Byte).with_value(0, 8, "TOVALLOW"),
        )
        .with_register(WINH, Register::new("WDOG_WINH", Byte).with_value(0, 8, "WINHIGH"))
        .with_register(WINL, Register::new("WDOG_WINL", Byte).with_value(0, 8, "WINLOW"))
}

impl Watchdog {
    pub fn new(reset: Arc<dyn ResetRequester>) -> Self {
        Self::with_timer(DEFAULT_FREQUENCY, DEFAULT_LIMIT, reset)
    }

    pub fn with_timer(frequency: u32, limit: u64, reset: Arc<dyn ResetRequester>) -> Self {
        let regs = registers();
        debug_assert!(regs.validate().is_ok());
        let mut wdog = Self {
            regs,
            timer: LimitTimer::new("watchdog", frequency, limit, CountDirection::Ascending),
            irq: InterruptLine::new(),
            reset,
            last_key: None,
        };
        wdog.apply_defaults();
        wdog
    }

    pub fn from_config(config: &kinetis_config::TimerConfig, reset: Arc<dyn ResetRequester>) -> Self {
        Self::with_timer(config.frequency_hz, config.limit, reset)
    }

    fn apply_defaults(&mut self) {
        let writes = [(CS1, CS1_DEFAULT), (CS2, CS2_DEFAULT)];
        for (offset, value) in writes {
            if let Err(e) = self.write_native(offset, value) {
                tracing::error!("watchdog default write failed: {}", e);
            }
        }
    }

    pub fn enabled(&self) -> bool {
        self.timer.enabled()
    }

    pub fn clock(&self) -> WatchdogClock {
        self.regs.bits(CLK).into()
    }

    pub fn test_mode(&self) -> WatchdogTest {
        self.regs.bits(TST).into()
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.regs.flag(INT)
    }

    pub fn update_allowed(&self) -> bool {
        self.regs.flag(UPDATE)
    }

    pub fn window_mode(&self) -> bool {
        self.regs.flag(WIN)
    }

    pub fn prescaler_enabled(&self) -> bool {
        self.regs.flag(PRES)
    }

    pub fn timeout_value(&self) -> u16 {
        self.pair(TOVALH, TOVALL)
    }

    pub fn window_value(&self) -> u16 {
        self.pair(WINH, WINL)
    }

    fn pair(&self, high: u64, low: u64) -> u16 {
        let hi = self.regs.bits(FieldSpan::bits(high, 0, 8));
        let lo = self.regs.bits(FieldSpan::bits(low, 0, 8));
        ((hi << 8) | lo) as u16
    }

    pub fn irq(&self) -> &InterruptLine {
        &self.irq
    }

    pub fn timer(&self) -> &LimitTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut LimitTimer {
        &mut self.timer
    }

    fn apply(&mut self, effect: FieldWrite<Hook>) {
        match effect.tag {
            Hook::Enable => self.timer.set_enabled(effect.new != 0),
            Hook::CounterHigh => {}
            Hook::CounterLow => {
                let key = self.pair(CNTH, CNTL);
                self.on_key(key);
            }
        }
    }

    /// Key sequences complete with the CNTL byte of the second 16-bit write.
    fn on_key(&mut self, key: u16) {
        match (self.last_key, key) {
            (Some(first), second) if (first, second) == REFRESH_KEYS => {
                tracing::debug!("watchdog refreshed");
                self.timer.restart();
                self.last_key = None;
            }
            (Some(first), second) if (first, second) == UNLOCK_KEYS => {
                tracing::debug!("watchdog unlock sequence written");
                self.last_key = None;
            }
            _ => self.last_key = Some(key),
        }
    }

    fn on_limit_reached(&mut self) {
        tracing::trace!("Watchdog limit reached");
        if self.regs.flag(INT) {
            self.irq.blink();
        }
        tracing::info!("Watchdog timed out. Resetting...");
        self.reset.request_reset("watchdog");
    }
}

impl NativeAccess for Watchdog {
    fn native_width(&self) -> AccessWidth {
        self.regs.native_width()
    }

    fn native_size(&self) -> u64 {
        self.regs.size()
    }

    fn read_native(&mut self, offset: u64) -> SimResult<u32> {
        let count = self.timer.value();
        self.regs.read(offset, |tag, stored| match tag {
            Hook::CounterHigh => ((count >> 8) & 0xFF) as u32,
            Hook::CounterLow => (count & 0xFF) as u32,
            Hook::Enable => stored,
        })
    }

    fn write_native(&mut self, offset: u64, value: u32) -> SimResult<()> {
        for effect in self.regs.write(offset, value)? {
            self.apply(effect);
        }
        Ok(())
    }

    fn peek_native(&self, offset: u64) -> SimResult<u32> {
        self.regs.peek(offset)
    }
}

impl crate::Peripheral for Watchdog {
    fn size(&self) -> u64 {
        self.regs.size()
    }

    fn read(&mut self, offset: u64, width: AccessWidth) -> SimResult<u32> {
        access::read(self, offset, width)
    }

    fn write(&mut self, offset: u64, width: AccessWidth, value: u32) -> SimResult<()> {
        access::write(self, offset, width, value)
    }

    fn reset(&mut self) {
        self.regs.reset();
        self.timer.reset();
        self.last_key = None;
        self.apply_defaults();
    }

    /// A stopped timer is not clocked.
    fn tick_frequency(&self) -> Option<u32> {
        self.timer.enabled().then_some(self.timer.frequency())
    }

    fn tick(&mut self) -> PeripheralTickResult {
        if !self.timer.enabled() {
            return PeripheralTickResult::default();
        }
        let expired = self.timer.tick();
        if expired {
            self.on_limit_reached();
        }
        PeripheralTickResult { expired }
    }

    fn interrupt_line(&self) -> Option<&InterruptLine> {
        Some(&self.irq)
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "registers": self.regs.snapshot(),
            "timer": serde_json::to_value(&self.timer).unwrap_or(serde_json::Value::Null),
            "clock": serde_json::to_value(self.clock()).unwrap_or(serde_json::Value::Null),
            "test_mode": serde_json::to_value(self.test_mode()).unwrap_or(serde_json::Value::Null),
        })
    }
}
