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
use std::sync::Arc;

const CSR: u64 = 0x0;
const RVR: u64 = 0x4;
const CVR: u64 = 0x8;
const CALIB: u64 = 0xC;

const ENABLE: FieldSpan = FieldSpan::flag(CSR, 0);
const TICKINT: FieldSpan = FieldSpan::flag(CSR, 1);
const RELOAD: FieldSpan = FieldSpan::bits(RVR, 0, 24);
const CURRENT: FieldSpan = FieldSpan::bits(CVR, 0, 24);

pub const DEFAULT_FREQUENCY: u32 = 1000;
pub const DEFAULT_LIMIT: u64 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Enable,
}

/// SysTick timer. Standard address: 0xE000_E010
///
/// Expiry pulses the IRQ when TICKINT is set and always requests a machine reset.
#[derive(Debug)]
pub struct SysTick {
    regs: RegisterFile<Hook>,
    timer: LimitTimer,
    irq: InterruptLine,
    reset: Arc<dyn ResetRequester>,
}

fn registers() -> RegisterFile<Hook> {
    use AccessWidth::DoubleWord;
    RegisterFile::new(DoubleWord)
        .with_register(
            CSR,
            Register::new("SYST_CSR", DoubleWord)
                .with_flag(16, "COUNTFLAG")
                .with_flag(2, "CLKSOURCE")
                .with_flag(1, "TICKINT")
                .with_field(Field::flag("ENABLE", 0).on_write(Hook::Enable)),
        )
        .with_register(
            RVR,
            Register::new("SYST_RVR", DoubleWord).with_value(0, 24, "RELOAD"),
        )
        .with_register(
            CVR,
            Register::new("SYST_CVR", DoubleWord).with_value(0, 24, "CURRENT"),
        )
        .with_register(
            CALIB,
            Register::new("SYST_CALIB", DoubleWord)
                .with_tagged_flag("NOREF", 31)
                .with_tagged_flag("SKEW", 30)
                .with_value(0, 24, "TENMS"),
        )
}

impl SysTick {
    pub fn new(reset: Arc<dyn ResetRequester>) -> Self {
        Self::with_timer(DEFAULT_FREQUENCY, DEFAULT_LIMIT, reset)
    }

    pub fn with_timer(frequency: u32, limit: u64, reset: Arc<dyn ResetRequester>) -> Self {
        let regs = registers();
        debug_assert!(regs.validate().is_ok());
        Self {
            regs,
            timer: LimitTimer::new("systick", frequency, limit, CountDirection::Descending),
            irq: InterruptLine::new(),
            reset,
        }
    }

    pub fn from_config(config: &kinetis_config::TimerConfig, reset: Arc<dyn ResetRequester>) -> Self {
        Self::with_timer(config.frequency_hz, config.limit, reset)
    }

    pub fn enabled(&self) -> bool {
        self.regs.flag(ENABLE)
    }

    pub fn rvr(&self) -> u32 {
        self.regs.bits(RELOAD)
    }

    pub fn cvr(&self) -> u32 {
        self.regs.bits(CURRENT)
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
        }
    }

    fn on_limit_reached(&mut self) {
        tracing::trace!("SysTick limit reached");
        if self.regs.flag(TICKINT) {
            self.irq.blink();
        }
        tracing::info!("SysTick timed out. Resetting...");
        self.reset.request_reset("systick");
    }
}

impl NativeAccess for SysTick {
    fn native_width(&self) -> AccessWidth {
        self.regs.native_width()
    }

    fn native_size(&self) -> u64 {
        self.regs.size()
    }

    fn read_native(&mut self, offset: u64) -> SimResult<u32> {
        self.regs.read(offset, |_, stored| stored)
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

impl crate::Peripheral for SysTick {
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
        })
    }
}
