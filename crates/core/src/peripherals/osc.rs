// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::access::{self, NativeAccess};
use crate::registers::{Field, FieldSpan, Register, RegisterFile};
use crate::{AccessWidth, SimResult};

const CR: u64 = 0x0;

const OSCEN: FieldSpan = FieldSpan::flag(CR, 7);
const OSCOS: FieldSpan = FieldSpan::flag(CR, 4);
const RANGE: FieldSpan = FieldSpan::flag(CR, 2);
const HGO: FieldSpan = FieldSpan::flag(CR, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Initialized,
}

/// External oscillator control. The oscillator reports itself initialized as soon
/// as its output is selected.
#[derive(Debug)]
pub struct Osc {
    regs: RegisterFile<Hook>,
}

impl Default for Osc {
    fn default() -> Self {
        Self::new()
    }
}

impl Osc {
    pub fn new() -> Self {
        let regs = RegisterFile::new(AccessWidth::Byte).with_register(
            CR,
            Register::new("OSC_CR", AccessWidth::Byte)
                .with_flag(7, "OSCEN")
                .with_flag(5, "OSCSTEN")
                .with_flag(4, "OSCOS")
                .with_flag(2, "RANGE")
                .with_flag(1, "HGO")
                .with_field(
                    Field::flag("OSCINIT", 0)
                        .read_only()
                        .provided_by(Hook::Initialized),
                ),
        );
        debug_assert!(regs.validate().is_ok());
        Self { regs }
    }

    pub fn enabled(&self) -> bool {
        self.regs.flag(OSCEN)
    }

    pub fn output_selected(&self) -> bool {
        self.regs.flag(OSCOS)
    }

    pub fn initialized(&self) -> bool {
        self.output_selected()
    }

    pub fn high_range(&self) -> bool {
        self.regs.flag(RANGE)
    }

    pub fn high_gain(&self) -> bool {
        self.regs.flag(HGO)
    }
}

impl NativeAccess for Osc {
    fn native_width(&self) -> AccessWidth {
        self.regs.native_width()
    }

    fn native_size(&self) -> u64 {
        self.regs.size()
    }

    fn read_native(&mut self, offset: u64) -> SimResult<u32> {
        let selected = self.regs.bits(OSCOS);
        self.regs.read(offset, |tag, _| match tag {
            Hook::Initialized => selected,
        })
    }

    fn write_native(&mut self, offset: u64, value: u32) -> SimResult<()> {
        self.regs.write(offset, value).map(|_| ())
    }

    fn peek_native(&self, offset: u64) -> SimResult<u32> {
        self.regs.peek(offset)
    }
}

impl crate::Peripheral for Osc {
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
            "initialized": self.initialized(),
        })
    }
}
