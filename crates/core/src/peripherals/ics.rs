// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::access::{self, NativeAccess};
use crate::registers::{Field, FieldSpan, Register, RegisterFile};
use crate::{AccessWidth, SimResult};
use serde::Serialize;

const C1: u64 = 0x0;
const C2: u64 = 0x1;
const C3: u64 = 0x2;
const C4: u64 = 0x3;
const S: u64 = 0x4;

const CLKS: FieldSpan = FieldSpan::bits(C1, 6, 2);
const IREFS: FieldSpan = FieldSpan::flag(C1, 2);
const BDIV: FieldSpan = FieldSpan::bits(C2, 5, 3);
const LP: FieldSpan = FieldSpan::flag(C2, 1);

/// ICS operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationMode {
    /// FLL engaged internal.
    Fei,
    /// FLL engaged external.
    Fee,
    /// FLL bypassed internal.
    Fbi,
    /// FLL bypassed internal low power.
    Fbilp,
    /// FLL bypassed external.
    Fbe,
    /// FLL bypassed external low power.
    Fbelp,
    Stop,
}

/// Maps CLKS, IREFS and LP to an operating mode. First match wins.
pub fn derive_mode(clock_select: u32, internal_ref: bool, low_power: bool) -> OperationMode {
    match (clock_select, internal_ref, low_power) {
        (0, true, _) => OperationMode::Fei,
        (0, false, _) => OperationMode::Fee,
        (1, false, false) => OperationMode::Fbi,
        (2, false, false) => OperationMode::Fbe,
        (2, false, true) => OperationMode::Fbelp,
        (1, true, true) => OperationMode::Fbilp,
        _ => OperationMode::Stop,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Locked,
    InternalRefStatus,
    ClockStatus,
}

/// Internal clock source. Status bits mirror the C1 selection and the FLL always
/// reports lock.
#[derive(Debug)]
pub struct Ics {
    regs: RegisterFile<Hook>,
}

fn registers() -> RegisterFile<Hook> {
    use AccessWidth::Byte;
    RegisterFile::new(Byte)
        .with_register(
            C1,
            Register::new("ICS_C1", Byte)
                .with_value(6, 2, "CLKS")
                .with_tag("RDIV", 3, 3)
                .with_field(Field::flag("IREFS", 2).reset(1))
                .with_tagged_flag("IRCLKEN", 1)
                .with_tagged_flag("IREFSTEN", 0),
        )
        .with_register(
            C2,
            Register::new("ICS_C2", Byte)
                .with_field(Field::value("BDIV", 5, 3).reset(1))
                .with_flag(1, "LP"),
        )
        .with_register(C3, Register::new("ICS_C3", Byte).with_value(0, 8, "SCTRIM"))
        .with_register(
            C4,
            Register::new("ICS_C4", Byte)
                .with_tagged_flag("LOLIE", 7)
                .with_tagged_flag("CME", 5)
                .with_tagged_flag("SCFTRIM", 0),
        )
        .with_register(
            S,
            Register::new("ICS_S", Byte)
                .with_field(Field::flag("LOLS", 7).read_only().provided_by(Hook::Locked))
                .with_field(Field::flag("LOCK", 6).read_only().provided_by(Hook::Locked))
                .with_field(
                    Field::flag("IREFST", 4)
                        .read_only()
                        .provided_by(Hook::InternalRefStatus),
                )
                .with_field(
                    Field::value("CLKST", 2, 2)
                        .read_only()
                        .provided_by(Hook::ClockStatus),
                ),
        )
}

impl Default for Ics {
    fn default() -> Self {
        Self::new()
    }
}

impl Ics {
    pub fn new() -> Self {
        let regs = registers();
        debug_assert!(regs.validate().is_ok());
        Self { regs }
    }

    /// Recomputed from the live register state on every call.
    pub fn operation_mode(&self) -> OperationMode {
        derive_mode(
            self.regs.bits(CLKS),
            self.regs.flag(IREFS),
            self.regs.flag(LP),
        )
    }

    /// Bus clock divider selected by C2.BDIV (1..=128).
    pub fn bus_divider(&self) -> u32 {
        1 << self.regs.bits(BDIV)
    }
}

impl NativeAccess for Ics {
    fn native_width(&self) -> AccessWidth {
        self.regs.native_width()
    }

    fn native_size(&self) -> u64 {
        self.regs.size()
    }

    fn read_native(&mut self, offset: u64) -> SimResult<u32> {
        let clock_select = self.regs.bits(CLKS);
        let internal_ref = self.regs.bits(IREFS);
        self.regs.read(offset, |tag, _| match tag {
            Hook::Locked => 1,
            Hook::InternalRefStatus => internal_ref,
            Hook::ClockStatus => clock_select,
        })
    }

    fn write_native(&mut self, offset: u64, value: u32) -> SimResult<()> {
        let effects = self.regs.write(offset, value)?;
        debug_assert!(effects.is_empty());
        if offset == C1 || offset == C2 {
            tracing::debug!("ICS mode now {:?}", self.operation_mode());
        }
        Ok(())
    }

    fn peek_native(&self, offset: u64) -> SimResult<u32> {
        self.regs.peek(offset)
    }
}

impl crate::Peripheral for Ics {
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
            "mode": serde_json::to_value(self.operation_mode()).unwrap_or(serde_json::Value::Null),
            "bus_divider": self.bus_divider(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::leaked_reserved_bits;
    use crate::Peripheral;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn test_mode_table() {
        use OperationMode::*;
        assert_eq!(derive_mode(0, true, false), Fei);
        assert_eq!(derive_mode(0, true, true), Fei);
        assert_eq!(derive_mode(0, false, true), Fee);
        assert_eq!(derive_mode(1, false, false), Fbi);
        assert_eq!(derive_mode(2, false, false), Fbe);
        assert_eq!(derive_mode(2, false, true), Fbelp);
        assert_eq!(derive_mode(1, true, true), Fbilp);
    }

    #[test]
    fn test_unlisted_combinations_stop() {
        for internal_ref in [false, true] {
            for low_power in [false, true] {
                assert_eq!(derive_mode(3, internal_ref, low_power), OperationMode::Stop);
            }
        }
        assert_eq!(derive_mode(1, true, false), OperationMode::Stop);
        assert_eq!(derive_mode(1, false, true), OperationMode::Stop);
        assert_eq!(derive_mode(2, true, false), OperationMode::Stop);
    }

    #[test]
    fn test_reset_state_is_fei() {
        let mut ics = Ics::new();
        assert_eq!(ics.size(), 5);
        assert_eq!(ics.read(0x0, AccessWidth::Byte).unwrap(), 0x04);
        assert_eq!(ics.read(0x1, AccessWidth::Byte).unwrap(), 0x20);
        assert_eq!(ics.operation_mode(), OperationMode::Fei);
        assert_eq!(ics.bus_divider(), 2);
    }

    #[test]
    fn test_mode_follows_register_writes() {
        let mut ics = Ics::new();
        // CLKS = 2 (external), IREFS = 0.
        ics.write(0x0, AccessWidth::Byte, 0x80).unwrap();
        assert_eq!(ics.operation_mode(), OperationMode::Fbe);
        ics.write(0x1, AccessWidth::Byte, 0x02).unwrap();
        assert_eq!(ics.operation_mode(), OperationMode::Fbelp);
        assert_eq!(ics.bus_divider(), 1);
        ics.write(0x0, AccessWidth::Byte, 0xC0).unwrap();
        assert_eq!(ics.operation_mode(), OperationMode::Stop);
    }

    #[test]
    fn test_status_mirrors_selection() {
        let mut ics = Ics::new();
        // LOLS | LOCK | IREFST, CLKST = 0
        assert_eq!(ics.read(0x4, AccessWidth::Byte).unwrap(), 0xD0);
        ics.write(0x0, AccessWidth::Byte, 0x40).unwrap();
        assert_eq!(ics.read(0x4, AccessWidth::Byte).unwrap(), 0xC4);
        // Status is read-only.
        ics.write(0x4, AccessWidth::Byte, 0x00).unwrap();
        assert_eq!(ics.read(0x4, AccessWidth::Byte).unwrap(), 0xC4);
    }

    #[test]
    fn test_reset_restores_fei() {
        let mut ics = Ics::new();
        ics.write(0x0, AccessWidth::Byte, 0x40).unwrap();
        ics.write(0x1, AccessWidth::Byte, 0xE2).unwrap();
        ics.reset();
        assert_eq!(ics.operation_mode(), OperationMode::Fei);
        assert_eq!(ics.bus_divider(), 2);
    }

    proptest! {
        #[test]
        fn test_reserved_bits_read_zero(values in vec(any::<u32>(), 8)) {
            let mut dev = Ics::new();
            let declared = dev.regs.declared_bits();
            prop_assert_eq!(leaked_reserved_bits(&mut dev, &declared, &values), None);
        }
    }
}
