// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! System integration module (SIM). Identification and option registers only.

use crate::registers::access::{self, NativeAccess};
use crate::registers::{Field, FieldSpan, Register, RegisterFile};
use crate::{AccessWidth, SimResult};
use serde::Serialize;

const SRSID: u64 = 0x00;
const SOPT: u64 = 0x04;
const PINSEL: u64 = 0x08;
const SCGC: u64 = 0x0C;
const UUIDL: u64 = 0x10;
const UUIDH: u64 = 0x14;
const BUSDIV: u64 = 0x18;

const UART0_GATE: FieldSpan = FieldSpan::flag(SCGC, 20);
const BUSDIV_FLAG: FieldSpan = FieldSpan::flag(BUSDIV, 0);

/// Source of device identifiers.
pub trait IdentifierSource {
    fn next_id(&mut self) -> u32;
}

/// Deterministic identifier source (splitmix64). The same seed always yields the
/// same sequence.
#[derive(Debug, Clone)]
pub struct SeededIds {
    state: u64,
}

impl SeededIds {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl IdentifierSource for SeededIds {
    fn next_id(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        (z ^ (z >> 31)) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UniqueId {
    pub high: u32,
    pub low: u32,
}

impl UniqueId {
    pub fn new(high: u32, low: u32) -> Self {
        Self { high, low }
    }

    pub fn from_source(source: &mut dyn IdentifierSource) -> Self {
        let high = source.next_id();
        let low = source.next_id();
        Self { high, low }
    }
}

impl From<kinetis_config::UniqueIdConfig> for UniqueId {
    fn from(config: kinetis_config::UniqueIdConfig) -> Self {
        Self::new(config.high, config.low)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    BusReference,
    UniqueIdLow,
    UniqueIdHigh,
}

#[derive(Debug)]
pub struct Sim {
    regs: RegisterFile<Hook>,
    unique_id: UniqueId,
}

fn tagged_flags(mut reg: Register<Hook>, flags: &[(&'static str, u8)]) -> Register<Hook> {
    for &(name, bit) in flags {
        reg = reg.with_tagged_flag(name, bit);
    }
    reg
}

fn registers() -> RegisterFile<Hook> {
    use AccessWidth::DoubleWord;

    let srsid = Register::new("SIM_SRSID", DoubleWord)
        .with_field(Field::value("FAMID", 28, 4).read_only())
        .with_field(Field::value("SUBFAMID", 24, 4).read_only())
        .with_field(Field::value("REVID", 20, 4).read_only())
        .with_field(Field::value("PINID", 16, 4).read_only());
    let srsid = [
        ("SACKERR", 13),
        ("MDMAP", 11),
        ("SW", 10),
        ("LOCKUP", 9),
        ("POR", 7),
        ("PIN", 6),
        ("WDOG", 5),
        ("LOC", 2),
        ("LVD", 1),
    ]
    .into_iter()
    .fold(srsid, |reg, (name, bit)| {
        reg.with_field(Field::tag(name, bit, 1).read_only())
    });

    let sopt = Register::new("SIM_SOPT", DoubleWord)
        .with_field(Field::value("DELAY", 24, 8).read_only())
        .with_field(Field::value("BUSREF", 16, 3).provided_by(Hook::BusReference))
        .with_field(Field::value("ADHWT", 8, 2).read_only());
    let sopt = tagged_flags(
        sopt,
        &[
            ("DLYACT", 23),
            ("CLKOE", 19),
            ("TXDME", 15),
            ("FTMSYNC", 14),
            ("RXDFE", 13),
            ("RXDCE", 12),
            ("ACIC", 11),
            ("RTCC", 10),
            ("SWDE", 3),
            ("RSTPE", 2),
            ("NMIE", 1),
        ],
    );

    let pinsel = tagged_flags(
        Register::new("SIM_PINSEL", DoubleWord),
        &[
            ("FTM2PS3", 15),
            ("FTM2PS2", 14),
            ("FTM2PS1", 13),
            ("FTM2PS0", 12),
            ("FTM1PS1", 11),
            ("FTM1PS0", 10),
            ("FTM0PS1", 9),
            ("FTM0PS0", 8),
            ("UART0PS", 7),
            ("SPI0PS", 6),
            ("I2C0PS", 5),
            ("RTCPS", 4),
        ],
    );

    let scgc = Register::new("SIM_SCGC", DoubleWord)
        .with_flag(22, "UART2")
        .with_flag(21, "UART1")
        .with_flag(20, "UART0");
    let scgc = tagged_flags(
        scgc,
        &[
            ("ACMP1", 31),
            ("ACMP0", 30),
            ("ADC", 29),
            ("IRQ", 27),
            ("KBI1", 25),
            ("KBI0", 24),
            ("SPI1", 19),
            ("SPI0", 18),
            ("I2C", 17),
            ("SWD", 13),
            ("FLASH", 12),
            ("CRC", 10),
            ("FTM2", 7),
            ("FTM1", 6),
            ("FTM0", 5),
            ("PIT", 1),
            ("RTC", 0),
        ],
    );

    RegisterFile::new(DoubleWord)
        .with_register(SRSID, srsid)
        .with_register(SOPT, sopt)
        .with_register(PINSEL, pinsel)
        .with_register(SCGC, scgc)
        .with_register(
            UUIDL,
            Register::new("SIM_UUIDL", DoubleWord).with_field(
                Field::value("UUIDL", 0, 32)
                    .read_only()
                    .provided_by(Hook::UniqueIdLow),
            ),
        )
        .with_register(
            UUIDH,
            Register::new("SIM_UUIDH", DoubleWord).with_field(
                Field::value("UUIDH", 0, 32)
                    .read_only()
                    .provided_by(Hook::UniqueIdHigh),
            ),
        )
        .with_register(
            BUSDIV,
            Register::new("SIM_BUSDIV", DoubleWord).with_flag(0, "BUSDIV"),
        )
}

impl Sim {
    pub fn new(unique_id: UniqueId) -> Self {
        let regs = registers();
        debug_assert!(regs.validate().is_ok());
        Self { regs, unique_id }
    }

    pub fn with_source(source: &mut dyn IdentifierSource) -> Self {
        Self::new(UniqueId::from_source(source))
    }

    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }

    /// Clock gate of UART `index` (0..=2).
    pub fn uart_clock_gate(&self, index: u8) -> bool {
        index < 3 && self.regs.flag(FieldSpan::flag(SCGC, UART0_GATE.shift + index))
    }

    pub fn bus_divider_enabled(&self) -> bool {
        self.regs.flag(BUSDIV_FLAG)
    }
}

impl NativeAccess for Sim {
    fn native_width(&self) -> AccessWidth {
        self.regs.native_width()
    }

    fn native_size(&self) -> u64 {
        self.regs.size()
    }

    fn read_native(&mut self, offset: u64) -> SimResult<u32> {
        let id = self.unique_id;
        self.regs.read(offset, |tag, _| match tag {
            Hook::BusReference => 0,
            Hook::UniqueIdLow => id.low,
            Hook::UniqueIdHigh => id.high,
        })
    }

    fn write_native(&mut self, offset: u64, value: u32) -> SimResult<()> {
        self.regs.write(offset, value).map(|_| ())
    }

    fn peek_native(&self, offset: u64) -> SimResult<u32> {
        self.regs.peek(offset)
    }
}

impl crate::Peripheral for Sim {
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
            "unique_id": serde_json::to_value(self.unique_id).unwrap_or(serde_json::Value::Null),
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
    fn test_register_map() {
        let sim = Sim::new(UniqueId::new(1, 2));
        assert_eq!(sim.size(), 28);
        assert!(sim.regs.validate().is_ok());
    }

    #[test]
    fn test_identification_reads_zero() {
        let mut sim = Sim::new(UniqueId::default());
        sim.write(0x0, AccessWidth::DoubleWord, 0xFFFF_FFFF).unwrap();
        assert_eq!(sim.read(0x0, AccessWidth::DoubleWord).unwrap(), 0);
        sim.write(0x4, AccessWidth::DoubleWord, 0xFF00_0300).unwrap();
        assert_eq!(sim.read(0x4, AccessWidth::DoubleWord).unwrap(), 0);
    }

    #[test]
    fn test_bus_reference_reads_zero() {
        let mut sim = Sim::new(UniqueId::default());
        sim.write(0x4, AccessWidth::DoubleWord, 0x0007_0000).unwrap();
        assert_eq!(sim.read(0x4, AccessWidth::DoubleWord).unwrap(), 0);
        assert_eq!(sim.read(0x6, AccessWidth::Byte).unwrap(), 0);
    }

    #[test]
    fn test_unique_id_registers() {
        let mut sim = Sim::new(UniqueId::new(0xCAFE_F00D, 0x1234_5678));
        assert_eq!(sim.read(0x10, AccessWidth::DoubleWord).unwrap(), 0x1234_5678);
        assert_eq!(sim.read(0x14, AccessWidth::DoubleWord).unwrap(), 0xCAFE_F00D);
        assert_eq!(sim.read(0x15, AccessWidth::Byte).unwrap(), 0xF0);
        sim.write(0x10, AccessWidth::DoubleWord, 0).unwrap();
        assert_eq!(sim.read(0x10, AccessWidth::DoubleWord).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_with_source_draws_high_then_low() {
        let mut source = SeededIds::new(7);
        let first = source.next_id();
        let second = source.next_id();
        let sim = Sim::with_source(&mut SeededIds::new(7));
        assert_eq!(sim.unique_id(), UniqueId::new(first, second));
    }

    #[test]
    fn test_seeded_ids_are_deterministic() {
        let a = UniqueId::from_source(&mut SeededIds::new(42));
        let b = UniqueId::from_source(&mut SeededIds::new(42));
        let c = UniqueId::from_source(&mut SeededIds::new(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.high, a.low);
    }

    #[test]
    fn test_clock_gates_store_and_reset() {
        let mut sim = Sim::new(UniqueId::default());
        sim.write(0xC, AccessWidth::DoubleWord, 1 << 21).unwrap();
        assert!(!sim.uart_clock_gate(0));
        assert!(sim.uart_clock_gate(1));
        assert!(!sim.uart_clock_gate(3));
        sim.write(0x18, AccessWidth::Byte, 0x01).unwrap();
        assert!(sim.bus_divider_enabled());
        sim.reset();
        assert!(!sim.uart_clock_gate(1));
        assert!(!sim.bus_divider_enabled());
    }

    proptest! {
        #[test]
        fn test_reserved_bits_read_zero(values in vec(any::<u32>(), 16)) {
            let mut dev = Sim::new(UniqueId::new(0x1234_5678, 0x9ABC_DEF0));
            let declared = dev.regs.declared_bits();
            prop_assert_eq!(leaked_reserved_bits(&mut dev, &declared, &values), None);
        }
    }
}
