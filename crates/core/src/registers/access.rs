// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Width adaptation between bus accesses and a peripheral's native register width.
//!
//! Wider-than-native accesses are split into consecutive native accesses, most
//! significant part at the lowest offset. Narrower-than-native accesses address a
//! little-endian byte lane of the containing register.

use crate::{SimResult, SimulationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessWidth {
    Byte,
    Word,
    DoubleWord,
}

impl AccessWidth {
    pub const fn bytes(self) -> u64 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Word => 2,
            AccessWidth::DoubleWord => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }

    pub const fn mask(self) -> u32 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Word => 0xFFFF,
            AccessWidth::DoubleWord => 0xFFFF_FFFF,
        }
    }
}

impl From<kinetis_config::AccessSize> for AccessWidth {
    fn from(size: kinetis_config::AccessSize) -> Self {
        match size {
            kinetis_config::AccessSize::Byte => AccessWidth::Byte,
            kinetis_config::AccessSize::Word => AccessWidth::Word,
            kinetis_config::AccessSize::DoubleWord => AccessWidth::DoubleWord,
        }
    }
}

/// Native-width register access of a peripheral; every call runs the side
/// effects of exactly one register.
pub trait NativeAccess {
    fn native_width(&self) -> AccessWidth;
    fn native_size(&self) -> u64;
    fn read_native(&mut self, offset: u64) -> SimResult<u32>;
    fn write_native(&mut self, offset: u64, value: u32) -> SimResult<()>;
    /// Stored register value, with no side effects.
    fn peek_native(&self, offset: u64) -> SimResult<u32>;
}

fn check_bounds(size: u64, offset: u64, width: AccessWidth) -> SimResult<()> {
    match offset.checked_add(width.bytes()) {
        Some(end) if end <= size => Ok(()),
        _ => Err(SimulationError::OutOfRange { offset, width }),
    }
}

/// Splits a narrow access into the containing register offset and lane shift.
fn lane(native: AccessWidth, offset: u64, width: AccessWidth) -> SimResult<(u64, u32)> {
    let base = offset - offset % native.bytes();
    let within = offset - base;
    if within + width.bytes() > native.bytes() {
        return Err(SimulationError::Unaligned { offset, width });
    }
    Ok((base, (within * 8) as u32))
}

pub fn read<A: NativeAccess + ?Sized>(dev: &mut A, offset: u64, width: AccessWidth) -> SimResult<u32> {
    check_bounds(dev.native_size(), offset, width)?;
    let native = dev.native_width();

    if width == native {
        return dev.read_native(offset);
    }

    if width.bytes() > native.bytes() {
        let mut value = 0u32;
        let mut at = offset;
        while at < offset + width.bytes() {
            value = (value << native.bits()) | (dev.read_native(at)? & native.mask());
            at += native.bytes();
        }
        return Ok(value);
    }

    let (base, shift) = lane(native, offset, width)?;
    Ok((dev.read_native(base)? >> shift) & width.mask())
}

pub fn write<A: NativeAccess + ?Sized>(
    dev: &mut A,
    offset: u64,
    width: AccessWidth,
    value: u32,
) -> SimResult<()> {
    check_bounds(dev.native_size(), offset, width)?;
    let native = dev.native_width();
    let value = value & width.mask();

    if width == native {
        return dev.write_native(offset, value);
    }

    if width.bytes() > native.bytes() {
        let parts = width.bytes() / native.bytes();
        for i in 0..parts {
            let shift = native.bits() * (parts - 1 - i) as u32;
            let part = (value >> shift) & native.mask();
            dev.write_native(offset + i * native.bytes(), part)?;
        }
        return Ok(());
    }

    let (base, shift) = lane(native, offset, width)?;
    let stored = dev.peek_native(base)?;
    let mask = width.mask() << shift;
    dev.write_native(base, (stored & !mask) | (value << shift))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every native access so ordering can be checked.
    #[derive(Debug)]
    struct Recorder {
        native: AccessWidth,
        mem: Vec<u32>,
        log: Vec<(char, u64, u32)>,
    }

    impl Recorder {
        fn new(native: AccessWidth, regs: usize) -> Self {
            Self {
                native,
                mem: vec![0; regs],
                log: Vec::new(),
            }
        }

        fn index(&self, offset: u64) -> usize {
            (offset / self.native.bytes()) as usize
        }
    }

    impl NativeAccess for Recorder {
        fn native_width(&self) -> AccessWidth {
            self.native
        }

        fn native_size(&self) -> u64 {
            self.mem.len() as u64 * self.native.bytes()
        }

        fn read_native(&mut self, offset: u64) -> SimResult<u32> {
            let v = self.mem[self.index(offset)];
            self.log.push(('r', offset, v));
            Ok(v)
        }

        fn write_native(&mut self, offset: u64, value: u32) -> SimResult<()> {
            let i = self.index(offset);
            self.mem[i] = value;
            self.log.push(('w', offset, value));
            Ok(())
        }

        fn peek_native(&self, offset: u64) -> SimResult<u32> {
            Ok(self.mem[self.index(offset)])
        }
    }

    #[test]
    fn test_wide_write_is_big_endian_in_address_order() {
        let mut dev = Recorder::new(AccessWidth::Byte, 8);
        write(&mut dev, 2, AccessWidth::Word, 0xABCD).unwrap();
        assert_eq!(dev.log, vec![('w', 2, 0xAB), ('w', 3, 0xCD)]);

        dev.log.clear();
        write(&mut dev, 4, AccessWidth::DoubleWord, 0x1122_3344).unwrap();
        assert_eq!(
            dev.log,
            vec![('w', 4, 0x11), ('w', 5, 0x22), ('w', 6, 0x33), ('w', 7, 0x44)]
        );
    }

    #[test]
    fn test_wide_round_trip() {
        let mut dev = Recorder::new(AccessWidth::Byte, 4);
        for v in [0x0000, 0x00FF, 0xFF00, 0x1234, 0xFFFF] {
            write(&mut dev, 1, AccessWidth::Word, v).unwrap();
            assert_eq!(read(&mut dev, 1, AccessWidth::Word).unwrap(), v);
        }
    }

    #[test]
    fn test_wide_read_issues_one_access_per_byte() {
        let mut dev = Recorder::new(AccessWidth::Byte, 4);
        dev.mem = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let v = read(&mut dev, 0, AccessWidth::DoubleWord).unwrap();
        assert_eq!(v, 0xDEAD_BEEF);
        assert_eq!(dev.log.len(), 4);
        assert_eq!(dev.log[0].1, 0);
        assert_eq!(dev.log[3].1, 3);
    }

    #[test]
    fn test_narrow_access_uses_little_endian_lanes() {
        let mut dev = Recorder::new(AccessWidth::DoubleWord, 2);
        dev.mem[1] = 0x1122_3344;
        assert_eq!(read(&mut dev, 4, AccessWidth::Byte).unwrap(), 0x44);
        assert_eq!(read(&mut dev, 7, AccessWidth::Byte).unwrap(), 0x11);
        assert_eq!(read(&mut dev, 6, AccessWidth::Word).unwrap(), 0x1122);

        write(&mut dev, 5, AccessWidth::Byte, 0xAA).unwrap();
        assert_eq!(dev.mem[1], 0x1122_AA44);
    }

    #[test]
    fn test_narrow_access_cannot_straddle_registers() {
        let mut dev = Recorder::new(AccessWidth::DoubleWord, 2);
        assert_eq!(
            read(&mut dev, 3, AccessWidth::Word),
            Err(SimulationError::Unaligned {
                offset: 3,
                width: AccessWidth::Word
            })
        );
    }

    #[test]
    fn test_access_past_size_is_out_of_range() {
        let mut dev = Recorder::new(AccessWidth::Byte, 8);
        assert_eq!(
            write(&mut dev, 7, AccessWidth::Word, 0),
            Err(SimulationError::OutOfRange {
                offset: 7,
                width: AccessWidth::Word
            })
        );
        assert!(dev.log.is_empty());
    }
}
