// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Bit-field register files.
//!
//! A [`RegisterFile`] maps byte offsets to fixed-width [`Register`]s, each made of
//! non-overlapping [`Field`]s. Fields carry a peripheral-defined tag in their
//! [`FieldBehavior`]: the file reports write effects back to the caller and asks
//! the caller for provided values on reads, so peripherals dispatch side effects
//! with a plain `match`.

pub mod access;

use crate::{AccessWidth, SimResult, SimulationError};
use std::collections::BTreeMap;
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("fields '{first}' and '{second}' overlap in register '{register}'")]
    Overlap {
        register: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("field '{field}' does not fit in register '{register}'")]
    OutOfWidth {
        register: &'static str,
        field: &'static str,
    },
    #[error("register '{register}' at {offset:#x} does not match the native access width")]
    WidthMismatch { register: &'static str, offset: u64 },
    #[error("register '{register}' at {offset:#x} overlaps its neighbour")]
    OffsetOverlap { register: &'static str, offset: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Side-effect hook of a field, tagged with a peripheral-specific value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldBehavior<T> {
    None,
    /// Reported from [`RegisterFile::write`] after the bits are stored.
    WriteEffect(T),
    /// Asked for on every read to compute the returned bits.
    ReadProvider(T),
    /// Both of the above, with the same tag.
    Duplex(T),
}

impl<T: Copy> FieldBehavior<T> {
    fn write_tag(&self) -> Option<T> {
        match *self {
            FieldBehavior::WriteEffect(t) | FieldBehavior::Duplex(t) => Some(t),
            _ => None,
        }
    }

    fn read_tag(&self) -> Option<T> {
        match *self {
            FieldBehavior::ReadProvider(t) | FieldBehavior::Duplex(t) => Some(t),
            _ => None,
        }
    }
}

/// Location of a field inside a register file, used to read stored field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpan {
    pub offset: u64,
    pub shift: u8,
    pub width: u8,
}

impl FieldSpan {
    pub const fn flag(offset: u64, bit: u8) -> Self {
        Self {
            offset,
            shift: bit,
            width: 1,
        }
    }

    pub const fn bits(offset: u64, shift: u8, width: u8) -> Self {
        Self {
            offset,
            shift,
            width,
        }
    }

    pub const fn extract(&self, register_value: u32) -> u32 {
        (register_value >> self.shift) & low_mask(self.width)
    }
}

const fn low_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

#[derive(Debug, Clone)]
pub struct Field<T> {
    pub name: &'static str,
    pub shift: u8,
    pub width: u8,
    pub mode: FieldMode,
    pub behavior: FieldBehavior<T>,
    pub reset: u32,
    /// Known to the device but not modeled; writes are only logged.
    pub tagged: bool,
}

impl<T> Field<T> {
    pub fn flag(name: &'static str, bit: u8) -> Self {
        Self::value(name, bit, 1)
    }

    pub fn value(name: &'static str, shift: u8, width: u8) -> Self {
        Self {
            name,
            shift,
            width,
            mode: FieldMode::ReadWrite,
            behavior: FieldBehavior::None,
            reset: 0,
            tagged: false,
        }
    }

    pub fn tag(name: &'static str, shift: u8, width: u8) -> Self {
        Self {
            tagged: true,
            ..Self::value(name, shift, width)
        }
    }

    pub fn read_only(mut self) -> Self {
        self.mode = FieldMode::ReadOnly;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.mode = FieldMode::WriteOnly;
        self
    }

    pub fn reset(mut self, value: u32) -> Self {
        self.reset = value & low_mask(self.width);
        self
    }

    pub fn on_write(mut self, tag: T) -> Self {
        self.behavior = FieldBehavior::WriteEffect(tag);
        self
    }

    pub fn provided_by(mut self, tag: T) -> Self {
        self.behavior = FieldBehavior::ReadProvider(tag);
        self
    }

    pub fn duplex(mut self, tag: T) -> Self {
        self.behavior = FieldBehavior::Duplex(tag);
        self
    }

    fn mask(&self) -> u32 {
        low_mask(self.width) << self.shift
    }
}

/// A write side effect reported by [`RegisterFile::write`].
///
/// For field effects `old`/`new` are the field values; for register-level effects
/// they are the whole register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldWrite<T> {
    pub tag: T,
    pub old: u32,
    pub new: u32,
}

#[derive(Debug, Clone)]
pub struct Register<T> {
    name: &'static str,
    width: AccessWidth,
    fields: Vec<Field<T>>,
    on_write: Option<T>,
    value: u32,
}

impl<T: Copy + Debug> Register<T> {
    pub fn new(name: &'static str, width: AccessWidth) -> Self {
        Self {
            name,
            width,
            fields: Vec::new(),
            on_write: None,
            value: 0,
        }
    }

    pub fn with_field(mut self, field: Field<T>) -> Self {
        debug_assert!(
            u32::from(field.shift) + u32::from(field.width) <= self.width.bits(),
            "field {}.{} does not fit",
            self.name,
            field.name
        );
        let pos = self
            .fields
            .iter()
            .position(|f| f.shift > field.shift)
            .unwrap_or(self.fields.len());
        self.fields.insert(pos, field);
        self.value = self.reset_value();
        self
    }

    pub fn with_flag(self, bit: u8, name: &'static str) -> Self {
        self.with_field(Field::flag(name, bit))
    }

    pub fn with_value(self, shift: u8, width: u8, name: &'static str) -> Self {
        self.with_field(Field::value(name, shift, width))
    }

    pub fn with_tag(self, name: &'static str, shift: u8, width: u8) -> Self {
        self.with_field(Field::tag(name, shift, width))
    }

    pub fn with_tagged_flag(self, name: &'static str, bit: u8) -> Self {
        self.with_field(Field::tag(name, bit, 1))
    }

    /// Register-level effect, reported after every write to this register.
    pub fn with_write_effect(mut self, tag: T) -> Self {
        self.on_write = Some(tag);
        self
    }

    pub fn reset_value(&self) -> u32 {
        self.fields
            .iter()
            .fold(0, |acc, f| acc | ((f.reset << f.shift) & f.mask()))
    }

    fn validate(&self) -> Result<(), RegisterError> {
        let mut covered = 0u32;
        for (i, field) in self.fields.iter().enumerate() {
            if u32::from(field.shift) + u32::from(field.width) > self.width.bits() {
                return Err(RegisterError::OutOfWidth {
                    register: self.name,
                    field: field.name,
                });
            }
            if covered & field.mask() != 0 {
                let first = self.fields[..i]
                    .iter()
                    .find(|f| f.mask() & field.mask() != 0)
                    .map_or("?", |f| f.name);
                return Err(RegisterError::Overlap {
                    register: self.name,
                    first,
                    second: field.name,
                });
            }
            covered |= field.mask();
        }
        Ok(())
    }
}

/// Offset-indexed collection of registers sharing one native access width.
#[derive(Debug, Clone)]
pub struct RegisterFile<T> {
    native: AccessWidth,
    registers: BTreeMap<u64, Register<T>>,
}

impl<T: Copy + Debug> RegisterFile<T> {
    pub fn new(native: AccessWidth) -> Self {
        Self {
            native,
            registers: BTreeMap::new(),
        }
    }

    pub fn with_register(mut self, offset: u64, register: Register<T>) -> Self {
        debug_assert_eq!(register.width, self.native, "register {}", register.name);
        self.registers.insert(offset, register);
        self
    }

    pub fn native_width(&self) -> AccessWidth {
        self.native
    }

    /// Highest register offset plus its width.
    pub fn size(&self) -> u64 {
        self.registers
            .iter()
            .next_back()
            .map_or(0, |(offset, reg)| offset + reg.width.bytes())
    }

    pub fn validate(&self) -> Result<(), RegisterError> {
        let mut next_free = 0u64;
        for (&offset, reg) in &self.registers {
            if reg.width != self.native {
                return Err(RegisterError::WidthMismatch {
                    register: reg.name,
                    offset,
                });
            }
            if offset < next_free {
                return Err(RegisterError::OffsetOverlap {
                    register: reg.name,
                    offset,
                });
            }
            next_free = offset + reg.width.bytes();
            reg.validate()?;
        }
        Ok(())
    }

    fn lookup(&self, offset: u64) -> SimResult<&Register<T>> {
        self.registers
            .get(&offset)
            .ok_or(SimulationError::OutOfRange {
                offset,
                width: self.native,
            })
    }

    /// Reads the register at `offset`, asking `provide` for every field that has a
    /// value provider. `provide` receives the stored field value.
    pub fn read(&self, offset: u64, mut provide: impl FnMut(T, u32) -> u32) -> SimResult<u32> {
        let reg = self.lookup(offset)?;
        let mut value = 0u32;
        for field in &reg.fields {
            let stored = (reg.value >> field.shift) & low_mask(field.width);
            let bits = if let Some(tag) = field.behavior.read_tag() {
                provide(tag, stored)
            } else if field.mode == FieldMode::WriteOnly {
                0
            } else {
                stored
            };
            value |= (bits & low_mask(field.width)) << field.shift;
        }
        tracing::trace!("{} read -> {:#x}", reg.name, value);
        Ok(value)
    }

    /// Writes `value` through field decoding and returns the effects to apply, in
    /// ascending bit order followed by the register-level effect.
    pub fn write(&mut self, offset: u64, value: u32) -> SimResult<Vec<FieldWrite<T>>> {
        let native = self.native;
        let reg = self
            .registers
            .get_mut(&offset)
            .ok_or(SimulationError::OutOfRange {
                offset,
                width: native,
            })?;

        let old_value = reg.value;
        let mut new_value = old_value;
        let mut effects = Vec::new();

        for field in &reg.fields {
            let old = (old_value >> field.shift) & low_mask(field.width);
            let new = (value >> field.shift) & low_mask(field.width);

            if field.mode == FieldMode::ReadOnly {
                if field.tagged && new != old {
                    tracing::debug!(
                        "{}.{}: ignoring write of {:#x} to read-only tagged field",
                        reg.name,
                        field.name,
                        new
                    );
                }
                continue;
            }

            if field.tagged && new != old {
                tracing::debug!(
                    "{}.{}: unhandled write of {:#x} to tagged field",
                    reg.name,
                    field.name,
                    new
                );
            }

            new_value = (new_value & !field.mask()) | (new << field.shift);
            if let Some(tag) = field.behavior.write_tag() {
                effects.push(FieldWrite { tag, old, new });
            }
        }

        reg.value = new_value;
        if let Some(tag) = reg.on_write {
            effects.push(FieldWrite {
                tag,
                old: old_value,
                new: new_value,
            });
        }

        tracing::trace!("{} write {:#x} -> {:#x}", reg.name, value, new_value);
        Ok(effects)
    }

    /// Stored register value, without consulting value providers.
    pub fn peek(&self, offset: u64) -> SimResult<u32> {
        self.lookup(offset).map(|reg| reg.value)
    }

    /// Stores a raw register value, bypassing field decoding. No effects are
    /// reported.
    pub fn poke(&mut self, offset: u64, value: u32) -> SimResult<()> {
        let native = self.native;
        let reg = self
            .registers
            .get_mut(&offset)
            .ok_or(SimulationError::OutOfRange {
                offset,
                width: native,
            })?;
        reg.value = value & reg.width.mask();
        Ok(())
    }

    /// Stored value of a field. Unknown offsets read as zero.
    pub fn bits(&self, span: FieldSpan) -> u32 {
        self.registers
            .get(&span.offset)
            .map_or(0, |reg| span.extract(reg.value))
    }

    pub fn flag(&self, span: FieldSpan) -> bool {
        self.bits(span) != 0
    }

    /// Offset and union of field masks of every register.
    #[cfg(test)]
    pub(crate) fn declared_bits(&self) -> Vec<(u64, u32)> {
        self.registers
            .iter()
            .map(|(offset, reg)| (*offset, reg.fields.iter().fold(0, |m, f| m | f.mask())))
            .collect()
    }

    /// Restores every field to its declared reset value. No effects are reported.
    pub fn reset(&mut self) {
        for reg in self.registers.values_mut() {
            reg.value = reg.reset_value();
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .registers
            .values()
            .map(|reg| (reg.name.to_string(), serde_json::Value::from(reg.value)))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Writes `values` to the registers of `declared` in turn and returns the first
/// offset, with the value read back, that has bits set outside its declared fields.
#[cfg(test)]
pub(crate) fn leaked_reserved_bits<A: access::NativeAccess>(
    dev: &mut A,
    declared: &[(u64, u32)],
    values: &[u32],
) -> Option<(u64, u32)> {
    let native = dev.native_width().mask();
    for (&(offset, mask), value) in declared.iter().zip(values) {
        dev.write_native(offset, value & native).unwrap();
        let read = dev.read_native(offset).unwrap();
        if read & !mask != 0 {
            return Some((offset, read));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Hook {
        Enable,
        Status,
        Control,
    }

    fn file() -> RegisterFile<Hook> {
        RegisterFile::new(AccessWidth::Byte)
            .with_register(
                0x0,
                Register::new("CTRL", AccessWidth::Byte)
                    .with_field(Field::flag("EN", 7).on_write(Hook::Enable).reset(1))
                    .with_value(4, 2, "MODE")
                    .with_tagged_flag("DBG", 2)
                    .with_field(Field::flag("KEY", 0).write_only()),
            )
            .with_register(
                0x1,
                Register::new("STAT", AccessWidth::Byte)
                    .with_field(Field::flag("READY", 7).read_only().provided_by(Hook::Status))
                    .with_field(Field::tag("ERR", 0, 2).read_only().reset(0b10)),
            )
            .with_register(
                0x2,
                Register::new("AUX", AccessWidth::Byte)
                    .with_value(0, 8, "DATA")
                    .with_write_effect(Hook::Control),
            )
    }

    #[test]
    fn test_reset_values_compose() {
        let regs = file();
        assert!(regs.validate().is_ok());
        assert_eq!(regs.peek(0x0).unwrap(), 0x80);
        assert_eq!(regs.peek(0x1).unwrap(), 0x02);
        assert_eq!(regs.size(), 3);
    }

    #[test]
    fn test_reserved_bits_read_zero_and_ignore_writes() {
        let mut regs = file();
        // Bits 6, 3 and 1 of CTRL are reserved.
        regs.write(0x0, 0xFF).unwrap();
        let value = regs.read(0x0, |_, stored| stored).unwrap();
        assert_eq!(value & 0b0100_1010, 0);
        assert_eq!(value, 0b1011_0100);
    }

    #[test]
    fn test_write_only_field_reads_zero() {
        let mut regs = file();
        regs.write(0x0, 0x01).unwrap();
        assert_eq!(regs.peek(0x0).unwrap() & 0x01, 0x01);
        assert_eq!(regs.read(0x0, |_, s| s).unwrap() & 0x01, 0);
    }

    #[test]
    fn test_read_only_field_ignores_writes() {
        let mut regs = file();
        regs.write(0x1, 0x81).unwrap();
        assert_eq!(regs.peek(0x1).unwrap(), 0x02);
    }

    #[test]
    fn test_provider_supplies_value() {
        let regs = file();
        let mut asked = Vec::new();
        let value = regs
            .read(0x1, |tag, stored| {
                asked.push((tag, stored));
                1
            })
            .unwrap();
        assert_eq!(value, 0x82);
        assert_eq!(asked, vec![(Hook::Status, 0)]);
    }

    #[test]
    fn test_effects_report_old_and_new() {
        let mut regs = file();
        let effects = regs.write(0x0, 0x00).unwrap();
        assert_eq!(
            effects,
            vec![FieldWrite {
                tag: Hook::Enable,
                old: 1,
                new: 0
            }]
        );
        // Effects fire on every write, changed or not.
        let effects = regs.write(0x0, 0x00).unwrap();
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_register_level_effect() {
        let mut regs = file();
        let effects = regs.write(0x2, 0x5A).unwrap();
        assert_eq!(
            effects,
            vec![FieldWrite {
                tag: Hook::Control,
                old: 0,
                new: 0x5A
            }]
        );
    }

    #[test]
    fn test_reset_restores_declared_values() {
        let mut regs = file();
        regs.write(0x0, 0x30).unwrap();
        regs.write(0x2, 0x11).unwrap();
        regs.reset();
        assert_eq!(regs.bits(FieldSpan::flag(0x0, 7)), 1);
        assert_eq!(regs.bits(FieldSpan::bits(0x0, 4, 2)), 0);
        assert_eq!(regs.peek(0x2).unwrap(), 0);
    }

    #[test]
    fn test_unknown_offset_is_out_of_range() {
        let mut regs = file();
        assert_eq!(
            regs.read(0x7, |_, s| s),
            Err(SimulationError::OutOfRange {
                offset: 0x7,
                width: AccessWidth::Byte
            })
        );
        assert!(regs.write(0x7, 0).is_err());
    }

    #[test]
    fn test_overlap_detected() {
        let mut reg: Register<Hook> = Register::new("BAD", AccessWidth::Byte).with_value(0, 4, "LO");
        // Bypass the builder ordering check by pushing directly.
        reg.fields.push(Field::value("HI", 2, 4));
        let regs = RegisterFile::new(AccessWidth::Byte).with_register(0, reg);
        assert_eq!(
            regs.validate(),
            Err(RegisterError::Overlap {
                register: "BAD",
                first: "LO",
                second: "HI"
            })
        );
    }
}
