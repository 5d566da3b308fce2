// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod board;
pub mod bus;
pub mod clock;
pub mod interrupt;
pub mod peripherals;
pub mod registers;
pub mod scenario;
pub mod signals;
pub mod timer;

use std::any::Any;

pub use registers::access::AccessWidth;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("{width:?} access at offset {offset:#x} is outside the register file")]
    OutOfRange { offset: u64, width: AccessWidth },
    #[error("{width:?} access at offset {offset:#x} straddles a register boundary")]
    Unaligned { offset: u64, width: AccessWidth },
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeripheralTickResult {
    /// The peripheral's timer reached its limit during this tick.
    pub expired: bool,
}

/// Trait representing a memory-mapped peripheral.
///
/// Offsets are relative to the peripheral base. Accesses that do not fit inside
/// [`Peripheral::size`] fail with [`SimulationError::OutOfRange`].
pub trait Peripheral: std::fmt::Debug + Send {
    /// Declared size in bytes: highest register offset plus its width.
    fn size(&self) -> u64;
    fn read(&mut self, offset: u64, width: AccessWidth) -> SimResult<u32>;
    fn write(&mut self, offset: u64, width: AccessWidth, value: u32) -> SimResult<()>;
    fn reset(&mut self);

    /// Rate at which the host clock should call [`Peripheral::tick`].
    fn tick_frequency(&self) -> Option<u32> {
        None
    }
    fn tick(&mut self) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    fn interrupt_line(&self) -> Option<&signals::InterruptLine> {
        None
    }
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
