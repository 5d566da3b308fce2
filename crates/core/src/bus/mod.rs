// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::{InterruptBridge, InterruptController};
use crate::peripherals::uart::Uart;
use crate::{AccessWidth, Peripheral, SimResult, SimulationError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A peripheral behind its own lock. Bus accesses and clock ticks both take it.
pub type SharedPeripheral = Arc<Mutex<Box<dyn Peripheral>>>;

pub fn lock(dev: &SharedPeripheral) -> MutexGuard<'_, Box<dyn Peripheral>> {
    dev.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub irq: Option<u32>,
    pub dev: SharedPeripheral,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.size
    }
}

#[derive(Default)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `dev` at `base`, using its declared size for address decoding.
    pub fn add(
        &mut self,
        name: &str,
        base: u64,
        irq: Option<u32>,
        dev: Box<dyn Peripheral>,
    ) -> anyhow::Result<SharedPeripheral> {
        let size = dev.size();
        if size == 0 {
            anyhow::bail!("Peripheral '{}' declares no registers", name);
        }
        if self.find(name).is_some() {
            anyhow::bail!("Duplicate peripheral name '{}'", name);
        }
        if let Some(other) = self
            .peripherals
            .iter()
            .find(|p| base < p.base + p.size && p.base < base + size)
        {
            anyhow::bail!(
                "Peripheral '{}' at {:#x}..{:#x} overlaps '{}' at {:#x}..{:#x}",
                name,
                base,
                base + size,
                other.name,
                other.base,
                other.base + other.size
            );
        }

        tracing::debug!("Mapped {} at {:#x} ({} bytes)", name, base, size);
        let dev: SharedPeripheral = Arc::new(Mutex::new(dev));
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            irq,
            dev: dev.clone(),
        });
        Ok(dev)
    }

    pub fn find(&self, name: &str) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.name == name)
    }

    fn decode(&self, addr: u64) -> SimResult<&PeripheralEntry> {
        self.peripherals
            .iter()
            .find(|p| p.contains(addr))
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    pub fn read(&self, addr: u64, width: AccessWidth) -> SimResult<u32> {
        let entry = self.decode(addr)?;
        let value = lock(&entry.dev).read(addr - entry.base, width)?;
        tracing::trace!("Bus: {} read {:#x} -> {:#x}", entry.name, addr, value);
        Ok(value)
    }

    pub fn write(&self, addr: u64, width: AccessWidth, value: u32) -> SimResult<()> {
        let entry = self.decode(addr)?;
        tracing::trace!("Bus: {} write {:#x} <- {:#x}", entry.name, addr, value);
        lock(&entry.dev).write(addr - entry.base, width, value)
    }

    pub fn reset_all(&self) {
        for p in &self.peripherals {
            lock(&p.dev).reset();
        }
    }

    /// Attach a UART TX capture sink to the named UART.
    ///
    /// When `echo_stdout` is false, UART writes will no longer be printed to stdout.
    pub fn attach_uart_tx_sink(
        &self,
        name: &str,
        sink: Arc<Mutex<Vec<u8>>>,
        echo_stdout: bool,
    ) -> bool {
        let Some(entry) = self.find(name) else {
            return false;
        };
        let mut dev = lock(&entry.dev);
        let Some(uart) = dev.as_any_mut().and_then(|a| a.downcast_mut::<Uart>()) else {
            return false;
        };
        uart.set_sink(Some(sink), echo_stdout);
        true
    }

    /// Forwards every peripheral interrupt line to `controller` and returns the
    /// IRQs that were signalled.
    pub fn signal_interrupts(&self, controller: &dyn InterruptController) -> Vec<u32> {
        let bridge = InterruptBridge::new(controller);
        let mut signalled = Vec::new();
        for p in &self.peripherals {
            let Some(irq) = p.irq else {
                continue;
            };
            let dev = lock(&p.dev);
            if let Some(line) = dev.interrupt_line() {
                if bridge.update(irq, line) {
                    signalled.push(irq);
                }
            }
        }
        signalled
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .peripherals
            .iter()
            .map(|p| (p.name.clone(), lock(&p.dev).snapshot()))
            .collect();
        serde_json::Value::Object(map)
    }
}
