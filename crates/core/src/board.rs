// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The KE02Z peripheral set wired to a bus, a virtual clock and a reset line.

use crate::bus::{lock, SystemBus};
use crate::clock::VirtualClock;
use crate::interrupt::PendingInterrupts;
use crate::peripherals::ics::Ics;
use crate::peripherals::osc::Osc;
use crate::peripherals::sim::{SeededIds, Sim, UniqueId};
use crate::peripherals::systick::SysTick;
use crate::peripherals::uart::Uart;
use crate::peripherals::wdog::Watchdog;
use crate::signals::{ResetLine, ResetRequester};
use crate::{AccessWidth, SimResult};
use anyhow::Context;
use kinetis_config::BoardConfig;
use std::sync::{Arc, Mutex};

/// Virtual time between checks of the reset line.
const RESET_POLL_US: u64 = 1_000;

pub struct Board {
    pub name: String,
    bus: SystemBus,
    clock: VirtualClock,
    reset_line: ResetLine,
    interrupts: PendingInterrupts,
    uart_sinks: Vec<(String, Arc<Mutex<Vec<u8>>>)>,
    reset_count: u64,
}

impl Board {
    pub fn from_config(config: &BoardConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let reset_line = ResetLine::new();
        let requester: Arc<dyn ResetRequester> = Arc::new(reset_line.clone());
        let mut bus = SystemBus::new();
        let mut clock = VirtualClock::new();

        let systick = bus
            .add(
                "systick",
                config.systick.base_address,
                config.systick.irq,
                Box::new(SysTick::from_config(&config.systick, requester.clone())),
            )
            .context("Failed to map SysTick")?;
        clock.register("systick", systick);

        let wdog = bus
            .add(
                "wdog",
                config.wdog.base_address,
                config.wdog.irq,
                Box::new(Watchdog::from_config(&config.wdog, requester)),
            )
            .context("Failed to map watchdog")?;
        clock.register("wdog", wdog);

        let mut uart_sinks = Vec::new();
        for uart in &config.uarts {
            bus.add(
                &uart.id,
                uart.base_address,
                uart.irq,
                Box::new(Uart::from_config(uart, config.bus_clock_hz)),
            )
            .with_context(|| format!("Failed to map UART '{}'", uart.id))?;
            let sink = Arc::new(Mutex::new(Vec::new()));
            bus.attach_uart_tx_sink(&uart.id, sink.clone(), uart.echo_stdout);
            uart_sinks.push((uart.id.clone(), sink));
        }

        bus.add("ics", config.ics.base_address, None, Box::new(Ics::new()))
            .context("Failed to map ICS")?;
        bus.add("osc", config.osc.base_address, None, Box::new(Osc::new()))
            .context("Failed to map OSC")?;

        let sim = match config.sim.unique_id {
            Some(id) => Sim::new(UniqueId::from(id)),
            None => Sim::with_source(&mut SeededIds::new(config.sim.id_seed)),
        };
        bus.add("sim", config.sim.base_address, None, Box::new(sim))
            .context("Failed to map SIM")?;

        tracing::info!(
            "Board '{}' ready with {} peripherals",
            config.name,
            bus.peripherals.len()
        );

        Ok(Self {
            name: config.name.clone(),
            bus,
            clock,
            reset_line,
            interrupts: PendingInterrupts::new(),
            uart_sinks,
            reset_count: 0,
        })
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn read(&mut self, addr: u64, width: AccessWidth) -> SimResult<u32> {
        let value = self.bus.read(addr, width)?;
        self.sync_interrupts();
        Ok(value)
    }

    pub fn write(&mut self, addr: u64, width: AccessWidth, value: u32) -> SimResult<()> {
        self.bus.write(addr, width, value)?;
        self.sync_interrupts();
        Ok(())
    }

    /// Host side: bytes arriving on the receive line of `uart`.
    pub fn receive(&mut self, uart: &str, data: &[u8]) -> anyhow::Result<()> {
        let entry = self
            .bus
            .find(uart)
            .with_context(|| format!("No peripheral named '{}'", uart))?;
        {
            let mut dev = lock(&entry.dev);
            let Some(uart_dev) = dev.as_any_mut().and_then(|a| a.downcast_mut::<Uart>()) else {
                anyhow::bail!("Peripheral '{}' is not a UART", uart);
            };
            for &b in data {
                uart_dev.receive_byte(b);
            }
        }
        self.sync_interrupts();
        Ok(())
    }

    /// Advances virtual time, performing a machine reset whenever a peripheral
    /// requests one. Returns the number of resets performed.
    pub fn advance(&mut self, micros: u64) -> u64 {
        let mut left = micros;
        let mut resets = 0;
        while left > 0 {
            let slice = left.min(RESET_POLL_US);
            self.clock.advance(slice);
            left -= slice;
            self.sync_interrupts();
            if self.reset_line.take() > 0 {
                self.reset();
                resets += 1;
            }
        }
        resets
    }

    /// Full machine reset: every peripheral returns to its reset state.
    pub fn reset(&mut self) {
        tracing::info!("Resetting board '{}'", self.name);
        self.bus.reset_all();
        self.clock.clear_carry();
        self.interrupts.clear();
        self.reset_count += 1;
    }

    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    pub fn elapsed_us(&self) -> u64 {
        self.clock.now_us()
    }

    pub fn uart_output(&self, uart: &str) -> Option<Vec<u8>> {
        self.uart_sinks
            .iter()
            .find(|(id, _)| id == uart)
            .map(|(_, sink)| sink.lock().map(|g| g.clone()).unwrap_or_default())
    }

    pub fn uart_ids(&self) -> impl Iterator<Item = &str> {
        self.uart_sinks.iter().map(|(id, _)| id.as_str())
    }

    pub fn pending_interrupts(&self) -> Vec<u32> {
        self.interrupts.pending()
    }

    /// Runs `f` against the named peripheral if it is a `P`.
    pub fn with_peripheral<P: 'static, R>(&self, name: &str, f: impl FnOnce(&P) -> R) -> Option<R> {
        let entry = self.bus.find(name)?;
        let dev = lock(&entry.dev);
        let p = dev.as_any()?.downcast_ref::<P>()?;
        Some(f(p))
    }

    pub fn with_peripheral_mut<P: 'static, R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut P) -> R,
    ) -> Option<R> {
        let entry = self.bus.find(name)?;
        let mut dev = lock(&entry.dev);
        let p = dev.as_any_mut()?.downcast_mut::<P>()?;
        Some(f(p))
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "elapsed_us": self.clock.now_us(),
            "reset_count": self.reset_count,
            "pending_irqs": self.interrupts.pending(),
            "peripherals": self.bus.snapshot(),
        })
    }

    fn sync_interrupts(&mut self) {
        let signalled = self.bus.signal_interrupts(&self.interrupts);
        if !signalled.is_empty() {
            tracing::trace!("IRQs pending: {:?}", signalled);
        }
    }
}
