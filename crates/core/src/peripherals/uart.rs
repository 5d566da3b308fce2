// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::registers::access::{self, NativeAccess};
use crate::registers::{Field, FieldSpan, FieldWrite, Register, RegisterFile};
use crate::signals::InterruptLine;
use crate::{AccessWidth, SimResult};
use bitflags::bitflags;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

const BDH: u64 = 0x0;
const BDL: u64 = 0x1;
const C1: u64 = 0x2;
const C2: u64 = 0x3;
const S1: u64 = 0x4;
const S2: u64 = 0x5;
const C3: u64 = 0x6;
const D: u64 = 0x7;

const SBR_HIGH: FieldSpan = FieldSpan::bits(BDH, 0, 5);
const SBR_LOW: FieldSpan = FieldSpan::bits(BDL, 0, 8);
const TIE: FieldSpan = FieldSpan::flag(C2, 7);
const TCIE: FieldSpan = FieldSpan::flag(C2, 6);
const RIE: FieldSpan = FieldSpan::flag(C2, 5);
const TE: FieldSpan = FieldSpan::flag(C2, 3);
const RE: FieldSpan = FieldSpan::flag(C2, 2);

pub const DEFAULT_BUS_CLOCK_HZ: u32 = 16_000_000;

bitflags! {
    /// Behavioural bits of UART_S1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartStatus: u8 {
        const TDRE = 1 << 7;
        const TC = 1 << 6;
        const RDRF = 1 << 5;
    }
}

/// Receive buffer and transmit sink shared by serial devices.
///
/// The host pushes received bytes with [`SerialBase::write_char`]; transmitted
/// bytes go to an optional capture buffer and, when enabled, to stdout.
#[derive(Debug, Default)]
pub struct SerialBase {
    rx: VecDeque<u8>,
    sink: Option<Arc<Mutex<Vec<u8>>>>,
    echo_stdout: bool,
}

impl SerialBase {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            sink: None,
            echo_stdout: true,
        }
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.sink = sink;
        self.echo_stdout = echo_stdout;
    }

    pub fn write_char(&mut self, value: u8) {
        self.rx.push_back(value);
    }

    pub fn try_get_character(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    pub fn count(&self) -> usize {
        self.rx.len()
    }

    pub fn transmit_character(&mut self, value: u8) {
        if let Some(sink) = &self.sink {
            if let Ok(mut guard) = sink.lock() {
                guard.push(value);
            }
        }

        if self.echo_stdout {
            #[allow(unused_must_use)]
            {
                print!("{}", value as char);
                io::stdout().flush();
            }
        }
    }

    pub fn reset(&mut self) {
        self.rx.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    BaudHigh,
    BaudLow,
    Control,
    TransmitEmpty,
    TransmitComplete,
    ReceiveFull,
    Data,
}

/// KE02Z UART.
///
/// Bytes written to D with TE set are queued and flushed to the serial sink once
/// the queue reaches the transmit watermark. The IRQ is a level:
/// `(TE && TIE) || (RE && RIE && rx >= rx_watermark)`.
#[derive(Debug)]
pub struct Uart {
    regs: RegisterFile<Hook>,
    tx_queue: VecDeque<u8>,
    serial: SerialBase,
    irq: InterruptLine,
    tx_watermark: usize,
    rx_watermark: usize,
    bus_clock_hz: u32,
}

fn registers() -> RegisterFile<Hook> {
    use AccessWidth::Byte;
    RegisterFile::new(Byte)
        .with_register(
            BDH,
            Register::new("UART_BDH", Byte)
                .with_tagged_flag("LBKDIE", 7)
                .with_tagged_flag("RXEDGIE", 6)
                .with_tagged_flag("SBNS", 5)
                .with_field(Field::value("SBR", 0, 5).on_write(Hook::BaudHigh)),
        )
        .with_register(
            BDL,
            Register::new("UART_BDL", Byte)
                .with_field(Field::value("SBR", 0, 8).reset(0x04).on_write(Hook::BaudLow)),
        )
        .with_register(
            C1,
            Register::new("UART_C1", Byte)
                .with_tagged_flag("LOOPS", 7)
                .with_tagged_flag("UARTSWAI", 6)
                .with_tagged_flag("RSRC", 5)
                .with_tagged_flag("M", 4)
                .with_tagged_flag("WAKE", 3)
                .with_tagged_flag("ILT", 2)
                .with_tagged_flag("PE", 1)
                .with_tagged_flag("PT", 0)
                .with_write_effect(Hook::Control),
        )
        .with_register(
            C2,
            Register::new("UART_C2", Byte)
                .with_flag(7, "TIE")
                .with_flag(6, "TCIE")
                .with_flag(5, "RIE")
                .with_tagged_flag("ILIE", 4)
                .with_flag(3, "TE")
                .with_flag(2, "RE")
                .with_tagged_flag("RWU", 1)
                .with_tagged_flag("SBK", 0)
                .with_write_effect(Hook::Control),
        )
        .with_register(
            S1,
            Register::new("UART_S1", Byte)
                .with_field(Field::flag("TDRE", 7).read_only().provided_by(Hook::TransmitEmpty))
                .with_field(Field::flag("TC", 6).read_only().provided_by(Hook::TransmitComplete))
                .with_field(Field::flag("RDRF", 5).read_only().provided_by(Hook::ReceiveFull))
                .with_field(Field::tag("IDLE", 4, 1).read_only())
                .with_field(Field::tag("OR", 3, 1).read_only())
                .with_field(Field::tag("NF", 2, 1).read_only())
                .with_field(Field::tag("FE", 1, 1).read_only()),
        )
        .with_register(
            S2,
            Register::new("UART_S2", Byte)
                .with_tagged_flag("LBKDIF", 7)
                .with_tagged_flag("RXEDGIF", 6)
                .with_tagged_flag("MSBF", 5)
                .with_tagged_flag("RXINV", 4)
                .with_tagged_flag("RWUID", 3)
                .with_tagged_flag("BRK13", 2)
                .with_tagged_flag("LBKDE", 1)
                .with_tagged_flag("RAF", 0),
        )
        .with_register(
            C3,
            Register::new("UART_C3", Byte)
                .with_tagged_flag("R8", 7)
                .with_tagged_flag("T8", 6)
                .with_tagged_flag("TXDIR", 5)
                .with_tagged_flag("TXINV", 4)
                .with_flag(3, "ORIE")
                .with_flag(2, "NEIE")
                .with_flag(1, "FEIE")
                .with_flag(0, "PEIE"),
        )
        .with_register(
            D,
            Register::new("UART_D", Byte).with_field(Field::value("D", 0, 8).duplex(Hook::Data)),
        )
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

impl Uart {
    pub fn new() -> Self {
        let regs = registers();
        debug_assert!(regs.validate().is_ok());
        Self {
            regs,
            tx_queue: VecDeque::new(),
            serial: SerialBase::new(),
            irq: InterruptLine::new(),
            tx_watermark: 0,
            rx_watermark: 0,
            bus_clock_hz: DEFAULT_BUS_CLOCK_HZ,
        }
    }

    pub fn from_config(config: &kinetis_config::UartConfig, bus_clock_hz: u32) -> Self {
        let mut uart = Self::new();
        uart.set_watermarks(config.tx_watermark as usize, config.rx_watermark as usize);
        uart.bus_clock_hz = bus_clock_hz;
        uart.serial.echo_stdout = config.echo_stdout;
        uart
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.serial.set_sink(sink, echo_stdout);
    }

    pub fn set_watermarks(&mut self, tx: usize, rx: usize) {
        self.tx_watermark = tx;
        self.rx_watermark = rx;
        self.update_interrupts();
    }

    /// Host side: a byte arrived on the RX pin.
    pub fn receive_byte(&mut self, value: u8) {
        self.serial.write_char(value);
        self.update_interrupts();
    }

    pub fn rx_count(&self) -> usize {
        self.serial.count()
    }

    pub fn tx_pending(&self) -> usize {
        self.tx_queue.len()
    }

    pub fn irq(&self) -> &InterruptLine {
        &self.irq
    }

    pub fn status(&self) -> UartStatus {
        let mut status = UartStatus::empty();
        status.set(UartStatus::TDRE, self.tx_queue.len() <= self.tx_watermark);
        status.set(UartStatus::TC, self.tx_queue.is_empty());
        status.set(UartStatus::RDRF, self.serial.count() >= self.rx_watermark);
        status
    }

    pub fn transmitter_enabled(&self) -> bool {
        self.regs.flag(TE)
    }

    pub fn receiver_enabled(&self) -> bool {
        self.regs.flag(RE)
    }

    pub fn tx_complete_irq_enabled(&self) -> bool {
        self.regs.flag(TCIE)
    }

    /// SBR divisor from BDH:BDL.
    pub fn baud_divisor(&self) -> u32 {
        (self.regs.bits(SBR_HIGH) << 8) | self.regs.bits(SBR_LOW)
    }

    /// Nominal baud rate; not used to pace transmission.
    pub fn baud_rate(&self) -> u32 {
        match self.baud_divisor() {
            0 => 0,
            sbr => self.bus_clock_hz / (sbr * 16),
        }
    }

    fn interrupt_level(&self) -> bool {
        let tx = self.regs.flag(TE) && self.regs.flag(TIE);
        let rx = self.regs.flag(RE)
            && self.regs.flag(RIE)
            && self.serial.count() >= self.rx_watermark;
        tx || rx
    }

    fn update_interrupts(&mut self) {
        let level = self.interrupt_level();
        self.irq.set(level);
    }

    /// Returns `false` when the byte was dropped.
    fn write_data(&mut self, value: u8) -> bool {
        if !self.regs.flag(TE) {
            tracing::warn!("UART: transmitter not enabled, dropping {:#04x}", value);
            return false;
        }
        self.tx_queue.push_back(value);
        self.transmit_data();
        self.update_interrupts();
        true
    }

    fn transmit_data(&mut self) {
        if self.tx_queue.len() < self.tx_watermark {
            return;
        }
        while let Some(b) = self.tx_queue.pop_front() {
            self.serial.transmit_character(b);
        }
    }

    fn apply(&mut self, effect: FieldWrite<Hook>) {
        match effect.tag {
            Hook::BaudHigh => {}
            Hook::BaudLow => {
                tracing::debug!(
                    "UART baud rate set to {} (SBR={})",
                    self.baud_rate(),
                    self.baud_divisor()
                );
            }
            Hook::Control => self.update_interrupts(),
            Hook::Data => {
                // A dropped byte leaves D as it was.
                if !self.write_data(effect.new as u8) {
                    if let Err(e) = self.regs.poke(D, effect.old) {
                        tracing::error!("UART: failed to restore D: {}", e);
                    }
                }
            }
            Hook::TransmitEmpty | Hook::TransmitComplete | Hook::ReceiveFull => {}
        }
    }
}

impl NativeAccess for Uart {
    fn native_width(&self) -> AccessWidth {
        self.regs.native_width()
    }

    fn native_size(&self) -> u64 {
        self.regs.size()
    }

    fn read_native(&mut self, offset: u64) -> SimResult<u32> {
        let status = self.status();
        let rx_enabled = self.regs.flag(RE);
        let serial = &mut self.serial;
        let mut data_read = false;

        let value = self.regs.read(offset, |tag, stored| match tag {
            Hook::TransmitEmpty => status.contains(UartStatus::TDRE) as u32,
            Hook::TransmitComplete => status.contains(UartStatus::TC) as u32,
            Hook::ReceiveFull => status.contains(UartStatus::RDRF) as u32,
            Hook::Data => {
                if !rx_enabled {
                    return 0;
                }
                data_read = true;
                match serial.try_get_character() {
                    Some(c) => u32::from(c),
                    None => {
                        tracing::warn!("UART: reading data from empty receive fifo");
                        0
                    }
                }
            }
            _ => stored,
        })?;

        if data_read {
            self.update_interrupts();
        }
        Ok(value)
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

impl crate::Peripheral for Uart {
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
        self.tx_queue.clear();
        self.regs.reset();
        self.serial.reset();
        self.update_interrupts();
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
            "tx_pending": self.tx_queue.len(),
            "rx_pending": self.serial.count(),
            "status": self.status().bits(),
            "baud_rate": self.baud_rate(),
            "irq": self.irq.is_set(),
        })
    }
}
