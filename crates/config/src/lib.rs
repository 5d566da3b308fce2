// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_board_name() -> String {
    "frdm-ke02z".to_string()
}

fn default_bus_clock_hz() -> u32 {
    16_000_000
}

fn default_true() -> bool {
    true
}

/// SysTick has a 24-bit counter.
pub const SYSTICK_MAX_LIMIT: u64 = 0x00FF_FFFF;
/// WDOG CNTH:CNTL exposes 16 bits.
pub const WDOG_MAX_LIMIT: u64 = 0xFFFF;
/// One hour of virtual time per `advance` step.
pub const MAX_ADVANCE_US: u64 = 3_600_000_000;

/// Width of a single bus access as written in scenario files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSize {
    #[default]
    #[serde(alias = "u8")]
    Byte,
    #[serde(alias = "u16", alias = "halfword")]
    Word,
    #[serde(alias = "u32", alias = "dword")]
    DoubleWord,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    pub base_address: u64,
    #[serde(default)]
    pub irq: Option<u32>,
    pub frequency_hz: u32,
    pub limit: u64,
}

impl TimerConfig {
    pub fn systick() -> Self {
        Self {
            base_address: 0xE000_E010,
            irq: Some(15),
            frequency_hz: 1000,
            limit: 0x00FF_FFFF,
        }
    }

    pub fn wdog() -> Self {
        Self {
            base_address: 0x4005_2000,
            irq: Some(44),
            frequency_hz: 250,
            limit: 0xFFFF,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UartConfig {
    pub id: String,
    pub base_address: u64,
    #[serde(default)]
    pub irq: Option<u32>,
    #[serde(default)]
    pub tx_watermark: u32,
    #[serde(default)]
    pub rx_watermark: u32,
    #[serde(default = "default_true")]
    pub echo_stdout: bool,
}

impl UartConfig {
    pub fn new(id: &str, base_address: u64, irq: u32) -> Self {
        Self {
            id: id.to_string(),
            base_address,
            irq: Some(irq),
            tx_watermark: 0,
            rx_watermark: 0,
            echo_stdout: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct UniqueIdConfig {
    pub high: u32,
    pub low: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub base_address: u64,
    /// Fixed unique ID. When absent the ID is derived from `id_seed`.
    #[serde(default)]
    pub unique_id: Option<UniqueIdConfig>,
    #[serde(default)]
    pub id_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_address: 0x4004_8000,
            unique_id: None,
            id_seed: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BankConfig {
    pub base_address: u64,
}

fn default_ics() -> BankConfig {
    BankConfig {
        base_address: 0x4006_4000,
    }
}

fn default_osc() -> BankConfig {
    BankConfig {
        base_address: 0x4006_5000,
    }
}

fn default_uarts() -> Vec<UartConfig> {
    vec![
        UartConfig::new("uart0", 0x4006_A000, 28),
        UartConfig::new("uart1", 0x4006_B000, 29),
        UartConfig::new("uart2", 0x4006_C000, 30),
    ]
}

/// Board description: where each KE02Z peripheral lives and how its timers are clocked.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_board_name")]
    pub name: String,
    /// Bus clock used for the (decorative) UART baud rate computation.
    #[serde(default = "default_bus_clock_hz")]
    pub bus_clock_hz: u32,
    #[serde(default = "TimerConfig::systick")]
    pub systick: TimerConfig,
    #[serde(default = "TimerConfig::wdog")]
    pub wdog: TimerConfig,
    #[serde(default = "default_uarts")]
    pub uarts: Vec<UartConfig>,
    #[serde(default = "default_ics")]
    pub ics: BankConfig,
    #[serde(default = "default_osc")]
    pub osc: BankConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: default_board_name(),
            bus_clock_hz: default_bus_clock_hz(),
            systick: TimerConfig::systick(),
            wdog: TimerConfig::wdog(),
            uarts: default_uarts(),
            ics: default_ics(),
            osc: default_osc(),
            sim: SimConfig::default(),
        }
    }
}

impl BoardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read board config at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Board Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        for (name, timer, max_limit) in [
            ("systick", &self.systick, SYSTICK_MAX_LIMIT),
            ("wdog", &self.wdog, WDOG_MAX_LIMIT),
        ] {
            if timer.frequency_hz == 0 {
                anyhow::bail!("Timer '{}' must have a non-zero frequency_hz", name);
            }
            if timer.limit == 0 || timer.limit > max_limit {
                anyhow::bail!(
                    "Timer '{}' limit {:#x} is outside 1..={:#x}",
                    name,
                    timer.limit,
                    max_limit
                );
            }
        }

        for (i, uart) in self.uarts.iter().enumerate() {
            if uart.id.trim().is_empty() {
                anyhow::bail!("UART #{} has an empty id", i);
            }
            if self.uarts[..i].iter().any(|u| u.id == uart.id) {
                anyhow::bail!("Duplicate UART id '{}'", uart.id);
            }
            if uart.rx_watermark == 0 {
                tracing::debug!(
                    "UART '{}' uses rx_watermark 0; RDRF reads as set even when empty",
                    uart.id
                );
            }
        }

        Ok(())
    }
}

/// A scripted bus or host action driven against a board.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStep {
    Write {
        address: u64,
        value: u32,
        #[serde(default)]
        width: AccessSize,
    },
    Read {
        address: u64,
        #[serde(default)]
        width: AccessSize,
        #[serde(default)]
        expect: Option<u32>,
        #[serde(default)]
        mask: Option<u32>,
    },
    /// Advance the virtual clock.
    Advance { micros: u64 },
    /// Host side: bytes arriving on a UART's receive line.
    Receive { uart: String, data: String },
    /// Host side: full machine reset.
    Reset,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
    /// UART to check; any UART when absent.
    #[serde(default)]
    pub uart: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResetCountAssertion {
    pub reset_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScenarioAssertion {
    UartContains(UartContainsAssertion),
    ResetCount(ResetCountAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub board: Option<String>,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<ScenarioStep>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.steps.is_empty() {
            anyhow::bail!("Scenario '{}' has no steps", self.name);
        }

        for (i, step) in self.steps.iter().enumerate() {
            if let ScenarioStep::Read {
                expect: None,
                mask: Some(_),
                ..
            } = step
            {
                anyhow::bail!("Step #{}: 'mask' requires 'expect'", i);
            }
            if let ScenarioStep::Advance { micros } = step {
                if *micros > MAX_ADVANCE_US {
                    anyhow::bail!(
                        "Step #{}: advance of {} us exceeds the {} us per-step maximum",
                        i,
                        micros,
                        MAX_ADVANCE_US
                    );
                }
            }
        }

        Ok(())
    }
}
