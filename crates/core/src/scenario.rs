// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Scripted bus traffic against a [`Board`].

use crate::board::Board;
use crate::AccessWidth;
use anyhow::Context;
use kinetis_config::{Scenario, ScenarioAssertion, ScenarioStep};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadRecord {
    pub step: usize,
    pub address: u64,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssertionResult {
    pub description: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub board: String,
    pub status: String,
    pub steps_executed: usize,
    pub elapsed_us: u64,
    pub reset_count: u64,
    pub reads: Vec<ReadRecord>,
    pub failures: Vec<String>,
    pub assertions: Vec<AssertionResult>,
    pub uart_output: BTreeMap<String, String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.assertions.iter().all(|a| a.passed)
    }
}

/// Executes every step, then evaluates the assertions.
///
/// Read mismatches are recorded as failures; bus faults abort the run with an
/// error.
pub fn run(board: &mut Board, scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
    let mut reads = Vec::new();
    let mut failures = Vec::new();

    for (i, step) in scenario.steps.iter().enumerate() {
        tracing::debug!("Step #{}: {:?}", i, step);
        match step {
            ScenarioStep::Write {
                address,
                value,
                width,
            } => {
                board
                    .write(*address, AccessWidth::from(*width), *value)
                    .with_context(|| format!("Step #{}: write to {:#x} failed", i, address))?;
            }
            ScenarioStep::Read {
                address,
                width,
                expect,
                mask,
            } => {
                let value = board
                    .read(*address, AccessWidth::from(*width))
                    .with_context(|| format!("Step #{}: read from {:#x} failed", i, address))?;
                reads.push(ReadRecord {
                    step: i,
                    address: *address,
                    value,
                });
                if let Some(expected) = expect {
                    let mask = mask.unwrap_or(u32::MAX);
                    if value & mask != expected & mask {
                        failures.push(format!(
                            "Step #{}: read {:#x} from {:#x}, expected {:#x} (mask {:#x})",
                            i, value, address, expected, mask
                        ));
                    }
                }
            }
            ScenarioStep::Advance { micros } => {
                board.advance(*micros);
            }
            ScenarioStep::Receive { uart, data } => {
                board
                    .receive(uart, data.as_bytes())
                    .with_context(|| format!("Step #{}: receive failed", i))?;
            }
            ScenarioStep::Reset => board.reset(),
        }
    }

    let uart_output: BTreeMap<String, String> = board
        .uart_ids()
        .map(|id| {
            let bytes = board.uart_output(id).unwrap_or_default();
            (id.to_string(), String::from_utf8_lossy(&bytes).into_owned())
        })
        .collect();

    let assertions = scenario
        .assertions
        .iter()
        .map(|assertion| evaluate(assertion, board, &uart_output))
        .collect();

    let mut report = ScenarioReport {
        name: scenario.name.clone(),
        board: board.name.clone(),
        status: String::new(),
        steps_executed: scenario.steps.len(),
        elapsed_us: board.elapsed_us(),
        reset_count: board.reset_count(),
        reads,
        failures,
        assertions,
        uart_output,
    };
    report.status = if report.passed() { "pass" } else { "fail" }.to_string();
    Ok(report)
}

fn evaluate(
    assertion: &ScenarioAssertion,
    board: &Board,
    uart_output: &BTreeMap<String, String>,
) -> AssertionResult {
    match assertion {
        ScenarioAssertion::UartContains(a) => {
            let passed = match &a.uart {
                Some(id) => uart_output
                    .get(id)
                    .is_some_and(|out| out.contains(&a.uart_contains)),
                None => uart_output.values().any(|out| out.contains(&a.uart_contains)),
            };
            AssertionResult {
                description: format!(
                    "{} contains {:?}",
                    a.uart.as_deref().unwrap_or("uart"),
                    a.uart_contains
                ),
                passed,
            }
        }
        ScenarioAssertion::ResetCount(a) => AssertionResult {
            description: format!("reset_count == {}", a.reset_count),
            passed: board.reset_count() == a.reset_count,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetis_config::BoardConfig;

    fn quiet_board() -> Board {
        let mut config = BoardConfig::default();
        for uart in &mut config.uarts {
            uart.echo_stdout = false;
        }
        Board::from_config(&config).unwrap()
    }

    #[test]
    fn test_read_mismatch_is_a_failure() {
        let scenario = Scenario::from_yaml(
            r#"
schema_version: "1.0"
name: wdog-defaults
steps:
  - read: { address: 0x40052000, expect: 0x80 }
  - read: { address: 0x40052001, expect: 0x02, mask: 0x03 }
"#,
        )
        .unwrap();
        let mut board = quiet_board();
        let report = run(&mut board, &scenario).unwrap();
        assert_eq!(report.reads.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.status, "fail");
    }

    #[test]
    fn test_unmapped_write_is_an_error() {
        let scenario = Scenario::from_yaml(
            r#"
schema_version: "1.0"
name: bad
steps:
  - write: { address: 0x10, value: 1 }
"#,
        )
        .unwrap();
        let mut board = quiet_board();
        assert!(run(&mut board, &scenario).is_err());
    }

    #[test]
    fn test_uart_assertions() {
        let scenario = Scenario::from_yaml(
            r#"
schema_version: "1.0"
name: hello
steps:
  - write: { address: 0x4006B003, value: 0x08 }
  - write: { address: 0x4006B007, value: 0x48 }
  - write: { address: 0x4006B007, value: 0x69 }
assertions:
  - uart_contains: "Hi"
  - uart_contains: "Hi"
    uart: uart0
  - reset_count: 0
"#,
        )
        .unwrap();
        let mut board = quiet_board();
        let report = run(&mut board, &scenario).unwrap();
        assert_eq!(report.uart_output["uart1"], "Hi");
        let passed: Vec<bool> = report.assertions.iter().map(|a| a.passed).collect();
        assert_eq!(passed, vec![true, false, true]);
        assert!(!report.passed());
    }
}
