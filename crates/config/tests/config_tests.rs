// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use kinetis_config::{
    AccessSize, BoardConfig, Scenario, ScenarioAssertion, ScenarioStep, UniqueIdConfig,
};

#[test]
fn test_board_overrides_parse() {
    let yaml = r#"
name: "custom-ke02"
bus_clock_hz: 20000000
wdog:
  base_address: 0x40052000
  irq: 44
  frequency_hz: 1000
  limit: 32
uarts:
  - id: "uart0"
    base_address: 0x4006A000
    irq: 28
    tx_watermark: 4
    rx_watermark: 1
    echo_stdout: false
sim:
  base_address: 0x40048000
  unique_id:
    high: 0x12345678
    low: 0x9ABCDEF0
"#;
    let board = BoardConfig::from_yaml(yaml).unwrap();
    assert_eq!(board.name, "custom-ke02");
    assert_eq!(board.bus_clock_hz, 20_000_000);
    assert_eq!(board.wdog.limit, 32);
    assert_eq!(board.wdog.frequency_hz, 1000);
    // Untouched sections keep their defaults.
    assert_eq!(board.systick.frequency_hz, 1000);
    assert_eq!(board.uarts.len(), 1);
    assert_eq!(board.uarts[0].tx_watermark, 4);
    assert!(!board.uarts[0].echo_stdout);
    assert_eq!(
        board.sim.unique_id,
        Some(UniqueIdConfig {
            high: 0x1234_5678,
            low: 0x9ABC_DEF0
        })
    );
}

#[test]
fn test_scenario_parses_all_step_kinds() {
    let yaml = r#"
schema_version: "1.0"
name: "uart-echo"
steps:
  - write:
      address: 0x4006A003
      value: 0x0C
  - write:
      address: 0x4006A006
      value: 0x0041
      width: word
  - read:
      address: 0x4006A004
      expect: 0xC0
      mask: 0xC0
  - receive:
      uart: "uart0"
      data: "ok"
  - advance:
      micros: 4000
  - reset
assertions:
  - uart_contains: "A"
  - reset_count: 1
"#;
    let scenario = Scenario::from_yaml(yaml).unwrap();
    assert_eq!(scenario.steps.len(), 6);
    assert_eq!(
        scenario.steps[1],
        ScenarioStep::Write {
            address: 0x4006_A006,
            value: 0x41,
            width: AccessSize::Word
        }
    );
    assert_eq!(scenario.steps[5], ScenarioStep::Reset);
    assert!(matches!(
        scenario.assertions[1],
        ScenarioAssertion::ResetCount(ref a) if a.reset_count == 1
    ));
}

#[test]
fn test_scenario_rejects_unknown_fields() {
    let yaml = r#"
schema_version: "1.0"
name: "typo"
stepz: []
steps:
  - reset
"#;
    assert!(Scenario::from_yaml(yaml).is_err());
}

#[test]
fn test_access_size_aliases() {
    let sizes: Vec<AccessSize> = serde_yaml::from_str("[u8, halfword, dword]").unwrap();
    assert_eq!(
        sizes,
        vec![AccessSize::Byte, AccessSize::Word, AccessSize::DoubleWord]
    );
}
