// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use kinetis_config::BoardConfig;
use kinetis_core::board::Board;
use kinetis_core::AccessWidth;
use proptest::prelude::*;

const WDOG: u64 = 0x4005_2000;

// Byte-native peripherals of the FRDM-KE02Z layout.
const BYTE_NATIVE: &[(&str, u64, u64)] = &[
    ("wdog", WDOG, 8),
    ("uart0", 0x4006_A000, 8),
    ("ics", 0x4006_4000, 5),
];

fn quiet_board() -> Board {
    let mut config = BoardConfig::default();
    for uart in &mut config.uarts {
        uart.echo_stdout = false;
    }
    Board::from_config(&config).unwrap()
}

fn dump(board: &mut Board, base: u64, size: u64) -> Vec<u32> {
    (0..size)
        .map(|offset| board.read(base + offset, AccessWidth::Byte).unwrap())
        .collect()
}

fn wide() -> impl Strategy<Value = AccessWidth> {
    prop::sample::select(vec![AccessWidth::Word, AccessWidth::DoubleWord])
}

proptest! {
    #[test]
    fn test_wide_write_matches_msb_first_bytes(
        target in 0..BYTE_NATIVE.len(),
        seed in any::<u64>(),
        width in wide(),
        value in any::<u32>(),
    ) {
        let (name, base, size) = BYTE_NATIVE[target];
        let offset = seed % (size - width.bytes() + 1);
        let value = value & width.mask();

        let mut wide_board = quiet_board();
        let mut byte_board = quiet_board();
        wide_board.write(base + offset, width, value).unwrap();
        for i in 0..width.bytes() {
            let shift = 8 * (width.bytes() - 1 - i) as u32;
            byte_board
                .write(base + offset + i, AccessWidth::Byte, (value >> shift) & 0xFF)
                .unwrap();
        }

        prop_assert_eq!(dump(&mut wide_board, base, size), dump(&mut byte_board, base, size));
        prop_assert_eq!(wide_board.uart_output(name), byte_board.uart_output(name));

        let composed = (0..width.bytes()).fold(0u32, |acc, i| {
            (acc << 8) | byte_board.read(base + offset + i, AccessWidth::Byte).unwrap()
        });
        prop_assert_eq!(wide_board.read(base + offset, width).unwrap(), composed);
    }

    #[test]
    fn test_watchdog_timeout_and_window_round_trip(
        word in any::<u16>(),
        double_word in any::<u32>(),
        window in any::<bool>(),
    ) {
        let mut board = quiet_board();
        let offset = if window { 6 } else { 4 };
        board.write(WDOG + offset, AccessWidth::Word, u32::from(word)).unwrap();
        prop_assert_eq!(
            board.read(WDOG + offset, AccessWidth::Word).unwrap(),
            u32::from(word)
        );

        board.write(WDOG + 4, AccessWidth::DoubleWord, double_word).unwrap();
        prop_assert_eq!(board.read(WDOG + 4, AccessWidth::DoubleWord).unwrap(), double_word);
        prop_assert_eq!(
            board.read(WDOG + 4, AccessWidth::Word).unwrap(),
            double_word >> 16
        );
    }
}
