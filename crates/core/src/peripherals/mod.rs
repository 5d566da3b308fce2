// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! KE02Z peripheral models.

pub mod ics;
pub mod osc;
pub mod sim;
pub mod systick;
pub mod uart;
pub mod wdog;
