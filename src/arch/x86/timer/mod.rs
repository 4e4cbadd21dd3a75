/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! x86 timer implementation.
//!
//! This single-CPU core drives its scheduling quantum off the legacy PIT; there is no APIC to
//! calibrate against and no HPET detection to perform.

use crate::config;

pub mod pit;

/// Initializes the timer used to drive preemption, at the frequency named by
/// [`config::TIMER_FREQUENCY`].
pub(crate) fn init() {
	pit::init(config::TIMER_FREQUENCY as u32);
}
