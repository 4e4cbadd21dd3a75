/*
 * Copyright 2025 Luc Lenôtre
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

//! Build-time configuration utilities and kernel-wide tunables.
//!
//! The numeric limits below are not dictated by hardware; they are policy decisions that several
//! modules need to agree on (task names, file descriptor tables, signal vectors, argument
//! buffers), so they live in one place instead of being scattered as magic numbers.

/// The size of a page in bytes, on every supported target.
pub const PAGE_SIZE: usize = 4096;

/// The maximum length of a task name, not counting the null terminator.
pub const NAME_MAX: usize = 255;

/// The maximum number of open file descriptors per task.
pub const FD_MAX: usize = 256;

/// The maximum PID value. Exceeding it causes a kernel panic instead of wrapping.
pub const PID_MAX: i32 = i32::MAX;

/// The maximum number of signal numbers, bounding `sighand`.
pub const SIG_MAX: usize = 32;

/// The maximum size in bytes of the `argv` area pushed onto a new program's stack.
pub const ARG_MAX: usize = PAGE_SIZE;

/// The maximum size in bytes of the `envp` area pushed onto a new program's stack.
pub const ENV_MAX: usize = i32::MAX as usize;

/// The number of scheduler ticks granted to a task when it is dispatched, before its priority is
/// taken into account. The scheduler's `min_ticks` field scales this by priority.
pub const DEFAULT_QUANTUM: u32 = 10;

/// The frequency, in Hertz, at which the PIT raises the timer interrupt that drives the
/// scheduler.
pub const TIMER_FREQUENCY: u32 = 100;

/// Include a build-generated config constant from OUT_DIR.
#[macro_export]
macro_rules! build_cfg {
	($config_name:ident) => {{
		include!(concat!(
			env!("OUT_DIR"),
			"/",
			stringify!($config_name),
			".rs"
		))
	}};
}
