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

//! PID allocation.
//!
//! Unlike a bitmap allocator recycling freed IDs, this core assigns PIDs by scanning the active
//! task queue for the current maximum and handing out one past it. IDs are never reused: a PID
//! only goes away with the task that held it, and the kernel panics rather than wrap back into
//! the space of a PID that might still be referenced by a stale `ppid`/waitq entry.

use crate::config;

/// Type representing a task ID. Unique among every active task.
pub type Pid = i32;

/// The maximum possible PID. Exhausting this space is a kernel panic, not a recoverable error.
pub const PID_MAX: Pid = config::PID_MAX as Pid;

/// Special PID for the idle task.
pub const IDLE_PID: Pid = 0;
/// PID of the init task.
pub const INIT_PID: Pid = 1;

/// Returns the next PID to assign, given an iterator over the PIDs of every currently active
/// task.
///
/// This is one past the greatest PID in use. Panics if the active queue is empty (there is
/// always at least the idle task) or if the result would reach [`PID_MAX`].
pub fn next_pid<I: Iterator<Item = Pid>>(active: I) -> Pid {
	let max = active.max().expect("active task queue is empty");
	let next = max.checked_add(1).expect("PID space exhausted");
	assert!(next < PID_MAX, "PID space exhausted");
	next
}
