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

//! The fork syscall duplicates the calling task. The parent observes the child's PID as its
//! return value; the child observes `0`, via [`scheduler::fork`] zeroing its saved `rax`.

use crate::{errno::EResult, process::scheduler};

#[macros::syscall]
pub fn fork() -> EResult<i64> {
	let pid = scheduler::fork()?;
	Ok(pid as i64)
}
