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

//! The wait syscall blocks until a child exits, writing its packed status through `status_out`
//! and returning its PID. Fails with [`Errno::ECHILD`] immediately if the caller has no children.

use crate::{errno::EResult, process::scheduler};

#[macros::syscall]
pub fn wait(status_out: *mut i32) -> EResult<i64> {
	let (pid, status) = scheduler::wait()?;
	if !status_out.is_null() {
		unsafe {
			*status_out = status;
		}
	}
	Ok(pid as i64)
}
