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

//! The close syscall releases a file descriptor from the calling task's file table.

use crate::{
	errno::{EResult, Errno},
	process::scheduler,
	vfs,
};
use core::ffi::c_int;

#[macros::syscall]
pub fn close(fd: c_int) -> EResult<i64> {
	scheduler::with_current(|task| {
		if fd < 0 || fd as usize >= task.file_table.len() {
			return Err(Errno::EBADF);
		}
		let file = task.file_table[fd as usize].take().ok_or(Errno::EBADF)?;
		vfs::close(file)?;
		if fd as usize + 1 == task.fd_last {
			task.fd_last = task.file_table[..fd as usize]
				.iter()
				.rposition(Option::is_some)
				.map(|i| i + 1)
				.unwrap_or(0);
		}
		Ok(0)
	})
	.ok_or(Errno::ESRCH)?
}
