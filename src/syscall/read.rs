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

//! The read syscall reads from an open file descriptor through [`vfs`].

use crate::{
	errno::{EResult, Errno},
	process::scheduler,
	vfs,
};
use core::{cmp::min, ffi::c_int};

#[macros::syscall]
pub fn read(fd: c_int, buf: *mut u8, count: usize) -> EResult<i64> {
	let len = min(count, isize::MAX as usize);
	if len == 0 {
		return Ok(0);
	}
	scheduler::with_current(|task| {
		if fd < 0 || fd as usize >= task.file_table.len() {
			return Err(Errno::EBADF);
		}
		let file = task.file_table[fd as usize].as_mut().ok_or(Errno::EBADF)?;
		let slice = unsafe { core::slice::from_raw_parts_mut(buf, len) };
		let n = vfs::read(file, slice)?;
		Ok(n as i64)
	})
	.ok_or(Errno::ESRCH)?
}
