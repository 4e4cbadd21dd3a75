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

//! The open syscall resolves a path through [`vfs`] and installs the resulting descriptor in the
//! calling task's file table, returning the lowest free fd.

use crate::{
	errno::{EResult, Errno},
	process::scheduler,
	vfs,
};
use core::ffi::{c_char, c_int};

#[macros::syscall]
pub fn open(pathname: *const c_char, flags: c_int, _mode: c_int) -> EResult<i64> {
	let path = unsafe { super::read_cstr(pathname) };
	let file = vfs::open(path, flags)?;
	scheduler::with_current(|task| {
		let fd = task
			.file_table
			.iter()
			.position(Option::is_none)
			.ok_or(Errno::EMFILE)?;
		task.file_table[fd] = Some(file);
		if fd >= task.fd_last {
			task.fd_last = fd + 1;
		}
		Ok(fd as i64)
	})
	.ok_or(Errno::ESRCH)?
}
