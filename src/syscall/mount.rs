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

//! The mount syscall attaches a filesystem to a mountpoint through [`vfs`].

use crate::{
	errno::{EResult, Errno},
	vfs,
};
use core::ffi::{c_char, c_int};

#[macros::syscall]
pub fn mount(
	source: *const c_char,
	target: *const c_char,
	filesystemtype: *const c_char,
	mountflags: c_int,
) -> EResult<i64> {
	if target.is_null() || (source.is_null() && filesystemtype.is_null()) {
		return Err(Errno::EINVAL);
	}
	let empty: &[u8] = b"";
	let source = if source.is_null() { empty } else { unsafe { super::read_cstr(source) } };
	let target = unsafe { super::read_cstr(target) };
	let fs = if filesystemtype.is_null() { empty } else { unsafe { super::read_cstr(filesystemtype) } };
	vfs::mount(source, target, fs, mountflags)?;
	Ok(0)
}
