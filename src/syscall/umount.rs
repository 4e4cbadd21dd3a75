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

//! The umount syscall detaches whatever filesystem is mounted at a target path, through [`vfs`].

use crate::{
	errno::{EResult, Errno},
	vfs,
};
use core::ffi::c_char;

#[macros::syscall]
pub fn umount(target: *const c_char) -> EResult<i64> {
	if target.is_null() {
		return Err(Errno::EINVAL);
	}
	let target = unsafe { super::read_cstr(target) };
	vfs::umount(target)?;
	Ok(0)
}
