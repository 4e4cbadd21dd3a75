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

//! The execve syscall replaces the calling task's image with a program read through [`vfs`].
//!
//! The program loader (ELF parsing, region swap, argv/envp stack layout) lives outside this
//! crate; this entry point resolves `path` and hands off, which with no backend mounted always
//! fails with `ENOENT`.

use crate::{errno::EResult, vfs};
use core::ffi::c_char;

#[macros::syscall]
pub fn execve(pathname: *const c_char, _argv: *const *const c_char, _envp: *const *const c_char) -> EResult<i64> {
	let path = unsafe { super::read_cstr(pathname) };
	vfs::namei(path)?;
	// A resolved node would be handed to the program loader here; none is wired into this
	// core, so resolution failure (the only outcome with no backend mounted) is the only path.
	Ok(0)
}
