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

//! The exit syscall terminates the calling task with the given status code. It never returns.

use crate::{errno::EResult, process::scheduler};
use core::ffi::c_int;

#[macros::syscall]
pub fn exit(code: c_int) -> EResult<i64> {
	scheduler::exit(code as _)?;
	unreachable!("exit does not return to its caller");
}
