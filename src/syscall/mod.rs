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

//! The syscall plane: one `int 0x80` vector, ten calls, dispatched by `rax`.
//!
//! Arguments ride in `rdi, rsi, rdx, r10, r8, r9`, the convention `macros::syscall` assumes when
//! it pulls a call's typed arguments out of an [`IntFrame`]. Each call's own module exposes a
//! single function of that shape; [`dispatch`] only has to pick the right one by `rax` and write
//! its result back into the frame.

mod close;
mod execve;
mod exit;
mod fork;
mod mount;
mod open;
mod read;
mod umount;
mod wait;
mod write;

use crate::arch::x86::idt::{self, IntFrame, Priority};
use crate::config;
use crate::errno::Errno;
use core::ffi::c_char;

/// Reads a NUL-terminated string out of user memory, up to [`config::NAME_MAX`] bytes.
///
/// # Safety
///
/// `ptr` must point to a valid, NUL-terminated byte sequence of at most `NAME_MAX` bytes.
pub(super) unsafe fn read_cstr<'a>(ptr: *const c_char) -> &'a [u8] {
	let mut len = 0;
	while len < config::NAME_MAX && unsafe { *ptr.add(len) } != 0 {
		len += 1;
	}
	unsafe { core::slice::from_raw_parts(ptr as *const u8, len) }
}

/// Registers the syscall entry point on [`idt::SYSCALL_VECTOR`].
pub fn init() {
	idt::register(idt::SYSCALL_VECTOR, Priority::First, dispatch);
}

/// Picks the call named by `frame.rax` and writes its outcome back into `frame.rax`: the return
/// value on success, `-errno` on failure.
fn dispatch(frame: &mut IntFrame) {
	let result = match frame.rax {
		0 => exit::exit(frame),
		1 => fork::fork(frame),
		2 => execve::execve(frame),
		3 => wait::wait(frame),
		4 => open::open(frame),
		5 => close::close(frame),
		6 => read::read(frame),
		7 => write::write(frame),
		8 => mount::mount(frame),
		9 => umount::umount(frame),
		_ => Err(Errno::ENOSYS),
	};
	frame.rax = match result {
		Ok(val) => val as u64,
		Err(e) => e.as_neg() as u64,
	};
}
