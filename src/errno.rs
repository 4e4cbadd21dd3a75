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

//! Error codes returned by kernel operations that can fail in an expected way: a missing file, a
//! bad file descriptor, an interrupted syscall, and so on.
//!
//! [`Errno`] only covers the subset of the UNIX errno space this core and its neighbors (VFS,
//! syscall plane) actually produce or consume. [`EResult`] is the crate-wide `Result` alias built
//! on it; [`AllocResult`] narrows failure to allocation exhaustion for code paths (the heap, the
//! frame allocator) that cannot fail any other way.

use core::alloc::AllocError;
use core::fmt;

/// An error code, named after its libc constant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum Errno {
	/// Operation not permitted.
	EPERM = 1,
	/// No such file or directory.
	ENOENT = 2,
	/// No such process.
	ESRCH = 3,
	/// Interrupted system call.
	EINTR = 4,
	/// I/O error.
	EIO = 5,
	/// Argument list too long.
	E2BIG = 7,
	/// Out of memory.
	ENOMEM = 12,
	/// Permission denied.
	EACCES = 13,
	/// Bad address.
	EFAULT = 14,
	/// Device or resource busy.
	EBUSY = 16,
	/// File exists.
	EEXIST = 17,
	/// Cross-device link.
	EXDEV = 18,
	/// Not a directory.
	ENOTDIR = 20,
	/// Is a directory.
	EISDIR = 21,
	/// Invalid argument.
	EINVAL = 22,
	/// Too many open files in system.
	ENFILE = 23,
	/// Too many open files.
	EMFILE = 24,
	/// No space left on device.
	ENOSPC = 28,
	/// Illegal seek.
	ESPIPE = 29,
	/// Read-only filesystem.
	EROFS = 30,
	/// Too many links.
	EMLINK = 31,
	/// Numerical argument out of domain.
	EDOM = 33,
	/// Numerical result out of range.
	ERANGE = 34,
	/// Resource temporarily unavailable.
	EAGAIN = 35,
	/// Bad file descriptor.
	EBADF = 9,
	/// File name too long.
	ENAMETOOLONG = 36,
	/// Function not implemented.
	ENOSYS = 38,
	/// Directory not empty.
	ENOTEMPTY = 39,
	/// No child processes.
	ECHILD = 10,
	/// Value too large to be stored in data type.
	EOVERFLOW = 75,
}

impl Errno {
	/// Returns the value the syscall plane reports to userspace on failure (`-errno`).
	pub fn as_neg(self) -> isize {
		-(self as i32 as isize)
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{self:?}")
	}
}

impl From<AllocError> for Errno {
	fn from(_: AllocError) -> Self {
		Self::ENOMEM
	}
}

/// Constructs an [`Errno`] at the call site, mirroring the teacher's `errno!` macro.
#[macro_export]
macro_rules! errno {
	($variant:ident) => {
		$crate::errno::Errno::$variant
	};
}

/// The crate's standard result type: a meaningful syscall-level failure.
pub type EResult<T> = Result<T, Errno>;

/// The crate's allocation-only result type: the operation cannot fail except by running out of
/// bound memory.
pub type AllocResult<T> = Result<T, AllocError>;
