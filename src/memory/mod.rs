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

//! Memory management.
//!
//! This module is split into the four layers named by the system overview:
//! - [`frame`]: the physical frame allocator (C1)
//! - [`paging`]: the raw 4-level page table layer, recursively self-mapped (C2)
//! - [`vmm`]: the virtual memory manager sitting on top of paging (C3)
//! - [`malloc`]: the kernel heap allocator (C4)
//!
//! The system's memory is divided in two halves:
//! - Userspace: virtual memory below [`PROCESS_END`], private to the running task
//! - Kernelspace: virtual memory above [`KERNEL_BEGIN`], shared across tasks

use core::{
	fmt,
	mem::size_of,
	ops::{Add, Deref, DerefMut, Sub},
	ptr,
	ptr::NonNull,
};

pub mod frame;
pub mod malloc;
pub mod memmap;
pub mod paging;
pub mod vmm;

/// Address of the end of the virtual memory reserved to a task (the canonical-address
/// boundary).
pub const PROCESS_END: VirtAddr = VirtAddr(0x0000800000000000);
/// Address of the beginning of the kernelspace: the start of the higher half.
pub const KERNEL_BEGIN: VirtAddr = VirtAddr(0xffff800000000000);

/// An address on physical memory.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
	/// Converts the physical address to a virtual address in the kernel's direct-map window.
	///
	/// This window is used before the recursively-mapped page tables exist (early boot) and for
	/// quick physical-memory access (the frame bitmap, page table contents) afterwards; it is
	/// independent from a task's own page tables.
	pub fn kernel_to_virtual(self) -> Option<VirtAddr> {
		self.0.checked_add(KERNEL_BEGIN.0).map(VirtAddr)
	}
}

/// An address on virtual memory.
///
/// This would usually be represented by a pointer. However, in some cases we need to be able to
/// represent virtual addresses without having to dereference them.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VirtAddr(pub usize);

impl<T> From<*const T> for VirtAddr {
	fn from(ptr: *const T) -> Self {
		Self(ptr as usize)
	}
}

impl<T> From<*mut T> for VirtAddr {
	fn from(ptr: *mut T) -> Self {
		Self(ptr as usize)
	}
}

impl<T> From<NonNull<T>> for VirtAddr {
	fn from(ptr: NonNull<T>) -> Self {
		Self(ptr.as_ptr() as usize)
	}
}

impl VirtAddr {
	/// Converts the kernel virtual address (in the direct-map window) to a physical address.
	///
	/// If the address is outside the kernelspace direct-map window, the function returns `None`.
	pub fn kernel_to_physical(self) -> Option<PhysAddr> {
		self.0.checked_sub(KERNEL_BEGIN.0).map(PhysAddr)
	}

	/// Returns a mutable pointer to the virtual address.
	pub fn as_ptr<T>(self) -> *mut T {
		ptr::with_exposed_provenance_mut(self.0)
	}

	/// Tells whether the address lies in the canonical userspace half.
	pub fn is_user(self) -> bool {
		self.0 < PROCESS_END.0
	}
}

macro_rules! addr_impl {
	($name:ident) => {
		impl $name {
			/// Tells whether the pointer is null.
			pub fn is_null(self) -> bool {
				self.0 == 0
			}

			/// Tells whether the pointer is aligned to `align`.
			pub fn is_aligned_to(self, align: usize) -> bool {
				self.0 % align == 0
			}

			/// Computes and returns the next address to be aligned to `align`.
			///
			/// If `self` is already aligned, the function returns `self`.
			pub fn align_to(self, align: usize) -> Self {
				Self(self.0.next_multiple_of(align))
			}

			/// Computes and returns the previous address to be aligned to `align`.
			///
			/// If `self` is already aligned, the function returns `self`.
			pub fn down_align_to(self, align: usize) -> Self {
				Self(self.0 & !(align - 1))
			}
		}

		impl Deref for $name {
			type Target = usize;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}

		impl DerefMut for $name {
			fn deref_mut(&mut self) -> &mut Self::Target {
				&mut self.0
			}
		}

		impl Add<usize> for $name {
			type Output = Self;

			/// Adds the given offset in bytes, wrapping on overflow.
			fn add(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_add(off))
			}
		}

		impl Sub<usize> for $name {
			type Output = Self;

			/// Subtracts the given offset in bytes, wrapping on overflow.
			fn sub(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_sub(off))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
				const LEN: usize = size_of::<usize>() * 2;
				write!(fmt, "{:0LEN$x}", self.0)
			}
		}
	};
}

addr_impl!(PhysAddr);
addr_impl!(VirtAddr);

/// Converts a kernel-space pointer in the direct-map window to its physical address.
///
/// # Safety
///
/// The pointer must point into the direct-map window installed at boot (see `boot.rs`).
pub unsafe fn kern_to_phys<T>(ptr: *const T) -> PhysAddr {
	VirtAddr::from(ptr)
		.kernel_to_physical()
		.expect("pointer outside the direct-map window")
}

/// Converts a physical address to a kernel-space pointer in the direct-map window.
///
/// # Safety
///
/// The physical address must be reachable through the direct-map window installed at boot.
pub unsafe fn kern_to_virt<T>(paddr: *const T) -> *mut T {
	PhysAddr(paddr as usize)
		.kernel_to_virtual()
		.expect("physical address outside the direct-map window")
		.as_ptr()
}
