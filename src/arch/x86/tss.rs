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

//! Under the x86 architecture, the TSS (Task State Segment) is a structure that
//! is mostly deprecated but that must still be used in order to perform
//! software context switching.
//!
//! It allows to store the pointers to the stacks to use whenever an interruption happens and
//! requires switching the protection ring, and thus the stack.
//!
//! The structure has to be registered into the GDT into the TSS segment, and must be loaded using
//! instruction `ltr`.

use crate::arch::x86::gdt;
use core::{arch::asm, mem, ptr::addr_of};

/// Task State Segment.
#[repr(C, packed)]
#[allow(missing_docs)]
pub struct Tss {
	pub reserved0: u32,
	pub rsp0: u64,
	pub rsp1: u64,
	pub rsp2: u64,
	pub reserved1: u64,
	pub ist1: u64,
	pub ist2: u64,
	pub ist3: u64,
	pub ist4: u64,
	pub ist5: u64,
	pub ist6: u64,
	pub ist7: u64,
	pub reserved2: u64,
	pub reserved3: u16,
	pub iopb: u16,
}

/// The Task State Segment.
#[unsafe(no_mangle)]
static mut TSS: Tss = unsafe { mem::zeroed() };

/// The size in bytes of the IST1 stack.
const IST1_SIZE: usize = 16384;

/// A dedicated stack for every interrupt gate in [`super::idt`].
///
/// Every gate is set up with IST index 1, which forces the CPU to switch to this stack on
/// *every* entry, including ones that don't cross a privilege level. Without this, a same-ring
/// trap (the scheduler's own software interrupt, fired from ring 0) leaves `ss`/`rsp` off the
/// exception stack while a ring 3 fault pushes them, giving two different frame shapes the common
/// handler would have to detect at runtime. Forcing the switch unconditionally makes the pushed
/// frame the same size no matter where the interrupt came from.
static mut IST1_STACK: [u8; IST1_SIZE] = [0; IST1_SIZE];

/// Initializes the TSS.
pub(crate) fn init() {
	let [gdt_entry_low, gdt_entry_high] = gdt::Entry::new64(
		addr_of!(TSS) as u64,
		size_of::<Tss>() as u32 - 1,
		0b10001001,
		0,
	);
	unsafe {
		TSS.ist1 = addr_of!(IST1_STACK) as u64 + IST1_SIZE as u64;
		gdt_entry_low.update_gdt(gdt::TSS_OFFSET);
		gdt_entry_high.update_gdt(gdt::TSS_OFFSET + size_of::<gdt::Entry>());
		// Sets TSS offset
		asm!(
			"mov ax, {off}",
			"ltr ax",
			off = const gdt::TSS_OFFSET
		);
	}
}

/// Sets the kernel stack pointer on the TSS.
///
/// # Safety
///
/// This function is **not** reentrant.
pub unsafe fn set_kernel_stack(kernel_stack: *mut u8) {
	TSS.rsp0 = kernel_stack as _;
}
