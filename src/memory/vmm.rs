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

//! Virtual memory manager (C3): an attribute-aware mapping API sitting on top of the raw
//! recursive page table layer in [`crate::arch::x86::paging`].
//!
//! A `Vmm` is nothing more than the physical address of a PML4: every operation here either acts
//! on the currently active one (through the recursive self-map, which only ever reaches the
//! address space loaded in `CR3`) or briefly [`sync`]s a target PML4's kernel half before
//! switching `CR3` to reach it. Free-space search is a linear scan from the bottom of the VMA —
//! simple, not fragmentation-aware, which is an explicit non-goal of this layer.

use crate::{
	arch::x86::paging::{self, FLAG_CACHE_DISABLE, FLAG_PFA_OWNED, FLAG_USER, FLAG_WRITE, FLAG_XD},
	config::PAGE_SIZE,
	errno,
	errno::EResult,
	memory::{KERNEL_BEGIN, PROCESS_END, PhysAddr, VirtAddr, frame},
	sync::IntSpin,
};

/// A virtual memory space: the physical address of its PML4.
pub type Vmm = PhysAddr;

/// First usable address of the userspace VMA.
pub const VMA_USER_START: VirtAddr = VirtAddr(PAGE_SIZE);
/// First address of the kernelspace VMA: the start of the canonical higher half.
pub const VMA_KERNEL_START: VirtAddr = KERNEL_BEGIN;

/// Attributes describing how a range should be mapped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Attr(u32);

impl Attr {
	/// The range is reachable from ring 3.
	pub const USER: Attr = Attr(1 << 0);
	/// The range cannot be executed.
	pub const NO_EXEC: Attr = Attr(1 << 1);
	/// The range is not cached.
	pub const NO_CACHE: Attr = Attr(1 << 2);
	/// The range cannot be written to.
	pub const RDONLY: Attr = Attr(1 << 3);
	/// The call may target pages that are already mapped, instead of failing.
	pub const REUSE: Attr = Attr(1 << 4);
	/// On unmap, the underlying physical frames are not returned to the frame allocator (the
	/// caller, usually [`crate::process::region`], owns them and will free them itself).
	pub const SAVE: Attr = Attr(1 << 5);

	/// No attributes set.
	pub const fn empty() -> Self {
		Attr(0)
	}

	/// Tells whether every flag of `other` is set in `self`.
	pub const fn contains(self, other: Attr) -> bool {
		self.0 & other.0 == other.0
	}
}

impl core::ops::BitOr for Attr {
	type Output = Attr;

	fn bitor(self, rhs: Attr) -> Attr {
		Attr(self.0 | rhs.0)
	}
}

impl core::ops::BitOrAssign for Attr {
	fn bitor_assign(&mut self, rhs: Attr) {
		self.0 |= rhs.0;
	}
}

/// Translates mapping attributes into leaf page table entry flags.
fn leaf_flags(attr: Attr) -> usize {
	let mut flags = FLAG_WRITE;
	if attr.contains(Attr::USER) {
		flags |= FLAG_USER;
	}
	if !attr.contains(Attr::SAVE) {
		flags |= FLAG_PFA_OWNED;
	}
	if attr.contains(Attr::NO_EXEC) {
		flags |= FLAG_XD;
	}
	if attr.contains(Attr::NO_CACHE) {
		flags |= FLAG_CACHE_DISABLE;
	}
	if attr.contains(Attr::RDONLY) {
		flags &= !FLAG_WRITE;
	}
	flags
}

/// Translates mapping attributes into the table-level flags OR'd into intermediate PDPT/PD/PT
/// entries along the walk. Only the user bit is meaningful above the leaf.
fn table_flags(attr: Attr) -> usize {
	if attr.contains(Attr::USER) {
		FLAG_USER
	} else {
		0
	}
}

/// Classifies `vaddr` as user or kernel space.
fn is_user(vaddr: VirtAddr) -> bool {
	vaddr.0 < PROCESS_END.0
}

/// Hook the scheduler installs at startup so the VMM can mark other tasks' address spaces stale
/// without this module depending back on [`crate::process::scheduler`].
static ALERT_HOOK: IntSpin<Option<fn(Vmm)>> = IntSpin::new(None);

/// Registers the callback invoked whenever a PML4-level entry is created or freed in the active
/// address space, so the scheduler can mark every task whose `vmm` differs as stale (its next
/// dispatch must [`sync`] before resuming).
pub fn set_alert_hook(hook: fn(Vmm)) {
	*ALERT_HOOK.lock() = Some(hook);
}

fn alert_tasks(vmm: Vmm) {
	if let Some(hook) = *ALERT_HOOK.lock() {
		hook(vmm);
	}
}

/// Maps `paddr` to `vaddr` with `attr`, calling into the raw layer and alerting other tasks if a
/// PML4-level entry was created.
fn map_one(vaddr: VirtAddr, paddr: PhysAddr, attr: Attr) -> EResult<()> {
	let created = paging::map_page(vaddr, paddr, leaf_flags(attr), table_flags(attr))?;
	if created {
		alert_tasks(paging::current());
	}
	Ok(())
}

/// Unmaps `vaddr`, freeing the underlying frame unless it is not PFA-owned or `attr` carries
/// [`Attr::SAVE`]. Reports (but does not fail the containing operation for) a page that was
/// already unmapped, matching the warning-tier "log and continue" error policy.
fn unmap_one(vaddr: VirtAddr, attr: Attr) {
	let Some((paddr, pfa_owned, pml4_cleared)) = paging::unmap_page(vaddr) else {
		return;
	};
	if pfa_owned && !attr.contains(Attr::SAVE) {
		frame::free(paddr, 1);
	}
	if pml4_cleared {
		alert_tasks(paging::current());
	}
}

/// Finds `num` contiguous, `align`-aligned unmapped pages starting from the bottom of the VMA
/// selected by `attr`.
///
/// A linear scan, not fragmentation-aware: the run counter resets to zero the moment a candidate
/// page turns out to already be mapped, only the start of each candidate run is alignment-checked.
fn find_contiguous(num: usize, align: usize, attr: Attr) -> EResult<VirtAddr> {
	let align = align.max(1) * PAGE_SIZE;
	let start = if attr.contains(Attr::USER) {
		VMA_USER_START
	} else {
		VMA_KERNEL_START
	};
	let mut candidate = start.align_to(align);
	let mut run = 0;
	loop {
		let page = candidate + run * PAGE_SIZE;
		if page.is_null() {
			return Err(errno!(ENOMEM));
		}
		if paging::entry_for(page).is_some() {
			run = 0;
			candidate = (page + PAGE_SIZE).align_to(align);
			continue;
		}
		run += 1;
		if run == num {
			return Ok(candidate);
		}
	}
}

/// Maps `num` fresh physical frames at a free virtual address chosen by [`find_contiguous`].
///
/// Returns the chosen virtual address.
pub fn map(num: usize, align: usize, attr: Attr) -> EResult<VirtAddr> {
	let vaddr = find_contiguous(num, align, attr)?;
	map_at(vaddr, num, attr)
}

/// Maps `num` fresh physical frames at `vaddr`, which must already be free (the caller is
/// expected to have obtained it from [`find_contiguous`] or similar).
fn map_at(vaddr: VirtAddr, num: usize, attr: Attr) -> EResult<VirtAddr> {
	for i in 0..num {
		let page = vaddr + i * PAGE_SIZE;
		let paddr = match frame::alloc(1, 1) {
			Ok(p) => p,
			Err(e) => {
				for j in 0..i {
					unmap_one(vaddr + j * PAGE_SIZE, Attr::empty());
				}
				return Err(e);
			}
		};
		if let Err(e) = map_one(page, paddr, attr) {
			frame::free(paddr, 1);
			for j in 0..i {
				unmap_one(vaddr + j * PAGE_SIZE, Attr::empty());
			}
			return Err(e);
		}
	}
	Ok(vaddr)
}

/// Maps `num` pages starting at physical address `paddr` at a free virtual address chosen by
/// [`find_contiguous`].
pub fn map_paddr(paddr: PhysAddr, num: usize, align: usize, attr: Attr) -> EResult<VirtAddr> {
	let vaddr = find_contiguous(num, align, attr)?;
	for i in 0..num {
		map_one(vaddr + i * PAGE_SIZE, paddr + i * PAGE_SIZE, attr)?;
	}
	Ok(vaddr)
}

/// Maps `num` fresh physical frames at the caller-chosen `vaddr`.
///
/// Unless `attr` carries [`Attr::REUSE`], every page in `[vaddr, vaddr + num * PAGE_SIZE)` must
/// already be unmapped, or the call fails without mapping anything.
pub fn map_vaddr(vaddr: VirtAddr, num: usize, align: usize, attr: Attr) -> EResult<VirtAddr> {
	let vaddr = vaddr.align_to(align.max(1) * PAGE_SIZE);
	if !attr.contains(Attr::REUSE) {
		for i in 0..num {
			if paging::entry_for(vaddr + i * PAGE_SIZE).is_some() {
				return Err(errno!(EEXIST));
			}
		}
	}
	map_at(vaddr, num, attr)
}

/// Maps `num` pages starting at physical address `paddr` to the caller-chosen `vaddr`.
///
/// If the first page already maps exactly to `paddr`, it is left untouched (and the remaining
/// pages are mapped starting from the second one); any other already-mapped page requires
/// [`Attr::REUSE`] to remap.
pub fn map_exact(paddr: PhysAddr, vaddr: VirtAddr, num: usize, attr: Attr) -> EResult<VirtAddr> {
	let mut i = 0;
	if num > 0 && paging::resolve(vaddr) == Some(paddr) {
		i = 1;
	}
	while i < num {
		let page = vaddr + i * PAGE_SIZE;
		if paging::entry_for(page).is_some() && !attr.contains(Attr::REUSE) {
			return Err(errno!(EEXIST));
		}
		map_one(page, paddr + i * PAGE_SIZE, attr)?;
		i += 1;
	}
	Ok(vaddr)
}

/// Unmaps `num` pages starting at `vaddr`.
///
/// Frees the underlying physical frames unless `attr` carries [`Attr::SAVE`] (and the frame was
/// actually PFA-owned to begin with). A page that is already unmapped is reported (in debug
/// builds) and skipped rather than failing the whole call.
pub fn unmap(vaddr: VirtAddr, num: usize, attr: Attr) {
	for i in 0..num {
		unmap_one(vaddr + i * PAGE_SIZE, attr);
	}
}

/// Resolves `vaddr` to the physical address it is currently mapped to, if any.
pub fn resolve(vaddr: VirtAddr) -> Option<PhysAddr> {
	paging::resolve(vaddr)
}

/// Reads which VMA `vaddr` belongs to.
pub fn vma_of(vaddr: VirtAddr) -> Attr {
	if is_user(vaddr) {
		Attr::USER
	} else {
		Attr::empty()
	}
}

/// Returns the physical address of the currently active PML4.
pub fn current() -> Vmm {
	paging::current()
}

/// Switches the active address space to `vmm`.
///
/// # Safety
///
/// `vmm` must have been produced by [`new`] (or be the boot-time kernel address space) and must
/// have had [`sync`] applied at least once since the last kernel-half mapping change.
pub unsafe fn switch(vmm: Vmm) {
	unsafe {
		paging::switch(vmm);
	}
}

/// Refreshes `vmm`'s kernel half and recursive self-map slot from the currently active address
/// space.
///
/// Temporarily maps `vmm`'s frame into the active address space, zeroes its user half, copies the
/// active PML4's kernel half into it, then fixes up its own recursive slot to point back at
/// itself (not at the address space that did the copying) before unmapping it again.
pub fn sync(vmm: Vmm) -> EResult<()> {
	let scratch = map_paddr(vmm, 1, 1, Attr::SAVE)?;
	let target: &paging::Table = unsafe { &*scratch.as_ptr() };
	let active = paging::active();
	for i in 0..paging::ENTRIES_PER_TABLE / 2 {
		target[i].store(0, core::sync::atomic::Ordering::Relaxed);
	}
	for i in paging::ENTRIES_PER_TABLE / 2..paging::ENTRIES_PER_TABLE {
		let val = active[i].load(core::sync::atomic::Ordering::Relaxed);
		target[i].store(val, core::sync::atomic::Ordering::Relaxed);
	}
	let recursive_flags = paging::FLAG_PRESENT | FLAG_WRITE;
	target[paging::RECURSIVE_INDEX].store(
		(vmm.0 & !(PAGE_SIZE - 1)) | recursive_flags,
		core::sync::atomic::Ordering::Relaxed,
	);
	unmap(scratch, 1, Attr::SAVE);
	Ok(())
}

/// Allocates a fresh address space: a new PML4 with the kernel half and recursive slot populated
/// from the currently active one.
pub fn new() -> EResult<Vmm> {
	let vmm = frame::alloc(1, 1)?;
	if let Err(e) = sync(vmm) {
		frame::free(vmm, 1);
		return Err(e);
	}
	Ok(vmm)
}

/// Releases the PML4 frame backing `vmm`.
///
/// The caller must have already unmapped and freed every region living in it (normally via
/// [`crate::process::region::free`]); this only reclaims the four-level table structure itself,
/// which [`paging::unmap_page`] already tears down as user-half mappings are removed.
pub fn free(vmm: Vmm) {
	frame::free(vmm, 1);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn leaf_flags_rdonly_clears_write() {
		let flags = leaf_flags(Attr::RDONLY);
		assert_eq!(flags & FLAG_WRITE, 0);
	}

	#[test_case]
	fn leaf_flags_save_drops_pfa_owned() {
		assert_eq!(leaf_flags(Attr::SAVE) & FLAG_PFA_OWNED, 0);
		assert_ne!(leaf_flags(Attr::empty()) & FLAG_PFA_OWNED, 0);
	}

	#[test_case]
	fn table_flags_only_cares_about_user() {
		assert_eq!(table_flags(Attr::NO_EXEC | Attr::RDONLY), 0);
		assert_ne!(table_flags(Attr::USER), 0);
	}

	#[test_case]
	fn vma_classification_matches_process_end() {
		assert_eq!(vma_of(VirtAddr(0x1000)), Attr::USER);
		assert_eq!(vma_of(KERNEL_BEGIN), Attr::empty());
	}
}
