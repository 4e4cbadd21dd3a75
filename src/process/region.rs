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

//! A region (C5) is a typed, contiguous virtual range owned by a task: code, read-only data,
//! read-write data, heap or stack. It maps, unmaps and copies itself through [`vmm`], the only
//! layer it talks to.
//!
//! `vaddr`/`paddr` are `Option` rather than null pointers/zero, one per the three ways
//! [`map`](Region::map) can be asked to place a region: pick a free vaddr, map a chosen vaddr to
//! a fresh paddr, or re-map a vaddr that already has a paddr assigned (used to reinstall a region
//! copy into a different address space).

use crate::{
	config::PAGE_SIZE,
	errno::EResult,
	memory::{PhysAddr, VirtAddr, frame, vmm, vmm::Attr},
};

/// What a region is used for. Determines the attribute set applied on map.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
	/// Runnable code: read + execute, not writable.
	Code,
	/// Read-only data: read only, not executable.
	Rdonly,
	/// Read/write data: not executable.
	Data,
	/// Heap memory: not executable.
	Heap,
	/// Program stack: not executable.
	Stack,
}

impl Kind {
	/// Returns the mapping attributes for this region type, before the VMA's `USER` bit (if any)
	/// is ORed in.
	fn attr(self) -> Attr {
		match self {
			Kind::Code => Attr::RDONLY,
			Kind::Rdonly => Attr::RDONLY | Attr::NO_EXEC,
			Kind::Data | Kind::Heap | Kind::Stack => Attr::NO_EXEC,
		}
	}

	/// Returns a human-readable name, as the source's `region_name` did.
	pub fn name(self) -> &'static str {
		match self {
			Kind::Code => "CODE",
			Kind::Rdonly => "READ_ONLY",
			Kind::Data => "DATA",
			Kind::Heap => "HEAP",
			Kind::Stack => "STACK",
		}
	}
}

/// Which half of the address space a region lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Vma {
	/// The per-task user half.
	User,
	/// The shared kernel half.
	Kernel,
}

/// A typed, contiguous virtual memory region owned by a task.
pub struct Region {
	kind: Kind,
	vma: Vma,
	vaddr: Option<VirtAddr>,
	paddr: Option<PhysAddr>,
	num: usize,
}

impl Region {
	/// Creates an unmapped region description. `vaddr`, if given, pins the virtual address used
	/// on the next [`map`](Self::map) instead of letting the VMM pick a free one.
	pub fn new(kind: Kind, vma: Vma, vaddr: Option<VirtAddr>, num: usize) -> Self {
		Self {
			kind,
			vma,
			vaddr,
			paddr: None,
			num,
		}
	}

	/// This region's type.
	pub fn kind(&self) -> Kind {
		self.kind
	}

	/// The VMA this region lives in.
	pub fn vma(&self) -> Vma {
		self.vma
	}

	/// This region's virtual start address, if it has been mapped (or pinned at construction).
	pub fn vaddr(&self) -> Option<VirtAddr> {
		self.vaddr
	}

	/// This region's physical start address, if it has been mapped.
	pub fn paddr(&self) -> Option<PhysAddr> {
		self.paddr
	}

	/// The number of pages in this region.
	pub fn num(&self) -> usize {
		self.num
	}

	/// Returns the full mapping attributes for this region: its type's attribute set, `REUSE`
	/// (regions are routinely remapped into a different address space without first unmapping),
	/// and `USER` if it lives in the user VMA.
	fn attr(&self) -> Attr {
		let mut attr = self.kind.attr() | Attr::REUSE;
		if self.vma == Vma::User {
			attr |= Attr::USER;
		}
		attr
	}

	/// Maps this region into the current address space, choosing among the three shapes the
	/// source's `region_map` offered depending on which of `vaddr`/`paddr` are already set:
	/// - Neither set: let the VMM pick a free vaddr and fresh frames ([`vmm::map`]).
	/// - `vaddr` set, `paddr` unset: map the chosen vaddr to fresh frames ([`vmm::map_vaddr`]).
	/// - Both set: re-map the known paddr back to the known vaddr ([`vmm::map_exact`]), used when
	///   reinstalling a [`copy`](Self::copy) into a new address space.
	pub fn map(&mut self) -> EResult<()> {
		let attr = self.attr() | Attr::SAVE;
		let vaddr = match (self.vaddr, self.paddr) {
			(None, _) => {
				let vaddr = vmm::map(self.num, 0, attr)?;
				self.paddr = vmm::resolve(vaddr);
				vaddr
			}
			(Some(vaddr), None) => {
				let vaddr = vmm::map_vaddr(vaddr, self.num, 0, attr)?;
				self.paddr = vmm::resolve(vaddr);
				vaddr
			}
			(Some(vaddr), Some(paddr)) => vmm::map_exact(paddr, vaddr, self.num, attr)?,
		};
		self.vaddr = Some(vaddr);
		Ok(())
	}

	/// Unmaps this region from the current address space. The underlying frames are not
	/// released: the region itself owns them (via [`frame::free`] on drop), matching the source's
	/// use of `VMM_ATTR_SAVE` on unmap.
	pub fn unmap(&self) {
		if let Some(vaddr) = self.vaddr {
			vmm::unmap(vaddr, self.num, Attr::SAVE);
		}
	}

	/// Duplicates this region's contents into a fresh set of physical frames, mapped at a
	/// scratch vaddr in the *current* address space just long enough to `memcpy`.
	///
	/// The returned region keeps the same `vaddr`/type/VMA as `self` but owns new physical
	/// frames; the caller is expected to [`map`](Self::map) it into the target address space
	/// (typically after switching to it) to actually install the copy.
	pub fn copy(&self) -> EResult<Self> {
		let src = self.vaddr.expect("cannot copy an unmapped region");
		let scratch = vmm::map(self.num, 0, Attr::empty())?;
		unsafe {
			core::ptr::copy_nonoverlapping(
				src.as_ptr::<u8>(),
				scratch.as_ptr::<u8>(),
				self.num * PAGE_SIZE,
			);
		}
		let paddr = vmm::resolve(scratch);
		vmm::unmap(scratch, self.num, Attr::SAVE);
		Ok(Self {
			kind: self.kind,
			vma: self.vma,
			vaddr: Some(src),
			paddr,
			num: self.num,
		})
	}
}

impl Drop for Region {
	/// Releases the physical frames this region owns, mirroring the source's `region_free`
	/// freeing `paddr` directly rather than going through an unmap.
	fn drop(&mut self) {
		if let Some(paddr) = self.paddr {
			frame::free(paddr, self.num);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn code_region_is_readonly_not_noexec() {
		let attr = Kind::Code.attr();
		assert!(attr.contains(Attr::RDONLY));
		assert!(!attr.contains(Attr::NO_EXEC));
	}

	#[test_case]
	fn data_region_is_writable_and_noexec() {
		let attr = Kind::Data.attr();
		assert!(!attr.contains(Attr::RDONLY));
		assert!(attr.contains(Attr::NO_EXEC));
	}

	#[test_case]
	fn user_region_carries_user_attr() {
		let region = Region::new(Kind::Heap, Vma::User, None, 1);
		assert!(region.attr().contains(Attr::USER));
	}
}
