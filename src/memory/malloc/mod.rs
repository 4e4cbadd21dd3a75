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

//! The kernel heap (C4): a global allocator built on fixed-size, 32-byte chunks handed out of
//! pages obtained from the virtual memory manager.
//!
//! Free chunks form a single doubly linked, address-ordered list. Allocation walks the list
//! accumulating chunks as long as they remain *contiguous in address*, extending the heap by one
//! page through [`vmm`] whenever the list runs out; this is not general-purpose coalescing, only
//! a byte-adjacency check performed at allocation time. A chunk handed out to a caller has its
//! first 8 bytes stamped with [`chunk::MAGIC`] and the second 8 with the run's byte size, checked
//! again on free. Freeing a run re-links it into the free list in address order and merges it
//! with any now-adjacent free neighbours.

mod chunk;

use crate::{
	config::PAGE_SIZE,
	errno,
	memory::{
		malloc::chunk::{Chunk, DATA_SIZE, META_SIZE, SIZE},
		vmm,
		vmm::Attr,
	},
	sync::IntSpin,
};
use core::{
	alloc::{AllocError, GlobalAlloc, Layout},
	cmp::Ordering,
	ptr,
	ptr::NonNull,
};

/// Number of chunks that fit in a single page.
const CHUNKS_PER_PAGE: usize = PAGE_SIZE / SIZE;

/// Bookkeeping for the heap's free list, guarded by [`HEAP`].
struct Heap {
	first: Option<NonNull<Chunk>>,
	last: Option<NonNull<Chunk>>,
}

// Raw pointers are only ever touched behind `HEAP`'s lock.
unsafe impl Send for Heap {}

static HEAP: IntSpin<Heap> = IntSpin::new(Heap {
	first: None,
	last: None,
});

impl Heap {
	unsafe fn chunk(&self, ptr: NonNull<Chunk>) -> &'static mut Chunk {
		unsafe { &mut *ptr.as_ptr() }
	}

	/// Maps one fresh page and splits it into [`CHUNKS_PER_PAGE`] free chunks, appended to the
	/// tail of the free list.
	fn extend(&mut self) -> Result<(), AllocError> {
		let vaddr = vmm::map(1, 0, Attr::empty()).map_err(|_| AllocError)?;
		let base = NonNull::new(vaddr.0 as *mut Chunk).ok_or(AllocError)?;
		if self.first.is_none() {
			self.first = Some(base);
		}
		let prev_last = self.last;
		if let Some(last) = prev_last {
			unsafe {
				self.chunk(last).set_next(Some(base));
			}
		}
		let mut prev = prev_last;
		for i in 0..CHUNKS_PER_PAGE {
			let cur = unsafe { NonNull::new_unchecked(base.as_ptr().add(i)) };
			let c = unsafe { self.chunk(cur) };
			c.clear_data();
			c.set_prev(prev);
			c.set_next(None);
			prev = Some(cur);
		}
		self.last = prev;
		Ok(())
	}

	/// The lazy-extending free list iterator: `cur == None` starts at the head; when the walk
	/// would otherwise run off the tail, the heap is grown by one page first.
	fn chunk_next(&mut self, cur: Option<NonNull<Chunk>>) -> Result<NonNull<Chunk>, AllocError> {
		if self.first.is_none() {
			self.extend()?;
		}
		let Some(cur) = cur else {
			return self.first.ok_or(AllocError);
		};
		let next = unsafe { self.chunk(cur).next() };
		match next {
			Some(next) => Ok(next),
			None => {
				self.extend()?;
				unsafe { self.chunk(cur).next() }.ok_or(AllocError)
			}
		}
	}

	fn unlink(&mut self, start: NonNull<Chunk>, end: NonNull<Chunk>) {
		let before = unsafe { self.chunk(start).prev() };
		let after = unsafe { self.chunk(end).next() };
		match before {
			Some(before) => unsafe { self.chunk(before).set_next(after) },
			None => self.first = after,
		}
		match after {
			Some(after) => unsafe { self.chunk(after).set_prev(before) },
			None => self.last = before,
		}
	}

	/// Finds a contiguous run of chunks totalling at least `size` bytes, removes it from the
	/// free list and stamps it as allocated. Mirrors the original's `heap_alloc`.
	fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
		let mut start: Option<NonNull<Chunk>> = None;
		let mut end: Option<NonNull<Chunk>> = None;
		let mut total = 0usize;
		let mut cur = self.chunk_next(None)?;
		loop {
			match start {
				None => {
					total += DATA_SIZE;
					start = Some(cur);
				}
				Some(_) => {
					let contiguous = unsafe {
						end.unwrap().as_ptr().add(1) == cur.as_ptr()
					};
					if !contiguous {
						total = 0;
						start = None;
						continue;
					}
					total += SIZE;
				}
			}
			end = Some(cur);
			if total >= size {
				break;
			}
			cur = self.chunk_next(Some(cur))?;
		}
		let start = start.ok_or(AllocError)?;
		let end = end.ok_or(AllocError)?;
		self.unlink(start, end);
		unsafe {
			self.chunk(start).mark_allocated(total as u64);
		}
		Ok(Chunk::data_ptr(start))
	}

	/// Re-links a freed run into the free list in address order, and merges it with any
	/// now-adjacent free neighbours. Mirrors the original's `heap_free`.
	fn free(&mut self, start: NonNull<Chunk>, end: NonNull<Chunk>) {
		// Re-thread the run itself into a private address-ordered list.
		let mut cur = start;
		loop {
			let c = unsafe { self.chunk(cur) };
			if cur != start {
				c.set_prev(NonNull::new(unsafe { cur.as_ptr().sub(1) }));
			}
			c.set_next(NonNull::new(unsafe { cur.as_ptr().add(1) }));
			if cur == end {
				break;
			}
			cur = unsafe { NonNull::new_unchecked(cur.as_ptr().add(1)) };
		}
		unsafe {
			self.chunk(start).set_prev(None);
			self.chunk(end).set_next(None);
		}
		let (mut before, mut after) = (None, None);
		let mut cur = self.first;
		while let Some(c) = cur {
			if start.as_ptr() > c.as_ptr() {
				before = Some(c);
			}
			if after.is_none() && end.as_ptr() < c.as_ptr() {
				after = Some(c);
			}
			cur = unsafe { self.chunk(c).next() };
		}
		match before {
			Some(before) => unsafe {
				self.chunk(start).set_prev(Some(before));
				self.chunk(before).set_next(Some(start));
			},
			None => self.first = Some(start),
		}
		match after {
			Some(after) => unsafe {
				self.chunk(end).set_next(Some(after));
				self.chunk(after).set_prev(Some(end));
			},
			None => self.last = Some(end),
		}
	}
}

/// Returns the run `[start, end]` of chunks an in-use allocation of `size` bytes occupies,
/// starting at `start`.
fn run_bounds(start: NonNull<Chunk>, size: u64) -> NonNull<Chunk> {
	let extra_chunks = (size as usize - DATA_SIZE) / SIZE;
	unsafe { NonNull::new_unchecked(start.as_ptr().add(extra_chunks)) }
}

/// Allocates at least `size` bytes, returning a pointer to the start of the allocation.
///
/// Every allocation is naturally aligned to [`META_SIZE`] (16) bytes; layouts requesting a wider
/// alignment are rejected.
fn alloc(size: usize) -> Result<NonNull<u8>, AllocError> {
	let mut heap = HEAP.lock();
	heap.alloc(size)
}

/// Frees a previously allocated pointer.
///
/// # Safety
///
/// `ptr` must have been returned by [`alloc`] or [`realloc`] and not freed since.
unsafe fn free(ptr: NonNull<u8>) {
	let start = unsafe { Chunk::from_data_ptr(ptr.as_ptr()) };
	let mut heap = HEAP.lock();
	let c = unsafe { heap.chunk(start) };
	if !c.is_allocated() {
		panic!("heap: attempt to free an invalid chunk");
	}
	let size = c.size();
	let end = run_bounds(start, size);
	heap.free(start, end);
}

/// Resizes a previously allocated pointer in place when possible, falling back to a fresh
/// allocation plus copy otherwise.
///
/// # Safety
///
/// `ptr` must have been returned by [`alloc`] or [`realloc`] and not freed since.
unsafe fn realloc(ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
	let start = unsafe { Chunk::from_data_ptr(ptr.as_ptr()) };
	let mut heap = HEAP.lock();
	let c = unsafe { heap.chunk(start) };
	if !c.is_allocated() {
		panic!("heap: attempt to reallocate an invalid chunk");
	}
	let cur_size = c.size();
	if new_size as u64 <= cur_size {
		return Ok(ptr);
	}
	let cur_end = run_bounds(start, cur_size);
	// Try to extend by consuming contiguous free chunks right after the run's end.
	let mut total = cur_size;
	let mut end = cur_end;
	let mut extended_start = None;
	let mut cur = unsafe { heap.chunk(end).next() };
	let _ = cur; // placeholder to keep borrow checker happy below; real walk starts from free list
	let mut walker = heap.first;
	while (new_size as u64) > total {
		let Some(node) = walker else { break };
		walker = unsafe { heap.chunk(node).next() };
		if unsafe { end.as_ptr().add(1) } != node.as_ptr() {
			continue;
		}
		end = node;
		total += SIZE as u64;
		if extended_start.is_none() {
			extended_start = Some(end);
		}
	}
	if (new_size as u64) > total {
		drop(heap);
		let fresh = alloc(new_size)?;
		unsafe {
			ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), cur_size as usize);
			free(ptr);
		}
		return Ok(fresh);
	}
	if let Some(extended_start) = extended_start {
		heap.unlink(extended_start, end);
	}
	unsafe {
		heap.chunk(start).set_size(total);
	}
	Ok(ptr)
}

/// The kernel's global allocator, backing `alloc::{boxed::Box, vec::Vec, ...}`.
struct KernelAlloc;

unsafe impl GlobalAlloc for KernelAlloc {
	unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
		if layout.align() > META_SIZE || layout.size() == 0 {
			return ptr::null_mut();
		}
		alloc(layout.size()).map_or(ptr::null_mut(), |p| p.as_ptr())
	}

	unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
		unsafe {
			free(NonNull::new_unchecked(ptr));
		}
	}

	unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
		if layout.align() > META_SIZE {
			return ptr::null_mut();
		}
		unsafe { realloc(NonNull::new_unchecked(ptr), new_size) }
			.map_or(ptr::null_mut(), |p| p.as_ptr())
	}
}

#[global_allocator]
static ALLOCATOR: KernelAlloc = KernelAlloc;

/// Called when the global allocator fails to satisfy an infallible `alloc::` request.
#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
	panic!("heap: out of memory ({} bytes requested)", layout.size());
}

/// Allocates a zero-initialized, heap-resident `T`, for callers (the task and region allocators)
/// that want a typed, fallible path instead of going through `alloc::boxed::Box`.
pub fn alloc_zeroed<T>() -> errno::EResult<NonNull<T>> {
	let size = core::mem::size_of::<T>().max(DATA_SIZE);
	let ptr = alloc(size).map_err(|_| errno!(ENOMEM))?;
	unsafe {
		ptr::write_bytes(ptr.as_ptr(), 0, size);
	}
	Ok(ptr.cast())
}

/// Frees a value previously obtained from [`alloc_zeroed`].
///
/// # Safety
///
/// `ptr` must have come from [`alloc_zeroed`] and not have been freed since.
pub unsafe fn free_typed<T>(ptr: NonNull<T>) {
	unsafe {
		free(ptr.cast());
	}
}

fn _assert_ordering(_: Ordering) {}

#[cfg(test)]
mod test {
	use super::*;
	use core::slice;

	#[test_case]
	fn alloc_free_small() {
		unsafe {
			let ptr = alloc(1).unwrap();
			slice::from_raw_parts_mut(ptr.as_ptr(), 1).fill(0xff);
			free(ptr);
		}
	}

	#[test_case]
	fn alloc_free_page() {
		unsafe {
			let ptr = alloc(PAGE_SIZE).unwrap();
			slice::from_raw_parts_mut(ptr.as_ptr(), PAGE_SIZE).fill(0xaa);
			free(ptr);
		}
	}

	#[test_case]
	fn alloc_free_many_fifo() {
		unsafe {
			let mut ptrs = [NonNull::dangling(); 256];
			for (i, p) in ptrs.iter_mut().enumerate() {
				*p = alloc(i + 1).unwrap();
			}
			for i in 0..ptrs.len() {
				for j in (i + 1)..ptrs.len() {
					assert_ne!(ptrs[i], ptrs[j]);
				}
			}
			for p in ptrs {
				free(p);
			}
		}
	}

	#[test_case]
	fn realloc_grow_in_place() {
		unsafe {
			let mut ptr = alloc(1).unwrap();
			for i in 1..32 {
				ptr = realloc(ptr, i).unwrap();
			}
			free(ptr);
		}
	}

	#[test_case]
	fn realloc_shrink_is_noop_move() {
		unsafe {
			let ptr = alloc(PAGE_SIZE).unwrap();
			let ptr = realloc(ptr, 1).unwrap();
			free(ptr);
		}
	}
}
