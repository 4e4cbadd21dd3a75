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

//! The fixed-size unit the heap is divided into.
//!
//! Free memory is split into 32-byte chunks, each made of 16 bytes of `meta` and 16 bytes of
//! `data`. While a chunk is free, `meta` stores its `next`/`prev` pointers, forming a doubly
//! linked free list ordered by address. An in-use run of chunks instead stores a magic value
//! (checked at free time) in `meta[0]` and the run's total byte size in `meta[1]`; the data
//! pointer handed out to callers is simply `self + META_SIZE`.

use core::ptr;

/// Marks the first chunk of an allocated (non-free) run, validated on free.
pub const MAGIC: u64 = 0xa71e394b53a81759;
/// Bytes of payload carried directly inside a chunk.
pub const DATA_SIZE: usize = 16;

/// A single heap chunk.
#[repr(C)]
pub struct Chunk {
	meta: [u64; 2],
	data: [u8; DATA_SIZE],
}

/// Total size of a chunk: `META_SIZE` (16) + [`DATA_SIZE`] (16).
pub const SIZE: usize = core::mem::size_of::<Chunk>();
/// Bytes of `meta` preceding the data pointer returned to callers.
pub const META_SIZE: usize = SIZE - DATA_SIZE;

impl Chunk {
	/// Returns the next chunk in the free list, or `None` at the tail.
	pub fn next(&self) -> Option<ptr::NonNull<Chunk>> {
		ptr::NonNull::new(self.meta[0] as *mut Chunk)
	}

	/// Sets the next chunk in the free list.
	pub fn set_next(&mut self, next: Option<ptr::NonNull<Chunk>>) {
		self.meta[0] = next.map_or(0, |p| p.as_ptr() as u64);
	}

	/// Returns the previous chunk in the free list, or `None` at the head.
	pub fn prev(&self) -> Option<ptr::NonNull<Chunk>> {
		ptr::NonNull::new(self.meta[1] as *mut Chunk)
	}

	/// Sets the previous chunk in the free list.
	pub fn set_prev(&mut self, prev: Option<ptr::NonNull<Chunk>>) {
		self.meta[1] = prev.map_or(0, |p| p.as_ptr() as u64);
	}

	/// Returns the byte size of the allocated run starting at this chunk.
	pub fn size(&self) -> u64 {
		self.meta[1]
	}

	/// Sets the byte size of the allocated run starting at this chunk.
	pub fn set_size(&mut self, size: u64) {
		self.meta[1] = size;
	}

	/// Stamps this chunk as the head of an allocated run of `size` bytes.
	pub fn mark_allocated(&mut self, size: u64) {
		self.meta[0] = MAGIC;
		self.meta[1] = size;
	}

	/// Tells whether this chunk is currently the head of an allocated run.
	pub fn is_allocated(&self) -> bool {
		self.meta[0] == MAGIC
	}

	/// Clears this chunk's inline data, as done when it re-enters the free list.
	pub fn clear_data(&mut self) {
		self.data = [0; DATA_SIZE];
	}

	/// Returns the data pointer callers see for an allocation starting at this chunk.
	pub fn data_ptr(chunk: ptr::NonNull<Chunk>) -> ptr::NonNull<u8> {
		unsafe { ptr::NonNull::new_unchecked((chunk.as_ptr() as *mut u8).add(META_SIZE)) }
	}

	/// Recovers the owning chunk from a data pointer previously returned by [`Self::data_ptr`].
	///
	/// # Safety
	///
	/// `ptr` must have been returned by a previous allocation that has not yet been freed.
	pub unsafe fn from_data_ptr(ptr: *mut u8) -> ptr::NonNull<Chunk> {
		ptr::NonNull::new_unchecked(ptr.sub(META_SIZE) as *mut Chunk)
	}
}
