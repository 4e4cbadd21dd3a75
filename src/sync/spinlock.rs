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

//! Spinlock implementations.
//!
//! This core has a single CPU, so mutual exclusion only has to worry about preemption and
//! interrupts, not other cores. Three flavors are offered:
//!
//! - [`Spinlock`]: the bare primitive, busy-waiting on an atomic flag.
//! - [`IntSpin`]: a [`Spinlock`] that additionally disables interrupts while held, for data
//!   shared with interrupt handlers (the frame allocator, the heap, the logger).
//! - [`SchedSpin`]: a lock that, on contention, yields to the scheduler instead of burning
//!   cycles — used by task-level locks per the scheduler's locking discipline.

use crate::arch::x86::{cli, is_interrupt_enabled, sti};
use core::{
	cell::UnsafeCell,
	hint,
	ops::{Deref, DerefMut},
	sync::atomic,
	sync::atomic::AtomicBool,
};

/// Locking primitive spinning until the resource can be acquired.
///
/// It works by storing a value telling whether a thread is already in that piece of code.
///
/// To avoid race conditions, the implementation uses an atomic exchange instruction. If a threads
/// tries to acquire the lock while already in use, the thread shall wait in a loop (spin) until
/// the lock is released.
pub struct Spinlock(AtomicBool);

impl Spinlock {
	/// Creates a new spinlock.
	#[allow(clippy::new_without_default)]
	pub const fn new() -> Self {
		Self(AtomicBool::new(false))
	}

	/// Locks the spinlock.
	#[inline(always)]
	pub fn lock(&self) {
		while self.0.swap(true, atomic::Ordering::Acquire) {
			hint::spin_loop();
		}
	}

	/// Attempts to lock the spinlock without blocking, returning whether it succeeded.
	#[inline(always)]
	pub fn try_lock(&self) -> bool {
		self.0.swap(true, atomic::Ordering::Acquire) == false
	}

	/// Unlocks the spinlock.
	#[inline(always)]
	pub fn unlock(&self) {
		self.0.store(false, atomic::Ordering::Release);
	}
}

/// A guard giving exclusive access to the value protected by an [`IntSpin`].
///
/// Interrupts are re-enabled (if they were on before the lock was taken) when the guard drops.
pub struct IntSpinGuard<'l, T> {
	lock: &'l IntSpin<T>,
	restore_int: bool,
}

impl<T> Deref for IntSpinGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		unsafe { &*self.lock.inner.get() }
	}
}

impl<T> DerefMut for IntSpinGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		unsafe { &mut *self.lock.inner.get() }
	}
}

impl<T> Drop for IntSpinGuard<'_, T> {
	fn drop(&mut self) {
		self.lock.lock.unlock();
		if self.restore_int {
			sti();
		}
	}
}

/// A spinlock that disables interrupts for the duration it is held.
///
/// Used to guard data that is also touched from interrupt context (the frame bitmap, the heap
/// free list, the kernel logger's ring buffer): without disabling interrupts, a handler running
/// on the same core could deadlock trying to re-enter the lock.
pub struct IntSpin<T> {
	lock: Spinlock,
	inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for IntSpin<T> {}

impl<T> IntSpin<T> {
	/// Creates a new lock wrapping `inner`.
	pub const fn new(inner: T) -> Self {
		Self {
			lock: Spinlock::new(),
			inner: UnsafeCell::new(inner),
		}
	}

	/// Locks, disabling interrupts until the guard is dropped.
	pub fn lock(&self) -> IntSpinGuard<'_, T> {
		let restore_int = is_interrupt_enabled();
		cli();
		self.lock.lock();
		IntSpinGuard {
			lock: self,
			restore_int,
		}
	}
}

/// A guard giving exclusive access to the value protected by a [`SchedSpin`].
pub struct SchedSpinGuard<'l, T> {
	lock: &'l SchedSpin<T>,
}

impl<T> Deref for SchedSpinGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		unsafe { &*self.lock.inner.get() }
	}
}

impl<T> DerefMut for SchedSpinGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		unsafe { &mut *self.lock.inner.get() }
	}
}

impl<T> Drop for SchedSpinGuard<'_, T> {
	fn drop(&mut self) {
		self.lock.lock.unlock();
	}
}

/// A lock that, instead of spinning the CPU on contention, calls into the scheduler so another
/// task can run.
///
/// This is the primitive backing a task's `lock_stack`: nesting depth is tracked by the caller
/// (see `process::task::Task`), since the lock itself only knows how to wait, not who holds it.
pub struct SchedSpin<T> {
	lock: Spinlock,
	inner: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SchedSpin<T> {}

impl<T> SchedSpin<T> {
	/// Creates a new lock wrapping `inner`.
	pub const fn new(inner: T) -> Self {
		Self {
			lock: Spinlock::new(),
			inner: UnsafeCell::new(inner),
		}
	}

	/// Locks, yielding to the scheduler on each failed attempt instead of spinning.
	pub fn lock(&self) -> SchedSpinGuard<'_, T> {
		while !self.lock.try_lock() {
			crate::process::scheduler::sched();
		}
		SchedSpinGuard {
			lock: self,
		}
	}
}
