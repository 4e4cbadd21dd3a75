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

//! The heart of the kernel: a preemptive, priority-ordered round-robin scheduler driven by the
//! PIT at 100 Hz.
//!
//! Unlike the source this is grounded on, tasks are not linked by `prev`/`next` pointers; they
//! live in a PID-indexed [`BTreeMap`], and the run queue is a separate [`VecDeque`] of PIDs kept
//! ordered by non-increasing priority. Walking "the next link" is walking the next index in that
//! queue, wrapping at the tail, which is the same round-robin the doubly-linked list gave the
//! source.

use super::{
	pid::{self, Pid},
	region::Region,
	signal::{self, Signal},
	task::{Ring, State, Task, WaitEntry},
};
use crate::{
	arch::x86::{idt, idt::IntFrame, pic, timer::pit},
	config,
	errno::{EResult, Errno},
	memory::vmm::{self, Vmm},
	sync::IntSpin,
};
use alloc::{collections::vec_deque::VecDeque, vec::Vec};

/// IRQ line the PIT is wired to.
const TIMER_IRQ: u8 = 0;
/// Interrupt vectors recognised as hardware faults, delivered to the current task as a signal
/// rather than crashing the kernel.
const FAULT_VECTORS: [u8; 5] = [0, 6, 8, 13, 14];

/// The single, global run queue and task arena. There is exactly one of these: this core targets
/// one CPU, one scheduler.
static SCHEDULER: IntSpin<Scheduler> = IntSpin::new(Scheduler::new());

/// The scheduler's state: every task that exists, the order runnable ones are considered in, and
/// which one (if any) is presently on CPU.
struct Scheduler {
	tasks: alloc::collections::btree_map::BTreeMap<Pid, Task>,
	/// PIDs in non-increasing priority order. Walking forward from the current task's position,
	/// wrapping at the end, is the round-robin rule.
	queue: VecDeque<Pid>,
	/// The task whose registers the live IM frame belongs to, if any.
	current: Option<Pid>,
	/// A task inserted with a higher priority than `current`'s; picked unconditionally on the
	/// next dispatch before the queue is walked.
	promoted: Option<Pid>,
}

impl Scheduler {
	const fn new() -> Self {
		Self {
			tasks: alloc::collections::btree_map::BTreeMap::new(),
			queue: VecDeque::new(),
			current: None,
			promoted: None,
		}
	}

	/// Inserts `pid` into the run queue, keeping it ordered by non-increasing priority: it is
	/// placed right before the first existing entry of strictly lower priority (after every
	/// existing entry of the same or higher priority), so same-priority tasks stay FIFO.
	fn queue_add(&mut self, pid: Pid) {
		let prio = self.tasks[&pid].prio;
		let pos = self
			.queue
			.iter()
			.position(|p| self.tasks[p].prio < prio)
			.unwrap_or(self.queue.len());
		self.queue.insert(pos, pid);
		if let Some(cur) = self.current {
			if prio > self.tasks[&cur].prio {
				self.promoted = Some(pid);
			}
		}
	}

	/// Removes `pid` from the run queue. Does not touch the task arena.
	fn queue_remove(&mut self, pid: Pid) {
		if let Some(pos) = self.queue.iter().position(|p| *p == pid) {
			self.queue.remove(pos);
		}
	}

	/// Picks the next task to dispatch: a promoted task if one is pending, otherwise the entry
	/// following `current` in the queue, wrapping to the head.
	fn queue_next(&mut self) -> Option<Pid> {
		if let Some(pid) = self.promoted.take() {
			return Some(pid);
		}
		match self.current {
			None => self.queue.front().copied(),
			Some(cur) => match self.queue.iter().position(|p| *p == cur) {
				Some(pos) if pos + 1 < self.queue.len() => Some(self.queue[pos + 1]),
				_ => self.queue.front().copied(),
			},
		}
	}

	/// Removes a DEAD task from the queue and arena, releases its regions and address space, and
	/// delivers its exit status to its parent's wait queue, waking the parent if it was WAITing.
	fn reap(&mut self, pid: Pid) {
		self.queue_remove(pid);
		let Some(mut task) = self.tasks.remove(&pid) else {
			return;
		};
		for region in task.region_list.drain(..) {
			region.unmap();
		}
		vmm::free(task.vmm);
		let status = (task.exit_code << 8) | (task.term_sig.map(Signal::id).unwrap_or(0) as i32 & 0xff);
		if let Some(parent) = self.tasks.get_mut(&task.ppid) {
			parent.waitq.push_back(WaitEntry {
				pid,
				status,
			});
			if parent.state == State::Wait {
				parent.state = State::Ready;
			}
		}
	}
}

/// Raises the timer vector by software interrupt, re-entering [`timer_handler`] immediately
/// instead of waiting for the next hardware tick. This is the only form of voluntary yield: every
/// [`crate::sync::SchedSpin`] waits this way on contention.
pub fn sched() {
	unsafe {
		core::arch::asm!("int {v}", v = const pit::INTERRUPT_VECTOR);
	}
}

/// Returns the PID of the currently scheduled task, if the scheduler has dispatched at least
/// once.
pub fn current_pid() -> Option<Pid> {
	SCHEDULER.lock().current
}

/// Runs `f` against the task `pid`, if it still exists.
pub fn with_task<R>(pid: Pid, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
	let mut sched = SCHEDULER.lock();
	sched.tasks.get_mut(&pid).map(f)
}

/// Runs `f` against the current task, if one is dispatched.
pub fn with_current<R>(f: impl FnOnce(&mut Task) -> R) -> Option<R> {
	let mut sched = SCHEDULER.lock();
	let pid = sched.current?;
	sched.tasks.get_mut(&pid).map(f)
}

/// Queues `sig` for delivery to `pid`. Fails with [`Errno::ESRCH`] if no such task exists.
pub fn kill(pid: Pid, sig: Signal) -> EResult<()> {
	with_task(pid, |task| signal::task_kill(task, sig)).ok_or(Errno::ESRCH)
}

/// Clones the current task: fresh PID, fresh address space with every region duplicated, and a
/// copy of the register image with `rax` zeroed so the child observes a `0` return from `fork`
/// while the parent's own `rax` (set by the caller after this returns) carries the child's PID.
///
/// Mirrors the source's `sched_fork` plus `task_create`'s region-copy pass.
pub fn fork() -> EResult<Pid> {
	let mut sched = SCHEDULER.lock();
	let cur_pid = sched.current.ok_or(Errno::ESRCH)?;
	let parent_vmm = sched.tasks[&cur_pid].vmm;

	let mut copied: Vec<Region> = Vec::new();
	for region in &sched.tasks[&cur_pid].region_list {
		copied.push(region.copy()?);
	}

	let child_vmm = vmm::new()?;
	unsafe {
		vmm::switch(child_vmm);
	}
	let mut install_err = None;
	for region in &mut copied {
		if let Err(e) = region.map() {
			install_err = Some(e);
			break;
		}
	}
	unsafe {
		vmm::switch(parent_vmm);
	}
	if let Some(e) = install_err {
		vmm::free(child_vmm);
		return Err(e);
	}

	let child_pid = pid::next_pid(sched.tasks.keys().copied());
	let parent = &sched.tasks[&cur_pid];
	let mut regs = parent.regs.clone();
	regs.rax = 0;
	let mut child = Task::blank(&parent.name, child_pid, cur_pid, parent.ring, child_vmm);
	child.regs = regs;
	child.prio = super::task::PRIO_LOW;
	child.min_ticks = parent.min_ticks;
	child.ticks = child.min_ticks;
	child.stack_kernel_top = parent.stack_kernel_top;
	child.stack_user_top = parent.stack_user_top;
	child.sighand = parent.sighand;
	child.state = State::Ready;
	child.region_list = copied;

	sched.tasks.insert(child_pid, child);
	sched.queue_add(child_pid);
	Ok(child_pid)
}

/// Marks the current task DEAD with `code` and reparents its children to [`pid::INIT_PID`].
/// Actual freeing happens on the next timer dispatch, which observes the DEAD state.
///
/// Killing [`pid::INIT_PID`] itself is a kernel panic, matching the source's `sched_exit`.
pub fn exit(code: i32) -> EResult<()> {
	let mut sched = SCHEDULER.lock();
	let pid = sched.current.ok_or(Errno::ESRCH)?;
	if pid == pid::INIT_PID {
		panic!("attempted to kill init (exit code: {code})");
	}
	if let Some(task) = sched.tasks.get_mut(&pid) {
		task.exit_code = code;
		task.state = State::Dead;
	}
	for task in sched.tasks.values_mut() {
		if task.ppid == pid {
			task.ppid = pid::INIT_PID;
		}
	}
	drop(sched);
	sched();
	Ok(())
}

/// Blocks the current task until a child exits, returning its PID and packed exit status.
///
/// If a status is already queued, it is returned immediately. If the task has no children at
/// all, fails with [`Errno::ECHILD`] without blocking, matching the source's `sched_exit` family.
/// Otherwise the task is marked WAIT and yields; it is woken (state set back to READY) by
/// [`Scheduler::reap`] when a child dies.
pub fn wait() -> EResult<(Pid, i32)> {
	loop {
		let mut guard = SCHEDULER.lock();
		let pid = guard.current.ok_or(Errno::ESRCH)?;
		let has_children = guard.tasks.values().any(|t| t.ppid == pid);
		let task = guard.tasks.get_mut(&pid).expect("current task vanished");
		if let Some(entry) = task.waitq.pop_front() {
			return Ok((entry.pid, entry.status));
		}
		if !has_children {
			return Err(Errno::ECHILD);
		}
		task.state = State::Wait;
		drop(guard);
		sched();
	}
}

/// The scheduler's interrupt-time entry point: runs the exact dispatch algorithm the source's
/// `__sched_timer_handler` implements, registered at [`init`] against the PIT vector.
pub fn timer_handler(frame: &mut IntFrame) {
	let mut sched = SCHEDULER.lock();
	if sched.current.is_none() {
		sched.current = sched.queue_next();
	}
	let Some(cur_pid) = sched.current else {
		drop(sched);
		crate::panic::with_frame(frame);
	};

	let state = sched.tasks.get(&cur_pid).map(|t| t.state);
	match state {
		Some(State::Ready) => {
			if let Some(task) = sched.tasks.get_mut(&cur_pid) {
				frame.save_to(&mut task.regs);
			}
		}
		Some(State::Save) => {
			if let Some(task) = sched.tasks.get(&cur_pid) {
				frame.restore_from(&task.regs);
			}
		}
		Some(State::Wait) => {
			if let Some(task) = sched.tasks.get_mut(&cur_pid) {
				frame.save_to(&mut task.regs);
				task.ticks = 0;
			}
		}
		Some(State::Dead) => {
			sched.reap(cur_pid);
			sched.current = None;
		}
		Some(_) => {
			crate::println!("task {cur_pid}: unexpected state, coercing to ready");
			if let Some(task) = sched.tasks.get_mut(&cur_pid) {
				task.state = State::Ready;
			}
		}
		None => {}
	}

	let ticks_left = sched
		.current
		.and_then(|pid| sched.tasks.get(&pid))
		.map(|t| t.ticks)
		.unwrap_or(0);
	if sched.current.is_none() || ticks_left == 0 {
		let Some(next_pid) = sched.queue_next() else {
			drop(sched);
			crate::panic::with_frame(frame);
		};
		let prev_vmm = sched
			.current
			.and_then(|pid| sched.tasks.get(&pid))
			.map(|t| t.vmm);
		sched.current = Some(next_pid);
		let next_vmm = sched.tasks[&next_pid].vmm;
		if prev_vmm != Some(next_vmm) {
			unsafe {
				vmm::switch(next_vmm);
			}
		}
		let task = sched.tasks.get_mut(&next_pid).expect("next task vanished");
		task.state = State::Active;
		task.ticks = task.min_ticks;
		frame.restore_from(&task.regs);
		task.ticks -= 1;
		drop(sched);
		pic::end_of_interrupt(TIMER_IRQ);
		return;
	}

	if let Some(task) = sched.tasks.get_mut(&cur_pid) {
		signal::dispatch(task);
		task.ticks = task.ticks.saturating_sub(1);
	}
	drop(sched);
	pic::end_of_interrupt(TIMER_IRQ);
}

/// Maps a fault vector to the signal it is turned into. Only [`FAULT_VECTORS`] are ever
/// registered, so every other vector is unreachable here.
fn fault_signal(vector: u64) -> Signal {
	match vector {
		6 => Signal::Ill,
		_ => Signal::Segv,
	}
}

/// The exception handler registered against fault vectors: delivers the corresponding signal to
/// the current task rather than letting the fault reach [`crate::panic`]. Panics if no task is
/// active, since a fault with nothing scheduled means the fault happened during scheduler
/// bring-up.
pub fn exception_handler(frame: &mut IntFrame) {
	let sig = fault_signal(frame.int);
	let mut sched = SCHEDULER.lock();
	let Some(pid) = sched.current else {
		drop(sched);
		crate::panic::with_frame(frame);
	};
	if let Some(task) = sched.tasks.get_mut(&pid) {
		signal::task_kill(task, sig);
	}
}

/// Disables dispatch of the timer and fault vectors, without unregistering their handlers. Used
/// to bracket a critical section that must not be preempted or reentered by a fault handler.
///
/// Mirrors the source's `sched_lock`/`sched_unlock`, except every fault vector is gated alongside
/// the timer rather than just it: a fault taken mid-critical-section would otherwise still run
/// [`exception_handler`] and mutate the very task state the caller is protecting.
pub fn lock() {
	idt::set_enabled(pit::INTERRUPT_VECTOR, false);
	for vector in FAULT_VECTORS {
		idt::set_enabled(vector, false);
	}
}

/// Reverses [`lock`].
pub fn unlock() {
	idt::set_enabled(pit::INTERRUPT_VECTOR, true);
	for vector in FAULT_VECTORS {
		idt::set_enabled(vector, true);
	}
}

/// Brings the scheduler up: masks the timer IRQ, registers the timer and fault handlers, forks
/// the bootstrap task out of the currently running context (adopting the active address space
/// per the source's "initial task" exception), unmasks the timer, then dispatches for the first
/// time.
pub fn init() {
	pic::disable_irq(TIMER_IRQ);
	idt::register(pit::INTERRUPT_VECTOR, idt::Priority::Second, timer_handler);
	for vector in FAULT_VECTORS {
		idt::register(vector, idt::Priority::Second, exception_handler);
	}

	let vmm = vmm::current();
	let mut main = Task::blank("main", pid::INIT_PID, pid::INIT_PID, Ring::Kernel, vmm);
	main.state = State::Ready;
	main.prio = super::task::PRIO_LOW;
	main.min_ticks = config::DEFAULT_QUANTUM as u8;
	main.ticks = main.min_ticks;

	let mut sched = SCHEDULER.lock();
	sched.tasks.insert(pid::INIT_PID, main);
	sched.queue_add(pid::INIT_PID);
	drop(sched);

	pic::enable_irq(TIMER_IRQ);
	sched();
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::memory::vmm::Vmm;

	fn with_fresh<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
		let mut s = Scheduler::new();
		f(&mut s)
	}

	fn insert(s: &mut Scheduler, pid: Pid, prio: u8) {
		let mut task = Task::blank("t", pid, pid, Ring::Kernel, Vmm::default());
		task.prio = prio;
		s.tasks.insert(pid, task);
		s.queue_add(pid);
	}

	#[test_case]
	fn queue_orders_by_non_increasing_priority() {
		with_fresh(|s| {
			insert(s, 1, 10);
			insert(s, 2, 30);
			insert(s, 3, 20);
			assert_eq!(s.queue, VecDeque::from([2, 3, 1]));
		});
	}

	#[test_case]
	fn equal_priority_ties_are_fifo() {
		with_fresh(|s| {
			insert(s, 1, 10);
			insert(s, 2, 10);
			insert(s, 3, 10);
			assert_eq!(s.queue, VecDeque::from([1, 2, 3]));
		});
	}

	#[test_case]
	fn higher_priority_insert_promotes_over_current() {
		with_fresh(|s| {
			insert(s, 1, 10);
			s.current = Some(1);
			insert(s, 2, 20);
			assert_eq!(s.promoted, Some(2));
			assert_eq!(s.queue_next(), Some(2));
			assert_eq!(s.promoted, None);
		});
	}

	#[test_case]
	fn queue_next_wraps_to_head() {
		with_fresh(|s| {
			insert(s, 1, 10);
			insert(s, 2, 10);
			s.current = Some(2);
			assert_eq!(s.queue_next(), Some(1));
		});
	}

	#[test_case]
	fn reap_enqueues_waitq_entry_and_wakes_waiting_parent() {
		with_fresh(|s| {
			insert(s, 1, 10);
			insert(s, 2, 10);
			s.tasks.get_mut(&2).unwrap().ppid = 1;
			s.tasks.get_mut(&1).unwrap().state = State::Wait;
			s.tasks.get_mut(&2).unwrap().exit_code = 0;
			s.reap(2);
			let parent = &s.tasks[&1];
			assert_eq!(parent.state, State::Ready);
			assert_eq!(parent.waitq.len(), 1);
			assert_eq!(parent.waitq[0].pid, 2);
		});
	}

	#[test_case]
	fn fifo_waitq_preserves_death_order() {
		with_fresh(|s| {
			insert(s, 1, 10);
			insert(s, 2, 10);
			insert(s, 3, 10);
			s.tasks.get_mut(&2).unwrap().ppid = 1;
			s.tasks.get_mut(&3).unwrap().ppid = 1;
			s.reap(2);
			s.reap(3);
			let parent = &s.tasks[&1];
			assert_eq!(parent.waitq[0].pid, 2);
			assert_eq!(parent.waitq[1].pid, 3);
		});
	}
}
