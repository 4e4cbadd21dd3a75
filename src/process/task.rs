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

//! A task is the unit of scheduling: a register image, a pair of stacks, a region list, a
//! signal set and a wait queue, all addressed through a single [`pid::Pid`].
//!
//! Unlike the source this core is grounded on, tasks are not linked by `prev`/`next` pointers:
//! the scheduler keeps them in a PID-indexed arena (see [`super::scheduler`]), so parent/child
//! relationships are plain PID values rather than back-references.

use crate::{
	arch::x86::gdt,
	memory::vmm::Vmm,
	process::{pid::Pid, region::Region, signal::SigHandler},
};
use alloc::{collections::vec_deque::VecDeque, string::String, vec::Vec};

/// Maximum task priority. Tasks are aged towards this value while READY.
pub const PRIO_MAX: u8 = 63;
/// Minimum task priority.
pub const PRIO_MIN: u8 = 0;
/// The priority assigned to a newly created task.
pub const PRIO_LOW: u8 = PRIO_MIN;

/// The privilege ring a task executes in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ring {
	/// Ring 0: kernel tasks.
	Kernel,
	/// Ring 3: user tasks.
	User,
}

/// A task's place in the scheduling state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
	/// Being constructed or mutated; never scheduled.
	Busy,
	/// Runnable, waiting for a dispatch.
	Ready,
	/// Currently executing; the task the IM frame belongs to.
	Active,
	/// Registers in the task struct are authoritative; do not overwrite them from the IM frame
	/// until the edit has been applied.
	Save,
	/// Blocked waiting for a child to exit.
	Wait,
	/// A fork was requested; the next dispatch performs it.
	Fork,
	/// Marked for reaping by the scheduler.
	Dead,
}

/// The register image saved across a preemption.
///
/// This is deliberately a separate type from [`crate::arch::x86::idt::IntFrame`]: the interrupt
/// frame additionally carries `gs`, `fs` and the vector/error pair, none of which are part of a
/// task's persistent state. Conversion between the two is an explicit, field-by-field copy
/// ([`IntFrame::save_to`](crate::arch::x86::idt::IntFrame::save_to) and
/// [`IntFrame::restore_from`](crate::arch::x86::idt::IntFrame::restore_from)), never a
/// reinterpret-cast.
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct Regs {
	pub r15: u64,
	pub r14: u64,
	pub r13: u64,
	pub r12: u64,
	pub r11: u64,
	pub r10: u64,
	pub r9: u64,
	pub r8: u64,
	pub rdi: u64,
	pub rsi: u64,
	pub rbp: u64,
	pub rdx: u64,
	pub rcx: u64,
	pub rbx: u64,
	pub rax: u64,
	pub rip: u64,
	pub cs: u64,
	pub ss: u64,
	pub rflags: u64,
	pub rsp: u64,
}

/// An entry in a parent's wait queue, recording one child's final status.
#[derive(Clone, Copy, Debug)]
pub struct WaitEntry {
	/// The PID of the child that exited.
	pub pid: Pid,
	/// `exit_code << 8 | term_signal & 0xff`.
	pub status: i32,
}

/// The unit of scheduling.
pub struct Task {
	/// The task's name, truncated to [`crate::config::NAME_MAX`] bytes.
	pub name: String,
	/// This task's PID.
	pub pid: Pid,
	/// The parent's PID.
	pub ppid: Pid,
	/// The address space this task executes in.
	pub vmm: Vmm,

	/// The saved register image, authoritative whenever the task is not the one the live IM
	/// frame belongs to.
	pub regs: Regs,
	/// Ticks remaining in the task's current slice.
	pub ticks: u8,
	/// Ticks granted on dispatch, scaled by priority.
	pub min_ticks: u8,
	/// Current scheduling state.
	pub state: State,
	/// Scheduling priority, `0..=63`; higher runs first.
	pub prio: u8,
	/// Privilege ring.
	pub ring: Ring,

	/// Per-signal handler table.
	pub sighand: [SigHandler; crate::config::SIG_MAX],
	/// Pending signals not yet delivered, oldest first.
	pub signal_queue: VecDeque<crate::process::signal::Signal>,

	/// Exit code, set by `sys_exit` or a signal default action.
	pub exit_code: i32,
	/// The terminating signal, if death was signal-induced.
	pub term_sig: Option<crate::process::signal::Signal>,

	/// Top of the ring-0 stack, loaded into the TSS on switch to this task if it runs in ring 3.
	pub stack_kernel_top: usize,
	/// Top of the ring-3 stack.
	pub stack_user_top: usize,

	/// The task's memory regions (code, data, heap, per-ring stack, ...).
	pub region_list: Vec<Region>,

	/// Open file descriptors.
	pub file_table: [Option<crate::vfs::File>; crate::config::FD_MAX],
	/// One past the highest fd ever handed out, for allocation.
	pub fd_last: usize,

	/// Spinlock nesting depth held by this task.
	pub lock_depth: u32,

	/// Children that have exited, awaiting `wait()`, oldest first.
	pub waitq: VecDeque<WaitEntry>,
}

impl Task {
	/// Builds a task in the [`State::Busy`] state with every field zeroed/defaulted, to be
	/// populated by [`new`] or the fork path before being made [`State::Ready`].
	pub(crate) fn blank(name: &str, pid: Pid, ppid: Pid, ring: Ring, vmm: Vmm) -> Self {
		let mut truncated = String::new();
		for c in name.chars().take(crate::config::NAME_MAX) {
			truncated.push(c);
		}
		Self {
			name: truncated,
			pid,
			ppid,
			vmm,

			regs: Regs::default(),
			ticks: 0,
			min_ticks: 0,
			state: State::Busy,
			prio: PRIO_LOW,
			ring,

			sighand: [SigHandler::Dfl; crate::config::SIG_MAX],
			signal_queue: VecDeque::new(),

			exit_code: 0,
			term_sig: None,

			stack_kernel_top: 0,
			stack_user_top: 0,

			region_list: Vec::new(),

			file_table: [None; crate::config::FD_MAX],
			fd_last: 0,

			lock_depth: 0,

			waitq: VecDeque::new(),
		}
	}

	/// Creates a new task named `name`, set to begin execution at `entry` in ring `ring`, with
	/// its own fresh address space.
	///
	/// The task is left in [`State::Ready`] with the initial state mandated for every new task:
	/// low priority, `ticks = min_ticks`, `rflags = IF | bit1`, and `rsp` at the top of its
	/// freshly mapped user/kernel stack region.
	pub fn new(
		name: &str,
		pid: Pid,
		ppid: Pid,
		ring: Ring,
		entry: usize,
		vmm: Vmm,
		stack: &Region,
	) -> Self {
		let mut task = Self::blank(name, pid, ppid, ring, vmm);
		task.min_ticks = crate::config::DEFAULT_QUANTUM as u8;
		task.ticks = task.min_ticks;
		let top = (stack.vaddr().unwrap() + stack.num() * crate::config::PAGE_SIZE).0;
		let (cs, ss) = match ring {
			Ring::Kernel => (gdt::KERNEL_CS as u64, gdt::KERNEL_DS as u64),
			Ring::User => ((gdt::USER_CS | 3) as u64, (gdt::USER_DS | 3) as u64),
		};
		task.stack_kernel_top = match ring {
			Ring::Kernel => top,
			Ring::User => 0,
		};
		task.stack_user_top = match ring {
			Ring::User => top,
			Ring::Kernel => 0,
		};
		task.regs = Regs {
			rflags: (1 << 1) | (1 << 9),
			rip: entry as u64,
			rsp: top as u64,
			cs,
			ss,
			..Default::default()
		};
		task.state = State::Ready;
		task
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn blank_task_has_zero_priority_and_is_busy() {
		let task = Task::blank("t", 2, 1, Ring::Kernel, Vmm::default());
		assert_eq!(task.state, State::Busy);
		assert_eq!(task.prio, PRIO_LOW);
	}

	#[test_case]
	fn name_truncates_to_name_max() {
		let long = "a".repeat(crate::config::NAME_MAX + 50);
		let task = Task::blank(&long, 2, 1, Ring::Kernel, Vmm::default());
		assert_eq!(task.name.len(), crate::config::NAME_MAX);
	}
}
