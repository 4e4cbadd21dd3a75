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

//! The signal taxonomy: HUP, INT, ILL, KILL, SEGV.
//!
//! A task's [`sighand`](super::task::Task::sighand) table maps each signal to [`SigHandler::Dfl`]
//! (run the built-in default below), [`SigHandler::Ign`] (drop it, unless it is
//! [`Signal::Kill`]), or a function pointer into user space. Exactly one pending signal is popped
//! per scheduler dispatch, after registers have been written back, matching the source's
//! `task_signal_pop`/`task_signal_call` split.

use super::task::{State, Task};
use crate::errno::{EResult, Errno};

/// The taxonomy of signals this core delivers. Numbering matches the source, not POSIX: there is
/// no SIGQUIT/SIGTRAP/... at this layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Signal {
	/// Hangup.
	Hup = 1,
	/// Interrupt.
	Int = 2,
	/// Illegal instruction.
	Ill = 3,
	/// Kill. Cannot be ignored or caught.
	Kill = 4,
	/// Segmentation violation.
	Segv = 5,
}

impl Signal {
	/// Recovers a signal from its numeric value, as stored in [`Task::sighand`]'s index or sent
	/// over `task_kill`.
	pub fn from_id(id: u8) -> Option<Self> {
		match id {
			1 => Some(Self::Hup),
			2 => Some(Self::Int),
			3 => Some(Self::Ill),
			4 => Some(Self::Kill),
			5 => Some(Self::Segv),
			_ => None,
		}
	}

	/// This signal's numeric value.
	pub const fn id(self) -> u8 {
		self as u8
	}

	/// Whether the signal can be set to [`SigHandler::Ign`] or caught by a user handler. Only
	/// [`Signal::Kill`] cannot.
	pub const fn catchable(self) -> bool {
		!matches!(self, Self::Kill)
	}
}

/// A task's disposition for one signal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SigHandler {
	/// Run the built-in default action.
	#[default]
	Dfl,
	/// Drop the signal. Rejected for [`Signal::Kill`].
	Ign,
	/// Jump to this user-space entry point on delivery.
	Handler(usize),
}

/// Sets `task`'s handler for `sig` to `handler`.
///
/// Mirrors the source's `task_signal`: [`SigHandler::Ign`] is rejected for signals that cannot
/// be ignored.
pub fn task_signal(task: &mut Task, sig: Signal, handler: SigHandler) -> EResult<()> {
	if matches!(handler, SigHandler::Ign) && !sig.catchable() {
		return Err(Errno::EINVAL);
	}
	task.sighand[sig.id() as usize] = handler;
	Ok(())
}

/// Queues `sig` for delivery to `task`, to be observed no later than `task`'s next ACTIVE slice.
///
/// Mirrors the source's `task_kill`: the signal is appended to the tail of the queue, so multiple
/// pending signals are delivered oldest first.
pub fn task_kill(task: &mut Task, sig: Signal) {
	task.signal_queue.push_back(sig);
}

/// Prints a best-effort core dump: the saved register image and nothing else, since there is no
/// console driver at this layer to hand a stack slice to.
fn dump_core(task: &Task) {
	crate::println!(
		"pid {}: core dump: rip={:#x} rsp={:#x} rax={:#x}",
		task.pid,
		task.regs.rip,
		task.regs.rsp,
		task.regs.rax
	);
}

/// Runs the built-in default action for `sig` against `task`, as the source's
/// `sighand_term`/`sighand_dump` do.
fn default_action(task: &mut Task, sig: Signal) {
	if matches!(sig, Signal::Ill | Signal::Segv) {
		dump_core(task);
	}
	task.exit_code = 128 + sig.id() as i32;
	task.term_sig = Some(sig);
	task.state = State::Dead;
}

/// Pops and delivers exactly one pending signal from `task`, as the scheduler does once per
/// dispatch after writing registers back.
///
/// Mirrors the source's `task_signal_call`: `Ign` drops it, `Handler` would redirect execution to
/// the user entry point (out of scope: this core models the disposition, not the user-mode
/// trampoline a full syscall plane would build), and `Dfl` runs [`default_action`].
pub fn dispatch(task: &mut Task) {
	let Some(sig) = task.signal_queue.pop_front() else {
		return;
	};
	match task.sighand[sig.id() as usize] {
		SigHandler::Ign if sig.catchable() => {}
		SigHandler::Handler(_) if sig.catchable() => {}
		_ => default_action(task, sig),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{memory::vmm::Vmm, process::task::Ring};

	fn blank() -> Task {
		Task::blank("t", 2, 1, Ring::Kernel, Vmm::default())
	}

	#[test_case]
	fn kill_cannot_be_ignored() {
		let mut task = blank();
		assert_eq!(
			task_signal(&mut task, Signal::Kill, SigHandler::Ign),
			Err(Errno::EINVAL)
		);
	}

	#[test_case]
	fn hup_default_terminates_with_code_128_plus_sig() {
		let mut task = blank();
		task_kill(&mut task, Signal::Hup);
		dispatch(&mut task);
		assert_eq!(task.state, State::Dead);
		assert_eq!(task.term_sig, Some(Signal::Hup));
		assert_eq!(task.exit_code, 128 + 1);
	}

	#[test_case]
	fn segv_default_dumps_and_terminates() {
		let mut task = blank();
		task_kill(&mut task, Signal::Segv);
		dispatch(&mut task);
		assert_eq!(task.state, State::Dead);
		assert_eq!(task.term_sig, Some(Signal::Segv));
	}

	#[test_case]
	fn ignored_catchable_signal_leaves_task_alone() {
		let mut task = blank();
		task_signal(&mut task, Signal::Int, SigHandler::Ign).unwrap();
		task_kill(&mut task, Signal::Int);
		dispatch(&mut task);
		assert_eq!(task.state, State::Busy);
	}

	#[test_case]
	fn kill_terminates_even_if_somehow_marked_handler() {
		let mut task = blank();
		task.sighand[Signal::Kill.id() as usize] = SigHandler::Handler(0x1000);
		task_kill(&mut task, Signal::Kill);
		dispatch(&mut task);
		assert_eq!(task.state, State::Dead);
		assert_eq!(task.term_sig, Some(Signal::Kill));
	}

	#[test_case]
	fn dispatch_on_empty_queue_is_a_no_op() {
		let mut task = blank();
		dispatch(&mut task);
		assert_eq!(task.state, State::Busy);
	}
}
