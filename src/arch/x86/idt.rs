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

//! The IDT (Interrupt Descriptor Table): 256 vectors, each with two handler slots (FIRST, run
//! before the other, SECOND, after), dispatched by a single assembly trampoline shared by every
//! vector.
//!
//! This is the glue between the hardware and the rest of the kernel: [`crate::process::scheduler`]
//! registers itself here, both on the PIT vector (to drive preemption) and on every fault vector
//! (to turn a CPU exception into a signal instead of an immediate panic). The IDT itself knows
//! nothing about tasks, signals or the VMM; it only knows how to call back into whatever
//! registered.
//!
//! Every gate is set up with IST index 1, which forces the CPU to switch onto
//! [`super::tss`]'s dedicated interrupt stack on every entry, including ones that don't cross a
//! privilege level. Without that, a same-ring trap (the scheduler's own software interrupt, used
//! to voluntarily yield from ring 0) would leave `rsp`/`ss` off the exception stack while a ring 3
//! fault pushes them, giving two different frame shapes. Forcing the stack switch unconditionally
//! makes [`IntFrame`] a fixed layout no matter where the interrupt came from.

use crate::{
	arch::x86::{cli, gdt, is_interrupt_enabled, sti, tss},
	sync::IntSpin,
};
use core::{arch::global_asm, ffi::c_void, fmt, mem::size_of, ptr::addr_of};

/// The number of entries in the IDT: every possible interrupt vector.
const ENTRIES_COUNT: usize = 256;
/// Interrupt gate, present, ring 0.
const GATE_INTERRUPT: u8 = 0x8e;
/// Interrupt gate, present, ring 3: the only vector a `ring 3` `int` instruction may target.
const GATE_INTERRUPT_USER: u8 = 0xee;
/// The IST index every gate is configured with.
const IST_INDEX: u8 = 1;

/// The vector ring 3 tasks trigger with `int 0x80` to enter the syscall plane.
///
/// Dispatched through the same trampoline and [`interrupt_dispatch`] as every other vector;
/// `syscall::init` registers its handler here the same way the scheduler registers on the timer
/// vector.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Which of the (up to) two handlers registered on a vector a call belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Priority {
	/// Runs first. Used for the scheduler's own bookkeeping (tick accounting, fault-to-signal
	/// translation), so other handlers observe already-updated task state.
	First,
	/// Runs after [`Priority::First`]. Used for handlers that only care about being notified,
	/// such as a fault reporter that logs but does not alter scheduling decisions.
	Second,
}

/// A vector handler: given the frame of the interrupt that fired, may inspect and mutate it
/// (redirecting execution on return, as the scheduler's timer handler does).
pub type Handler = fn(&mut IntFrame);

/// The two handler slots per vector, indexed by [`Priority`].
static HANDLERS: IntSpin<[[Option<Handler>; 2]; ENTRIES_COUNT]> =
	IntSpin::new([[None; 2]; ENTRIES_COUNT]);
/// Whether a vector's handlers are currently called at all. Disabling a vector here is how
/// [`crate::process::scheduler`] implements its critical sections: the handlers stay registered,
/// they are just skipped.
static ENABLED: IntSpin<[bool; ENTRIES_COUNT]> = IntSpin::new([true; ENTRIES_COUNT]);

/// Registers `handler` on `vector` at `priority`, replacing whatever was there before.
pub fn register(vector: u8, priority: Priority, handler: Handler) {
	HANDLERS.lock()[vector as usize][priority as usize] = Some(handler);
}

/// Enables or disables dispatch for `vector`, without touching what is registered on it.
pub fn set_enabled(vector: u8, enabled: bool) {
	ENABLED.lock()[vector as usize] = enabled;
}

/// The register image of an interrupted context.
///
/// Deliberately a different type from [`crate::process::task::Regs`]: this additionally carries
/// `gs`, `fs` and the vector/error-code pair, which are properties of the trap, not of the task.
/// [`save_to`](Self::save_to) and [`restore_from`](Self::restore_from) are the only sanctioned
/// conversions between the two, each copying field by field.
#[repr(C)]
#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct IntFrame {
	pub rax: u64,
	pub rbx: u64,
	pub rcx: u64,
	pub rdx: u64,
	pub rsi: u64,
	pub rdi: u64,
	pub rbp: u64,
	pub r8: u64,
	pub r9: u64,
	pub r10: u64,
	pub r11: u64,
	pub r12: u64,
	pub r13: u64,
	pub r14: u64,
	pub r15: u64,

	pub gs: u64,
	pub fs: u64,

	/// The interrupt vector that fired.
	pub int: u64,
	/// The hardware error code, or `0` for vectors that don't push one.
	pub code: u64,

	pub rip: u64,
	pub cs: u64,
	pub rflags: u64,
	pub rsp: u64,
	pub ss: u64,
}

impl IntFrame {
	/// Copies this frame's task-relevant registers into `regs`, leaving `gs`/`fs`/`int`/`code`
	/// behind. Called by the scheduler right after it decides to keep the outgoing task's state.
	pub fn save_to(&self, regs: &mut crate::process::task::Regs) {
		regs.r15 = self.r15;
		regs.r14 = self.r14;
		regs.r13 = self.r13;
		regs.r12 = self.r12;
		regs.r11 = self.r11;
		regs.r10 = self.r10;
		regs.r9 = self.r9;
		regs.r8 = self.r8;
		regs.rdi = self.rdi;
		regs.rsi = self.rsi;
		regs.rbp = self.rbp;
		regs.rdx = self.rdx;
		regs.rcx = self.rcx;
		regs.rbx = self.rbx;
		regs.rax = self.rax;
		regs.rip = self.rip;
		regs.cs = self.cs;
		regs.ss = self.ss;
		regs.rflags = self.rflags;
		regs.rsp = self.rsp;
	}

	/// Overwrites this frame's task-relevant registers from `regs`, as the scheduler does right
	/// before returning control to the task it just picked. `gs`/`fs`/`int`/`code` are untouched.
	pub fn restore_from(&mut self, regs: &crate::process::task::Regs) {
		self.r15 = regs.r15;
		self.r14 = regs.r14;
		self.r13 = regs.r13;
		self.r12 = regs.r12;
		self.r11 = regs.r11;
		self.r10 = regs.r10;
		self.r9 = regs.r9;
		self.r8 = regs.r8;
		self.rdi = regs.rdi;
		self.rsi = regs.rsi;
		self.rbp = regs.rbp;
		self.rdx = regs.rdx;
		self.rcx = regs.rcx;
		self.rbx = regs.rbx;
		self.rax = regs.rax;
		self.rip = regs.rip;
		self.cs = regs.cs;
		self.ss = regs.ss;
		self.rflags = regs.rflags;
		self.rsp = regs.rsp;
	}
}

impl fmt::Display for IntFrame {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "Interrupt: {} (code: {:#x})", self.int, self.code)?;
		writeln!(
			f,
			"rax: {:#018x} rbx: {:#018x} rcx: {:#018x} rdx: {:#018x}",
			self.rax, self.rbx, self.rcx, self.rdx
		)?;
		writeln!(
			f,
			"rsi: {:#018x} rdi: {:#018x} rbp: {:#018x} rsp: {:#018x}",
			self.rsi, self.rdi, self.rbp, self.rsp
		)?;
		writeln!(f, "rip: {:#018x} rflags: {:#018x}", self.rip, self.rflags)?;
		write!(f, "cs: {:#x} ss: {:#x} gs: {:#x} fs: {:#x}", self.cs, self.ss, self.gs, self.fs)
	}
}

/// An IDT gate descriptor.
#[repr(C)]
#[derive(Clone, Copy)]
struct InterruptDescriptor {
	offset0: u16,
	selector: u16,
	ist: u8,
	flags: u8,
	offset1: u16,
	offset2: u32,
	reserved: u32,
}

impl InterruptDescriptor {
	const fn placeholder() -> Self {
		Self {
			offset0: 0,
			selector: 0,
			ist: 0,
			flags: 0,
			offset1: 0,
			offset2: 0,
			reserved: 0,
		}
	}

	fn new(address: *const c_void, selector: u16, flags: u8, ist: u8) -> Self {
		let addr = address as usize;
		Self {
			offset0: (addr & 0xffff) as u16,
			selector,
			ist,
			flags,
			offset1: ((addr >> 16) & 0xffff) as u16,
			offset2: ((addr >> 32) & 0xffffffff) as u32,
			reserved: 0,
		}
	}
}

/// An IDT header, loaded with `lidt`.
#[repr(C, packed)]
struct InterruptDescriptorTable {
	size: u16,
	offset: u64,
}

/// The raw IDT. Filled once at [`init`] and never mutated afterwards; only [`HANDLERS`] and
/// [`ENABLED`] change at runtime.
static mut IDT_ENTRIES: [InterruptDescriptor; ENTRIES_COUNT] =
	[InterruptDescriptor::placeholder(); ENTRIES_COUNT];

unsafe extern "C" {
	fn error0();
	fn error1();
	fn error2();
	fn error3();
	fn error4();
	fn error5();
	fn error6();
	fn error7();
	fn error8();
	fn error9();
	fn error10();
	fn error11();
	fn error12();
	fn error13();
	fn error14();
	fn error15();
	fn error16();
	fn error17();
	fn error18();
	fn error19();
	fn error20();
	fn error21();
	fn error22();
	fn error23();
	fn error24();
	fn error25();
	fn error26();
	fn error27();
	fn error28();
	fn error29();
	fn error30();
	fn error31();

	fn irq0();
	fn irq1();
	fn irq2();
	fn irq3();
	fn irq4();
	fn irq5();
	fn irq6();
	fn irq7();
	fn irq8();
	fn irq9();
	fn irq10();
	fn irq11();
	fn irq12();
	fn irq13();
	fn irq14();
	fn irq15();

	fn error128();
}

/// Points `SYSCALL`/`SYSRET` at the kernel/user selector pairs the GDT layout dictates and sets
/// `entry` as the target of the fast `syscall` instruction, masking `rflags`'s interrupt bit so a
/// syscall always starts with interrupts off.
///
/// Relies on [`gdt::check_selector_layout`] having already verified the selector offsets this
/// depends on.
pub fn enable_syscall_inst(entry: extern "C" fn()) {
	use crate::arch::x86::{MSR_EFER, MSR_FMASK, MSR_LSTAR, MSR_STAR, rdmsr, wrmsr};
	unsafe {
		wrmsr(MSR_EFER, rdmsr(MSR_EFER) | 1);
		let star = ((gdt::USER_CS as u64) << 48) | ((gdt::KERNEL_CS as u64) << 32);
		wrmsr(MSR_STAR, star);
		wrmsr(MSR_LSTAR, entry as usize as u64);
		wrmsr(MSR_FMASK, 1 << 9);
	}
}

/// Runs `f` with maskable interrupts disabled, restoring the prior flag on return.
pub fn wrap_disable_interrupts<T, F: FnOnce() -> T>(f: F) -> T {
	let was_enabled = is_interrupt_enabled();
	cli();
	let res = f();
	if was_enabled {
		sti();
	}
	res
}

/// Initializes the GDT/TSS (for the IST-backed interrupt stack), builds every IDT gate, and loads
/// the table. Interrupts are left disabled: the caller unmasks what it needs once its own
/// handlers are registered.
pub fn init() {
	cli();
	gdt::flush();
	tss::init();
	unsafe {
		IDT_ENTRIES[0x00] = InterruptDescriptor::new(error0 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x01] = InterruptDescriptor::new(error1 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x02] = InterruptDescriptor::new(error2 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x03] = InterruptDescriptor::new(error3 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x04] = InterruptDescriptor::new(error4 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x05] = InterruptDescriptor::new(error5 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x06] = InterruptDescriptor::new(error6 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x07] = InterruptDescriptor::new(error7 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x08] = InterruptDescriptor::new(error8 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x09] = InterruptDescriptor::new(error9 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x0a] = InterruptDescriptor::new(error10 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x0b] = InterruptDescriptor::new(error11 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x0c] = InterruptDescriptor::new(error12 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x0d] = InterruptDescriptor::new(error13 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x0e] = InterruptDescriptor::new(error14 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x0f] = InterruptDescriptor::new(error15 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x10] = InterruptDescriptor::new(error16 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x11] = InterruptDescriptor::new(error17 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x12] = InterruptDescriptor::new(error18 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x13] = InterruptDescriptor::new(error19 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x14] = InterruptDescriptor::new(error20 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x15] = InterruptDescriptor::new(error21 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x16] = InterruptDescriptor::new(error22 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x17] = InterruptDescriptor::new(error23 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x18] = InterruptDescriptor::new(error24 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x19] = InterruptDescriptor::new(error25 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x1a] = InterruptDescriptor::new(error26 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x1b] = InterruptDescriptor::new(error27 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x1c] = InterruptDescriptor::new(error28 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x1d] = InterruptDescriptor::new(error29 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x1e] = InterruptDescriptor::new(error30 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x1f] = InterruptDescriptor::new(error31 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);

		IDT_ENTRIES[0x20] = InterruptDescriptor::new(irq0 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x21] = InterruptDescriptor::new(irq1 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x22] = InterruptDescriptor::new(irq2 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x23] = InterruptDescriptor::new(irq3 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x24] = InterruptDescriptor::new(irq4 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x25] = InterruptDescriptor::new(irq5 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x26] = InterruptDescriptor::new(irq6 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x27] = InterruptDescriptor::new(irq7 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x28] = InterruptDescriptor::new(irq8 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x29] = InterruptDescriptor::new(irq9 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x2a] = InterruptDescriptor::new(irq10 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x2b] = InterruptDescriptor::new(irq11 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x2c] = InterruptDescriptor::new(irq12 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x2d] = InterruptDescriptor::new(irq13 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x2e] = InterruptDescriptor::new(irq14 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);
		IDT_ENTRIES[0x2f] = InterruptDescriptor::new(irq15 as _, gdt::KERNEL_CS as u16, GATE_INTERRUPT, IST_INDEX);

		IDT_ENTRIES[SYSCALL_VECTOR as usize] = InterruptDescriptor::new(
			error128 as _,
			gdt::KERNEL_CS as u16,
			GATE_INTERRUPT_USER,
			IST_INDEX,
		);

		let idt = InterruptDescriptorTable {
			size: (size_of::<InterruptDescriptor>() * ENTRIES_COUNT - 1) as u16,
			offset: addr_of!(IDT_ENTRIES) as u64,
		};
		core::arch::asm!("lidt [{}]", in(reg) &idt);
	}
}

/// The Rust side of the shared assembly trampoline: looks up `frame.int`'s handlers and runs
/// whichever of [`Priority::First`]/[`Priority::Second`] are registered, in that order, unless
/// the vector has been disabled via [`set_enabled`].
extern "C" fn interrupt_dispatch(frame: *mut IntFrame) {
	let frame = unsafe { &mut *frame };
	let vector = frame.int as usize;
	if !ENABLED.lock()[vector] {
		return;
	}
	let slots = HANDLERS.lock()[vector];
	for slot in slots.into_iter().flatten() {
		slot(frame);
	}
}

global_asm!(
	r#"
.code64

.macro ISR_NOERR num
.global error\num
error\num:
	push 0
	push \num
	jmp int_common_stub
.endm

.macro ISR_ERR num
.global error\num
error\num:
	push \num
	jmp int_common_stub
.endm

.macro IRQ num, vec
.global irq\num
irq\num:
	push 0
	push \vec
	jmp int_common_stub
.endm

ISR_NOERR 0
ISR_NOERR 1
ISR_NOERR 2
ISR_NOERR 3
ISR_NOERR 4
ISR_NOERR 5
ISR_NOERR 6
ISR_NOERR 7
ISR_ERR 8
ISR_NOERR 9
ISR_ERR 10
ISR_ERR 11
ISR_ERR 12
ISR_ERR 13
ISR_ERR 14
ISR_NOERR 15
ISR_NOERR 16
ISR_ERR 17
ISR_NOERR 18
ISR_NOERR 19
ISR_NOERR 20
ISR_ERR 21
ISR_NOERR 22
ISR_NOERR 23
ISR_NOERR 24
ISR_NOERR 25
ISR_NOERR 26
ISR_NOERR 27
ISR_NOERR 28
ISR_ERR 29
ISR_ERR 30
ISR_NOERR 31

IRQ 0, 0x20
IRQ 1, 0x21
IRQ 2, 0x22
IRQ 3, 0x23
IRQ 4, 0x24
IRQ 5, 0x25
IRQ 6, 0x26
IRQ 7, 0x27
IRQ 8, 0x28
IRQ 9, 0x29
IRQ 10, 0x2a
IRQ 11, 0x2b
IRQ 12, 0x2c
IRQ 13, 0x2d
IRQ 14, 0x2e
IRQ 15, 0x2f

ISR_NOERR 128

int_common_stub:
	push fs
	push gs
	push r15
	push r14
	push r13
	push r12
	push r11
	push r10
	push r9
	push r8
	push rbp
	push rdi
	push rsi
	push rdx
	push rcx
	push rbx
	push rax

	mov ax, 0
	mov fs, ax
	mov gs, ax

	mov rdi, rsp
	call {dispatch}

	pop rax
	pop rbx
	pop rcx
	pop rdx
	pop rsi
	pop rdi
	pop rbp
	pop r8
	pop r9
	pop r10
	pop r11
	pop r12
	pop r13
	pop r14
	pop r15
	pop gs
	pop fs

	add rsp, 16
	iretq
"#,
	dispatch = sym interrupt_dispatch
);

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn register_then_dispatch_runs_first_before_second() {
		static ORDER: IntSpin<[u8; 2]> = IntSpin::new([0; 2]);
		static COUNT: IntSpin<u8> = IntSpin::new(0);
		fn first(_frame: &mut IntFrame) {
			let mut count = COUNT.lock();
			ORDER.lock()[*count as usize] = 1;
			*count += 1;
		}
		fn second(_frame: &mut IntFrame) {
			let mut count = COUNT.lock();
			ORDER.lock()[*count as usize] = 2;
			*count += 1;
		}
		register(0x30, Priority::First, first);
		register(0x30, Priority::Second, second);
		let mut frame = IntFrame {
			int: 0x30,
			..Default::default()
		};
		interrupt_dispatch(&mut frame as *mut IntFrame);
		assert_eq!(*ORDER.lock(), [1, 2]);
	}

	#[test_case]
	fn disabled_vector_is_not_dispatched() {
		static CALLED: IntSpin<bool> = IntSpin::new(false);
		fn handler(_frame: &mut IntFrame) {
			*CALLED.lock() = true;
		}
		register(0x31, Priority::First, handler);
		set_enabled(0x31, false);
		let mut frame = IntFrame {
			int: 0x31,
			..Default::default()
		};
		interrupt_dispatch(&mut frame as *mut IntFrame);
		assert!(!*CALLED.lock());
		set_enabled(0x31, true);
	}

	#[test_case]
	fn save_and_restore_round_trip_task_registers() {
		let mut frame = IntFrame {
			rax: 42,
			rip: 0x1000,
			rflags: 0x202,
			..Default::default()
		};
		let mut regs = crate::process::task::Regs::default();
		frame.save_to(&mut regs);
		assert_eq!(regs.rax, 42);
		assert_eq!(regs.rip, 0x1000);

		let mut fresh = IntFrame::default();
		fresh.restore_from(&regs);
		assert_eq!(fresh.rax, 42);
		assert_eq!(fresh.rip, 0x1000);
	}
}
