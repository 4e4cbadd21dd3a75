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

//! A small x86-64 kernel core: a 4-level virtual memory manager, a preemptive scheduler with
//! signals and per-task address spaces, and an interrupt/syscall dispatcher. Storage, filesystems
//! and a real program loader live outside this crate; the scheduler only reaches them through
//! [`vfs`], a minimal seam a real backend would register itself into.
//!
//! # Features
//!
//! The crate has the following features:
//! - `strace`: if enabled, the syscall plane traces every call. This is a debug feature.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(crate::selftest::runner)]
#![reexport_test_harness_main = "kernel_selftest"]
#![deny(missing_docs)]
#![allow(clippy::tabs_in_doc_comments)]
#![allow(dead_code)]

extern crate alloc;

pub mod arch;
mod boot;
pub mod cmdline;
#[macro_use]
pub mod config;
pub mod errno;
pub mod logger;
pub mod memory;
pub mod multiboot;
#[macro_use]
pub mod panic;
#[macro_use]
pub mod print;
pub mod process;
pub mod selftest;
pub mod sync;
pub mod syscall;
pub mod vfs;

use crate::{cmdline::ArgsParser, logger::LOGGER};
use core::ffi::c_void;

/// The kernel's name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Current kernel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// An inner function is required to ensure everything in scope is dropped before the scheduler
/// takes over.
///
/// Does not return: [`process::scheduler::init`] ends by dispatching the bootstrap task through
/// a software interrupt, which never hands control back here.
fn kernel_main_inner(magic: u32, multiboot_ptr: *const c_void) {
	assert_eq!(
		magic,
		multiboot::BOOTLOADER_MAGIC,
		"invalid multiboot magic number"
	);

	// Architecture bring-up: SSE, IDT, PIC masking, PIT.
	arch::init();

	println!("Boot {NAME} version {VERSION}");

	// Read multiboot information
	unsafe {
		multiboot::read_tags(multiboot_ptr);
	}
	let boot_info = multiboot::get_boot_info();

	// Initialize memory management
	println!("Setup memory management");
	memory::memmap::init(boot_info);

	// Perform kernel self-tests
	#[cfg(test)]
	kernel_selftest();

	// Parse bootloader command line arguments
	let cmdline = boot_info.cmdline.unwrap_or_default();
	let args_parser = ArgsParser::parse(cmdline).expect("could not parse command line");
	LOGGER.lock().silent = args_parser.is_silent();

	// Wire the syscall plane: DPL=3 IDT vector plus the selector layout the fast `syscall`
	// instruction MSR path depends on.
	arch::x86::gdt::check_selector_layout();
	syscall::init();

	println!("Setup scheduler");
	process::scheduler::init();
}

/// This is the main function of the Rust source code, responsible for the
/// initialization of the kernel.
///
/// When calling this function, the CPU must be in Protected Mode with the GDT loaded with space
/// for the Task State Segment.
///
/// Arguments:
/// - `magic` is the magic number passed by Multiboot.
/// - `multiboot_ptr` is the pointer to the Multiboot booting information structure.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(magic: u32, multiboot_ptr: *const c_void) -> ! {
	kernel_main_inner(magic, multiboot_ptr);
	// Reached only if the scheduler somehow returned without dispatching a task.
	loop {
		arch::x86::hlt();
	}
}
