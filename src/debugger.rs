//! Snapshot-based inspection plus command dispatch to a running VM.
//!
//! Every inspection operation ([`Debugger::disassemble`],
//! [`Debugger::show_registers`], [`Debugger::dump_memory`],
//! [`Debugger::show_stack`]) works off a [`Snapshot`] taken at call time, so
//! it never observes a half-formed instruction and is safe to call while the
//! VM thread keeps running. Control operations ([`Debugger::step`],
//! [`Debugger::resume`], breakpoint/register/memory writes) send a
//! [`Command`] through the control endpoint; they don't block for a reply
//! (the reply, if any, arrives later as an [`Event`] on the event channel).

use std::fmt::Write as _;

use crossbeam_channel::Sender;

use crate::disasm::{self, DEFAULT_CODE_END};
use crate::protocol::Command;
use crate::snapshot::Snapshot;
use crate::types::Word;

/// Instructions shown before the selected one in [`Debugger::disassemble`].
const WINDOW_BEFORE: usize = 3;
/// Instructions shown after the selected one.
const WINDOW_AFTER: usize = 6;
/// Words per row in [`Debugger::dump_memory`].
const MEM_ROW_WIDTH: usize = 8;

/// A handle to a running VM's control endpoint, plus formatting helpers that
/// operate on snapshots rather than a live reference.
pub struct Debugger {
    control: Sender<Command>,
    code_end: Word,
}

impl Debugger {
    /// Attach to a VM's control endpoint. `code_end` is forwarded to the
    /// disassembler (see [`crate::disasm::DEFAULT_CODE_END`]).
    pub fn new(control: Sender<Command>) -> Self {
        Debugger {
            control,
            code_end: DEFAULT_CODE_END,
        }
    }

    /// Override the disassembler's code/data split point.
    pub fn with_code_end(mut self, code_end: Word) -> Self {
        self.code_end = code_end;
        self
    }

    /// Render a disassembly window centered on `snapshot`'s current IP:
    /// up to 3 instructions before, up to 6 after, the selected instruction
    /// marked with `>`.
    pub fn disassemble(&self, snapshot: &Snapshot, out: &mut String) -> std::fmt::Result {
        let ops = disasm::optimize(&disasm::decode(snapshot.memory(), self.code_end));
        let ip = snapshot.ip();

        let selected = match ops.iter().position(|op| op.offset >= ip) {
            Some(i) => i,
            None => return Ok(()),
        };

        let from = selected.saturating_sub(WINDOW_BEFORE);
        let upto = (selected + WINDOW_AFTER + 1).min(ops.len());

        for (i, op) in ops[from..upto].iter().enumerate() {
            let marker = if from + i == selected { "> " } else { "  " };
            writeln!(out, "{marker}{op}")?;
        }
        Ok(())
    }

    /// Render the eight registers as a two-line header/value table.
    pub fn show_registers(&self, snapshot: &Snapshot, out: &mut String) -> std::fmt::Result {
        for i in 0..8 {
            write!(out, "r{i:<3} ")?;
        }
        writeln!(out)?;
        for r in snapshot.registers() {
            write!(out, "{r:04x} ")?;
        }
        writeln!(out)?;
        Ok(())
    }

    /// Dump `size` words of memory starting at `address`, 8 words per row,
    /// with a trailing printable-ASCII gutter.
    pub fn dump_memory(&self, snapshot: &Snapshot, address: Word, size: usize, out: &mut String) -> std::fmt::Result {
        let mem = snapshot.memory();
        let start = address as usize;

        for row_start in (start..start + size).step_by(MEM_ROW_WIDTH) {
            write!(out, "{row_start:04X}:")?;
            let row_end = (row_start + MEM_ROW_WIDTH).min(start + size);

            let mut gutter = String::new();
            for addr in row_start..row_end {
                let word = mem.get(addr).copied().unwrap_or(0);
                write!(out, " {word:04x}")?;
                let byte = (word & 0xFF) as u8;
                gutter.push(if (0x20..0x7F).contains(&byte) { byte as char } else { '.' });
            }
            for _ in row_end..row_start + MEM_ROW_WIDTH {
                write!(out, "     ")?;
            }
            writeln!(out, "  {gutter}")?;
        }
        Ok(())
    }

    /// Show the top `size` stack entries, walking down from `sp - 1`.
    pub fn show_stack(&self, snapshot: &Snapshot, size: usize, out: &mut String) -> std::fmt::Result {
        let stack = snapshot.stack();
        let depth = stack.len();
        let take = size.min(depth);

        for i in 0..take {
            let idx = depth - 1 - i;
            writeln!(out, "{idx:04}: {:04x}", stack[idx])?;
        }
        Ok(())
    }

    /// Execute exactly one instruction, then stop.
    pub fn step(&self) {
        let _ = self.control.send(Command::Step);
    }

    /// Run until the next `RET` returns to the caller, then stop.
    pub fn step_out(&self) {
        let _ = self.control.send(Command::StepOut);
    }

    /// Enter the stopped state without advancing `ip`.
    pub fn stop(&self) {
        let _ = self.control.send(Command::Stop);
    }

    /// Leave the stopped state.
    pub fn resume(&self) {
        let _ = self.control.send(Command::Resume);
    }

    /// Request the current breakpoint set (arrives as `Event::Breakpoints`).
    pub fn list_breakpoints(&self) {
        let _ = self.control.send(Command::InfoBreakpoints);
    }

    /// Add an execution breakpoint.
    pub fn break_on(&self, address: Word) {
        let _ = self.control.send(Command::SetBreakpoint(address));
    }

    /// Remove an execution breakpoint.
    pub fn clear_breakpoint(&self, address: Word) {
        let _ = self.control.send(Command::ClearBreakpoint(address));
    }

    /// Write a register. Safest when the VM is stopped; the VM applies it on
    /// its next control poll regardless of run state.
    pub fn set_register(&self, index: u8, value: Word) {
        let _ = self.control.send(Command::WriteReg(index, value));
    }

    /// Write a memory cell, applied on the VM's next control poll.
    pub fn write_memory(&self, address: Word, value: Word) {
        let _ = self.control.send(Command::WriteMem(address, value));
    }

    /// Request a fresh [`Snapshot`] of the live VM (arrives as
    /// `Event::Snapshot` on the event channel).
    pub fn request_snapshot(&self) {
        let _ = self.control.send(Command::RequestSnapshot);
    }
}
