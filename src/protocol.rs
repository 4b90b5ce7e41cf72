//! The fixed command/event vocabulary exchanged between a debugger (or
//! runner frontend) and a running VM.
//!
//! Transport is two in-process `crossbeam_channel` pairs (see
//! [`crate::runner`]): a command channel carries [`Command`] values from
//! debugger/frontend to the VM thread, and an event channel carries
//! [`Event`] values back. The wire vocabulary itself — not the channel
//! implementation — is what spec.md §6 fixes.

use crate::snapshot::Snapshot;
use crate::types::Word;

/// A request sent to the VM's control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Execute exactly one instruction, then stop.
    Step,
    /// Resume until the next `RET` returns to the caller, then stop.
    StepOut,
    /// Enter the stopped state without advancing `ip`.
    Stop,
    /// Leave the stopped state; one step is taken immediately so a
    /// breakpoint that was just hit doesn't immediately re-trigger.
    Resume,
    /// Request an `Event::Breakpoints` reply listing every set address.
    InfoBreakpoints,
    /// Add an execution breakpoint at the given address.
    SetBreakpoint(Word),
    /// Remove an execution breakpoint at the given address, if present.
    ClearBreakpoint(Word),
    /// Write a register, applied on the VM thread's next poll.
    WriteReg(u8, Word),
    /// Write a memory cell, applied on the VM thread's next poll.
    WriteMem(Word, Word),
    /// Tear down the worker thread. Not part of spec.md §6's fixed debug
    /// vocabulary: it's the runner's own lifecycle plumbing for
    /// `restart`/`reset`/`quit`, layered on the same channel rather than a
    /// second one.
    Shutdown,
    /// Request an `Event::Snapshot` reply. Not part of spec.md §6's fixed
    /// vocabulary either: it's how a CLI frontend gets the detached,
    /// consistent state every inspection operation in §4.5 needs, since the
    /// VM lives on the worker thread and the frontend never touches it
    /// directly.
    RequestSnapshot,
}

/// A notification published by the VM's event endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The VM has entered the stopped state (breakpoint, step or step-out).
    Stopped,
    /// Reply to `Command::InfoBreakpoints`: every currently-set address.
    Breakpoints(Vec<Word>),
    /// The VM halted (reached `HALT`, or `RET` on an empty stack).
    Halted,
    /// Reply to `Command::RequestSnapshot`.
    Snapshot(Snapshot),
}
