//! Runtime error hierarchy for the interpreter, snapshot codec and runner.

use crate::types::Word;
use std::io;
use thiserror::Error;

/// Errors raised while fetching/decoding/executing an instruction.
#[derive(Debug, Error)]
pub enum VmError {
    /// The word at `ip` did not name one of the 22 known opcodes.
    #[error("unknown opcode {opcode:#06x} at ip={ip:#06x}")]
    UnknownOpcode {
        /// The offending raw word.
        opcode: Word,
        /// Instruction pointer at the time of the fault.
        ip: Word,
    },
    /// `POP` was executed against an empty stack. `RET` on an empty stack is
    /// not an error: it halts cleanly per spec.
    #[error("stack underflow")]
    StackUnderflow,
    /// An instruction tried to write through a literal (non-register)
    /// destination operand.
    #[error("invalid write target {0:#06x}: not a register")]
    InvalidWriteTarget(Word),
    /// Propagated I/O failure (guest stdin/stdout).
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while saving or loading a [`crate::snapshot::Snapshot`].
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The file did not start with the `SYNACOR\0` signature.
    #[error("not a snapshot file (bad signature)")]
    BadSignature,
    /// The file ended before every declared section could be read.
    #[error("truncated snapshot file")]
    Truncated,
    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised by the runner (frontend/worker lifecycle, debug commands).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The worker thread could not be (re)spawned.
    #[error("failed to start worker: {0}")]
    WorkerSpawn(String),
    /// A snapshot could not be restored; the live VM is left untouched.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    /// The VM's own execution error, surfaced through the event channel.
    #[error(transparent)]
    Vm(#[from] VmError),
    /// Platform PTY setup failed.
    #[error("pty error: {0}")]
    Pty(String),
}
