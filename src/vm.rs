//! Fetch/decode/execute core: registers, memory, call stack, breakpoints,
//! and the run/step state machine.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::error::VmError;
use crate::opcode::Opcode;
use crate::protocol::{Command, Event};
use crate::snapshot::Snapshot;
use crate::types::{Operand, Word, MEM_SIZE, REG_COUNT};

/// How long the VM sleeps between control-channel polls while stopped.
/// Keeps the loop from spinning hot without adding real latency to a human
/// issuing debugger commands.
const STOPPED_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The interpreter: memory, registers, stack, and the breakpoint/run state
/// that the debugger and runner observe and drive.
///
/// Guest I/O (`IN`/`OUT`) goes through `input`/`output` rather than directly
/// against `std::io::stdin`/`stdout`, so a runner can redirect a VM's guest
/// stream to a PTY slave without the VM needing to know about terminals at
/// all. The default, built by [`Vm::new`], is plain process stdio.
pub struct Vm {
    mem: Box<[Word; MEM_SIZE]>,
    reg: [Word; REG_COUNT],
    stack: Vec<Word>,
    ip: Word,
    halted: bool,
    stopped: bool,
    last_op: Option<Opcode>,
    breakpoints: HashSet<Word>,
    break_next: bool,
    break_ret: bool,
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A freshly zeroed VM with no image loaded, reading guest input from
    /// process stdin and writing guest output to process stdout.
    pub fn new() -> Self {
        Vm {
            mem: Box::new([0; MEM_SIZE]),
            reg: [0; REG_COUNT],
            stack: Vec::new(),
            ip: 0,
            halted: false,
            stopped: false,
            last_op: None,
            breakpoints: HashSet::new(),
            break_next: false,
            break_ret: false,
            input: Box::new(io::stdin()),
            output: Box::new(io::stdout()),
        }
    }

    /// Redirect guest input (the `IN` opcode) to `reader`, e.g. a PTY slave.
    pub fn set_input(&mut self, reader: impl Read + Send + 'static) {
        self.input = Box::new(reader);
    }

    /// Redirect guest output (the `OUT` opcode) to `writer`.
    pub fn set_output(&mut self, writer: impl Write + Send + 'static) {
        self.output = Box::new(writer);
    }

    /// Zero all state and copy `image` into memory starting at address 0.
    pub fn load(&mut self, image: &[Word]) {
        *self.mem = [0; MEM_SIZE];
        self.reg = [0; REG_COUNT];
        self.stack.clear();
        self.ip = 0;
        self.halted = false;
        self.stopped = false;
        self.last_op = None;
        self.break_next = false;
        self.break_ret = false;

        let n = image.len().min(MEM_SIZE);
        self.mem[..n].copy_from_slice(&image[..n]);
    }

    /// Current instruction pointer.
    pub const fn ip(&self) -> Word {
        self.ip
    }

    /// Stack depth.
    pub fn sp(&self) -> Word {
        self.stack.len() as Word
    }

    /// Register file, read-only.
    pub const fn registers(&self) -> &[Word; REG_COUNT] {
        &self.reg
    }

    /// Memory, read-only.
    pub fn memory(&self) -> &[Word; MEM_SIZE] {
        &self.mem
    }

    /// Live stack contents, bottom to top.
    pub fn stack(&self) -> &[Word] {
        &self.stack
    }

    /// True once `HALT` has been reached or `RET` emptied the stack.
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// True while paused (breakpoint hit, single-stepping, or explicit stop).
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Mark the VM halted; the next `run` iteration returns.
    pub fn halt(&mut self) {
        self.stopped = true;
        self.halted = true;
    }

    /// Add an execution breakpoint.
    pub fn set_breakpoint(&mut self, address: Word) {
        self.breakpoints.insert(address);
    }

    /// Remove an execution breakpoint, if present.
    pub fn clear_breakpoint(&mut self, address: Word) {
        self.breakpoints.remove(&address);
    }

    /// Every currently-set breakpoint address.
    pub fn breakpoints(&self) -> Vec<Word> {
        let mut addrs: Vec<Word> = self.breakpoints.iter().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Resolve an operand to its value: literal pass-through, register read,
    /// or zero for the reserved range (spec.md §3, preserved as permissive).
    fn val(&self, x: Word) -> Word {
        match Operand::decode(x) {
            Operand::Literal(v) => v,
            Operand::Register(r) => self.reg[r as usize],
            Operand::Invalid => 0,
        }
    }

    /// Resolve an operand to a register index, or fail if it names a
    /// literal or reserved word: writing through either is fatal.
    fn reg_index(&self, x: Word) -> Result<usize, VmError> {
        match Operand::decode(x) {
            Operand::Register(r) => Ok(r as usize),
            _ => Err(VmError::InvalidWriteTarget(x)),
        }
    }

    fn fetch3(&self) -> (Word, Word, Word, Word) {
        let ip = self.ip as usize;
        let read = |i: usize| -> Word { if i < MEM_SIZE { self.mem[i] } else { 0 } };
        (read(ip), read(ip + 1), read(ip + 2), read(ip + 3))
    }

    /// Execute exactly one instruction.
    pub fn step(&mut self) -> Result<(), VmError> {
        let (opcode_word, a, b, c) = self.fetch3();
        let opcode = Opcode::from_word(opcode_word).ok_or(VmError::UnknownOpcode {
            opcode: opcode_word,
            ip: self.ip,
        })?;

        trace!(ip = self.ip, op = opcode.mnemonic(), "step");

        match opcode {
            Opcode::Halt => {
                self.halted = true;
                return Ok(());
            }
            Opcode::Set => {
                let r = self.reg_index(a)?;
                self.reg[r] = self.val(b);
                self.ip += 3;
            }
            Opcode::Push => {
                self.stack.push(self.val(a));
                self.ip += 2;
            }
            Opcode::Pop => {
                let v = self.stack.pop().ok_or(VmError::StackUnderflow)?;
                let r = self.reg_index(a)?;
                self.reg[r] = v;
                self.ip += 2;
            }
            Opcode::Eq => {
                let r = self.reg_index(a)?;
                self.reg[r] = (self.val(b) == self.val(c)) as Word;
                self.ip += 4;
            }
            Opcode::Gt => {
                let r = self.reg_index(a)?;
                self.reg[r] = (self.val(b) > self.val(c)) as Word;
                self.ip += 4;
            }
            Opcode::Jmp => {
                self.ip = self.val(a);
            }
            Opcode::Jt => {
                self.ip = if self.val(a) != 0 { self.val(b) } else { self.ip + 3 };
            }
            Opcode::Jf => {
                self.ip = if self.val(a) == 0 { self.val(b) } else { self.ip + 3 };
            }
            Opcode::Add => {
                let r = self.reg_index(a)?;
                self.reg[r] = ((self.val(b) as u32 + self.val(c) as u32) % 0x8000) as Word;
                self.ip += 4;
            }
            Opcode::Mult => {
                let r = self.reg_index(a)?;
                self.reg[r] = ((self.val(b) as u32 * self.val(c) as u32) % 0x8000) as Word;
                self.ip += 4;
            }
            Opcode::Mod => {
                let r = self.reg_index(a)?;
                self.reg[r] = self.val(b) % self.val(c);
                self.ip += 4;
            }
            Opcode::And => {
                let r = self.reg_index(a)?;
                self.reg[r] = self.val(b) & self.val(c);
                self.ip += 4;
            }
            Opcode::Or => {
                let r = self.reg_index(a)?;
                self.reg[r] = self.val(b) | self.val(c);
                self.ip += 4;
            }
            Opcode::Not => {
                let r = self.reg_index(a)?;
                self.reg[r] = !self.val(b) & 0x7FFF;
                self.ip += 3;
            }
            Opcode::Rmem => {
                let r = self.reg_index(a)?;
                self.reg[r] = self.mem[self.val(b) as usize % MEM_SIZE];
                self.ip += 3;
            }
            Opcode::Wmem => {
                let addr = self.val(a) as usize % MEM_SIZE;
                self.mem[addr] = self.val(b);
                self.ip += 3;
            }
            Opcode::Call => {
                self.stack.push(self.ip + 2);
                self.ip = self.val(a);
            }
            Opcode::Ret => match self.stack.pop() {
                Some(addr) => self.ip = addr,
                None => self.halted = true,
            },
            Opcode::Out => {
                self.ip += 2;
                let byte = (self.val(a) & 0xFF) as u8;
                let _ = self.output.write_all(&[byte]);
                let _ = self.output.flush();
            }
            Opcode::In => {
                let r = self.reg_index(a)?;
                let mut buf = [0u8; 1];
                self.reg[r] = match self.input.read_exact(&mut buf) {
                    Ok(()) => buf[0] as Word,
                    // EOF: store the platform sentinel directly, as the
                    // original does by assigning a raw `int` read result.
                    Err(_) => 0xFFFF,
                };
                self.ip += 2;
            }
            Opcode::Noop => {
                self.ip += 1;
            }
            Opcode::Data => unreachable!("Data is a disassembler-only pseudo-op"),
        }

        self.last_op = Some(opcode);
        Ok(())
    }

    /// Check breakpoint conditions in spec.md §4.2 order: a pending
    /// single-step flag, an address match, then a pending step-out gated on
    /// the previous opcode being `RET`.
    fn should_break(&mut self) -> bool {
        if self.break_next {
            self.break_next = false;
            self.break_ret = false;
            return true;
        }
        if self.breakpoints.contains(&self.ip) {
            self.break_ret = false;
            return true;
        }
        if self.break_ret && self.last_op == Some(Opcode::Ret) {
            self.break_ret = false;
            return true;
        }
        false
    }

    /// Execute until halted, servicing at most one control command and
    /// advancing at most one instruction per loop iteration.
    pub fn run(&mut self, control: &Receiver<Command>, events: &Sender<Event>) -> Result<(), VmError> {
        while !self.halted {
            if let Ok(command) = control.try_recv() {
                self.apply_command(command, events);
            }

            if !self.stopped {
                if self.should_break() {
                    self.stopped = true;
                    debug!(ip = self.ip, "stopped");
                    let _ = events.send(Event::Stopped);
                } else {
                    self.step()?;
                    if self.halted {
                        let _ = events.send(Event::Halted);
                    }
                }
            } else {
                std::thread::sleep(STOPPED_POLL_INTERVAL);
            }
        }
        Ok(())
    }

    fn apply_command(&mut self, command: Command, events: &Sender<Event>) {
        match command {
            Command::Step => {
                self.stopped = false;
                if let Err(e) = self.step() {
                    warn!(error = %e, "step failed");
                }
                self.break_next = true;
            }
            Command::StepOut => {
                self.break_ret = true;
                self.stopped = false;
                if let Err(e) = self.step() {
                    warn!(error = %e, "step-out step failed");
                }
            }
            Command::Stop => {
                self.stopped = true;
            }
            Command::Resume => {
                self.stopped = false;
                if let Err(e) = self.step() {
                    warn!(error = %e, "resume step failed");
                }
            }
            Command::InfoBreakpoints => {
                let _ = events.send(Event::Breakpoints(self.breakpoints()));
            }
            Command::SetBreakpoint(addr) => self.set_breakpoint(addr),
            Command::ClearBreakpoint(addr) => self.clear_breakpoint(addr),
            Command::WriteReg(r, v) => {
                if (r as usize) < REG_COUNT {
                    self.reg[r as usize] = v;
                }
            }
            Command::WriteMem(addr, v) => {
                self.mem[addr as usize % MEM_SIZE] = v;
            }
            Command::Shutdown => {
                self.stopped = true;
                self.halted = true;
            }
            Command::RequestSnapshot => {
                let _ = events.send(Event::Snapshot(self.save()));
            }
        }
    }

    /// Snapshot the full VM state as a detached value.
    pub fn save(&self) -> Snapshot {
        let mem_used = self
            .mem
            .iter()
            .rposition(|&w| w != 0)
            .map(|i| i + 1)
            .unwrap_or(0);

        Snapshot {
            reg: self.reg,
            ip: self.ip,
            stack: self.stack.clone(),
            mem: self.mem[..mem_used].to_vec(),
        }
    }

    /// Restore full VM state from a snapshot.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        *self.mem = [0; MEM_SIZE];
        let n = snapshot.mem.len().min(MEM_SIZE);
        self.mem[..n].copy_from_slice(&snapshot.mem[..n]);

        self.reg = snapshot.reg;
        self.ip = snapshot.ip;
        self.stack = snapshot.stack.clone();
        self.halted = false;
        self.stopped = false;
        self.last_op = None;
        self.break_next = false;
        self.break_ret = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn run_to_halt(image: &[Word]) -> Vm {
        let mut vm = Vm::new();
        vm.load(image);
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
        vm.run(&cmd_rx, &ev_tx).unwrap();
        vm
    }

    #[test]
    fn minimal_run_advances_ip_to_halt() {
        let vm = run_to_halt(&[21, 21, 0]);
        assert_eq!(vm.ip(), 2);
        assert_eq!(vm.sp(), 0);
    }

    #[test]
    fn out_writes_bytes_in_order() {
        // Smoke test only: OUT's effect is observed via stdout, which this
        // test does not capture. It checks the instruction sequence runs
        // to completion without panicking or erroring.
        let vm = run_to_halt(&[19, b'X' as Word, 19, b'x' as Word, 19, b'\n' as Word, 0]);
        assert!(vm.is_halted());
    }

    #[test]
    fn add_wraps_modulo_32768() {
        let vm = run_to_halt(&[9, 0x8000, 10, 20000, 0]);
        assert_eq!(vm.registers()[0], 30000);
    }

    #[test]
    fn call_then_ret_on_empty_stack_halts_cleanly() {
        let vm = run_to_halt(&[17, 5, 0, 0, 0, 21, 18]);
        assert_eq!(vm.ip(), 2);
        assert!(vm.is_halted());
    }

    #[test]
    fn mult_overflow_uses_32bit_intermediate() {
        let vm = run_to_halt(&[10, 0x8000, 0x7FFF, 0x8001, 0x7FFF, 0]);
        assert_eq!(vm.registers()[0], 1);
    }

    #[test]
    fn not_is_involution_on_15_bits() {
        let vm = run_to_halt(&[14, 0x8000, 0, 14, 0x8001, 0x8000, 0]);
        assert_eq!(vm.registers()[0], 0x7FFF);
        assert_eq!(vm.registers()[1], 0);
    }

    #[test]
    fn jt_falls_through_on_zero() {
        // JT r0(=0), 0x7FFF -> not taken, falls through to ip+3 (NOOP) -> HALT
        let vm = run_to_halt(&[7, 0x8000, 0x7FFF, 21, 0]);
        assert!(vm.is_halted());
        assert_eq!(vm.ip(), 4);
    }

    #[test]
    fn jf_jumps_on_zero() {
        let vm = run_to_halt(&[8, 0x8000, 5, 21, 0, 0]);
        assert!(vm.is_halted());
    }

    #[test]
    fn in_reads_from_the_configured_reader() {
        let mut vm = Vm::new();
        vm.load(&[20, 0x8000, 0]);
        vm.set_input(&b"Q"[..]);
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
        vm.run(&cmd_rx, &ev_tx).unwrap();
        assert_eq!(vm.registers()[0], b'Q' as Word);
    }

    #[test]
    fn in_at_eof_stores_the_sentinel() {
        let mut vm = Vm::new();
        vm.load(&[20, 0x8000, 0]);
        vm.set_input(&b""[..]);
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
        vm.run(&cmd_rx, &ev_tx).unwrap();
        assert_eq!(vm.registers()[0], 0xFFFF);
    }

    #[test]
    fn out_writes_to_the_configured_writer() {
        let mut vm = Vm::new();
        vm.load(&[19, b'Q' as Word, 0]);
        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        struct SharedWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl std::io::Write for SharedWriter {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        vm.set_output(SharedWriter(buf.clone()));
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
        vm.run(&cmd_rx, &ev_tx).unwrap();
        assert_eq!(&*buf.lock().unwrap(), b"Q");
    }

    #[test]
    fn reserved_operand_reads_as_zero() {
        let vm = run_to_halt(&[4, 0x8000, 0x9000, 0, 0]);
        assert_eq!(vm.registers()[0], 1);
    }

    #[test]
    fn pop_on_empty_stack_is_fatal() {
        let mut vm = Vm::new();
        vm.load(&[3, 0x8000, 0]);
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
        let err = vm.run(&cmd_rx, &ev_tx).unwrap_err();
        assert!(matches!(err, VmError::StackUnderflow));
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut vm = Vm::new();
        vm.load(&[9999]);
        let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
        let err = vm.run(&cmd_rx, &ev_tx).unwrap_err();
        assert!(matches!(err, VmError::UnknownOpcode { opcode: 9999, .. }));
    }

    #[quickcheck]
    fn add_matches_modular_addition(b: u16, c: u16) -> bool {
        let b = b % 0x8000;
        let c = c % 0x8000;
        let vm = run_to_halt(&[9, 0x8000, b, c, 0]);
        vm.registers()[0] == ((b as u32 + c as u32) % 0x8000) as Word
    }

    #[quickcheck]
    fn mult_matches_modular_multiplication(b: u16, c: u16) -> bool {
        let b = b % 0x8000;
        let c = c % 0x8000;
        let vm = run_to_halt(&[10, 0x8000, b, c, 0]);
        vm.registers()[0] == ((b as u32 * c as u32) % 0x8000) as Word
    }

    #[quickcheck]
    fn not_matches_15bit_complement(b: u16) -> bool {
        let b = b % 0x8000;
        let vm = run_to_halt(&[14, 0x8000, b, 0]);
        vm.registers()[0] == (!b & 0x7FFF)
    }

    #[quickcheck]
    fn register_writes_never_exceed_14_bits_plus_one(b: u16) -> bool {
        let b = b % 0x8000;
        let vm = run_to_halt(&[1, 0x8000, b, 0]);
        vm.registers()[0] < 0x8000
    }
}
