//! Frontend/worker split for the interactive REPL: a PTY bridges guest I/O,
//! a command/event channel pair bridges debug control, and the worker
//! thread owns the [`Vm`] exclusively.
//!
//! The binary (`src/bin/play.rs`) owns the actual `rustyline` read loop; this
//! module is the part that is unit-testable without a real terminal: line
//! classification, worker lifecycle (spawn/restart/reset/quit), and routing
//! a classified line to either the PTY master (guest input) or the control
//! channel (a debug command).

pub mod pty;

use std::io::Write;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::debugger::Debugger;
use crate::error::RunnerError;
use crate::protocol::{Command, Event};
use crate::snapshot::Snapshot;
use crate::types::Word;
use crate::vm::Vm;

/// First tokens that route a line to the worker's control endpoint instead
/// of the guest's PTY. Transcribed from spec.md §4.6.
const META_COMMANDS: &[&str] = &[
    "save", "load", "restore", "restart", "reset", "di", "dis", "disassemble", "reg", "regs", "registers", "s",
    "si", "step", "c", "cont", "b", "break", "clear", "fin", "finish", "m", "mem", "memory", "stack", "write",
    "q", "quit", "exit",
];

/// True if `first_token` names a known debug/meta command rather than guest
/// input that should go straight to the PTY master.
pub fn is_meta_command(first_token: &str) -> bool {
    META_COMMANDS.contains(&first_token)
}

/// How a REPL line should be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// First token is a known meta-command; carries the whole line back for
    /// the caller to tokenize and act on.
    Meta(String),
    /// Not a meta-command: write this verbatim (plus a newline) to the PTY
    /// master, to arrive as guest input.
    GuestInput(String),
}

/// Classify one REPL line. An empty line repeats `previous`, matching
/// spec.md §4.6 ("An empty line repeats the previous command").
pub fn classify(line: &str, previous: Option<&str>) -> Classified {
    let effective = if line.trim().is_empty() {
        previous.unwrap_or("").to_string()
    } else {
        line.to_string()
    };

    let first = effective.split_whitespace().next().unwrap_or("");
    if is_meta_command(first) {
        Classified::Meta(effective)
    } else {
        Classified::GuestInput(effective)
    }
}

/// A spawned worker: the thread running the VM, plus the two endpoints and
/// PTY master a frontend uses to drive it.
pub struct Worker {
    control: Sender<Command>,
    events: Receiver<Event>,
    pty_master: Box<dyn pty::PtyWriter>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker thread owning a fresh [`Vm`] loaded with `image`. The
    /// VM's guest input is bound to a PTY slave; guest output goes straight
    /// to process stdout (unbuffered per instruction, per spec.md §5).
    pub fn spawn(image: Vec<Word>) -> Result<Self, RunnerError> {
        Self::spawn_from(move |vm| vm.load(&image))
    }

    /// Spawn a worker thread whose VM starts from a restored snapshot.
    pub fn spawn_from_snapshot(snapshot: Snapshot) -> Result<Self, RunnerError> {
        Self::spawn_from(move |vm| vm.restore(&snapshot))
    }

    fn spawn_from(init: impl FnOnce(&mut Vm) + Send + 'static) -> Result<Self, RunnerError> {
        let pair = pty::open_pair().map_err(|e| RunnerError::Pty(e.to_string()))?;
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let slave = pair.slave;

        let join = std::thread::Builder::new()
            .name("synacor-vm-worker".into())
            .spawn(move || {
                let mut vm = Vm::new();
                vm.set_input(slave);
                init(&mut vm);
                if let Err(e) = vm.run(&control_rx, &event_tx) {
                    warn!(error = %e, "worker vm halted on error");
                }
            })
            .map_err(|e| RunnerError::WorkerSpawn(e.to_string()))?;

        Ok(Worker {
            control: control_tx,
            events: event_rx,
            pty_master: pair.master,
            join: Some(join),
        })
    }

    /// A debugger handle bound to this worker's control endpoint.
    pub fn debugger(&self) -> Debugger {
        Debugger::new(self.control.clone())
    }

    /// Non-blocking check for the next VM event, if any.
    pub fn try_recv_event(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Write a guest input line (plus trailing newline) to the PTY master.
    pub fn send_guest_line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.pty_master, "{line}")
    }

    /// Tear down: signal shutdown and join the worker thread.
    pub fn shutdown(mut self) {
        let _ = self.control.send(Command::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// The frontend: REPL-facing state independent of any particular terminal
/// library. Owns the current worker and enough lifecycle state to
/// `restart`/`reset`/`quit` per spec.md §4.6.
pub struct Runner {
    image: Vec<Word>,
    worker: Option<Worker>,
    last_line: Option<String>,
}

impl Runner {
    /// Build a runner around a base image, with no worker spawned yet.
    pub fn new(image: Vec<Word>) -> Self {
        Runner {
            image,
            worker: None,
            last_line: None,
        }
    }

    /// Spawn the initial worker from the base image.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        self.worker = Some(Worker::spawn(self.image.clone())?);
        Ok(())
    }

    /// The live worker, if one is running.
    pub fn worker(&self) -> Option<&Worker> {
        self.worker.as_ref()
    }

    /// The live worker, mutably, if one is running.
    pub fn worker_mut(&mut self) -> Option<&mut Worker> {
        self.worker.as_mut()
    }

    /// Classify and remember `line`, honoring "empty line repeats the
    /// previous command".
    pub fn classify_line(&mut self, line: &str) -> Classified {
        let classified = classify(line, self.last_line.as_deref());
        let effective = match &classified {
            Classified::Meta(s) | Classified::GuestInput(s) => s.clone(),
        };
        if !line.trim().is_empty() {
            self.last_line = Some(effective);
        }
        classified
    }

    /// Tear down any live worker and spawn a fresh one from the base image.
    pub fn reset(&mut self) -> Result<(), RunnerError> {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.worker = Some(Worker::spawn(self.image.clone())?);
        Ok(())
    }

    /// Tear down any live worker and spawn a fresh one restored from a
    /// snapshot file.
    pub fn restart_from_snapshot(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), RunnerError> {
        let snapshot = Snapshot::load(path)?;
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.worker = Some(Worker::spawn_from_snapshot(snapshot)?);
        Ok(())
    }

    /// Tear down the worker without spawning a new one (`quit`).
    pub fn quit(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_meta_commands() {
        assert_eq!(classify("step", None), Classified::Meta("step".into()));
        assert_eq!(classify("b 1234", None), Classified::Meta("b 1234".into()));
        assert_eq!(
            classify("look around", None),
            Classified::GuestInput("look around".into())
        );
    }

    #[test]
    fn empty_line_repeats_previous() {
        assert_eq!(classify("", Some("step")), Classified::Meta("step".into()));
        assert_eq!(classify("", None), Classified::GuestInput("".into()));
    }

    #[test]
    fn runner_tracks_last_line_for_repeats() {
        let mut runner = Runner::new(vec![0]);
        assert_eq!(runner.classify_line("step"), Classified::Meta("step".into()));
        assert_eq!(runner.classify_line(""), Classified::Meta("step".into()));
    }

    #[test]
    fn worker_spawns_and_shuts_down_cleanly() {
        let worker = Worker::spawn(vec![21, 21, 0]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        worker.shutdown();
    }

    #[test]
    fn worker_reports_halted_event() {
        let worker = Worker::spawn(vec![0]).unwrap();
        worker.debugger().resume();
        let mut saw_halted = false;
        for _ in 0..100 {
            if let Some(Event::Halted) = worker.try_recv_event() {
                saw_halted = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(saw_halted);
        worker.shutdown();
    }
}
