//! `play <image>` — interactive REPL with stepping/breakpoint debugging.
//!
//! Couples a `rustyline`-driven frontend to a worker thread owning the VM
//! (see [`synacor_vm::runner`]). Unrecognized lines go straight to the
//! worker's PTY master as guest input; recognized meta-commands (spec.md
//! §4.6) drive the debugger. Inspection commands (`disassemble`,
//! `registers`, `memory`, `stack`, `save`) round-trip a snapshot request
//! through the worker's event channel so they always see a consistent,
//! between-instruction state.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use rustyline::DefaultEditor;

use synacor_vm::debugger::Debugger;
use synacor_vm::loader::load_image;
use synacor_vm::protocol::Event;
use synacor_vm::runner::{Classified, Runner, Worker};
use synacor_vm::snapshot::{self, Snapshot};
use synacor_vm::types::Word;

/// How long a meta-command will wait for a `Snapshot` reply before giving up.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(500);

fn parse_hex(s: &str) -> Option<Word> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

fn fetch_snapshot(worker: &Worker) -> Option<Snapshot> {
    worker.debugger().request_snapshot();
    let deadline = Instant::now() + SNAPSHOT_TIMEOUT;
    while Instant::now() < deadline {
        match worker.try_recv_event() {
            Some(Event::Snapshot(snapshot)) => return Some(snapshot),
            Some(Event::Stopped) => println!("stopped"),
            Some(Event::Halted) => println!("halted"),
            Some(Event::Breakpoints(_)) | None => {}
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

fn apply_write(debugger: &Debugger, target: &str, value_str: &str) {
    let Some(value) = parse_hex(value_str) else {
        eprintln!("write: bad value {value_str:?}");
        return;
    };

    if let Some(reg) = target.strip_prefix('r') {
        match reg.parse::<u8>() {
            Ok(index) if index < 8 => debugger.set_register(index, value),
            _ => eprintln!("write: bad register {target:?}"),
        }
        return;
    }

    match parse_hex(target) {
        Some(addr) => debugger.write_memory(addr, value),
        None => eprintln!("write: bad target {target:?}"),
    }
}

fn drain_events(runner: &Runner) {
    let Some(worker) = runner.worker() else { return };
    while let Some(event) = worker.try_recv_event() {
        match event {
            Event::Stopped => println!("stopped"),
            Event::Halted => println!("halted"),
            Event::Breakpoints(addrs) => {
                let rendered: Vec<String> = addrs.iter().map(|a| format!("{a:04x}")).collect();
                println!("breakpoints: {}", rendered.join(" "));
            }
            Event::Snapshot(_) => {}
        }
    }
}

fn dispatch_meta(runner: &mut Runner, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&cmd) = tokens.first() else { return };

    match cmd {
        "save" => {
            let Some(worker) = runner.worker() else { return };
            let Some(snap) = fetch_snapshot(worker) else {
                eprintln!("save: worker did not reply with a snapshot");
                return;
            };
            let path = tokens
                .get(1)
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| snapshot::probe_filename("snapshot"));
            match snap.save(&path) {
                Ok(()) => println!("saved {}", path.display()),
                Err(e) => eprintln!("save: {e}"),
            }
        }
        "load" | "restore" => {
            let Some(path) = tokens.get(1) else {
                eprintln!("usage: {cmd} <path>");
                return;
            };
            if let Err(e) = runner.restart_from_snapshot(path) {
                eprintln!("{cmd}: {e}");
            }
        }
        "restart" | "reset" => {
            if let Err(e) = runner.reset() {
                eprintln!("{cmd}: {e}");
            }
        }
        "di" | "dis" | "disassemble" => {
            let Some(worker) = runner.worker() else { return };
            let Some(snap) = fetch_snapshot(worker) else {
                eprintln!("disassemble: worker did not reply with a snapshot");
                return;
            };
            let debugger = worker.debugger();
            let mut out = String::new();
            if debugger.disassemble(&snap, &mut out).is_ok() {
                print!("{out}");
            }
        }
        "reg" | "regs" | "registers" => {
            let Some(worker) = runner.worker() else { return };
            let Some(snap) = fetch_snapshot(worker) else {
                eprintln!("registers: worker did not reply with a snapshot");
                return;
            };
            let debugger = worker.debugger();
            let mut out = String::new();
            if debugger.show_registers(&snap, &mut out).is_ok() {
                print!("{out}");
            }
        }
        "s" | "si" | "step" => {
            if let Some(worker) = runner.worker() {
                worker.debugger().step();
            }
        }
        "c" | "cont" => {
            if let Some(worker) = runner.worker() {
                worker.debugger().resume();
            }
        }
        "b" | "break" => {
            let Some(addr) = tokens.get(1).and_then(|s| parse_hex(s)) else {
                eprintln!("usage: b <address>");
                return;
            };
            if let Some(worker) = runner.worker() {
                worker.debugger().break_on(addr);
            }
        }
        "clear" => {
            let Some(addr) = tokens.get(1).and_then(|s| parse_hex(s)) else {
                eprintln!("usage: clear <address>");
                return;
            };
            if let Some(worker) = runner.worker() {
                worker.debugger().clear_breakpoint(addr);
            }
        }
        "fin" | "finish" => {
            if let Some(worker) = runner.worker() {
                worker.debugger().step_out();
            }
        }
        "m" | "mem" | "memory" => {
            let Some(worker) = runner.worker() else { return };
            let Some(snap) = fetch_snapshot(worker) else {
                eprintln!("memory: worker did not reply with a snapshot");
                return;
            };
            let addr = tokens.get(1).and_then(|s| parse_hex(s)).unwrap_or(snap.ip());
            let debugger = worker.debugger();
            let mut out = String::new();
            if debugger.dump_memory(&snap, addr, 16, &mut out).is_ok() {
                print!("{out}");
            }
        }
        "stack" => {
            let Some(worker) = runner.worker() else { return };
            let Some(snap) = fetch_snapshot(worker) else {
                eprintln!("stack: worker did not reply with a snapshot");
                return;
            };
            let debugger = worker.debugger();
            let mut out = String::new();
            if debugger.show_stack(&snap, 8, &mut out).is_ok() {
                print!("{out}");
            }
        }
        "write" => {
            let (Some(target), Some(value)) = (tokens.get(1), tokens.get(2)) else {
                eprintln!("usage: write <rN|address> <value>");
                return;
            };
            if let Some(worker) = runner.worker() {
                apply_write(&worker.debugger(), target, value);
            }
        }
        "q" | "quit" | "exit" => {
            runner.quit();
        }
        _ => {}
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _argv0 = args.next();

    let Some(path) = args.next() else {
        println!("usage: play <image>");
        return ExitCode::SUCCESS;
    };

    let image = match load_image(&path) {
        Ok(image) => image,
        Err(e) => {
            tracing::error!(error = %e, path, "failed to read image");
            println!("usage: play <image>");
            return ExitCode::SUCCESS;
        }
    };

    let mut runner = Runner::new(image);
    if let Err(e) = runner.start() {
        eprintln!("play: failed to start worker: {e}");
        return ExitCode::SUCCESS;
    }

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("play: failed to start line editor: {e}");
            return ExitCode::SUCCESS;
        }
    };

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(_) => break,
        };
        let _ = editor.add_history_entry(line.as_str());

        let is_quit = {
            let first = line.split_whitespace().next();
            matches!(first, Some("quit") | Some("q") | Some("exit"))
        };

        match runner.classify_line(&line) {
            Classified::Meta(meta) => dispatch_meta(&mut runner, &meta),
            Classified::GuestInput(guest) => {
                if let Some(worker) = runner.worker_mut() {
                    let _ = worker.send_guest_line(&guest);
                }
            }
        }

        drain_events(&runner);

        if is_quit {
            break;
        }
    }

    runner.quit();
    ExitCode::SUCCESS
}
