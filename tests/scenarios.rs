//! End-to-end scenarios transcribed from the architecture's testable
//! properties: minimal run, output, arithmetic, call/return, and snapshot
//! round-trip under scrambled state.

use synacor_vm::snapshot::Snapshot;
use synacor_vm::types::Word;
use synacor_vm::vm::Vm;

fn run_to_halt(image: &[Word]) -> Vm {
    let mut vm = Vm::new();
    vm.load(image);
    let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
    vm.run(&cmd_rx, &ev_tx).unwrap();
    vm
}

#[test]
fn minimal_run_advances_ip_and_leaves_stack_empty() {
    let vm = run_to_halt(&[21, 21, 0]);
    assert_eq!(vm.ip(), 2);
    assert_eq!(vm.sp(), 0);
}

#[test]
fn output_prints_expected_bytes() {
    let mut vm = Vm::new();
    vm.load(&[19, b'X' as Word, 19, b'x' as Word, 19, b'\n' as Word, 0]);

    let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    struct Capture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    vm.set_output(Capture(captured.clone()));

    let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();
    vm.run(&cmd_rx, &ev_tx).unwrap();

    assert_eq!(&*captured.lock().unwrap(), b"Xx\n");
}

#[test]
fn arithmetic_adds_with_modular_wraparound() {
    let vm = run_to_halt(&[9, 0x8000, 10, 20000, 0]);
    assert_eq!(vm.registers()[0], 30000);
}

#[test]
fn call_then_empty_stack_ret_halts_cleanly() {
    let vm = run_to_halt(&[17, 5, 0, 0, 0, 21, 18]);
    assert_eq!(vm.ip(), 2);
    assert!(vm.is_halted());
}

#[test]
fn snapshot_round_trip_preserves_execution_after_scrambling() {
    let mut vm = Vm::new();
    vm.load(&[9, 0x8000, 10, 20000, 0]);

    let (_cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (ev_tx, _ev_rx) = crossbeam_channel::unbounded();

    vm.step().unwrap(); // execute the ADD
    let snap = vm.save();

    // Scramble live state, then restore from the snapshot.
    vm.load(&[0]);
    vm.restore(&snap);

    vm.run(&cmd_rx, &ev_tx).unwrap();
    assert!(vm.is_halted());
    assert_eq!(vm.registers()[0], 30000);
}

#[test]
fn snapshot_file_round_trip_matches_in_memory_save() {
    let mut vm = Vm::new();
    vm.load(&[9, 0x8000, 10, 20000, 0]);
    vm.step().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.bin");

    let snap = vm.save();
    snap.save(&path).unwrap();

    let restored = Snapshot::load(&path).unwrap();
    assert_eq!(snap, restored);
}
