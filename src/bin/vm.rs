//! `vm <image>` — load an image and run it to completion against real stdio.

use std::process::ExitCode;

use synacor_vm::loader::load_image;
use synacor_vm::vm::Vm;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _argv0 = args.next();

    let Some(path) = args.next() else {
        println!("usage: vm <image>");
        return ExitCode::SUCCESS;
    };

    let image = match load_image(&path) {
        Ok(image) => image,
        Err(e) => {
            tracing::error!(error = %e, path, "failed to read image");
            println!("usage: vm <image>");
            return ExitCode::SUCCESS;
        }
    };

    let mut vm = Vm::new();
    vm.load(&image);

    let (_control_tx, control_rx) = crossbeam_channel::unbounded();
    let (event_tx, _event_rx) = crossbeam_channel::unbounded();

    if let Err(e) = vm.run(&control_rx, &event_tx) {
        tracing::error!(error = %e, ip = vm.ip(), "vm halted on error");
    }

    ExitCode::SUCCESS
}
