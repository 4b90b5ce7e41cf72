//! `ida <image>` — disassemble an image and print it to stdout.

use std::process::ExitCode;

use synacor_vm::disasm::{self, DEFAULT_CODE_END};
use synacor_vm::loader::load_image;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _argv0 = args.next();

    let Some(path) = args.next() else {
        println!("usage: ida <image>");
        return ExitCode::SUCCESS;
    };

    let image = match load_image(&path) {
        Ok(image) => image,
        Err(e) => {
            tracing::error!(error = %e, path, "failed to read image");
            println!("usage: ida <image>");
            return ExitCode::SUCCESS;
        }
    };

    let mut out = String::new();
    if let Err(e) = disasm::disassemble(&image, DEFAULT_CODE_END, &mut out) {
        tracing::error!(error = %e, "failed to format disassembly");
        return ExitCode::SUCCESS;
    }
    print!("{out}");

    ExitCode::SUCCESS
}
