//! `teleport <image>` — standalone puzzle solver, out of core scope.
//!
//! `original_source/code/src/teleport/main.cpp` (and the earlier
//! `main0.cpp` draft) brute-force the confirmation algorithm's eighth
//! register value. Per spec.md §1 that search is explicitly non-core; this
//! binary exists only to satisfy the CLI surface in spec.md §6.

use std::process::ExitCode;

use synacor_vm::loader::load_image;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _argv0 = args.next();

    let Some(path) = args.next() else {
        println!("usage: teleport <image>");
        return ExitCode::SUCCESS;
    };

    if let Err(e) = load_image(&path) {
        tracing::error!(error = %e, path, "failed to read image");
    }

    println!("teleport: puzzle-specific search not ported; out of core scope.");

    ExitCode::SUCCESS
}
