//! `vault <image>` — standalone puzzle solver, out of core scope.
//!
//! `original_source/code/src/vault/main.cpp` brute-forces the vault door's
//! arithmetic puzzle by searching an expression-tree space specific to the
//! known challenge image. Per spec.md §1 ("Deliberately OUT of scope,
//! treated as external collaborators"), that search isn't part of this
//! rebuild; this binary exists to satisfy the CLI surface in spec.md §6
//! without porting the puzzle-specific solver.

use std::process::ExitCode;

use synacor_vm::loader::load_image;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let _argv0 = args.next();

    let Some(path) = args.next() else {
        println!("usage: vault <image>");
        return ExitCode::SUCCESS;
    };

    if let Err(e) = load_image(&path) {
        tracing::error!(error = %e, path, "failed to read image");
    }

    println!("vault: puzzle-specific search not ported; out of core scope.");

    ExitCode::SUCCESS
}
