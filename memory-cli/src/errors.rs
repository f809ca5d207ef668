//! Translates `do_memory_core::Error` into the process exit codes of
//! `spec.md` §6/§7. Grounded in the teacher's `errors.rs` context-helper
//! idiom, trimmed to this crate's thinner error surface (no colored
//! terminal hints — that dependency isn't carried here).

use do_memory_core::Error;

/// Map a library error to the exit code the host expects.
#[must_use]
pub fn exit_code_for(err: &Error) -> i32 {
    err.exit_code()
}

/// Print `err` to stderr and return the exit code the process should use.
pub fn report(err: &Error) -> i32 {
    eprintln!("error: {err}");
    exit_code_for(err)
}
