//! reskin CLI binary
//!
//! All logic is in the library; main.rs only invokes cli::run().

fn main() {
    // cli::run() prints everything, errors included
    if let Err(code) = reskin::cli::run() {
        std::process::exit(code.as_i32());
    }
}
