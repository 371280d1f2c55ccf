//! `filterbench` binary: benchmark commands, and worker mode for the
//! process-isolated runners.

fn main() {
    if let Err(e) = filterbench::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
