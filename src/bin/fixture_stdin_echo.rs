//! Test fixture: reads all of stdin and writes it back to stdout.
//!
//! Supports `--fail` (nonzero exit after echoing) and `--sleep-ms N`
//! (pause before exiting) so subprocess-manager tests can exercise the
//! exit-status and deadline paths without a real engine binary installed.

use std::io::{Read, Write};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut fail = false;
    let mut sleep_ms: u64 = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--fail" => fail = true,
            "--sleep-ms" => {
                i += 1;
                sleep_ms = args.get(i).and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            _ => {}
        }
        i += 1;
    }

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input).expect("read stdin");

    if sleep_ms > 0 {
        std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
    }

    std::io::stdout().write_all(input.as_bytes()).expect("write stdout");

    if fail {
        std::process::exit(1);
    }
}
