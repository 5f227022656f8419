//! Test fixture standing in for a Piper-like synthesis binary: accepts the
//! same flag shapes the real adapters pass (`--model`, `--config`,
//! `--output-raw`, `--length-scale`) and ignores their values, then emits
//! deterministic raw PCM derived from the stdin text so engine adapter
//! tests can assert on byte count and content without a real model file.
//!
//! `--fail` exits nonzero after consuming stdin. `--sleep-ms N` pauses
//! before producing output, for timeout tests. `--odd-byte` emits one
//! extra trailing byte to exercise the padding rule.

use std::io::{Read, Write};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut fail = false;
    let mut sleep_ms: u64 = 0;
    let mut odd_byte = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--fail" => fail = true,
            "--odd-byte" => odd_byte = true,
            "--sleep-ms" => {
                i += 1;
                sleep_ms = args.get(i).and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            // Flags that take a value we don't need: skip the value too.
            "--model" | "--config" | "--length-scale" => {
                i += 1;
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

    // Two PCM bytes per input character, derived from the character's code
    // point so output is deterministic and non-silent.
    let mut pcm = Vec::with_capacity(input.len() * 2);
    for ch in input.chars() {
        let sample = (ch as u32 % 30000) as i16;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    if odd_byte {
        pcm.push(7);
    }

    std::io::stdout().write_all(&pcm).expect("write stdout");

    if fail {
        std::process::exit(1);
    }
}
