//! Fuzz target for resume-file parsing.
//!
//! Checkpoints are plain text and occasionally hand-edited, so the parser
//! must handle arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use stm_core::input::parse_resume;

fuzz_target!(|data: &[u8]| {
    // Should never panic, only return an error.
    let _ = parse_resume(Cursor::new(data));
});
