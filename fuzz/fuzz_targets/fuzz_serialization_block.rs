//! Fuzz target for single-block key-value parsing and typed access.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stm_core::input::SerializationData;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let sd = SerializationData::parse_block(text);
        // Typed getters must fail cleanly on whatever was parsed.
        let _ = sd.scalar::<f64>("version");
        let _ = sd.vector::<f64>("parameterValues");
        let _ = sd.strings("parNames");
    }
});
