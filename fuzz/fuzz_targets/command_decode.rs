//! Fuzz target for Command::decode
//!
//! Arbitrary bytes must either fail to decode or decode to a command whose
//! encoding is exactly the input. The decoder should NEVER panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_proto::Command;

fuzz_target!(|data: &[u8]| {
    if let Ok(command) = Command::decode(data) {
        assert_eq!(command.encode(), data, "decode accepted a non-canonical encoding");
    }
});
