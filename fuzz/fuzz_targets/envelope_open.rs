//! Fuzz target for device-side envelope handling
//!
//! Feeds arbitrary bytes to `open_command` and `unprotect` under a fixed key.
//! Forged envelopes must be rejected with an error, never a panic and never a
//! decoded command.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_crypto::Key;
use tessera_proto::{open_command, unprotect};

fuzz_target!(|data: &[u8]| {
    let key = Key::from_bytes([0x42; 32]);

    // Forging a Poly1305 tag by chance is not something a fuzzer finds
    assert!(open_command(data, &key).is_err());
    assert!(unprotect(data, &key).is_err());
});
