// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

/// Formats a buffer as a classic 16-bytes-per-line hex dump, offsets
/// included. Used when a response fails structural decode and the raw
/// bytes are the only truth worth logging.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + (bytes.len() / 16 + 1) * 8);
    for (i, chunk) in bytes.chunks(16).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write!(&mut out, "{:04x}:", i * 16).expect("Writing to String cannot fail");
        for b in chunk {
            write!(&mut out, " {b:02x}").expect("Writing to String cannot fail");
        }
    }
    out
}
