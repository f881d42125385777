//! # Hex Dump
//!
//! Fixed-width hexadecimal view of raw log bytes for manual inspection,
//! independent of schema decoding.
//!
//! ```text
//! Offset    00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F
//! 00000000  30 00 00 00 02 00 05 74 00 00 00 00 00 00 00 00  |0......t........|
//! ```

use std::fmt::Write;

/// Bytes shown per row
pub const BYTES_PER_ROW: usize = 16;

/// Render `bytes` as hex rows, labelling the first row with `start_offset`.
///
/// `with_header` prepends the column header line; callers dumping a large
/// file in chunks pass it only for the first chunk.
pub fn hexdump(bytes: &[u8], start_offset: usize, with_header: bool) -> String {
    let rows = bytes.len().div_ceil(BYTES_PER_ROW);
    let mut out = String::with_capacity((rows + 1) * 80);

    if with_header {
        out.push_str("Offset   ");
        for col in 0..BYTES_PER_ROW {
            let _ = write!(out, " {:02X}", col);
        }
        out.push('\n');
    }

    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        let _ = write!(out, "{:08X} ", start_offset + row * BYTES_PER_ROW);

        for byte in chunk {
            let _ = write!(out, " {:02X}", byte);
        }
        for _ in chunk.len()..BYTES_PER_ROW {
            out.push_str("   ");
        }

        out.push_str("  |");
        for &byte in chunk {
            out.push(if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            });
        }
        out.push_str("|\n");
    }

    out
}
