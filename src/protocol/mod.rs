//! Telnet Line Protocol
//!
//! The console speaks plain text over TCP. There is no framing beyond
//! newline-terminated lines, so this module only deals with:
//!
//! - turning raw reads into trimmed messages
//! - recognizing the two control sequences we care about (EOT, cursor up)
//! - framing response lines with the console prefix
//!
//! ## Example
//!
//! ```
//! use telnetctl::protocol::{decode_line, frame_lines, DEFAULT_PREFIX};
//!
//! let msg = decode_line(b"stats\r\n");
//! assert_eq!(msg, "stats");
//!
//! let framed = frame_lines(DEFAULT_PREFIX, ["ok"]);
//! assert_eq!(&framed[..], b"[Telnet]: ok\r\n");
//! ```

pub mod line;

// Re-export commonly used items for convenience
pub use line::{
    decode_line, frame_lines, is_cursor_up, is_end_of_transmission, CRLF, CURSOR_UP,
    DEFAULT_PREFIX, END_OF_TRANSMISSION,
};
