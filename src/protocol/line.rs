//! Telnet Line Handling
//!
//! Telnet clients in line mode send whatever the user typed followed by a
//! CR/LF pair. We never see partial keystrokes, so one successful read is
//! treated as one line of input.
//!
//! ## Control Sequences
//!
//! Only two raw byte sequences get special treatment:
//!
//! | Bytes            | Meaning                          |
//! |------------------|----------------------------------|
//! | `0x04`           | End of transmission (Ctrl+D)     |
//! | `ESC [ A`        | Cursor up (repeat last command)  |
//!
//! ## Response Framing
//!
//! Every line written back to the client looks like:
//!
//! ```text
//! [Telnet]: <payload>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// CRLF line terminator used for every response line
pub const CRLF: &[u8] = b"\r\n";

/// End of transmission (Ctrl+D). A read starting with it ends the session.
pub const END_OF_TRANSMISSION: u8 = 0x04;

/// The three bytes a terminal sends for the up arrow key.
pub const CURSOR_UP: &str = "\x1b[A";

/// Default prefix written in front of every response line.
pub const DEFAULT_PREFIX: &str = "[Telnet]: ";

/// Returns true if a raw read should be handled as end of stream.
#[inline]
pub fn is_end_of_transmission(buf: &[u8]) -> bool {
    buf.first() == Some(&END_OF_TRANSMISSION)
}

/// Returns true if the (already trimmed) message is the cursor-up sequence.
#[inline]
pub fn is_cursor_up(msg: &str) -> bool {
    msg == CURSOR_UP
}

/// Turns one raw read into a message.
///
/// Invalid UTF-8 is replaced rather than rejected; surrounding whitespace
/// (including the CR/LF the client sent) is removed.
///
/// The cursor-up sequence starts with ESC, which is not whitespace, so it
/// survives trimming intact.
pub fn decode_line(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim().to_string()
}

/// Frames response lines for the wire.
///
/// Each line gets `prefix` in front and CRLF after it. Embedded line breaks
/// in a payload are split so that every physical line is framed.
///
/// # Example
///
/// ```
/// use telnetctl::protocol::frame_lines;
///
/// let framed = frame_lines("[Telnet]: ", ["hello"]);
/// assert_eq!(&framed[..], b"[Telnet]: hello\r\n");
/// ```
pub fn frame_lines<I, S>(prefix: &str, lines: I) -> Bytes
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buf = BytesMut::new();
    for line in lines {
        for physical in line.as_ref().lines() {
            buf.reserve(prefix.len() + physical.len() + CRLF.len());
            buf.put_slice(prefix.as_bytes());
            buf.put_slice(physical.as_bytes());
            buf.put_slice(CRLF);
        }
        if line.as_ref().is_empty() {
            buf.put_slice(prefix.as_bytes());
            buf.put_slice(CRLF);
        }
    }
    buf.freeze()
}
