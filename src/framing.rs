//! Newline-delimited framing over a byte stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Largest frame accepted, not counting the line terminator.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// `buf` holds one frame without its line terminator.
    Line,
    /// The line ran past the limit. It was discarded up to and including
    /// its newline and `buf` is empty.
    Oversized,
    /// The stream is exhausted.
    End,
}

/// Reads the next frame into `buf`.
///
/// At most `max_len + 2` bytes are buffered for one line, however long the
/// peer keeps sending without a newline. A trailing fragment with no newline
/// before end-of-stream is still returned as a frame.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();

    let mut seen_any = false;
    let mut oversized = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !seen_any {
                return Ok(Frame::End);
            }
            break;
        }
        seen_any = true;

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };

        if !oversized {
            buf.extend_from_slice(&available[..used]);
            // Room for "\r\n" on top of the limit.
            if buf.len() > max_len + 2 {
                oversized = true;
                buf.clear();
            }
        }

        reader.consume(used);

        if done {
            break;
        }
    }

    trim_line_end(buf);

    if oversized || buf.len() > max_len {
        buf.clear();
        return Ok(Frame::Oversized);
    }

    Ok(Frame::Line)
}

fn trim_line_end(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}

pub fn is_blank(frame: &[u8]) -> bool {
    frame.iter().all(u8::is_ascii_whitespace)
}
