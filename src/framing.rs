//! Message framing over a byte stream
//!
//! A TCP stream does not preserve write boundaries. Two modes are offered:
//!
//! - [`Framing::Newline`]: each message is terminated by `\n` and the reader
//!   reassembles frames from however the bytes arrive.
//! - [`Framing::Unframed`]: no terminator; the reader treats every `read`
//!   call as exactly one message. This only works while the transport happens
//!   to deliver one write per read, and breaks under coalescing or splitting.

use crate::error::PlantarError;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use tracing::warn;

/// Default receive chunk size
pub const DEFAULT_RECV_BUFFER: usize = 1024;

/// Default longest accepted newline-delimited frame
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// How message boundaries are marked on the stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Newline,
    Unframed,
}

impl Framing {
    /// Bytes to put on the wire for one message
    pub fn frame(&self, message: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(message.len() + 1);
        bytes.extend_from_slice(message.as_bytes());
        if *self == Framing::Newline {
            bytes.push(b'\n');
        }
        bytes
    }
}

/// Pulls complete message frames out of a byte stream
pub struct FrameReader<R> {
    inner: R,
    framing: Framing,
    buffer: Vec<u8>,
    chunk: Vec<u8>,
    max_frame_len: usize,
    discarding: bool,
    eof: bool,
    dropped_frames: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R, framing: Framing) -> Self {
        Self::with_limits(inner, framing, DEFAULT_RECV_BUFFER, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_limits(inner: R, framing: Framing, recv_buffer: usize, max_frame_len: usize) -> Self {
        Self {
            inner,
            framing,
            buffer: Vec::new(),
            chunk: vec![0; recv_buffer.max(1)],
            max_frame_len: max_frame_len.max(1),
            discarding: false,
            eof: false,
            dropped_frames: 0,
        }
    }

    /// Frames discarded for exceeding the length limit
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Next message, or `None` once the peer has closed the stream
    pub fn next_frame(&mut self) -> Result<Option<String>, PlantarError> {
        match self.framing {
            Framing::Unframed => self.next_chunk(),
            Framing::Newline => self.next_line(),
        }
    }

    fn fill(&mut self) -> Result<usize, PlantarError> {
        loop {
            match self.inner.read(&mut self.chunk) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PlantarError::transport(e)),
            }
        }
    }

    fn next_chunk(&mut self) -> Result<Option<String>, PlantarError> {
        let n = self.fill()?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.chunk[..n]).into_owned()))
    }

    fn note_dropped(&mut self, len: usize) {
        self.dropped_frames += 1;
        warn!(len, limit = self.max_frame_len, "frame exceeds length limit, discarding");
    }

    fn next_line(&mut self) -> Result<Option<String>, PlantarError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if self.discarding {
                    // Tail of an oversized frame
                    self.discarding = false;
                    continue;
                }
                if line.is_empty() {
                    continue;
                }
                if line.len() > self.max_frame_len {
                    self.note_dropped(line.len());
                    continue;
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.buffer.len() > self.max_frame_len {
                if !self.discarding {
                    self.note_dropped(self.buffer.len());
                }
                self.discarding = true;
                self.buffer.clear();
            }

            if self.eof {
                if self.buffer.is_empty() || self.discarding {
                    self.buffer.clear();
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }

            let n = self.fill()?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buffer.extend_from_slice(&self.chunk[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out the underlying bytes in fixed-size pieces
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = (self.pos + self.step).min(self.data.len());
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn collect<R: Read>(reader: &mut FrameReader<R>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_frame_appends_terminator() {
        assert_eq!(Framing::Newline.frame("Steps: 1"), b"Steps: 1\n".to_vec());
        assert_eq!(Framing::Unframed.frame("Steps: 1"), b"Steps: 1".to_vec());
    }

    #[test]
    fn test_coalesced_writes_are_split() {
        let mut reader = FrameReader::new(
            Cursor::new(b"Steps: 1\nSteps: 2\r\n\nSteps: 3\n".to_vec()),
            Framing::Newline,
        );
        assert_eq!(collect(&mut reader), vec!["Steps: 1", "Steps: 2", "Steps: 3"]);
    }

    #[test]
    fn test_split_writes_are_reassembled() {
        let data = b"Steps: 10, Channel 0: 5\nSteps: 11, Channel 0: 6\n".to_vec();
        let trickle = Trickle { data, pos: 0, step: 3 };
        let mut reader = FrameReader::new(trickle, Framing::Newline);
        assert_eq!(
            collect(&mut reader),
            vec!["Steps: 10, Channel 0: 5", "Steps: 11, Channel 0: 6"]
        );
    }

    #[test]
    fn test_unterminated_tail_is_final_frame() {
        let mut reader = FrameReader::new(Cursor::new(b"Steps: 1\nSteps: 2".to_vec()), Framing::Newline);
        assert_eq!(collect(&mut reader), vec!["Steps: 1", "Steps: 2"]);
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut data = vec![b'x'; 64];
        data.extend_from_slice(b"\nSteps: 4\n");
        let trickle = Trickle { data, pos: 0, step: 8 };
        let mut reader = FrameReader::with_limits(trickle, Framing::Newline, 8, 16);
        assert_eq!(collect(&mut reader), vec!["Steps: 4"]);
        assert_eq!(reader.dropped_frames(), 1);
    }

    #[test]
    fn test_oversized_frame_in_one_read_is_dropped() {
        let mut data = vec![b'x'; 64];
        data.extend_from_slice(b"\nSteps: 4\n");
        let mut reader = FrameReader::with_limits(Cursor::new(data), Framing::Newline, 1024, 16);
        assert_eq!(collect(&mut reader), vec!["Steps: 4"]);
        assert_eq!(reader.dropped_frames(), 1);
    }

    #[test]
    fn test_frame_at_limit_is_kept() {
        let mut reader = FrameReader::with_limits(Cursor::new(b"0123456789\n".to_vec()), Framing::Newline, 1024, 10);
        assert_eq!(collect(&mut reader), vec!["0123456789"]);
        assert_eq!(reader.dropped_frames(), 0);
    }

    #[test]
    fn test_unframed_reads_one_message_per_read() {
        let trickle = Trickle {
            data: b"Steps: 1Steps: 2".to_vec(),
            pos: 0,
            step: 8,
        };
        let mut reader = FrameReader::new(trickle, Framing::Unframed);
        assert_eq!(collect(&mut reader), vec!["Steps: 1", "Steps: 2"]);
    }

    #[test]
    fn test_empty_stream_ends_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()), Framing::Newline);
        assert_eq!(reader.next_frame().unwrap(), None);
        let mut reader = FrameReader::new(Cursor::new(Vec::new()), Framing::Unframed);
        assert_eq!(reader.next_frame().unwrap(), None);
    }
}
