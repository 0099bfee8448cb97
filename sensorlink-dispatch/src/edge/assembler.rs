//! Reassembles frames from a byte stream.
//!
//! Boards write frames back to back with no outer envelope, so the only
//! way back into sync after line noise is to scan for the next start
//! sentinel and try again from there.

use sensorlink_core::FramingError;
use sensorlink_core::checksum8;
use sensorlink_core::protocol::{END_BYTE, FRAME_HEADER_SIZE, MIN_FRAME_SIZE, START_BYTE};

#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    discarded: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes dropped while hunting for a start sentinel.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Bytes held waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame from the buffered bytes.
    ///
    /// `None` means more input is needed. A frame whose end sentinel or
    /// checksum is wrong is returned as an error and the assembler resumes
    /// scanning one byte past its start.
    pub fn next_frame(&mut self) -> Option<Result<Box<[u8]>, FramingError>> {
        self.skip_to_start();

        if self.buf.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let body_len = self.buf[2] as usize;
        let frame_len = MIN_FRAME_SIZE + body_len;
        if self.buf.len() < frame_len {
            return None;
        }

        let end = self.buf[frame_len - 1];
        if end != END_BYTE {
            self.resync();
            return Some(Err(FramingError::InvalidEndByte(end)));
        }

        let expected = self.buf[frame_len - 2];
        let actual = checksum8(&self.buf[FRAME_HEADER_SIZE..frame_len - 2], 0);
        if expected != actual {
            self.resync();
            return Some(Err(FramingError::ChecksumMismatch { expected, actual }));
        }

        let frame: Box<[u8]> = self.buf.drain(..frame_len).collect();
        Some(Ok(frame))
    }

    fn skip_to_start(&mut self) {
        let start = self
            .buf
            .iter()
            .position(|&b| b == START_BYTE)
            .unwrap_or(self.buf.len());

        if start > 0 {
            self.discarded += start;
            self.buf.drain(..start);
        }
    }

    fn resync(&mut self) {
        self.discarded += 1;
        self.buf.drain(..1);
    }
}
