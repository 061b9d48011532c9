//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian length followed by exactly that many payload
//! bytes. Frames are all-or-nothing: callers either get a complete payload or
//! an error, never a fragment.
//!
//! # Invariants
//!
//! - Length Bounds: `0 < length <= MAX_FRAME_SIZE`. Both the sender and the
//!   receiver enforce this; the receiver checks the header before allocating
//!   or reading any payload byte.
//!
//! - Exact Reads: [`FrameReader`] never reads past the end of the current
//!   frame, so the stream stays aligned on a frame boundary between calls.
//!
//! - Bounded Sends: once the first byte of a frame is written,
//!   [`send_frame`] keeps writing until the frame is complete, the stream
//!   fails, or the peer accepts nothing for [`SEND_STALL_LIMIT`]. A half-sent
//!   frame leaves the stream misaligned, so every error after the first byte
//!   is fatal.

use std::{
    io::{self, Read, Write},
    thread,
    time::{Duration, Instant},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::FrameError;

/// Maximum payload length of a single frame (10 MiB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// How long [`send_frame`] waits for a stalled peer once a frame is started
pub const SEND_STALL_LIMIT: Duration = Duration::from_secs(5);

/// Pause between write attempts on a full socket
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Largest single read into the frame buffer.
///
/// The buffer grows with the bytes that actually arrive, never with the
/// length a header merely declares.
const READ_CHUNK: usize = 64 * 1024;

/// Fixed 4-byte frame header (network byte order).
///
/// The header is parsed by casting raw bytes with `zerocopy`; every 4-byte
/// pattern is a valid `FrameHeader`, and length validation happens in
/// [`FrameHeader::parse`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    length: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header
    pub const SIZE: usize = 4;

    /// Build the header for a payload of `len` bytes.
    ///
    /// # Errors
    ///
    /// - `FrameError::Empty` if `len == 0`
    /// - `FrameError::TooLarge` if `len > MAX_FRAME_SIZE`
    pub fn for_payload(len: usize) -> Result<Self, FrameError> {
        check_length(len)?;

        // MAX_FRAME_SIZE fits in u32, so this conversion cannot truncate.
        let length = u32::try_from(len)
            .map_err(|_| FrameError::TooLarge { size: len, max: MAX_FRAME_SIZE })?;

        Ok(Self { length: length.to_be_bytes() })
    }

    /// Parse and validate a header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// - `FrameError::Truncated` if fewer than [`Self::SIZE`] bytes are given
    /// - `FrameError::Empty` / `FrameError::TooLarge` if the declared length
    ///   is out of bounds
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let (header, _) = Self::read_from_prefix(bytes)
            .map_err(|_| FrameError::Truncated { expected: Self::SIZE, actual: bytes.len() })?;

        check_length(header.payload_len())?;

        Ok(header)
    }

    /// Declared payload length.
    pub fn payload_len(&self) -> usize {
        u32::from_be_bytes(self.length) as usize
    }

    /// Raw header bytes as they appear on the wire.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.length
    }
}

fn check_length(len: usize) -> Result<(), FrameError> {
    if len == 0 {
        return Err(FrameError::Empty);
    }

    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge { size: len, max: MAX_FRAME_SIZE });
    }

    Ok(())
}

/// Encode `payload` as a complete frame into `dst`.
///
/// # Errors
///
/// - `FrameError::Empty` / `FrameError::TooLarge` on out-of-bounds payloads
pub fn encode_frame(payload: &[u8], dst: &mut impl BufMut) -> Result<(), FrameError> {
    let header = FrameHeader::for_payload(payload.len())?;

    dst.put_slice(header.as_bytes());
    dst.put_slice(payload);

    Ok(())
}

/// Write `payload` to `dst` as one frame.
///
/// Same as [`send_frame_within`] with [`SEND_STALL_LIMIT`].
pub fn send_frame<W: Write>(dst: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    send_frame_within(dst, payload, SEND_STALL_LIMIT)
}

/// Write `payload` to `dst` as one frame, giving up if the peer accepts no
/// bytes for `stall_limit`.
///
/// Partial writes and `Interrupted` are retried. A `WouldBlock` before the
/// first byte is surfaced as [`FrameError::WouldBlock`] (nothing was sent).
/// After the first byte, `WouldBlock` and `TimedOut` are retried until the
/// stall limit runs out, at which point the frame is abandoned half-sent and
/// [`FrameError::Stalled`] is returned.
///
/// # Errors
///
/// - `FrameError::Empty` / `FrameError::TooLarge` before anything is written
/// - `FrameError::ConnectionClosed` if the peer stops accepting bytes
/// - `FrameError::Stalled` if a started frame makes no progress in time
/// - `FrameError::Io` for other I/O failures
pub fn send_frame_within<W: Write>(
    dst: &mut W,
    payload: &[u8],
    stall_limit: Duration,
) -> Result<(), FrameError> {
    let mut wire = BytesMut::with_capacity(FrameHeader::SIZE + payload.len());
    encode_frame(payload, &mut wire)?;

    let total = wire.len();
    let mut sent = 0;
    let mut last_progress = Instant::now();

    while sent < total {
        match dst.write(&wire[sent..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => {
                sent += n;
                last_progress = Instant::now();
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) if is_would_block(&e) && sent == 0 => return Err(FrameError::WouldBlock),
            Err(e) if is_would_block(&e) => {
                wait_for_progress(last_progress, stall_limit, sent, total)?;
            },
            Err(e) => return Err(e.into()),
        }
    }

    loop {
        match dst.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted || is_would_block(&e) => {
                wait_for_progress(last_progress, stall_limit, sent, total)?;
            },
            Err(e) => return Err(e.into()),
        }
    }
}

fn wait_for_progress(
    last_progress: Instant,
    stall_limit: Duration,
    sent: usize,
    total: usize,
) -> Result<(), FrameError> {
    if last_progress.elapsed() >= stall_limit {
        return Err(FrameError::Stalled { sent, total });
    }

    thread::sleep(SEND_RETRY_INTERVAL);
    Ok(())
}

/// Read exactly one frame from `src`.
///
/// Convenience wrapper around a fresh [`FrameReader`]. Suitable for blocking
/// streams; on a non-blocking stream use a long-lived [`FrameReader`] so that
/// partial frames survive `WouldBlock`.
pub fn receive_frame<R: Read>(src: &mut R) -> Result<Bytes, FrameError> {
    FrameReader::new().read_frame(src)
}

/// Incremental frame reader.
///
/// Holds the bytes of a partially received frame between calls, which makes
/// it safe to use with non-blocking streams: a `WouldBlock` in the middle of
/// a frame is reported to the caller and the next call picks up where the
/// previous one stopped.
#[derive(Debug, Default)]
pub struct FrameReader {
    /// Bytes received for the frame currently being assembled
    buf: BytesMut,
    /// Payload length once the header has been parsed
    expected: Option<usize>,
}

impl FrameReader {
    /// Create a reader positioned at a frame boundary.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if part of a frame has been received but not yet returned.
    pub fn has_partial_frame(&self) -> bool {
        self.expected.is_some() || !self.buf.is_empty()
    }

    /// Read the next complete frame payload from `src`.
    ///
    /// # Errors
    ///
    /// - `FrameError::Empty` / `FrameError::TooLarge` if the header declares
    ///   an out-of-bounds length. No payload byte is read or allocated.
    /// - `FrameError::ConnectionClosed` on EOF (before or inside a frame)
    /// - `FrameError::WouldBlock` if the stream has no data yet; partial state
    ///   is kept
    /// - `FrameError::Io` for other I/O failures
    pub fn read_frame<R: Read>(&mut self, src: &mut R) -> Result<Bytes, FrameError> {
        self.read_frame_limited(src, MAX_FRAME_SIZE)
    }

    /// Like [`FrameReader::read_frame`], but rejects frames longer than `max`.
    ///
    /// `max` is clamped to [`MAX_FRAME_SIZE`]. Use it wherever the expected
    /// payload is known to be small, so that a peer cannot make the reader
    /// wait on a large frame it never intends to finish.
    pub fn read_frame_limited<R: Read>(
        &mut self,
        src: &mut R,
        max: usize,
    ) -> Result<Bytes, FrameError> {
        let max = max.min(MAX_FRAME_SIZE);

        loop {
            let needed = match self.expected {
                None if self.buf.len() >= FrameHeader::SIZE => {
                    let len = match FrameHeader::parse(&self.buf).map(|h| h.payload_len()) {
                        Ok(len) if len <= max => len,
                        Ok(len) => {
                            self.reset();
                            return Err(FrameError::TooLarge { size: len, max });
                        },
                        Err(e) => {
                            self.reset();
                            return Err(e);
                        },
                    };

                    self.buf.advance(FrameHeader::SIZE);
                    self.expected = Some(len);
                    continue;
                },
                None => FrameHeader::SIZE - self.buf.len(),
                Some(len) if self.buf.len() >= len => {
                    debug_assert_eq!(self.buf.len(), len);
                    self.expected = None;
                    return Ok(self.buf.split_to(len).freeze());
                },
                Some(len) => len - self.buf.len(),
            };

            if let Err(e) = self.fill(src, needed.min(READ_CHUNK)) {
                if e.is_fatal() {
                    self.reset();
                }
                return Err(e);
            }
        }
    }

    /// Read at most `needed` bytes into the buffer.
    fn fill<R: Read>(&mut self, src: &mut R, needed: usize) -> Result<(), FrameError> {
        let start = self.buf.len();
        self.buf.resize(start + needed, 0);

        let result = src.read(&mut self.buf[start..]);
        let read = match &result {
            Ok(n) => *n,
            Err(_) => 0,
        };
        self.buf.truncate(start + read);

        match result {
            Ok(0) => Err(FrameError::ConnectionClosed),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.expected = None;
    }
}

fn is_would_block(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Reader that hands out at most `chunk` bytes per call and reports
    /// `WouldBlock` every other call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
        block_next: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.block_next = true;

            let n = buf.len().min(self.chunk).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        encode_frame(payload, &mut wire).unwrap();
        wire
    }

    #[test]
    fn header_is_big_endian_length() {
        let header = FrameHeader::for_payload(0x0102_0304).unwrap();
        assert_eq!(header.to_bytes(), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(header.payload_len(), 0x0102_0304);
    }

    #[test]
    fn header_rejects_out_of_bounds_lengths() {
        assert_eq!(FrameHeader::for_payload(0), Err(FrameError::Empty));
        assert_eq!(
            FrameHeader::for_payload(MAX_FRAME_SIZE + 1),
            Err(FrameError::TooLarge { size: MAX_FRAME_SIZE + 1, max: MAX_FRAME_SIZE })
        );
        assert!(FrameHeader::for_payload(MAX_FRAME_SIZE).is_ok());
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert_eq!(
            FrameHeader::parse(&[0, 0, 1]),
            Err(FrameError::Truncated { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn send_then_receive() {
        let mut wire = Vec::new();
        send_frame(&mut wire, b"TestPing").unwrap();

        let payload = receive_frame(&mut Cursor::new(wire)).unwrap();
        assert_eq!(&payload[..], b"TestPing");
    }

    #[test]
    fn send_rejects_empty_payload_without_writing() {
        let mut wire = Vec::new();
        assert_eq!(send_frame(&mut wire, &[]), Err(FrameError::Empty));
        assert!(wire.is_empty());
    }

    #[test]
    fn reader_does_not_consume_next_frame() {
        let mut wire = framed(b"first");
        wire.extend_from_slice(&framed(b"second"));
        let mut src = Cursor::new(wire);

        let mut reader = FrameReader::new();
        assert_eq!(&reader.read_frame(&mut src).unwrap()[..], b"first");
        assert_eq!(&reader.read_frame(&mut src).unwrap()[..], b"second");
        assert_eq!(reader.read_frame(&mut src), Err(FrameError::ConnectionClosed));
    }

    #[test]
    fn zero_length_header_rejected_before_payload() {
        let mut wire = vec![0, 0, 0, 0];
        wire.extend_from_slice(b"trailing");
        let mut src = Cursor::new(wire);

        assert_eq!(receive_frame(&mut src), Err(FrameError::Empty));
        assert_eq!(src.position(), 4, "payload bytes must not be read");
    }

    #[test]
    fn oversize_header_rejected_before_payload() {
        let declared = (MAX_FRAME_SIZE + 1) as u32;
        let mut wire = declared.to_be_bytes().to_vec();
        wire.extend_from_slice(&[0xAA; 16]);
        let mut src = Cursor::new(wire);

        assert_eq!(
            receive_frame(&mut src),
            Err(FrameError::TooLarge { size: MAX_FRAME_SIZE + 1, max: MAX_FRAME_SIZE })
        );
        assert_eq!(src.position(), 4, "payload bytes must not be read");
    }

    #[test]
    fn eof_mid_payload_is_connection_closed() {
        let mut wire = framed(b"truncated payload");
        wire.truncate(wire.len() - 3);

        assert_eq!(receive_frame(&mut Cursor::new(wire)), Err(FrameError::ConnectionClosed));
    }

    #[test]
    fn eof_mid_header_is_connection_closed() {
        assert_eq!(receive_frame(&mut Cursor::new(vec![0, 0])), Err(FrameError::ConnectionClosed));
    }

    #[test]
    fn partial_frames_survive_would_block() {
        let mut data = framed(b"hello over a slow link");
        data.extend_from_slice(&framed(b"again"));
        let mut src = Trickle { data, pos: 0, chunk: 3, block_next: false };

        let mut reader = FrameReader::new();
        let mut frames = Vec::new();
        let mut would_block = 0;

        while frames.len() < 2 {
            match reader.read_frame(&mut src) {
                Ok(frame) => frames.push(frame),
                Err(FrameError::WouldBlock) => {
                    would_block += 1;
                    assert!(would_block < 1000, "reader made no progress");
                },
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(&frames[0][..], b"hello over a slow link");
        assert_eq!(&frames[1][..], b"again");
        assert!(would_block > 0);
        assert!(!reader.has_partial_frame());
    }

    #[test]
    fn would_block_before_first_byte_sends_nothing() {
        struct Full;

        impl Write for Full {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::WouldBlock.into())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        assert_eq!(send_frame(&mut Full, b"payload"), Err(FrameError::WouldBlock));
    }

    #[test]
    fn partial_writes_are_completed() {
        struct Narrow {
            written: Vec<u8>,
            calls: usize,
        }

        impl Write for Narrow {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.calls += 1;
                if self.calls % 2 == 0 {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                let n = buf.len().min(2);
                self.written.extend_from_slice(&buf[..n]);
                Ok(n)
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut dst = Narrow { written: Vec::new(), calls: 0 };
        send_frame(&mut dst, b"abcdefg").unwrap();

        assert_eq!(dst.written, framed(b"abcdefg"));
    }

    #[test]
    fn stalled_peer_abandons_frame() {
        /// Accepts one byte, then times out forever.
        struct StallsAfterOne {
            written: usize,
        }

        impl Write for StallsAfterOne {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                if self.written == 0 {
                    self.written = 1;
                    return Ok(1);
                }
                Err(io::ErrorKind::TimedOut.into())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut dst = StallsAfterOne { written: 0 };
        let started = Instant::now();

        let result = send_frame_within(&mut dst, b"payload", Duration::from_millis(50));

        assert_eq!(result, Err(FrameError::Stalled { sent: 1, total: FrameHeader::SIZE + 7 }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn declared_length_is_not_preallocated() {
        let header = (MAX_FRAME_SIZE as u32).to_be_bytes().to_vec();
        let mut src = Trickle { data: header, pos: 0, chunk: 4, block_next: false };
        let mut reader = FrameReader::new();

        // Header arrives, then the stream goes quiet.
        assert_eq!(reader.read_frame(&mut src), Err(FrameError::WouldBlock));
        assert!(reader.has_partial_frame());
        assert!(reader.buf.capacity() <= 2 * READ_CHUNK);
    }

    #[test]
    fn limited_reader_rejects_long_frames_from_header() {
        let mut src = Cursor::new(framed(&[0x04; 100]));
        let mut reader = FrameReader::new();

        assert_eq!(
            reader.read_frame_limited(&mut src, 65),
            Err(FrameError::TooLarge { size: 100, max: 65 })
        );
        assert_eq!(src.position(), 4, "payload bytes must not be read");
        assert!(!reader.has_partial_frame());

        let mut src = Cursor::new(framed(&[0x04; 65]));
        assert_eq!(reader.read_frame_limited(&mut src, 65).unwrap().len(), 65);
    }

    #[test]
    fn large_frames_are_read_in_bounded_chunks() {
        /// Records the largest buffer offered to a single `read`.
        struct Widest {
            inner: Cursor<Vec<u8>>,
            widest: usize,
        }

        impl Read for Widest {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.widest = self.widest.max(buf.len());
                self.inner.read(buf)
            }
        }

        let payload: Vec<u8> = (0..3 * READ_CHUNK + 5).map(|i| i as u8).collect();
        let mut src = Widest { inner: Cursor::new(framed(&payload)), widest: 0 };

        let frame = FrameReader::new().read_frame(&mut src).unwrap();

        assert_eq!(&frame[..], &payload[..]);
        assert!(src.widest <= READ_CHUNK);
    }
}
