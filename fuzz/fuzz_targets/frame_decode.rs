//! Fuzz target for FrameReader::read_frame
//!
//! Feeds arbitrary byte streams to the incremental frame reader to find:
//! - Parser crashes or panics
//! - Allocations driven by an unchecked length header
//! - Reads past the end of a frame
//!
//! The reader should NEVER panic. Every frame it returns must be non-empty
//! and within the size limit, and it must consume exactly header + payload.

#![no_main]

use std::io::Cursor;

use fenris_proto::{FrameError, FrameHeader, FrameReader, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut src = Cursor::new(data);
    let mut reader = FrameReader::new();

    loop {
        let before = src.position();

        match reader.read_frame(&mut src) {
            Ok(frame) => {
                assert!(!frame.is_empty());
                assert!(frame.len() <= MAX_FRAME_SIZE);
                assert_eq!(src.position() - before, (FrameHeader::SIZE + frame.len()) as u64);
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(FrameError::Empty | FrameError::TooLarge { .. }) => {
                // Rejected from the header alone; no payload byte consumed
                assert_eq!(src.position() - before, FrameHeader::SIZE as u64);
                break;
            }
            Err(e) => panic!("unexpected error from in-memory stream: {e}"),
        }
    }
});
