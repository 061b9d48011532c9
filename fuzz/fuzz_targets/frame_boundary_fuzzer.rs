//! Fuzz target for frame length boundary conditions
//!
//! Prevent DoS attacks via malformed length headers (HIGH priority)
//!
//! # Strategy
//!
//! - Declared length: zero, small, at-max, just-over-max, u32::MAX, random
//! - Actual payload: shorter than, equal to, or longer than declared
//!
//! # Invariants
//!
//! - `length == 0` MUST return `FrameError::Empty`
//! - `length > MAX_FRAME_SIZE` MUST return `FrameError::TooLarge`
//! - A short payload MUST return `FrameError::ConnectionClosed`, never a
//!   partial frame
//! - A valid frame MUST round-trip through `send_frame`

#![no_main]

use std::io::Cursor;

use arbitrary::Arbitrary;
use fenris_proto::{receive_frame, send_frame, FrameError, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum DeclaredLength {
    Zero,
    Small(u8),
    AtMax,
    JustOverMax,
    MaxU32,
    Random(u32),
}

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    length: DeclaredLength,
    payload: Vec<u8>,
}

fuzz_target!(|input: BoundaryFrame| {
    let declared: u32 = match input.length {
        DeclaredLength::Zero => 0,
        DeclaredLength::Small(n) => u32::from(n),
        DeclaredLength::AtMax => MAX_FRAME_SIZE as u32,
        DeclaredLength::JustOverMax => MAX_FRAME_SIZE as u32 + 1,
        DeclaredLength::MaxU32 => u32::MAX,
        DeclaredLength::Random(n) => n,
    };

    let mut wire = declared.to_be_bytes().to_vec();
    wire.extend_from_slice(&input.payload);

    let result = receive_frame(&mut Cursor::new(&wire));
    let declared = declared as usize;

    if declared == 0 {
        assert_eq!(result, Err(FrameError::Empty));
    } else if declared > MAX_FRAME_SIZE {
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    } else if input.payload.len() < declared {
        assert_eq!(result, Err(FrameError::ConnectionClosed));
    } else {
        let frame = result.expect("complete frame must decode");
        assert_eq!(&frame[..], &input.payload[..declared]);

        let mut resent = Vec::new();
        send_frame(&mut resent, &frame).expect("valid frame must encode");
        assert_eq!(resent, &wire[..4 + declared]);
    }
});
