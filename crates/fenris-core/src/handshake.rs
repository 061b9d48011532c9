//! Ephemeral key exchange run once per connection.
//!
//! ```text
//!  initiator                               responder
//!  ─────────                               ─────────
//!  keygen                                  keygen
//!  send  [len | public key] ─────────────► recv
//!  recv  ◄───────────────── [len | public key] send
//!  ECDH + HKDF ─► session key              ECDH + HKDF ─► session key
//! ```
//!
//! Both roles send before they receive. A public key is one 69-byte frame,
//! which always fits in the socket send buffer, so two peers writing at the
//! same time cannot deadlock. A peer that reads first and replies second also
//! interoperates.
//!
//! The handshake is anonymous: it protects against passive observers but does
//! not authenticate either side.

use std::io::{Read, Write};

use fenris_crypto::{CryptoError, EphemeralKeypair, PUBLIC_KEY_SIZE, SCALAR_SIZE, SessionKey};
use fenris_proto::{FrameReader, send_frame};
use tracing::trace;
use zeroize::Zeroizing;

use crate::{connection::Role, env::Environment, error::HandshakeError};

/// Draws of 32 random bytes attempted before keypair generation gives up.
///
/// A uniformly random draw is an invalid P-256 scalar with probability of
/// about 2^-32, so exhausting this budget means the entropy source is broken.
pub const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// Longest frame accepted while waiting for the peer's public key.
///
/// The peer is unauthenticated at this point, so anything longer than an
/// uncompressed SEC1 point is refused from its header alone.
pub const MAX_PUBLIC_KEY_FRAME: usize = PUBLIC_KEY_SIZE;

/// Run the key exchange over `stream` and return the derived session key.
///
/// `reader` must be positioned at a frame boundary; it is left there on
/// success so the caller can keep using it for encrypted frames.
///
/// # Errors
///
/// - `HandshakeError::KeyGeneration` if the environment never yields a valid
///   private scalar
/// - `HandshakeError::Frame` if either public key frame fails to transfer,
///   or the peer declares a key frame longer than [`MAX_PUBLIC_KEY_FRAME`]
/// - `HandshakeError::MalformedPublicKey` if the peer's key is not a P-256
///   point
/// - `HandshakeError::KeyDerivation` if HKDF fails
pub fn perform<S, E>(
    stream: &mut S,
    reader: &mut FrameReader,
    env: &E,
    role: Role,
) -> Result<SessionKey, HandshakeError>
where
    S: Read + Write,
    E: Environment,
{
    let keypair = generate_keypair(env)?;

    send_frame(stream, keypair.public_key()).map_err(HandshakeError::Frame)?;
    trace!(?role, "public key sent");

    let peer_public =
        reader.read_frame_limited(stream, MAX_PUBLIC_KEY_FRAME).map_err(HandshakeError::Frame)?;
    trace!(?role, len = peer_public.len(), "peer public key received");

    keypair.agree(&peer_public).map_err(|e| match e {
        CryptoError::MalformedPublicKey { len } => HandshakeError::MalformedPublicKey { len },
        _ => HandshakeError::KeyDerivation,
    })
}

fn generate_keypair<E: Environment>(env: &E) -> Result<EphemeralKeypair, HandshakeError> {
    let mut seed = Zeroizing::new([0u8; SCALAR_SIZE]);

    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        env.random_bytes(seed.as_mut_slice());

        if let Ok(keypair) = EphemeralKeypair::from_scalar_bytes(&seed) {
            return Ok(keypair);
        }
    }

    Err(HandshakeError::KeyGeneration)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Cursor},
        sync::{
            Arc,
            atomic::{AtomicU8, Ordering},
        },
    };

    use fenris_proto::{FrameError, MAX_FRAME_SIZE, receive_frame};

    use super::*;

    /// Fills every request with one repeated byte, incrementing per call.
    #[derive(Clone)]
    struct CountingEnv(Arc<AtomicU8>);

    impl CountingEnv {
        fn starting_at(byte: u8) -> Self {
            Self(Arc::new(AtomicU8::new(byte)))
        }
    }

    impl Environment for CountingEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(self.0.fetch_add(1, Ordering::SeqCst));
        }
    }

    /// Always returns the same bytes.
    #[derive(Clone)]
    struct ConstantEnv(u8);

    impl Environment for ConstantEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(self.0);
        }
    }

    /// Stream with canned input that records everything written.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn replying_with(frame_payload: &[u8]) -> Self {
            let mut input = Vec::new();
            send_frame(&mut input, frame_payload).unwrap();
            Self { input: Cursor::new(input), output: Vec::new() }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn peer_keypair() -> EphemeralKeypair {
        EphemeralKeypair::from_scalar_bytes(&[0x22; SCALAR_SIZE]).unwrap()
    }

    #[test]
    fn derives_same_key_as_peer() {
        let peer = peer_keypair();
        let mut stream = Scripted::replying_with(peer.public_key());

        let key = perform(
            &mut stream,
            &mut FrameReader::new(),
            &ConstantEnv(0x11),
            Role::Initiator,
        )
        .unwrap();

        let our_public = receive_frame(&mut Cursor::new(stream.output)).unwrap();
        assert_eq!(our_public.len(), PUBLIC_KEY_SIZE);

        let peer_key = peer.agree(&our_public).unwrap();
        assert_eq!(key.as_bytes(), peer_key.as_bytes());
    }

    #[test]
    fn sends_before_receiving() {
        let mut stream = Scripted { input: Cursor::new(Vec::new()), output: Vec::new() };

        let result = perform(
            &mut stream,
            &mut FrameReader::new(),
            &ConstantEnv(0x11),
            Role::Responder,
        );

        assert_eq!(result.map(|_| ()), Err(HandshakeError::Frame(FrameError::ConnectionClosed)));
        assert_eq!(stream.output.len(), 4 + PUBLIC_KEY_SIZE, "own key is sent first");
    }

    #[test]
    fn malformed_peer_key_rejected() {
        let mut stream = Scripted::replying_with(&[0x04; 10]);

        let result = perform(
            &mut stream,
            &mut FrameReader::new(),
            &ConstantEnv(0x11),
            Role::Initiator,
        );

        assert_eq!(result.map(|_| ()), Err(HandshakeError::MalformedPublicKey { len: 10 }));
    }

    #[test]
    fn oversized_key_frame_rejected_from_header() {
        let declared = MAX_FRAME_SIZE as u32;
        let mut stream = Scripted {
            input: Cursor::new(declared.to_be_bytes().to_vec()),
            output: Vec::new(),
        };

        let result = perform(
            &mut stream,
            &mut FrameReader::new(),
            &ConstantEnv(0x11),
            Role::Responder,
        );

        assert_eq!(
            result.map(|_| ()),
            Err(HandshakeError::Frame(FrameError::TooLarge {
                size: MAX_FRAME_SIZE,
                max: MAX_PUBLIC_KEY_FRAME
            }))
        );
        assert_eq!(stream.input.position(), 4, "payload is never read");
    }

    #[test]
    fn invalid_scalars_are_redrawn() {
        // 0xFF.. is above the group order and 0x00.. is zero; the third draw
        // (0x01..) is the first valid scalar.
        let env = CountingEnv::starting_at(0xFF);
        assert!(generate_keypair(&env).is_ok());
        assert_eq!(env.0.load(Ordering::SeqCst), 0x02);
    }

    #[test]
    fn broken_entropy_fails_key_generation() {
        let result = generate_keypair(&ConstantEnv(0x00));
        assert!(matches!(result, Err(HandshakeError::KeyGeneration)));
    }
}
