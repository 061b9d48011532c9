//! Test harness for the Fenris secure channel.
//!
//! - [`Responder`]: a real server on a loopback port that records every
//!   request it receives and answers with scripted responses.
//! - [`SeededEnv`]: a deterministic [`fenris_core::Environment`], so key
//!   generation and nonces repeat exactly between runs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod responder;
pub mod seeded_env;

pub use responder::{RecordingHandler, Responder};
pub use seeded_env::SeededEnv;
