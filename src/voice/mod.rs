//! Render-context voice allocation and synthesis.
//!
//! Everything in this module runs on the audio thread and is allocation-free
//! after construction.

mod engine;
mod envelope;
mod sampler;

pub use engine::VoiceEngine;
pub use envelope::{Envelope, EnvelopeParams, EnvelopeStage, SILENCE};
pub use sampler::Voice;
