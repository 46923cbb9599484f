//! Audio hosts for the engine.
//!
//! - Live playback through rodio
//! - Offline rendering to WAV with hound

pub mod export;
pub mod output;

pub use export::{render_to_wav, NoteEvent};
pub use output::{AudioOutput, PortSource};
