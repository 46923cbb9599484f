//! sfplayer - a real-time SoundFont synthesizer engine.
//!
//! The engine is split in two. A control half ([`SynthesisCore`]) loads
//! banks, selects presets and queues note events. A render half
//! ([`Renderer`]) runs on the audio thread and turns queued events into
//! stereo samples without allocating, locking or blocking.
//! [`ControlBridge`] wraps the control half in a typed request/response
//! protocol for UIs and other processes.

pub mod audio;
pub mod bank;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod midi;
pub mod voice;

// Re-export commonly used types
pub use bank::{BankStore, BankSummary, PresetInfo};
pub use bridge::{ControlBridge, RenderPort, Request, Response};
pub use config::EngineConfig;
pub use engine::{EngineStateSnapshot, Renderer, StateReader, SynthesisCore};
pub use error::{DecodeError, EngineError, InitError, NotFoundError};
