//! Error taxonomy for the engine.
//!
//! Every command-level failure is reported synchronously to the control
//! context. The render path has no error channel: inconsistencies there are
//! skipped silently.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding raw SoundFont bytes into a bank.
///
/// The bank store is left untouched whenever one of these is returned.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are an archive container rather than a bare SoundFont.
    #[error("unsupported container format: {0} archives must be extracted first")]
    UnsupportedContainer(&'static str),

    /// The SoundFont parser rejected the data.
    #[error("failed to load soundfont data: {0}")]
    Malformed(String),

    /// The SoundFont parsed but contains no presets.
    #[error("soundfont contains no presets")]
    NoPresets,

    /// A preset uses a program number outside 0-127.
    #[error("preset '{name}' has program number {program} outside 0-127")]
    ProgramOutOfRange {
        /// Preset display name.
        name: String,
        /// Offending program number.
        program: i32,
    },

    /// A preset uses a bank number outside the range a MIDI bank select can reach.
    #[error("preset '{name}' has bank number {bank} outside 0-16383")]
    BankOutOfRange {
        /// Preset display name.
        name: String,
        /// Offending bank number.
        bank: i32,
    },

    /// Two presets share the same (bank, program) pair.
    #[error("duplicate preset for bank {bank}, program {program}")]
    DuplicatePreset {
        /// MIDI bank number.
        bank: u16,
        /// MIDI program number.
        program: u8,
    },
}

/// Lookup failures for bank or preset identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    /// No bank with this id has been loaded.
    #[error("bank not found: {0}")]
    Bank(String),

    /// The bank exists but has no preset with this id.
    #[error("preset not found: {preset_id} in bank {bank_id}")]
    Preset {
        /// Bank id that was searched.
        bank_id: String,
        /// Preset id that was requested.
        preset_id: String,
    },

    /// The bank exists but has no preset at these MIDI numbers.
    #[error("no preset at bank {bank}, program {program} in bank {bank_id}")]
    PresetNumbers {
        /// Bank id that was searched.
        bank_id: String,
        /// MIDI bank number.
        bank: u16,
        /// MIDI program number.
        program: u8,
    },
}

/// Engine construction failures. Fatal to the engine instance being built.
#[derive(Debug, Error)]
pub enum InitError {
    /// The configuration failed validation.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The default bank could not be decoded.
    #[error("failed to load default bank: {0}")]
    DefaultBank(#[from] DecodeError),

    /// The configured default SoundFont file could not be read.
    #[error("failed to read default soundfont {path}: {source}")]
    DefaultBankIo {
        /// Path from the configuration.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A request arrived before the engine was initialized.
    #[error("engine is not initialized")]
    NotInitialized,

    /// The bridge already owns a running engine.
    #[error("engine is already initialized")]
    AlreadyInitialized,
}

/// Umbrella error for control-context operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bank decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A bank or preset id did not resolve.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// The engine is missing or could not be built.
    #[error(transparent)]
    Init(#[from] InitError),

    /// The command queue is full because the render context stopped draining it.
    #[error("command queue is full ({0} commands pending)")]
    QueueFull(usize),

    /// A request failed validation at the transport boundary.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_messages() {
        let err = NotFoundError::Bank("piano.sf2".to_string());
        assert_eq!(err.to_string(), "bank not found: piano.sf2");

        let err = NotFoundError::PresetNumbers {
            bank_id: "default".to_string(),
            bank: 0,
            program: 5,
        };
        assert_eq!(
            err.to_string(),
            "no preset at bank 0, program 5 in bank default"
        );
    }

    #[test]
    fn test_engine_error_is_transparent() {
        let err: EngineError = DecodeError::NoPresets.into();
        assert_eq!(err.to_string(), "soundfont contains no presets");

        let err: EngineError = InitError::NotInitialized.into();
        assert!(matches!(err, EngineError::Init(InitError::NotInitialized)));
    }
}
