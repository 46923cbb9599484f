//! Messages sent from the control context to the renderer.

use crate::bank::Preset;
use std::sync::Arc;

/// A preset selection resolved in the control context.
///
/// Carries the preset handle itself so the renderer never touches the bank
/// store. The indices identify the selection in published state.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Index of the owning bank in the store.
    pub bank_index: usize,
    /// Index of the preset within its bank.
    pub preset_index: usize,
    /// The preset to play.
    pub preset: Arc<Preset>,
}

/// A state change applied by the renderer at the start of a quantum.
#[derive(Debug, Clone)]
pub enum Command {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    AllNotesOff,
    SetGain(f32),
    SelectPreset(Selection),
}
