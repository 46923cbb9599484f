//! The render half of the engine.

use super::command::Command;
use super::shared::SharedState;
use crate::voice::{EnvelopeStage, VoiceEngine};
use rtrb::Consumer;
use std::sync::Arc;

/// Owns the voices and drains the command queue once per quantum.
///
/// Move this to the audio thread. `render` never allocates, locks, blocks or
/// logs.
pub struct Renderer {
    voices: VoiceEngine,
    commands: Consumer<Command>,
    shared: Arc<SharedState>,
    sample_rate: u32,
}

impl Renderer {
    pub(crate) fn new(
        voices: VoiceEngine,
        commands: Consumer<Command>,
        shared: Arc<SharedState>,
        sample_rate: u32,
    ) -> Self {
        Self {
            voices,
            commands,
            shared,
            sample_rate,
        }
    }

    /// Applies pending commands, then renders one quantum into `left` and
    /// `right`.
    ///
    /// The quantum length is the shorter buffer's length; the remainder of
    /// the longer one is zeroed. Always returns true: the engine stays alive
    /// for as long as its owner keeps calling.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> bool {
        if let Ok(first) = self.commands.pop() {
            self.shared.begin_drain();
            self.apply(first);
            let mut applied = 1;
            while let Ok(command) = self.commands.pop() {
                self.apply(command);
                applied += 1;
            }
            self.shared.add_applied(applied);
            self.shared.end_drain();
        }

        self.voices.render_into(left, right);
        self.shared.set_active_voices(self.voices.active_voices());
        true
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Voices sounding after the last quantum.
    pub fn active_voices(&self) -> usize {
        self.voices.active_voices()
    }

    /// Envelope stage of the newest voice for `key`, if it is sounding.
    pub fn stage_of(&self, key: u8) -> Option<EnvelopeStage> {
        self.voices.stage_of(key)
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::NoteOn { key, velocity } => self.voices.note_on(key, velocity),
            Command::NoteOff { key } => self.voices.note_off(key),
            Command::AllNotesOff => self.voices.all_notes_off(),
            Command::SetGain(gain) => {
                self.voices.set_gain(gain);
                self.shared.set_gain(self.voices.gain());
            }
            Command::SelectPreset(selection) => {
                // The replaced handle is also held by the bank store, so
                // dropping it here never frees memory.
                self.voices.set_preset(Some(selection.preset));
                self.shared
                    .set_selection(Some((selection.bank_index, selection.preset_index)));
            }
        }
    }
}
