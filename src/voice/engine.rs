//! Polyphonic voice management and mixing.
//!
//! The engine owns a fixed pool of voices allocated at construction. Nothing
//! in `note_on`, `note_off` or `render_into` allocates, so the whole type is
//! safe to drive from the render context.

use super::envelope::EnvelopeStage;
use super::sampler::Voice;
use crate::bank::Preset;
use std::sync::Arc;

/// Highest valid MIDI key or velocity.
const MIDI_MAX: u8 = 127;

/// Allocates voices for note events and mixes them to stereo.
#[derive(Debug)]
pub struct VoiceEngine {
    voices: Vec<Voice>,
    preset: Option<Arc<Preset>>,
    gain: f32,
    sample_rate: f32,
    clock: u64,
}

impl VoiceEngine {
    /// Creates an engine with `max_voices` preallocated voices and no preset.
    pub fn new(sample_rate: f32, max_voices: usize, gain: f32) -> Self {
        Self {
            voices: (0..max_voices.max(1))
                .map(|_| Voice::new(sample_rate))
                .collect(),
            preset: None,
            gain: sanitize_gain(gain),
            sample_rate,
            clock: 0,
        }
    }

    /// Sets the preset used by subsequent note-ons.
    ///
    /// Voices already sounding keep their own preset handle.
    pub fn set_preset(&mut self, preset: Option<Arc<Preset>>) {
        self.preset = preset;
    }

    /// The preset new notes will use.
    pub fn preset(&self) -> Option<&Arc<Preset>> {
        self.preset.as_ref()
    }

    /// Starts a note.
    ///
    /// Without a current preset this is a no-op. Velocity 0 is a note-off.
    /// A key that is already sounding is retriggered: its voices stop at once
    /// and new ones start.
    pub fn note_on(&mut self, key: u8, velocity: u8) {
        if key > MIDI_MAX {
            return;
        }
        if velocity == 0 {
            self.note_off(key);
            return;
        }
        let Some(preset) = self.preset.clone() else {
            return;
        };
        let velocity = velocity.min(MIDI_MAX);

        for voice in self.voices.iter_mut().filter(|v| v.is_active() && v.key() == key) {
            voice.kill();
        }

        self.clock += 1;
        for (index, zone) in preset.zones().iter().enumerate() {
            if !zone.contains(key, velocity) {
                continue;
            }
            let slot = self.allocate();
            self.voices[slot].start(&preset, index, key, velocity, self.clock, self.sample_rate);
        }
    }

    /// Releases the sounding voices of `key`. A silent key is a no-op.
    pub fn note_off(&mut self, key: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.is_held() && v.key() == key) {
            voice.release();
        }
    }

    /// Releases every held voice.
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut().filter(|v| v.is_held()) {
            voice.release();
        }
    }

    /// Sets the output gain. Negative or non-finite values become 0.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = sanitize_gain(gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Number of voices currently producing sound.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Size of the voice pool.
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Envelope stage of the newest sounding voice for `key`.
    pub fn stage_of(&self, key: u8) -> Option<EnvelopeStage> {
        self.voices
            .iter()
            .filter(|v| v.is_active() && v.key() == key)
            .max_by_key(|v| v.age())
            .map(|v| v.stage())
    }

    /// Renders the next block into `left` and `right`.
    ///
    /// Both buffers are overwritten. The block length is the shorter of the
    /// two; any extra samples in the longer buffer are zeroed. Voices that
    /// reach silence are returned to the pool.
    pub fn render_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        left.fill(0.0);
        right.fill(0.0);
        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);

        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.render(left, right);
        }

        for sample in left.iter_mut().chain(right.iter_mut()) {
            *sample = (*sample * self.gain).clamp(-1.0, 1.0);
        }
    }

    // Free voice if any, otherwise steal the oldest one.
    fn allocate(&self) -> usize {
        self.voices
            .iter()
            .position(|v| !v.is_active())
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.age())
                    .map(|(index, _)| index)
            })
            .unwrap_or(0)
    }
}

fn sanitize_gain(gain: f32) -> f32 {
    if gain.is_finite() && gain > 0.0 {
        gain
    } else {
        0.0
    }
}
