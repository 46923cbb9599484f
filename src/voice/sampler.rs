//! A single sounding zone of a note.

use super::envelope::{Envelope, EnvelopeStage};
use crate::bank::{LoopMode, Preset};
use std::f32::consts::FRAC_PI_4;
use std::sync::Arc;

/// Scale from 16-bit sample values to [-1, 1).
const SAMPLE_SCALE: f32 = 1.0 / 32768.0;

/// One voice: plays one zone of the preset that was current at note-on.
///
/// The preset handle is kept for the voice's whole life, so switching presets
/// does not cut voices that are still sounding.
#[derive(Debug)]
pub struct Voice {
    key: u8,
    age: u64,
    preset: Option<Arc<Preset>>,
    zone: usize,
    position: f64,
    step: f64,
    amplitude: f32,
    pan_left: f32,
    pan_right: f32,
    loop_mode: LoopMode,
    envelope: Envelope,
}

impl Voice {
    /// Creates an idle voice.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            key: 0,
            age: 0,
            preset: None,
            zone: 0,
            position: 0.0,
            step: 1.0,
            amplitude: 0.0,
            pan_left: 0.0,
            pan_right: 0.0,
            loop_mode: LoopMode::None,
            envelope: Envelope::new(sample_rate),
        }
    }

    /// Starts playing `zone` of `preset`.
    ///
    /// A zone index that does not exist leaves the voice idle.
    pub fn start(
        &mut self,
        preset: &Arc<Preset>,
        zone: usize,
        key: u8,
        velocity: u8,
        age: u64,
        output_rate: f32,
    ) {
        let Some(params) = preset.zones().get(zone) else {
            self.envelope.kill();
            return;
        };

        let velocity_gain = (velocity as f32 / 127.0).powi(2);
        let angle = (params.pan + 1.0) * FRAC_PI_4;

        self.key = key;
        self.age = age;
        self.zone = zone;
        self.position = params.sample_start as f64;
        self.step = params.playback_step(key, output_rate);
        self.amplitude = velocity_gain * 10f32.powf(-params.attenuation_db / 20.0);
        self.pan_left = angle.cos();
        self.pan_right = angle.sin();
        self.loop_mode = params.loop_mode;
        self.envelope.start(&params.envelope);
        self.preset = Some(Arc::clone(preset));
    }

    /// Moves the voice into its release stage.
    pub fn release(&mut self) {
        self.envelope.release();
    }

    /// Stops the voice immediately.
    pub fn kill(&mut self) {
        self.envelope.kill();
    }

    /// Returns true while the voice produces sound.
    pub fn is_active(&self) -> bool {
        !self.envelope.is_silent()
    }

    /// Returns true if the voice is sounding and not yet released.
    pub fn is_held(&self) -> bool {
        !matches!(
            self.envelope.stage(),
            EnvelopeStage::Release | EnvelopeStage::Silent
        )
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    /// Note-on counter value when the voice started. Lower is older.
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    /// Adds this voice's next `left.len()` samples into the buffers.
    ///
    /// Sample positions that fall outside the wave data end the voice.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let Some(preset) = self.preset.as_deref() else {
            self.envelope.kill();
            return;
        };
        let Some(zone) = preset.zones().get(self.zone) else {
            self.envelope.kill();
            return;
        };
        let wave = preset.wave_data();
        let loop_len = (zone.loop_end - zone.loop_start) as f64;

        for (out_l, out_r) in left.iter_mut().zip(right.iter_mut()) {
            let level = self.envelope.advance();
            if self.envelope.is_silent() {
                break;
            }

            let looping = match self.loop_mode {
                LoopMode::Continuous => true,
                LoopMode::UntilRelease => self.envelope.stage() != EnvelopeStage::Release,
                LoopMode::None => false,
            };

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = if looping && index + 1 >= zone.loop_end {
                zone.loop_start
            } else {
                index + 1
            };
            let Some(&current) = wave.get(index) else {
                self.envelope.kill();
                break;
            };
            let following = wave.get(next).copied().unwrap_or(0);

            let a = current as f32;
            let b = following as f32;
            let value = (a + (b - a) * frac) * SAMPLE_SCALE * level * self.amplitude;
            *out_l += value * self.pan_left;
            *out_r += value * self.pan_right;

            self.position += self.step;
            if looping && self.position >= zone.loop_end as f64 {
                let overshoot = self.position - zone.loop_start as f64;
                self.position = zone.loop_start as f64 + overshoot % loop_len;
            } else if self.position >= zone.sample_end as f64 {
                self.envelope.kill();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::builtin::{sine_soundfont, SoundFontWriter};
    use crate::bank::Bank;

    const RATE: f32 = 48000.0;

    fn sine_preset() -> Arc<Preset> {
        let bank = Bank::decode("sine", &sine_soundfont()).unwrap();
        Arc::clone(&bank.presets()[0])
    }

    #[test]
    fn test_render_produces_sound() {
        let preset = sine_preset();
        let mut voice = Voice::new(RATE);
        voice.start(&preset, 0, 69, 127, 1, RATE);
        assert!(voice.is_active());
        assert_eq!(voice.stage(), EnvelopeStage::Attack);

        let mut left = vec![0.0; 512];
        let mut right = vec![0.0; 512];
        voice.render(&mut left, &mut right);
        assert!(left.iter().any(|s| s.abs() > 0.01));
        // Centered pan
        for (l, r) in left.iter().zip(&right) {
            assert!((l - r).abs() < 1e-6);
        }
    }

    #[test]
    fn test_looped_voice_keeps_playing() {
        let preset = sine_preset();
        let mut voice = Voice::new(RATE);
        voice.start(&preset, 0, 60, 100, 1, RATE);

        let mut left = vec![0.0; 128];
        let mut right = vec![0.0; 128];
        // One second of sound is far longer than the 100-sample loop.
        for _ in 0..375 {
            left.fill(0.0);
            right.fill(0.0);
            voice.render(&mut left, &mut right);
        }
        assert!(voice.is_active());
        assert!(voice.is_held());
        assert!(left.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_release_then_silence() {
        let bytes = SoundFontWriter::new("Short")
            .preset("Blip", 0, 0)
            .release(0.01)
            .build();
        let bank = Bank::decode("short", &bytes).unwrap();
        let preset = Arc::clone(&bank.presets()[0]);

        let mut voice = Voice::new(RATE);
        voice.start(&preset, 0, 72, 100, 1, RATE);
        let mut left = vec![0.0; 128];
        let mut right = vec![0.0; 128];
        voice.render(&mut left, &mut right);

        voice.release();
        assert!(!voice.is_held());
        for _ in 0..10 {
            voice.render(&mut left, &mut right);
        }
        assert!(!voice.is_active());
    }

    #[test]
    fn test_missing_zone_stays_idle() {
        let preset = sine_preset();
        let mut voice = Voice::new(RATE);
        voice.start(&preset, 99, 60, 100, 1, RATE);
        assert!(!voice.is_active());
    }
}
