//! Volume envelope for sample voices.
//!
//! Linear attack, hold, exponential decay toward the sustain level, sustain,
//! and exponential release. Decay and release are specified as the time to
//! fall 100 dB, matching the SoundFont convention.

/// Level treated as silence (-100 dB).
pub const SILENCE: f32 = 1e-5;

/// Shortest stage time in seconds.
const MIN_STAGE_SECS: f32 = 0.001;

/// Longest stage time in seconds. Keeps every release bounded.
const MAX_STAGE_SECS: f32 = 100.0;

/// Timing of one envelope, in seconds except for the sustain level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    /// Time to ramp from silence to full level.
    pub attack: f32,
    /// Time to stay at full level after the attack.
    pub hold: f32,
    /// Time to fall 100 dB from full level (stops at the sustain level).
    pub decay: f32,
    /// Linear level held while the key is down (0.0 to 1.0).
    pub sustain_level: f32,
    /// Time to fall 100 dB once the key is released.
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: MIN_STAGE_SECS,
            hold: MIN_STAGE_SECS,
            decay: MIN_STAGE_SECS,
            sustain_level: 1.0,
            release: MIN_STAGE_SECS,
        }
    }
}

/// Envelope stages. A voice moves strictly forward through them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Ramping up from silence.
    Attack,
    /// Holding full level.
    Hold,
    /// Falling toward the sustain level.
    Decay,
    /// Holding the sustain level until release.
    Sustain,
    /// Key released, falling to silence.
    Release,
    /// Finished. The voice can be reused.
    #[default]
    Silent,
}

/// Per-voice volume envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
    sample_rate: f32,
    attack_step: f32,
    hold_samples: u32,
    decay_coeff: f32,
    sustain: f32,
    release_coeff: f32,
}

impl Envelope {
    /// Creates a silent envelope.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stage: EnvelopeStage::Silent,
            level: 0.0,
            sample_rate,
            attack_step: 1.0,
            hold_samples: 0,
            decay_coeff: 0.0,
            sustain: 1.0,
            release_coeff: 0.0,
        }
    }

    /// Starts the envelope from silence with the given timing.
    pub fn start(&mut self, params: &EnvelopeParams) {
        let attack_samples = self.samples(params.attack).max(1.0);
        self.attack_step = 1.0 / attack_samples;
        self.hold_samples = self.samples(params.hold) as u32;
        self.decay_coeff = self.fall_coefficient(params.decay);
        self.sustain = params.sustain_level.clamp(0.0, 1.0);
        self.release_coeff = self.fall_coefficient(params.release);
        self.level = 0.0;
        self.stage = EnvelopeStage::Attack;
    }

    /// Moves to the release stage. No effect once releasing or silent.
    pub fn release(&mut self) {
        if !matches!(self.stage, EnvelopeStage::Release | EnvelopeStage::Silent) {
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Silences the envelope immediately.
    pub fn kill(&mut self) {
        self.stage = EnvelopeStage::Silent;
        self.level = 0.0;
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Returns true once the envelope has finished.
    pub fn is_silent(&self) -> bool {
        self.stage == EnvelopeStage::Silent
    }

    /// Advances one sample and returns the new level.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = if self.hold_samples > 0 {
                        EnvelopeStage::Hold
                    } else {
                        EnvelopeStage::Decay
                    };
                }
            }
            EnvelopeStage::Hold => {
                self.hold_samples = self.hold_samples.saturating_sub(1);
                if self.hold_samples == 0 {
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level *= self.decay_coeff;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
                if self.level <= SILENCE {
                    self.kill();
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
                if self.level <= SILENCE {
                    self.kill();
                }
            }
            EnvelopeStage::Release => {
                self.level *= self.release_coeff;
                if self.level <= SILENCE {
                    self.kill();
                }
            }
            EnvelopeStage::Silent => {
                self.level = 0.0;
            }
        }
        self.level
    }

    fn samples(&self, secs: f32) -> f32 {
        secs.clamp(MIN_STAGE_SECS, MAX_STAGE_SECS) * self.sample_rate
    }

    // Per-sample multiplier that falls from 1.0 to SILENCE in `secs`.
    fn fall_coefficient(&self, secs: f32) -> f32 {
        (SILENCE.ln() / self.samples(secs).max(1.0)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 48000.0;

    fn params(attack: f32, decay: f32, sustain_level: f32, release: f32) -> EnvelopeParams {
        EnvelopeParams {
            attack,
            hold: 0.0,
            decay,
            sustain_level,
            release,
        }
    }

    #[test]
    fn test_starts_silent() {
        let mut env = Envelope::new(RATE);
        assert!(env.is_silent());
        for _ in 0..100 {
            assert_eq!(env.advance(), 0.0);
        }
    }

    #[test]
    fn test_attack_reaches_full_level() {
        let mut env = Envelope::new(RATE);
        env.start(&params(0.01, 0.1, 0.5, 0.1));
        assert_eq!(env.stage(), EnvelopeStage::Attack);

        // 10 ms at 48 kHz, plus a little slack for rounding
        let mut level = 0.0;
        for _ in 0..500 {
            level = env.advance();
        }
        assert!(level > 0.99);
        assert_ne!(env.stage(), EnvelopeStage::Attack);
    }

    #[test]
    fn test_decay_settles_at_sustain() {
        let mut env = Envelope::new(RATE);
        env.start(&params(0.001, 0.05, 0.5, 0.1));
        let mut level = 0.0;
        for _ in 0..(RATE as usize) {
            level = env.advance();
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert_eq!(level, 0.5);
    }

    #[test]
    fn test_release_reaches_silence_in_time() {
        let mut env = Envelope::new(RATE);
        env.start(&params(0.001, 0.001, 1.0, 0.1));
        for _ in 0..1000 {
            env.advance();
        }
        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);

        let release_samples = (0.1 * RATE) as usize;
        let mut level = 1.0;
        for _ in 0..release_samples + 2 {
            level = env.advance();
        }
        assert!(env.is_silent());
        assert_eq!(level, 0.0);
    }

    #[test]
    fn test_zero_sustain_decays_to_silence() {
        let mut env = Envelope::new(RATE);
        env.start(&params(0.001, 0.02, 0.0, 1.0));
        for _ in 0..(0.05 * RATE) as usize {
            env.advance();
        }
        assert!(env.is_silent());
    }

    #[test]
    fn test_release_while_silent_is_ignored() {
        let mut env = Envelope::new(RATE);
        env.release();
        assert!(env.is_silent());
    }

    #[test]
    fn test_hold_delays_decay() {
        let mut env = Envelope::new(RATE);
        env.start(&EnvelopeParams {
            attack: 0.001,
            hold: 0.01,
            decay: 0.001,
            sustain_level: 0.2,
            release: 0.1,
        });
        let mut level = 0.0;
        for _ in 0..100 {
            level = env.advance();
        }
        assert_eq!(env.stage(), EnvelopeStage::Hold);
        assert_eq!(level, 1.0);
    }
}
