//! SoundFont banks and their preset catalogs.
//!
//! A [`Bank`] is decoded once, in the control context, from raw SoundFont
//! bytes. Decoding flattens every preset into a list of playable [`Zone`]s so
//! the render context never has to walk the SoundFont generator tree.
//! Banks are immutable after decoding and shared through `Arc`.

pub mod builtin;
mod riff;
mod store;

pub use store::{BankStore, PresetRef};

use crate::error::DecodeError;
use crate::voice::EnvelopeParams;
use rustysynth::SoundFont;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

/// Highest bank number reachable with a 14-bit MIDI bank select.
pub const MAX_BANK_NUMBER: u16 = 16383;

/// How a zone's sample loop behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play the sample once from start to end.
    None,
    /// Loop for the whole life of the voice, including release.
    Continuous,
    /// Loop while the key is held, then play through to the end.
    UntilRelease,
}

/// One playable sample mapping of a preset.
///
/// Produced by intersecting a preset region with one of its instrument's
/// regions. All sample positions are absolute indices into the bank's wave data.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    /// Lowest key (inclusive) that triggers this zone.
    pub key_lo: u8,
    /// Highest key (inclusive) that triggers this zone.
    pub key_hi: u8,
    /// Lowest velocity (inclusive) that triggers this zone.
    pub velocity_lo: u8,
    /// Highest velocity (inclusive) that triggers this zone.
    pub velocity_hi: u8,
    /// First sample of the zone.
    pub sample_start: usize,
    /// One past the last sample of the zone.
    pub sample_end: usize,
    /// First sample of the loop.
    pub loop_start: usize,
    /// One past the last sample of the loop.
    pub loop_end: usize,
    /// Loop behaviour.
    pub loop_mode: LoopMode,
    /// Key at which the sample plays at its recorded pitch.
    pub root_key: u8,
    /// Static detune in cents (coarse and fine tuning combined).
    pub tune_cents: f32,
    /// Pitch change per key in cents (100 = equal temperament).
    pub scale_tuning: f32,
    /// Recording sample rate of the sample in Hz.
    pub sample_rate: u32,
    /// Static attenuation in decibels.
    pub attenuation_db: f32,
    /// Stereo position from -1.0 (left) to 1.0 (right).
    pub pan: f32,
    /// Volume envelope timing.
    pub envelope: EnvelopeParams,
}

impl Zone {
    /// Returns true if the zone responds to this key and velocity.
    pub fn contains(&self, key: u8, velocity: u8) -> bool {
        (self.key_lo..=self.key_hi).contains(&key)
            && (self.velocity_lo..=self.velocity_hi).contains(&velocity)
    }

    /// Playback rate for `key`, in source samples per output sample.
    pub fn playback_step(&self, key: u8, output_rate: f32) -> f64 {
        let cents = (key as f32 - self.root_key as f32) * self.scale_tuning + self.tune_cents;
        let ratio = 2f64.powf(cents as f64 / 1200.0);
        ratio * self.sample_rate as f64 / output_rate as f64
    }
}

/// A selectable instrument within a bank.
#[derive(Debug)]
pub struct Preset {
    id: String,
    bank_id: String,
    name: String,
    bank: u16,
    program: u8,
    zones: Vec<Zone>,
    wave: Arc<[i16]>,
}

impl Preset {
    /// Stable identifier derived from the bank id and preset metadata.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the bank this preset belongs to.
    pub fn bank_id(&self) -> &str {
        &self.bank_id
    }

    /// Display name from the SoundFont.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIDI bank number.
    pub fn bank(&self) -> u16 {
        self.bank
    }

    /// MIDI program number (0-127).
    pub fn program(&self) -> u8 {
        self.program
    }

    /// Playable zones of this preset.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// The bank's 16-bit wave data that zone positions index into.
    pub fn wave_data(&self) -> &[i16] {
        &self.wave
    }

    /// Serializable description of this preset.
    pub fn info(&self) -> PresetInfo {
        PresetInfo {
            id: self.id.clone(),
            soundfont_id: self.bank_id.clone(),
            name: self.name.clone(),
            bank: self.bank,
            program: self.program,
        }
    }
}

/// Builds the identifier of a preset.
///
/// The same bank id and preset metadata always yield the same identifier.
pub fn preset_id(bank_id: &str, name: &str, bank: u16, program: u8) -> String {
    format!("{}:{}:{}:{}", bank_id, bank, program, name)
}

/// A loaded SoundFont with its ordered preset catalog.
#[derive(Debug)]
pub struct Bank {
    id: String,
    presets: Vec<Arc<Preset>>,
}

impl Bank {
    /// Decodes raw SoundFont bytes into a bank with the given final id.
    ///
    /// Presets are ordered by (bank number, program number).
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the bytes are an archive, are not a valid
    /// SoundFont, contain no presets, or contain out-of-range or duplicate
    /// preset numbers.
    pub fn decode(id: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
        if let Some(container) = sniff_container(bytes) {
            return Err(DecodeError::UnsupportedContainer(container));
        }
        riff::check_structure(bytes)?;

        let mut cursor = Cursor::new(bytes);
        let soundfont =
            SoundFont::new(&mut cursor).map_err(|e| DecodeError::Malformed(format!("{:?}", e)))?;
        let wave: Arc<[i16]> = Arc::from(&soundfont.get_wave_data()[..]);

        let mut seen = HashSet::new();
        let mut presets = Vec::with_capacity(soundfont.get_presets().len());
        for source in soundfont.get_presets() {
            let name = source.get_name().trim().to_string();
            let program = u8::try_from(source.get_patch_number())
                .ok()
                .filter(|p| *p <= 127)
                .ok_or_else(|| DecodeError::ProgramOutOfRange {
                    name: name.clone(),
                    program: source.get_patch_number(),
                })?;
            let bank = u16::try_from(source.get_bank_number())
                .ok()
                .filter(|b| *b <= MAX_BANK_NUMBER)
                .ok_or_else(|| DecodeError::BankOutOfRange {
                    name: name.clone(),
                    bank: source.get_bank_number(),
                })?;
            if !seen.insert((bank, program)) {
                return Err(DecodeError::DuplicatePreset { bank, program });
            }

            presets.push(Preset {
                id: preset_id(id, &name, bank, program),
                bank_id: id.to_string(),
                zones: collect_zones(&soundfont, source),
                name,
                bank,
                program,
                wave: Arc::clone(&wave),
            });
        }

        if presets.is_empty() {
            return Err(DecodeError::NoPresets);
        }
        presets.sort_by_key(|p| (p.bank, p.program));

        Ok(Self {
            id: id.to_string(),
            presets: presets.into_iter().map(Arc::new).collect(),
        })
    }

    /// Unique id of this bank within its store.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Presets ordered by (bank number, program number).
    pub fn presets(&self) -> &[Arc<Preset>] {
        &self.presets
    }

    /// Finds a preset by id, returning its index and the preset.
    pub fn find_preset(&self, preset_id: &str) -> Option<(usize, &Arc<Preset>)> {
        self.presets
            .iter()
            .enumerate()
            .find(|(_, p)| p.id == preset_id)
    }

    /// Finds a preset by MIDI bank and program numbers.
    pub fn find_by_numbers(&self, bank: u16, program: u8) -> Option<(usize, &Arc<Preset>)> {
        self.presets
            .iter()
            .enumerate()
            .find(|(_, p)| p.bank == bank && p.program == program)
    }

    /// Serializable summary (id plus preset list).
    pub fn summary(&self) -> BankSummary {
        BankSummary {
            id: self.id.clone(),
            presets: self.presets.iter().map(|p| p.info()).collect(),
        }
    }
}

/// Serializable description of a preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetInfo {
    /// Stable preset id.
    pub id: String,
    /// Id of the owning bank.
    pub soundfont_id: String,
    /// Display name.
    pub name: String,
    /// MIDI bank number.
    pub bank: u16,
    /// MIDI program number.
    pub program: u8,
}

/// Serializable description of a bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSummary {
    /// Final (unique) bank id.
    pub id: String,
    /// Presets in (bank, program) order.
    pub presets: Vec<PresetInfo>,
}

/// Recognizes archive formats that a browser-style upload might hand us.
fn sniff_container(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"PK\x03\x04") {
        Some("zip")
    } else if bytes.starts_with(&[0x1f, 0x8b]) {
        Some("gzip")
    } else if bytes.get(257..262) == Some(b"ustar".as_slice()) {
        Some("tar")
    } else {
        None
    }
}

/// Flattens the preset → instrument → sample hierarchy into zones.
///
/// Regions whose sample bounds fall outside the wave data are dropped.
fn collect_zones(soundfont: &SoundFont, preset: &rustysynth::Preset) -> Vec<Zone> {
    let wave_len = soundfont.get_wave_data().len();
    let instruments = soundfont.get_instruments();
    let sample_headers = soundfont.get_sample_headers();
    let mut zones = Vec::new();

    for preset_region in preset.get_regions() {
        let Some(instrument) = instruments.get(preset_region.get_instrument_id()) else {
            continue;
        };

        for region in instrument.get_regions() {
            let key_lo = region
                .get_key_range_start()
                .max(preset_region.get_key_range_start())
                .max(0);
            let key_hi = region
                .get_key_range_end()
                .min(preset_region.get_key_range_end())
                .min(127);
            let velocity_lo = region
                .get_velocity_range_start()
                .max(preset_region.get_velocity_range_start())
                .max(0);
            let velocity_hi = region
                .get_velocity_range_end()
                .min(preset_region.get_velocity_range_end())
                .min(127);
            if key_lo > key_hi || velocity_lo > velocity_hi {
                continue;
            }

            let start = region.get_sample_start();
            let end = region.get_sample_end();
            if start < 0 || end <= start || end as usize > wave_len {
                continue;
            }
            let (start, end) = (start as usize, end as usize);

            let mut loop_mode = match region.get_sample_modes() {
                rustysynth::LoopMode::Continuous => LoopMode::Continuous,
                rustysynth::LoopMode::LoopUntilNoteOff => LoopMode::UntilRelease,
                _ => LoopMode::None,
            };
            let loop_start = region.get_sample_start_loop();
            let loop_end = region.get_sample_end_loop();
            let loop_valid = loop_start >= start as i32
                && loop_end > loop_start
                && loop_end as usize <= end;
            if !loop_valid {
                loop_mode = LoopMode::None;
            }

            let sustain_db = region.get_sustain_volume_envelope();
            let sustain_level = if sustain_db >= 100.0 {
                0.0
            } else {
                10f32.powf(-sustain_db.max(0.0) / 20.0)
            };

            zones.push(Zone {
                key_lo: key_lo as u8,
                key_hi: key_hi as u8,
                velocity_lo: velocity_lo as u8,
                velocity_hi: velocity_hi as u8,
                sample_start: start,
                sample_end: end,
                loop_start: if loop_valid { loop_start as usize } else { start },
                loop_end: if loop_valid { loop_end as usize } else { end },
                loop_mode,
                root_key: region.get_root_key().clamp(0, 127) as u8,
                tune_cents: ((region.get_coarse_tune() + preset_region.get_coarse_tune()) * 100
                    + region.get_fine_tune()
                    + preset_region.get_fine_tune()) as f32,
                scale_tuning: region.get_scale_tuning() as f32,
                sample_rate: sample_headers
                    .get(region.get_sample_id())
                    .map_or(1, |h| h.get_sample_rate())
                    .max(1) as u32,
                attenuation_db: (region.get_initial_attenuation()
                    + preset_region.get_initial_attenuation())
                .max(0.0),
                pan: ((region.get_pan() + preset_region.get_pan()) / 50.0).clamp(-1.0, 1.0),
                envelope: EnvelopeParams {
                    attack: region.get_attack_volume_envelope(),
                    hold: region.get_hold_volume_envelope(),
                    decay: region.get_decay_volume_envelope(),
                    sustain_level,
                    release: region.get_release_volume_envelope(),
                },
            });
        }
    }

    zones
}
