//! Built-in SoundFont generation.
//!
//! Writes minimal but complete SF2 files: one looped single-cycle sine sample
//! shared by any number of presets. The engine loads [`sine_soundfont`] as its
//! default bank, so a fresh engine can make sound without any user files.

use super::riff::{GEN_INSTRUMENT, GEN_SAMPLE_ID};
use std::f32::consts::TAU;

/// Length of the single sine cycle in samples.
const SINE_PERIOD: u32 = 100;

/// Recording rate of the sine sample. 100 samples per cycle at 44 kHz is 440 Hz.
const SINE_SAMPLE_RATE: u32 = 44000;

/// Key of the recorded pitch (A4 = 440 Hz).
const SINE_ROOT_KEY: u8 = 69;

/// Peak amplitude of the stored sample.
const SINE_AMPLITUDE: f32 = 30000.0;

/// Zero samples required by the SF2 format after every sample.
const SAMPLE_PADDING: usize = 46;

/// Default release time of generated instruments in seconds.
const DEFAULT_RELEASE_SECS: f32 = 0.1;

// SF2 generator operators used by the writer.
const GEN_RELEASE_VOL_ENV: u16 = 38;
const GEN_KEY_RANGE: u16 = 43;
const GEN_VEL_RANGE: u16 = 44;
const GEN_SAMPLE_MODES: u16 = 54;

/// Generators per instrument zone (key range, velocity range, sample modes,
/// release, sample id).
const INSTRUMENT_GENERATORS: u16 = 5;

/// Key and velocity ranges of one instrument zone, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneRange {
    pub keys: (u8, u8),
    pub velocities: (u8, u8),
}

impl Default for ZoneRange {
    fn default() -> Self {
        Self {
            keys: (0, 127),
            velocities: (0, 127),
        }
    }
}

/// A preset entry to be written.
#[derive(Debug, Clone)]
struct PresetEntry {
    name: String,
    bank: u16,
    program: u8,
    zones: Vec<ZoneRange>,
}

/// Builder for small sine-based SoundFonts.
///
/// # Examples
///
/// ```
/// use sfplayer::bank::builtin::SoundFontWriter;
///
/// let bytes = SoundFontWriter::new("Test")
///     .preset("Lead", 0, 80)
///     .preset("Pad", 0, 88)
///     .build();
/// assert_eq!(&bytes[..4], b"RIFF");
/// ```
#[derive(Debug, Clone)]
pub struct SoundFontWriter {
    name: String,
    presets: Vec<PresetEntry>,
    release_secs: f32,
}

impl SoundFontWriter {
    /// Creates a writer for a SoundFont with the given bank name and no presets.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            presets: Vec::new(),
            release_secs: DEFAULT_RELEASE_SECS,
        }
    }

    /// Adds a preset playing the sine sample over the full key and velocity
    /// range.
    ///
    /// Duplicate (bank, program) pairs are written as given.
    pub fn preset(self, name: impl Into<String>, bank: u16, program: u8) -> Self {
        self.split_preset(name, bank, program, &[ZoneRange::default()])
    }

    /// Adds a preset with one sine zone per range. Ranges may overlap.
    pub fn split_preset(
        mut self,
        name: impl Into<String>,
        bank: u16,
        program: u8,
        zones: &[ZoneRange],
    ) -> Self {
        self.presets.push(PresetEntry {
            name: name.into(),
            bank,
            program,
            zones: zones.to_vec(),
        });
        self
    }

    /// Sets the release time of every instrument in seconds.
    pub fn release(mut self, secs: f32) -> Self {
        self.release_secs = secs.max(0.001);
        self
    }

    /// Serializes the SoundFont to bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut body = b"sfbk".to_vec();
        body.extend(self.info_list());
        body.extend(self.sample_list());
        body.extend(self.parameter_list());
        chunk(b"RIFF", &body)
    }

    fn info_list(&self) -> Vec<u8> {
        let mut version = Vec::new();
        put_u16(&mut version, 2);
        put_u16(&mut version, 1);

        let mut data = b"INFO".to_vec();
        data.extend(chunk(b"ifil", &version));
        data.extend(chunk(b"isng", &zstr("EMU8000")));
        data.extend(chunk(b"INAM", &zstr(&self.name)));
        chunk(b"LIST", &data)
    }

    fn sample_list(&self) -> Vec<u8> {
        let mut samples = Vec::with_capacity((SINE_PERIOD as usize + SAMPLE_PADDING) * 2);
        for i in 0..SINE_PERIOD {
            let value = (TAU * i as f32 / SINE_PERIOD as f32).sin() * SINE_AMPLITUDE;
            samples.extend_from_slice(&(value as i16).to_le_bytes());
        }
        samples.resize(samples.len() + SAMPLE_PADDING * 2, 0);

        let mut data = b"sdta".to_vec();
        data.extend(chunk(b"smpl", &samples));
        chunk(b"LIST", &data)
    }

    fn parameter_list(&self) -> Vec<u8> {
        let count = self.presets.len() as u16;
        let mut instrument_zones = 0u16;

        let mut phdr = Vec::new();
        let mut pbag = Vec::new();
        let mut pgen = Vec::new();
        let mut inst = Vec::new();
        let mut ibag = Vec::new();
        let mut igen = Vec::new();

        for (index, preset) in self.presets.iter().enumerate() {
            let index = index as u16;

            // Preset header pointing at one zone that selects instrument `index`.
            phdr.extend(fixed_name(&preset.name));
            put_u16(&mut phdr, preset.program as u16);
            put_u16(&mut phdr, preset.bank);
            put_u16(&mut phdr, index);
            phdr.extend([0; 12]);

            put_u16(&mut pbag, index);
            put_u16(&mut pbag, 0);
            put_u16(&mut pgen, GEN_INSTRUMENT);
            put_u16(&mut pgen, index);

            // Instrument zones: looped sine, configured release.
            inst.extend(fixed_name(&preset.name));
            put_u16(&mut inst, instrument_zones);

            for zone in &preset.zones {
                put_u16(&mut ibag, instrument_zones * INSTRUMENT_GENERATORS);
                put_u16(&mut ibag, 0);
                put_u16(&mut igen, GEN_KEY_RANGE);
                igen.extend([zone.keys.0, zone.keys.1]);
                put_u16(&mut igen, GEN_VEL_RANGE);
                igen.extend([zone.velocities.0, zone.velocities.1]);
                put_u16(&mut igen, GEN_SAMPLE_MODES);
                put_u16(&mut igen, 1);
                put_u16(&mut igen, GEN_RELEASE_VOL_ENV);
                put_u16(&mut igen, seconds_to_timecents(self.release_secs) as u16);
                put_u16(&mut igen, GEN_SAMPLE_ID);
                put_u16(&mut igen, 0);
                instrument_zones += 1;
            }
        }

        // Terminal records.
        phdr.extend(fixed_name("EOP"));
        put_u16(&mut phdr, 0);
        put_u16(&mut phdr, 0);
        put_u16(&mut phdr, count);
        phdr.extend([0; 12]);
        put_u16(&mut pbag, count);
        put_u16(&mut pbag, 0);
        pgen.extend([0; 4]);
        inst.extend(fixed_name("EOI"));
        put_u16(&mut inst, instrument_zones);
        put_u16(&mut ibag, instrument_zones * INSTRUMENT_GENERATORS);
        put_u16(&mut ibag, 0);
        igen.extend([0; 4]);

        let mut shdr = fixed_name("Sine").to_vec();
        put_u32(&mut shdr, 0);
        put_u32(&mut shdr, SINE_PERIOD);
        put_u32(&mut shdr, 0);
        put_u32(&mut shdr, SINE_PERIOD);
        put_u32(&mut shdr, SINE_SAMPLE_RATE);
        shdr.push(SINE_ROOT_KEY);
        shdr.push(0); // pitch correction
        put_u16(&mut shdr, 0); // sample link
        put_u16(&mut shdr, 1); // mono
        shdr.extend(fixed_name("EOS"));
        shdr.extend([0; 26]);

        let modulators = [0u8; 10];

        let mut data = b"pdta".to_vec();
        data.extend(chunk(b"phdr", &phdr));
        data.extend(chunk(b"pbag", &pbag));
        data.extend(chunk(b"pmod", &modulators));
        data.extend(chunk(b"pgen", &pgen));
        data.extend(chunk(b"inst", &inst));
        data.extend(chunk(b"ibag", &ibag));
        data.extend(chunk(b"imod", &modulators));
        data.extend(chunk(b"igen", &igen));
        data.extend(chunk(b"shdr", &shdr));
        chunk(b"LIST", &data)
    }
}

/// The default bank: a single "Sine Wave" preset at bank 0, program 0.
pub fn sine_soundfont() -> Vec<u8> {
    SoundFontWriter::new("Sine").preset("Sine Wave", 0, 0).build()
}

/// Wraps `data` in a RIFF chunk, padding to an even length.
fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 9);
    out.extend_from_slice(id);
    put_u32(&mut out, data.len() as u32);
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// Null-terminated string padded to an even length.
fn zstr(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    if out.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// 20-byte null-padded name field; longer names are truncated.
fn fixed_name(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    let bytes = name.as_bytes();
    let len = bytes.len().min(19);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

fn seconds_to_timecents(secs: f32) -> i16 {
    (1200.0 * secs.log2()).round().clamp(-12000.0, 8000.0) as i16
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn test_riff_header() {
        let bytes = sine_soundfont();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(&bytes[8..12], b"sfbk");
        assert_eq!(&bytes[12..16], b"LIST");
        assert_eq!(&bytes[20..24], b"INFO");
    }

    #[test]
    fn test_chunk_padding() {
        let odd = chunk(b"test", &[1, 2, 3]);
        assert_eq!(odd.len(), 12);
        assert_eq!(read_u32(&odd, 4), 3);
    }

    #[test]
    fn test_fixed_name_truncates() {
        let name = fixed_name("A very long preset name indeed");
        assert_eq!(name[19], 0);
        assert_eq!(&name[..5], b"A ver");
    }

    #[test]
    fn test_timecents() {
        assert_eq!(seconds_to_timecents(1.0), 0);
        assert_eq!(seconds_to_timecents(2.0), 1200);
        assert_eq!(seconds_to_timecents(0.5), -1200);
    }

    #[test]
    fn test_split_preset_writes_one_bag_per_zone() {
        let full = SoundFontWriter::new("X").preset("P", 0, 0).build();
        let split = SoundFontWriter::new("X")
            .split_preset(
                "P",
                0,
                0,
                &[
                    ZoneRange {
                        keys: (0, 59),
                        ..ZoneRange::default()
                    },
                    ZoneRange {
                        keys: (60, 127),
                        ..ZoneRange::default()
                    },
                ],
            )
            .build();
        // One extra bag record plus its five generators.
        assert_eq!(split.len(), full.len() + 4 + 5 * 4);
    }

    #[test]
    fn test_release_changes_output() {
        let short = SoundFontWriter::new("X").preset("P", 0, 0).build();
        let long = SoundFontWriter::new("X")
            .preset("P", 0, 0)
            .release(2.0)
            .build();
        assert_eq!(short.len(), long.len());
        assert_ne!(short, long);
    }
}
