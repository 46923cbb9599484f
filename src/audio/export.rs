//! Offline rendering to WAV files.
//!
//! Drives the same control/render pair used for live playback, so an export
//! sounds exactly like the engine does in real time. Note events are applied
//! on their exact sample frame.

use crate::engine::{Renderer, SynthesisCore};
use crate::midi::parse_key;
use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Largest block rendered between events.
const RENDER_BUFFER_SIZE: usize = 4096;

/// Default velocity for parsed notes.
const DEFAULT_VELOCITY: u8 = 100;

/// A note to render, timed in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub key: u8,
    pub velocity: u8,
    /// Start time in seconds.
    pub start: f64,
    /// Time held before note-off, in seconds.
    pub duration: f64,
}

impl FromStr for NoteEvent {
    type Err = anyhow::Error;

    /// Parses `KEY:START:DURATION[:VELOCITY]`, where KEY is a note name
    /// ("C4", "F#5") or a MIDI key number.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            bail!("expected KEY:START:DURATION[:VELOCITY], got '{}'", s);
        }

        let key = parse_key(parts[0]).with_context(|| format!("invalid key '{}'", parts[0]))?;
        let start = parts[1]
            .parse::<f64>()
            .with_context(|| format!("invalid start '{}'", parts[1]))?;
        let duration = parts[2]
            .parse::<f64>()
            .with_context(|| format!("invalid duration '{}'", parts[2]))?;
        let velocity = match parts.get(3) {
            Some(v) => v.parse::<u8>().with_context(|| format!("invalid velocity '{}'", v))?,
            None => DEFAULT_VELOCITY,
        };

        if !start.is_finite() || start < 0.0 || !duration.is_finite() || duration < 0.0 {
            bail!("start and duration must be non-negative, got '{}'", s);
        }
        if velocity > 127 {
            bail!("velocity {} outside 0-127", velocity);
        }
        Ok(Self {
            key,
            velocity,
            start,
            duration,
        })
    }
}

/// Renders `notes` followed by `tail_secs` of release time to a 16-bit
/// stereo WAV file. Returns the number of frames written.
///
/// The renderer must belong to `core`.
///
/// # Errors
///
/// Returns error if the output file cannot be created or written.
pub fn render_to_wav<P, F>(
    core: &mut SynthesisCore,
    renderer: &mut Renderer,
    notes: &[NoteEvent],
    tail_secs: f64,
    output_path: P,
    mut progress_callback: Option<F>,
) -> Result<usize>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let sample_rate = core.sample_rate();
    let to_frame = |secs: f64| (secs * sample_rate as f64).round() as usize;

    // (frame, is_note_on, key, velocity)
    let mut events: Vec<(usize, bool, u8, u8)> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let on = to_frame(note.start);
        let off = to_frame(note.start + note.duration).max(on + 1);
        events.push((on, true, note.key, note.velocity));
        events.push((off, false, note.key, 0));
    }
    // Note-off before note-on on the same frame
    events.sort_by_key(|(frame, is_on, _, _)| (*frame, *is_on));

    let last_event = events.last().map(|e| e.0).unwrap_or(0);
    let total_frames = last_event + to_frame(tail_secs.max(0.0));

    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec).with_context(|| {
        format!(
            "Failed to create output WAV file: {}",
            output_path.as_ref().display()
        )
    })?;

    let mut left_buf = vec![0.0f32; RENDER_BUFFER_SIZE];
    let mut right_buf = vec![0.0f32; RENDER_BUFFER_SIZE];
    let mut current = 0usize;
    let mut next_event = 0usize;

    while current < total_frames {
        while let Some(&(frame, is_on, key, velocity)) = events.get(next_event) {
            if frame > current {
                break;
            }
            if is_on {
                core.note_on(key, velocity);
            } else {
                core.note_off(key);
            }
            // Apply right away so bursts never overflow the command queue.
            renderer.render(&mut [], &mut []);
            next_event += 1;
        }

        let until = events
            .get(next_event)
            .map_or(total_frames, |e| e.0.min(total_frames));
        let frames = (until - current).clamp(1, RENDER_BUFFER_SIZE);

        renderer.render(&mut left_buf[..frames], &mut right_buf[..frames]);
        for (left, right) in left_buf[..frames].iter().zip(&right_buf[..frames]) {
            writer.write_sample(to_i16(*left))?;
            writer.write_sample(to_i16(*right))?;
        }

        current += frames;
        if let Some(ref mut callback) = progress_callback {
            callback(current as f32 / total_frames as f32);
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    info!(
        path = %output_path.as_ref().display(),
        frames = total_frames,
        notes = notes.len(),
        "Exported WAV"
    );
    Ok(total_frames)
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
