//! Lock-free state published by the renderer for the control context.

use std::hint;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Packed value meaning "no selection".
const NO_SELECTION: u64 = u64::MAX;

/// Selection and gain as applied by one command drain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    /// Number of completed drains that changed published state.
    pub version: u64,
    /// Current (bank index, preset index).
    pub selection: Option<(usize, usize)>,
    /// Linear output gain.
    pub gain: f32,
}

/// State written by the renderer after each command drain and read by the
/// control context when building snapshots.
///
/// Selection and gain are guarded by a sequence counter: the renderer makes
/// it odd while it applies a drain and even again once done, so readers
/// never combine values from two different drains. The renderer never waits.
#[derive(Debug)]
pub struct SharedState {
    /// Current (bank index, preset index), packed as `bank << 32 | preset`.
    selection: AtomicU64,
    /// Output gain as `f32` bits.
    gain: AtomicU32,
    /// Sequence counter, odd while a drain is being applied.
    sequence: AtomicU64,
    /// Voices sounding at the end of the last quantum.
    active_voices: AtomicUsize,
    /// Total commands the renderer has applied.
    applied: AtomicU64,
}

impl SharedState {
    pub fn new(selection: Option<(usize, usize)>, gain: f32) -> Self {
        Self {
            selection: AtomicU64::new(pack(selection)),
            gain: AtomicU32::new(gain.to_bits()),
            sequence: AtomicU64::new(0),
            active_voices: AtomicUsize::new(0),
            applied: AtomicU64::new(0),
        }
    }

    /// Consistent read of selection and gain.
    pub fn read(&self) -> RenderState {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before % 2 == 0 {
                let selection = unpack(self.selection.load(Ordering::Acquire));
                let gain = f32::from_bits(self.gain.load(Ordering::Acquire));
                fence(Ordering::Acquire);
                if self.sequence.load(Ordering::Relaxed) == before {
                    return RenderState {
                        version: before / 2,
                        selection,
                        gain,
                    };
                }
            }
            hint::spin_loop();
        }
    }

    /// Marks the start of a drain. Must be paired with [`Self::end_drain`].
    pub fn begin_drain(&self) {
        self.sequence.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    pub fn end_drain(&self) {
        self.sequence.fetch_add(1, Ordering::Release);
    }

    pub fn set_selection(&self, selection: Option<(usize, usize)>) {
        self.selection.store(pack(selection), Ordering::Release);
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Release);
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Acquire)
    }

    pub fn set_active_voices(&self, count: usize) {
        self.active_voices.store(count, Ordering::Release);
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }

    pub fn add_applied(&self, count: u64) {
        self.applied.fetch_add(count, Ordering::AcqRel);
    }
}

fn pack(selection: Option<(usize, usize)>) -> u64 {
    match selection {
        Some((bank, preset)) => ((bank as u64) << 32) | (preset as u64 & 0xFFFF_FFFF),
        None => NO_SELECTION,
    }
}

fn unpack(packed: u64) -> Option<(usize, usize)> {
    (packed != NO_SELECTION).then(|| ((packed >> 32) as usize, (packed & 0xFFFF_FFFF) as usize))
}
