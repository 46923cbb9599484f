//! Point-in-time engine state for the control context.

use super::shared::{RenderState, SharedState};
use crate::bank::{BankSummary, PresetInfo};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A serializable copy of engine state.
///
/// The selection, gain and voice count reflect what the renderer had applied
/// when the snapshot was taken. Commands still in the queue are not visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStateSnapshot {
    /// Id of the bank owning the current preset.
    pub current_bank: Option<String>,
    /// The current preset.
    pub current_preset: Option<PresetInfo>,
    /// All banks in insertion order.
    pub banks: Vec<BankSummary>,
    /// Linear output gain.
    pub gain: f32,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Voices sounding at the end of the last rendered quantum.
    pub active_voices: usize,
}

impl EngineStateSnapshot {
    /// Builds a snapshot from the bank catalog and the renderer's state.
    ///
    /// The selection indexes into `banks`, which is in store order.
    pub(crate) fn build(
        banks: Vec<BankSummary>,
        render: &RenderState,
        active_voices: usize,
        sample_rate: u32,
    ) -> Self {
        let current = render.selection.and_then(|(bank, preset)| {
            let summary = banks.get(bank)?;
            Some((summary.id.clone(), summary.presets.get(preset)?.clone()))
        });
        let (current_bank, current_preset) = match current {
            Some((bank, preset)) => (Some(bank), Some(preset)),
            None => (None, None),
        };

        Self {
            current_bank,
            current_preset,
            banks,
            gain: render.gain,
            sample_rate,
            active_voices,
        }
    }
}

/// A snapshot together with the renderer state it was built from.
#[derive(Debug)]
pub(crate) struct Publication {
    version: u64,
    snapshot: Arc<EngineStateSnapshot>,
}

impl Publication {
    pub(crate) fn new(version: u64, snapshot: Arc<EngineStateSnapshot>) -> Self {
        Self { version, snapshot }
    }
}

/// Cloneable read handle to the engine state.
///
/// Reads never block the renderer and never observe a partially built
/// snapshot. When the renderer has applied commands since the last
/// publication, `load` rebuilds the snapshot and publishes it.
#[derive(Debug, Clone)]
pub struct StateReader {
    published: Arc<ArcSwap<Publication>>,
    shared: Arc<SharedState>,
}

impl StateReader {
    pub(crate) fn new(published: Arc<ArcSwap<Publication>>, shared: Arc<SharedState>) -> Self {
        Self { published, shared }
    }

    /// Current snapshot, refreshed from the renderer's state if it has moved on.
    pub fn load(&self) -> Arc<EngineStateSnapshot> {
        let current = self.published.load_full();
        let render = self.shared.read();
        let active_voices = self.shared.active_voices();
        if render.version == current.version && active_voices == current.snapshot.active_voices {
            return Arc::clone(&current.snapshot);
        }

        let snapshot = Arc::new(EngineStateSnapshot::build(
            current.snapshot.banks.clone(),
            &render,
            active_voices,
            current.snapshot.sample_rate,
        ));
        // Leaves a newer publication in place.
        self.published.compare_and_swap(
            &current,
            Arc::new(Publication::new(render.version, Arc::clone(&snapshot))),
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(id: &str, presets: &[&str]) -> BankSummary {
        BankSummary {
            id: id.to_string(),
            presets: presets
                .iter()
                .enumerate()
                .map(|(program, name)| PresetInfo {
                    id: format!("{}:0:{}:{}", id, program, name),
                    soundfont_id: id.to_string(),
                    name: name.to_string(),
                    bank: 0,
                    program: program as u8,
                })
                .collect(),
        }
    }

    fn reader(shared: &Arc<SharedState>, banks: Vec<BankSummary>) -> StateReader {
        let snapshot = EngineStateSnapshot::build(banks, &shared.read(), 0, 48000);
        let published = Arc::new(ArcSwap::from_pointee(Publication::new(
            shared.read().version,
            Arc::new(snapshot),
        )));
        StateReader::new(published, Arc::clone(shared))
    }

    #[test]
    fn test_build_resolves_selection() {
        let render = RenderState {
            version: 0,
            selection: Some((1, 1)),
            gain: 0.5,
        };
        let banks = vec![bank("default", &["Sine"]), bank("gm", &["Piano", "Organ"])];
        let snapshot = EngineStateSnapshot::build(banks, &render, 2, 44100);
        assert_eq!(snapshot.current_bank.as_deref(), Some("gm"));
        assert_eq!(
            snapshot.current_preset.as_ref().map(|p| p.name.as_str()),
            Some("Organ")
        );
        assert_eq!(snapshot.active_voices, 2);
    }

    #[test]
    fn test_build_ignores_stale_selection() {
        let render = RenderState {
            version: 0,
            selection: Some((4, 0)),
            gain: 0.5,
        };
        let banks = vec![bank("default", &["Sine"])];
        let snapshot = EngineStateSnapshot::build(banks, &render, 0, 48000);
        assert_eq!(snapshot.current_bank, None);
        assert_eq!(snapshot.current_preset, None);
    }

    #[test]
    fn test_reader_follows_renderer() {
        let shared = Arc::new(SharedState::new(Some((0, 0)), 0.5));
        let reader = reader(&shared, vec![bank("default", &["Sine"]), bank("gm", &["Piano"])]);
        let before = reader.load();
        assert_eq!(before.current_bank.as_deref(), Some("default"));

        shared.begin_drain();
        shared.set_selection(Some((1, 0)));
        shared.set_gain(0.9);
        shared.end_drain();

        let after = reader.load();
        assert_eq!(after.current_bank.as_deref(), Some("gm"));
        assert_eq!(after.gain, 0.9);
        // Earlier loads keep their own copy.
        assert_eq!(before.gain, 0.5);
        // Unchanged state reuses the published snapshot.
        assert!(Arc::ptr_eq(&after, &reader.load()));
    }

    #[test]
    fn test_serializes_null_selection() {
        let shared = SharedState::new(None, 0.5);
        let snapshot = EngineStateSnapshot::build(Vec::new(), &shared.read(), 0, 48000);
        let json = serde_json::to_value(snapshot).unwrap();
        assert!(json["current_bank"].is_null());
        assert!(json["current_preset"].is_null());
        assert_eq!(json["sample_rate"], 48000);
    }
}
