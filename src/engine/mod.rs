//! The synthesis engine, split into a control half and a render half.
//!
//! [`SynthesisCore`] lives in the control context. It owns the bank store,
//! validates every operation and sends the resulting state changes over a
//! single-producer/single-consumer queue. [`Renderer`] lives in the render
//! context, owns the voices and applies queued commands at the start of each
//! quantum. Nothing mutable is shared between the two except atomics.
//!
//! # Example
//!
//! ```
//! use sfplayer::{EngineConfig, SynthesisCore};
//!
//! let (mut core, mut renderer) = SynthesisCore::new(&EngineConfig::default()).unwrap();
//! core.note_on(69, 100);
//!
//! let mut left = vec![0.0; 128];
//! let mut right = vec![0.0; 128];
//! renderer.render(&mut left, &mut right);
//! assert!(left.iter().any(|s| *s != 0.0));
//! ```

mod command;
mod render;
mod shared;
mod snapshot;

pub use command::{Command, Selection};
pub use render::Renderer;
pub use snapshot::{EngineStateSnapshot, StateReader};
use snapshot::Publication;

use crate::bank::{builtin, BankStore, BankSummary, PresetRef};
use crate::config::EngineConfig;
use crate::error::{EngineError, InitError};
use crate::voice::VoiceEngine;
use arc_swap::ArcSwap;
use rtrb::{Producer, PushError, RingBuffer};
use shared::SharedState;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Id of the bank loaded at construction.
pub const DEFAULT_BANK_ID: &str = "default";

/// Control half of the engine.
///
/// Every operation validates before it queues anything, so a failed call
/// leaves both halves unchanged.
pub struct SynthesisCore {
    store: BankStore,
    commands: Producer<Command>,
    shared: Arc<SharedState>,
    published: Arc<ArcSwap<Publication>>,
    sample_rate: u32,
    capacity: usize,
    sent: u64,
}

impl SynthesisCore {
    /// Builds a ready engine: the default bank is loaded and its first preset
    /// selected.
    ///
    /// # Errors
    ///
    /// Returns `InitError` if the configuration is invalid or the default
    /// bank cannot be read or decoded.
    pub fn new(config: &EngineConfig) -> Result<(Self, Renderer), InitError> {
        config.validate()?;

        let default_bytes = match &config.default_soundfont {
            Some(path) => fs::read(path).map_err(|source| InitError::DefaultBankIo {
                path: path.clone(),
                source,
            })?,
            None => builtin::sine_soundfont(),
        };

        let mut store = BankStore::new();
        store.add_bank(DEFAULT_BANK_ID, &default_bytes)?;
        let initial = store.preset_at(0, 0);

        let mut voices = VoiceEngine::new(
            config.sample_rate as f32,
            config.max_voices,
            config.default_gain,
        );
        voices.set_preset(initial.as_ref().map(|r| Arc::clone(&r.preset)));

        let selection = initial.as_ref().map(|r| (r.bank_index, r.preset_index));
        let shared = Arc::new(SharedState::new(selection, voices.gain()));
        let (producer, consumer) = RingBuffer::<Command>::new(config.command_capacity);

        let renderer = Renderer::new(
            voices,
            consumer,
            Arc::clone(&shared),
            config.sample_rate,
        );

        let initial_snapshot = EngineStateSnapshot::build(
            store.list_banks(),
            &shared.read(),
            0,
            config.sample_rate,
        );
        let published = Publication::new(shared.read().version, Arc::new(initial_snapshot));
        let core = Self {
            store,
            commands: producer,
            shared,
            published: Arc::new(ArcSwap::from_pointee(published)),
            sample_rate: config.sample_rate,
            capacity: config.command_capacity,
            sent: 0,
        };
        core.snapshot_state();

        info!(
            sample_rate = config.sample_rate,
            max_voices = config.max_voices,
            preset = initial.as_ref().map(|r| r.preset.name()).unwrap_or("none"),
            "Synthesis engine ready"
        );
        Ok((core, renderer))
    }

    /// Decodes and registers a bank. The current selection is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Decode` if the bytes are not a usable SoundFont.
    pub fn load_bank(&mut self, name: &str, bytes: &[u8]) -> Result<BankSummary, EngineError> {
        let summary = self.store.add_bank(name, bytes)?;
        self.snapshot_state();
        Ok(summary)
    }

    /// Selects a preset by bank id and preset id.
    ///
    /// Voices already sounding keep playing their old preset through release.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if either id is unknown, or
    /// `EngineError::QueueFull` if the renderer is not draining commands.
    pub fn select_preset(&mut self, bank_id: &str, preset_id: &str) -> Result<(), EngineError> {
        let found = self.store.resolve_preset(bank_id, preset_id)?;
        self.select(found)
    }

    /// Selects a preset by bank id and MIDI bank/program numbers.
    ///
    /// # Errors
    ///
    /// Same as [`SynthesisCore::select_preset`].
    pub fn select_preset_by_numbers(
        &mut self,
        bank_id: &str,
        bank: u16,
        program: u8,
    ) -> Result<(), EngineError> {
        let found = self.store.resolve_preset_by_numbers(bank_id, bank, program)?;
        self.select(found)
    }

    /// Queues a note-on. Dropped with a warning if the queue is full.
    pub fn note_on(&mut self, key: u8, velocity: u8) {
        self.send_note(Command::NoteOn { key, velocity });
    }

    /// Queues a note-off. Dropped with a warning if the queue is full.
    pub fn note_off(&mut self, key: u8) {
        self.send_note(Command::NoteOff { key });
    }

    /// Queues a release of every sounding voice.
    pub fn all_notes_off(&mut self) {
        self.send_note(Command::AllNotesOff);
    }

    /// Queues a gain change. Negative or non-finite values become 0.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::QueueFull` if the renderer is not draining commands.
    pub fn set_gain(&mut self, gain: f32) -> Result<(), EngineError> {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.send(Command::SetGain(gain))
    }

    /// Builds and publishes a snapshot of the current state.
    pub fn snapshot_state(&self) -> Arc<EngineStateSnapshot> {
        let render = self.shared.read();
        let snapshot = Arc::new(EngineStateSnapshot::build(
            self.store.list_banks(),
            &render,
            self.shared.active_voices(),
            self.sample_rate,
        ));
        self.published
            .store(Arc::new(Publication::new(render.version, Arc::clone(&snapshot))));
        snapshot
    }

    /// Read handle for other control threads.
    pub fn state_reader(&self) -> StateReader {
        StateReader::new(Arc::clone(&self.published), Arc::clone(&self.shared))
    }

    /// Summaries of all loaded banks in insertion order.
    pub fn list_banks(&self) -> Vec<BankSummary> {
        self.store.list_banks()
    }

    /// Commands queued but not yet applied by the renderer.
    pub fn pending_commands(&self) -> u64 {
        self.sent.saturating_sub(self.shared.applied())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn select(&mut self, found: PresetRef) -> Result<(), EngineError> {
        debug!(
            bank = found.preset.bank_id(),
            preset = found.preset.name(),
            "Selecting preset"
        );
        self.send(Command::SelectPreset(Selection {
            bank_index: found.bank_index,
            preset_index: found.preset_index,
            preset: found.preset,
        }))
    }

    fn send_note(&mut self, command: Command) {
        if let Err(err) = self.send(command) {
            warn!("Dropped note command: {}", err);
        }
    }

    fn send(&mut self, command: Command) -> Result<(), EngineError> {
        match self.commands.push(command) {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(PushError::Full(_)) => Err(EngineError::QueueFull(self.capacity)),
        }
    }
}
