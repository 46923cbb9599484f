//! Append-only registry of loaded banks.
//!
//! The store lives in the control context. Banks are never removed, so any
//! `Arc<Preset>` handed to the render context stays alive for as long as the
//! store does.

use super::{Bank, BankSummary, Preset};
use crate::error::{DecodeError, NotFoundError};
use std::sync::Arc;
use tracing::info;

/// Id given to banks loaded with an empty name hint.
const UNTITLED_BANK: &str = "untitled";

/// A resolved preset together with its position in the store.
#[derive(Debug, Clone)]
pub struct PresetRef {
    /// Index of the owning bank in insertion order.
    pub bank_index: usize,
    /// Index of the preset within its bank.
    pub preset_index: usize,
    /// The preset itself.
    pub preset: Arc<Preset>,
}

/// Owns every loaded bank, in insertion order.
#[derive(Debug, Default)]
pub struct BankStore {
    banks: Vec<Arc<Bank>>,
}

impl BankStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self { banks: Vec::new() }
    }

    /// Decodes and registers a bank.
    ///
    /// The final id equals `id_hint` unless that id is taken, in which case
    /// the first free of `"<hint> (2)"`, `"<hint> (3)"`, ... is used.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the bytes cannot be decoded. The store is
    /// unchanged in that case.
    pub fn add_bank(&mut self, id_hint: &str, data: &[u8]) -> Result<BankSummary, DecodeError> {
        let id = self.unique_id(id_hint);
        let bank = Bank::decode(&id, data)?;
        let summary = bank.summary();

        info!(
            bank = %id,
            presets = summary.presets.len(),
            "Loaded soundfont bank"
        );
        self.banks.push(Arc::new(bank));
        Ok(summary)
    }

    /// Summaries of all banks in insertion order.
    pub fn list_banks(&self) -> Vec<BankSummary> {
        self.banks.iter().map(|b| b.summary()).collect()
    }

    /// Number of loaded banks.
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Returns true if no bank has been loaded.
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Returns the bank at `index` (insertion order).
    pub fn bank_at(&self, index: usize) -> Option<&Arc<Bank>> {
        self.banks.get(index)
    }

    /// Resolves a preset by bank id and preset id.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` if either id is unknown.
    pub fn resolve_preset(
        &self,
        bank_id: &str,
        preset_id: &str,
    ) -> Result<PresetRef, NotFoundError> {
        let (bank_index, bank) = self.find_bank(bank_id)?;
        let (preset_index, preset) = bank
            .find_preset(preset_id)
            .ok_or_else(|| NotFoundError::Preset {
                bank_id: bank_id.to_string(),
                preset_id: preset_id.to_string(),
            })?;
        Ok(PresetRef {
            bank_index,
            preset_index,
            preset: Arc::clone(preset),
        })
    }

    /// Resolves a preset by bank id and MIDI bank/program numbers.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` if the bank is unknown or has no preset at
    /// those numbers.
    pub fn resolve_preset_by_numbers(
        &self,
        bank_id: &str,
        bank: u16,
        program: u8,
    ) -> Result<PresetRef, NotFoundError> {
        let (bank_index, found) = self.find_bank(bank_id)?;
        let (preset_index, preset) = found
            .find_by_numbers(bank, program)
            .ok_or_else(|| NotFoundError::PresetNumbers {
                bank_id: bank_id.to_string(),
                bank,
                program,
            })?;
        Ok(PresetRef {
            bank_index,
            preset_index,
            preset: Arc::clone(preset),
        })
    }

    /// Resolves a preset by store position.
    pub fn preset_at(&self, bank_index: usize, preset_index: usize) -> Option<PresetRef> {
        let preset = self.banks.get(bank_index)?.presets().get(preset_index)?;
        Some(PresetRef {
            bank_index,
            preset_index,
            preset: Arc::clone(preset),
        })
    }

    fn find_bank(&self, bank_id: &str) -> Result<(usize, &Arc<Bank>), NotFoundError> {
        self.banks
            .iter()
            .enumerate()
            .find(|(_, b)| b.id() == bank_id)
            .ok_or_else(|| NotFoundError::Bank(bank_id.to_string()))
    }

    fn contains_id(&self, id: &str) -> bool {
        self.banks.iter().any(|b| b.id() == id)
    }

    fn unique_id(&self, hint: &str) -> String {
        let base = match hint.trim() {
            "" => UNTITLED_BANK,
            trimmed => trimmed,
        };
        if !self.contains_id(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| !self.contains_id(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}
