//! Structural checks on raw SoundFont bytes.
//!
//! The SoundFont parser trusts the chunk sizes and the record indices in the
//! `pdta` list and slices with them directly. Everything it would index with
//! is checked here first, so corrupted uploads come back as
//! [`DecodeError::Malformed`] instead of reaching an out-of-range slice.

use crate::error::DecodeError;

/// Generator operator selecting a preset zone's instrument.
pub(super) const GEN_INSTRUMENT: u16 = 41;

/// Generator operator selecting an instrument zone's sample.
pub(super) const GEN_SAMPLE_ID: u16 = 53;

const CHUNK_HEADER: usize = 8;

// Record sizes of the pdta sub-chunks.
const PHDR_RECORD: usize = 38;
const INST_RECORD: usize = 22;
const BAG_RECORD: usize = 4;
const GEN_RECORD: usize = 4;
const SHDR_RECORD: usize = 46;

// Offsets of the bag index inside preset and instrument headers.
const PHDR_BAG_OFFSET: usize = 24;
const INST_BAG_OFFSET: usize = 20;

#[derive(Debug, Clone, Copy)]
struct Chunk<'a> {
    id: [u8; 4],
    data: &'a [u8],
}

/// Fixed-size records of one pdta sub-chunk. The last record is the terminal.
#[derive(Debug, Clone, Copy)]
struct Records<'a> {
    name: &'static str,
    data: &'a [u8],
    size: usize,
}

impl Records<'_> {
    fn len(&self) -> usize {
        self.data.len() / self.size
    }

    fn u16_at(&self, record: usize, offset: usize) -> u16 {
        let at = record * self.size + offset;
        u16::from_le_bytes([self.data[at], self.data[at + 1]])
    }
}

/// Verifies the RIFF layout and the pdta index tables of a SoundFont.
///
/// # Errors
///
/// Returns `DecodeError::Malformed` naming the first inconsistency found.
pub(super) fn check_structure(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"sfbk" {
        return Err(malformed("not a RIFF sfbk file"));
    }
    let riff_end = CHUNK_HEADER + read_u32(bytes, 4) as usize;
    if riff_end > bytes.len() {
        return Err(malformed("RIFF chunk is truncated"));
    }

    let mut pdta = None;
    for chunk in chunks(&bytes[12..riff_end])? {
        if chunk.id != *b"LIST" {
            continue;
        }
        if chunk.data.len() < 4 {
            return Err(malformed("LIST chunk without a type"));
        }
        let children = chunks(&chunk.data[4..])?;
        if &chunk.data[..4] == b"pdta" {
            pdta = Some(children);
        }
    }

    let pdta = pdta.ok_or_else(|| malformed("missing pdta list"))?;
    check_hydra(&pdta)
}

fn check_hydra(chunks: &[Chunk]) -> Result<(), DecodeError> {
    let phdr = records(chunks, "phdr", PHDR_RECORD)?;
    let pbag = records(chunks, "pbag", BAG_RECORD)?;
    let pgen = records(chunks, "pgen", GEN_RECORD)?;
    let inst = records(chunks, "inst", INST_RECORD)?;
    let ibag = records(chunks, "ibag", BAG_RECORD)?;
    let igen = records(chunks, "igen", GEN_RECORD)?;
    let shdr = records(chunks, "shdr", SHDR_RECORD)?;

    // Every preset and instrument owns at least one zone.
    check_indices(&phdr, PHDR_BAG_OFFSET, &pbag, true)?;
    check_indices(&inst, INST_BAG_OFFSET, &ibag, true)?;
    // Zones may have no generators.
    check_indices(&pbag, 0, &pgen, false)?;
    check_indices(&ibag, 0, &igen, false)?;

    check_targets(&pgen, GEN_INSTRUMENT, &inst)?;
    check_targets(&igen, GEN_SAMPLE_ID, &shdr)?;
    Ok(())
}

/// Splits `data` into consecutive chunks, each within bounds.
fn chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>, DecodeError> {
    let mut found = Vec::new();
    let mut pos = 0;
    while pos + CHUNK_HEADER <= data.len() {
        let mut id = [0u8; 4];
        id.copy_from_slice(&data[pos..pos + 4]);
        let size = read_u32(data, pos + 4) as usize;
        let start = pos + CHUNK_HEADER;
        let end = start
            .checked_add(size)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                malformed(format!(
                    "chunk '{}' overruns its parent",
                    String::from_utf8_lossy(&id)
                ))
            })?;
        found.push(Chunk {
            id,
            data: &data[start..end],
        });
        pos = end + size % 2;
    }
    Ok(found)
}

fn records<'a>(
    chunks: &[Chunk<'a>],
    name: &'static str,
    size: usize,
) -> Result<Records<'a>, DecodeError> {
    let chunk = chunks
        .iter()
        .find(|c| c.id == name.as_bytes())
        .ok_or_else(|| malformed(format!("missing {} chunk", name)))?;
    if chunk.data.is_empty() || chunk.data.len() % size != 0 {
        return Err(malformed(format!(
            "{} chunk has size {}, expected a non-zero multiple of {}",
            name,
            chunk.data.len(),
            size
        )));
    }
    Ok(Records {
        name,
        data: chunk.data,
        size,
    })
}

/// Checks the start indices `owner` keeps into `target`.
///
/// Indices must not decrease (or must strictly increase when `strict`), and
/// the terminal owner record may point at most at the terminal target record.
fn check_indices(
    owner: &Records,
    offset: usize,
    target: &Records,
    strict: bool,
) -> Result<(), DecodeError> {
    let last = target.len() - 1;
    let mut previous = None;
    for record in 0..owner.len() {
        let index = owner.u16_at(record, offset) as usize;
        let in_order = match previous {
            Some(prev) if strict => index > prev,
            Some(prev) => index >= prev,
            None => true,
        };
        if !in_order || index > last {
            return Err(malformed(format!(
                "{} record {} points at {} entry {} of {}",
                owner.name,
                record,
                target.name,
                index,
                target.len()
            )));
        }
        previous = Some(index);
    }
    Ok(())
}

/// Checks that every `operator` generator names an existing `target` record.
fn check_targets(generators: &Records, operator: u16, target: &Records) -> Result<(), DecodeError> {
    // Terminal records are not addressable.
    let available = target.len() - 1;
    for record in 0..generators.len() - 1 {
        if generators.u16_at(record, 0) != operator {
            continue;
        }
        let index = generators.u16_at(record, 2) as usize;
        if index >= available {
            return Err(malformed(format!(
                "{} record {} references {} entry {} of {}",
                generators.name, record, target.name, index, available
            )));
        }
    }
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn malformed(message: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(message.into())
}
