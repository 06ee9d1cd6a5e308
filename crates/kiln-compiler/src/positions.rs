//! Source positions for emitted instructions.
//!
//! While a function is being generated, [`PositionTable`] keeps one optional
//! position per instruction, parallel to the instruction stream, and drops
//! entries together with the instructions the relocation engine removes.
//!
//! When the function is finished the table is compacted into
//! [`PersistedPositions`]: an ordered list of `(address, span, file)`
//! entries, written only where the position changes. An entry without a span
//! starts a run of instructions that have no position. The file used by most
//! instructions is stored once as the default and entries that use it carry
//! no file index.

use kiln_core::{Span, StructuralError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Interned position of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    file: u32,
    span: Span,
}

/// Per-instruction source positions of the function being generated.
#[derive(Debug, Default)]
pub struct PositionTable {
    enabled: bool,
    files: Vec<String>,
    file_ids: FxHashMap<String, u32>,
    current: Option<Position>,
    entries: Vec<Option<Position>>,
}

impl PositionTable {
    /// Create a table. A disabled table records nothing.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Set the position applied to subsequently emitted instructions.
    pub fn set(&mut self, file: &str, line: u32, col: u32) {
        let file = self.intern(file);
        self.current = Some(Position {
            file,
            span: Span::new(line, col),
        });
    }

    /// Stop attaching positions to emitted instructions.
    pub fn clear(&mut self) {
        self.current = None;
    }

    fn intern(&mut self, file: &str) -> u32 {
        if let Some(&id) = self.file_ids.get(file) {
            return id;
        }
        let id = self.files.len() as u32;
        self.files.push(file.to_string());
        self.file_ids.insert(file.to_string(), id);
        id
    }

    /// Record the current position for a newly emitted instruction.
    pub(crate) fn record(&mut self) {
        let position = if self.enabled { self.current } else { None };
        self.entries.push(position);
    }

    /// Drop the positions of `count` removed instructions at `index`.
    pub(crate) fn remove(&mut self, index: usize, count: usize) {
        let end = (index + count).min(self.entries.len());
        if index < end {
            self.entries.drain(index..end);
        }
    }

    /// Position of the instruction at `address`, if one was recorded.
    pub fn position_at(&self, address: usize) -> Option<(&str, Span)> {
        let position = (*self.entries.get(address)?)?;
        Some((self.files[position.file as usize].as_str(), position.span))
    }

    /// Number of tracked instructions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no instruction is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact the table for persistence.
    pub fn persist(&self) -> PersistedPositions {
        let mut counts = vec![0usize; self.files.len()];
        for position in self.entries.iter().flatten() {
            counts[position.file as usize] += 1;
        }
        // Most used file wins; ties go to the file seen first.
        let default = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(id, _)| id as u32);

        let mut remap = vec![None; self.files.len()];
        let mut files = Vec::new();
        for (id, name) in self.files.iter().enumerate() {
            if Some(id as u32) != default && counts[id] > 0 {
                remap[id] = Some(files.len() as u32);
                files.push(name.clone());
            }
        }

        // Addresses before the first entry have no position, so a leading
        // gap needs no entry of its own.
        let mut entries = Vec::new();
        let mut previous = None;
        for (address, &position) in self.entries.iter().enumerate() {
            if position == previous {
                continue;
            }
            previous = position;
            entries.push(PositionEntry {
                address: address as u32,
                span: position.map(|position| position.span),
                file: position.and_then(|position| remap[position.file as usize]),
            });
        }

        PersistedPositions {
            default_file: default.map(|id| self.files[id as usize].clone()),
            files,
            entries,
        }
    }
}

/// One change of source position, starting at `address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    /// First instruction at this position.
    pub address: u32,
    /// Source location; `None` for instructions without a position.
    pub span: Option<Span>,
    /// Index into [`PersistedPositions::files`]; `None` means the default file.
    pub file: Option<u32>,
}

/// Source-position table as stored in function metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedPositions {
    /// The file most instructions come from.
    pub default_file: Option<String>,
    /// Every other file, indexed by [`PositionEntry::file`].
    pub files: Vec<String>,
    /// Position changes in address order.
    pub entries: Vec<PositionEntry>,
}

impl PersistedPositions {
    /// File name of an entry.
    pub fn file_of(&self, entry: &PositionEntry) -> Option<&str> {
        match entry.file {
            Some(index) => self.files.get(index as usize).map(String::as_str),
            None => self.default_file.as_deref(),
        }
    }

    /// Position in effect at `address`.
    pub fn lookup(&self, address: usize) -> Option<(&str, Span)> {
        let after = self
            .entries
            .partition_point(|entry| entry.address as usize <= address);
        let entry = self.entries.get(after.checked_sub(1)?)?;
        let span = entry.span?;
        Some((self.file_of(entry)?, span))
    }

    /// Serialize for storage in function metadata.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StructuralError> {
        bincode::serialize(self).map_err(|err| StructuralError::Serialization {
            message: err.to_string(),
        })
    }

    /// Read back a table written by [`PersistedPositions::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StructuralError> {
        bincode::deserialize(bytes).map_err(|err| StructuralError::Serialization {
            message: err.to_string(),
        })
    }
}
