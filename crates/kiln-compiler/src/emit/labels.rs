//! Label management for single-pass jump emission.
//!
//! A label is either bound to an address or pending, in which case it keeps
//! the addresses of every jump emitted against it. Binding the label hands
//! those addresses back so the emitter can patch them.

use kiln_core::StructuralError;
use rustc_hash::FxHashMap;

/// State of one label.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LabelState {
    /// Bound to an address.
    Bound(usize),
    /// Referenced by the jumps at these addresses, not yet bound.
    Pending(Vec<usize>),
}

/// Label name to address (or fixup list) table for one function.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: FxHashMap<String, LabelState>,
}

impl LabelTable {
    /// Create an empty label table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference to `name` from the jump at `address`.
    ///
    /// Returns the bound address if the label is already defined; otherwise
    /// the reference is queued and `None` is returned.
    pub fn reference(&mut self, name: &str, address: usize) -> Option<usize> {
        match self.labels.get_mut(name) {
            Some(LabelState::Bound(target)) => Some(*target),
            Some(LabelState::Pending(fixups)) => {
                fixups.push(address);
                None
            }
            None => {
                self.labels
                    .insert(name.to_string(), LabelState::Pending(vec![address]));
                None
            }
        }
    }

    /// Bind `name` to `address`.
    ///
    /// Returns the addresses of the jumps waiting on this label.
    pub fn define(&mut self, name: &str, address: usize) -> Result<Vec<usize>, StructuralError> {
        if let Some(LabelState::Bound(first)) = self.labels.get(name) {
            return Err(StructuralError::DuplicateLabel {
                name: name.to_string(),
                first: *first,
                second: address,
            });
        }

        match self
            .labels
            .insert(name.to_string(), LabelState::Bound(address))
        {
            Some(LabelState::Pending(fixups)) => Ok(fixups),
            _ => Ok(Vec::new()),
        }
    }

    /// The address `name` is bound to, if it is bound.
    pub fn address(&self, name: &str) -> Option<usize> {
        match self.labels.get(name) {
            Some(LabelState::Bound(address)) => Some(*address),
            _ => None,
        }
    }

    /// The earliest pending reference, as `(label, address)`.
    pub fn first_unresolved(&self) -> Option<(&str, usize)> {
        self.labels
            .iter()
            .filter_map(|(name, state)| match state {
                LabelState::Pending(fixups) => fixups
                    .iter()
                    .min()
                    .map(|&address| (name.as_str(), address)),
                LabelState::Bound(_) => None,
            })
            .min_by_key(|&(_, address)| address)
    }

    /// Shift addresses after `count` instructions were removed at `index`.
    ///
    /// Bound addresses past `index` move down like jump targets; a label bound
    /// inside the removed range lands on `index`. Fixups are
    /// instruction addresses: those inside the removed range disappear with
    /// their instructions, the rest move down.
    pub fn relocate(&mut self, index: usize, count: usize) {
        let removed = index..index + count;
        self.labels.retain(|_, state| match state {
            LabelState::Bound(address) => {
                if *address > index {
                    *address = address.saturating_sub(count).max(index);
                }
                true
            }
            LabelState::Pending(fixups) => {
                fixups.retain(|address| !removed.contains(address));
                for address in fixups.iter_mut() {
                    if *address >= removed.end {
                        *address -= count;
                    }
                }
                !fixups.is_empty()
            }
        });
    }

    /// Number of labels (bound or pending).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if no label has been bound or referenced.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
