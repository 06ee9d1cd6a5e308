//! Try blocks and the exception regions derived from them.
//!
//! ## Layout
//!
//! ```text
//! begin_try:      [try body]
//! begin_finally:  [finally body]     ; optional
//! begin_catch:    [catch body]       ; optional
//! end_try:        last protected instruction (inclusive)
//! ```
//!
//! A descriptor is valid when its boundaries appear in that order and
//! `end_try` lies inside the instruction stream. Regions of one descriptor
//! never overlap because each one ends where the next begins.

use kiln_core::{RegionViolation, StructuralError};

/// Handle to a try block within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TryBlockId(pub(crate) usize);

impl TryBlockId {
    /// Index of this block in registration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Which part of a try block a region covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// The protected body.
    Try,
    /// The finally clause.
    Finally,
    /// The catch clause.
    Catch,
}

/// A contiguous, inclusive address range of one try-block part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionRegion {
    /// Owning try block.
    pub block: TryBlockId,
    /// Which part this region is.
    pub kind: RegionKind,
    /// First address (inclusive).
    pub begin: usize,
    /// Last address (inclusive).
    pub end: usize,
}

/// Boundary addresses of one try block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    /// First instruction of the protected body.
    pub begin_try: usize,
    /// First instruction of the finally clause.
    pub begin_finally: Option<usize>,
    /// First instruction of the catch clause.
    pub begin_catch: Option<usize>,
    /// Last protected instruction; `None` while the block is still open.
    pub end_try: Option<usize>,
}

impl TryBlock {
    fn new(begin_try: usize) -> Self {
        Self {
            begin_try,
            begin_finally: None,
            begin_catch: None,
            end_try: None,
        }
    }

    /// Whether `end_try` has been set.
    pub fn is_closed(&self) -> bool {
        self.end_try.is_some()
    }

    /// Present boundaries, in the order they must appear.
    fn boundaries(&self) -> Vec<(&'static str, usize)> {
        let mut out = vec![("begin-try", self.begin_try)];
        if let Some(at) = self.begin_finally {
            out.push(("begin-finally", at));
        }
        if let Some(at) = self.begin_catch {
            out.push(("begin-catch", at));
        }
        if let Some(at) = self.end_try {
            out.push(("end-try", at));
        }
        out
    }

    /// Check the structural invariant against a stream of `len` instructions.
    pub fn validate(&self, len: usize) -> Result<(), RegionViolation> {
        let Some(end) = self.end_try else {
            return Err(RegionViolation::Unterminated);
        };

        let boundaries = self.boundaries();
        for pair in boundaries.windows(2) {
            let (first, first_at) = pair[0];
            let (second, second_at) = pair[1];
            if first_at > second_at {
                return Err(RegionViolation::Misordered {
                    first,
                    first_at,
                    second,
                    second_at,
                });
            }
        }

        if end >= len {
            return Err(RegionViolation::EndOutOfRange { end, len });
        }
        Ok(())
    }

    /// Non-empty regions of this block, in address order.
    pub fn regions(&self, block: TryBlockId) -> Vec<ExceptionRegion> {
        let Some(end) = self.end_try else {
            return Vec::new();
        };
        let after = end + 1;
        let mut regions = Vec::with_capacity(3);
        let mut push = |kind, begin: usize, stop: usize| {
            if begin < stop {
                regions.push(ExceptionRegion {
                    block,
                    kind,
                    begin,
                    end: stop - 1,
                });
            }
        };

        let try_stop = self.begin_finally.or(self.begin_catch).unwrap_or(after);
        push(RegionKind::Try, self.begin_try, try_stop);
        if let Some(begin) = self.begin_finally {
            push(RegionKind::Finally, begin, self.begin_catch.unwrap_or(after));
        }
        if let Some(begin) = self.begin_catch {
            push(RegionKind::Catch, begin, after);
        }
        regions
    }

    /// Move every boundary past `index` down by `count`.
    ///
    /// A boundary that would move below address zero was inside the removed
    /// range and is reported instead.
    fn relocate(&mut self, index: usize, count: usize) -> Result<(), RegionViolation> {
        let shift = |boundary: &'static str, at: &mut usize| -> Result<(), RegionViolation> {
            if *at > index {
                *at = at
                    .checked_sub(count)
                    .ok_or(RegionViolation::BoundaryRemoved { boundary, at: *at })?;
            }
            Ok(())
        };
        shift("begin-try", &mut self.begin_try)?;
        if let Some(at) = self.begin_finally.as_mut() {
            shift("begin-finally", at)?;
        }
        if let Some(at) = self.begin_catch.as_mut() {
            shift("begin-catch", at)?;
        }
        if let Some(at) = self.end_try.as_mut() {
            shift("end-try", at)?;
        }
        Ok(())
    }
}

/// All try blocks of one function, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ExceptionTable {
    blocks: Vec<TryBlock>,
}

impl ExceptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a try block whose body starts at `address`.
    pub fn begin(&mut self, address: usize) -> TryBlockId {
        self.blocks.push(TryBlock::new(address));
        TryBlockId(self.blocks.len() - 1)
    }

    /// Mark where the finally clause of `id` starts.
    pub fn mark_finally(&mut self, id: TryBlockId, address: usize) -> Result<(), StructuralError> {
        let block = self.open_block(id, "finally")?;
        if block.begin_finally.is_some() || block.begin_catch.is_some() {
            return Err(out_of_sequence(id, "finally"));
        }
        block.begin_finally = Some(address);
        Ok(())
    }

    /// Mark where the catch clause of `id` starts.
    pub fn mark_catch(&mut self, id: TryBlockId, address: usize) -> Result<(), StructuralError> {
        let block = self.open_block(id, "catch")?;
        if block.begin_catch.is_some() {
            return Err(out_of_sequence(id, "catch"));
        }
        block.begin_catch = Some(address);
        Ok(())
    }

    /// Close `id` with `address` as its last protected instruction.
    pub fn end(&mut self, id: TryBlockId, address: usize) -> Result<(), StructuralError> {
        let block = self.open_block(id, "end")?;
        block.end_try = Some(address);
        Ok(())
    }

    fn open_block(
        &mut self,
        id: TryBlockId,
        clause: &'static str,
    ) -> Result<&mut TryBlock, StructuralError> {
        let block = self
            .blocks
            .get_mut(id.0)
            .ok_or(StructuralError::InvalidExceptionRegion {
                block: id.0,
                violation: RegionViolation::UnknownBlock,
            })?;
        if block.is_closed() {
            return Err(out_of_sequence(id, clause));
        }
        Ok(block)
    }

    /// Get a try block.
    pub fn get(&self, id: TryBlockId) -> Option<&TryBlock> {
        self.blocks.get(id.0)
    }

    /// All try blocks.
    pub fn blocks(&self) -> &[TryBlock] {
        &self.blocks
    }

    /// Every non-empty region of every block.
    pub fn regions(&self) -> Vec<ExceptionRegion> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(index, block)| block.regions(TryBlockId(index)))
            .collect()
    }

    /// Validate every block against a stream of `len` instructions.
    pub fn validate(&self, len: usize) -> Result<(), StructuralError> {
        for (index, block) in self.blocks.iter().enumerate() {
            block
                .validate(len)
                .map_err(|violation| StructuralError::InvalidExceptionRegion {
                    block: index,
                    violation,
                })?;
        }
        Ok(())
    }

    /// Shift boundaries after a removal and re-validate every closed block.
    ///
    /// Blocks that are still open are shifted but not validated.
    pub(crate) fn relocate(
        &mut self,
        index: usize,
        count: usize,
        len: usize,
    ) -> Result<(), StructuralError> {
        for (position, block) in self.blocks.iter_mut().enumerate() {
            let moved = block.relocate(index, count).and_then(|()| {
                if block.is_closed() {
                    block.validate(len)
                } else {
                    Ok(())
                }
            });
            moved.map_err(|violation| StructuralError::InvalidExceptionRegion {
                block: position,
                violation,
            })?;
        }
        Ok(())
    }

    /// Number of try blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if there are no try blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Consume the table, returning the blocks.
    pub fn into_blocks(self) -> Vec<TryBlock> {
        self.blocks
    }
}

fn out_of_sequence(id: TryBlockId, clause: &'static str) -> StructuralError {
    StructuralError::InvalidExceptionRegion {
        block: id.0,
        violation: RegionViolation::OutOfSequence { clause },
    }
}
