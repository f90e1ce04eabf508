//! Per-file, conflict-aware set of byte-span replacements.
//!
//! Every pass appends to one [`ReplacementSet`] per file. Replacements are
//! always expressed against the original text; a new replacement that collides
//! with accepted ones is shifted through them and merged, so insertions at the
//! same original offset compose in arrival order. A replacement whose shifted
//! span no longer has its original length is a genuine conflict.
//!
//! Adding is two-phase: [`ReplacementSet::plan`] computes a [`Staged`] edit
//! without mutating anything, and [`ReplacementSet::commit`] applies it.

use crate::edit::{apply_replacements, EditError, Replacement};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error(
        "replacement at {offset} (length {length}) shifts to length {shifted_length}; edits overlap irreconcilably"
    )]
    Irreconcilable {
        offset: usize,
        length: usize,
        shifted_length: usize,
    },

    #[error("replacement [{offset}, {end}) exceeds source length {source_len}")]
    OutOfBounds {
        offset: usize,
        end: usize,
        source_len: usize,
    },

    #[error("replacement boundary at byte {offset} splits a UTF-8 character")]
    CharBoundary { offset: usize },

    #[error("staged replacement was planned against an older state of the set")]
    StalePlan,
}

/// A replacement ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staged {
    /// Overlaps nothing; goes in at `index`.
    Direct {
        index: usize,
        replacement: Replacement,
        generation: u64,
    },
    /// Collided with `group`; those entries are replaced by `combined`.
    Merged {
        group: Range<usize>,
        combined: Replacement,
        generation: u64,
    },
}

impl Staged {
    fn generation(&self) -> u64 {
        match self {
            Staged::Direct { generation, .. } | Staged::Merged { generation, .. } => *generation,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, Staged::Merged { .. })
    }
}

/// Ordered, non-overlapping replacements over one original text.
#[derive(Debug, Clone, Default)]
pub struct ReplacementSet {
    entries: Vec<Replacement>,
    generation: u64,
}

impl ReplacementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Replacement] {
        &self.entries
    }

    /// Plan and commit in one step.
    pub fn add(&mut self, original: &str, replacement: Replacement) -> Result<(), ConflictError> {
        let staged = self.plan(original, replacement)?;
        self.commit(staged)
    }

    /// Compute where `replacement` goes without modifying the set.
    pub fn plan(&self, original: &str, replacement: Replacement) -> Result<Staged, ConflictError> {
        check_bounds(original, replacement.offset, replacement.end())?;

        if !self.collides(&replacement) {
            let key = sort_key(&replacement);
            let index = self.entries.partition_point(|e| sort_key(e) < key);
            return Ok(Staged::Direct {
                index,
                replacement,
                generation: self.generation,
            });
        }

        let start = self.shifted_position(replacement.offset);
        let end = self.shifted_position(replacement.end());
        let shifted_length = end.saturating_sub(start);
        if shifted_length != replacement.length {
            return Err(ConflictError::Irreconcilable {
                offset: replacement.offset,
                length: replacement.length,
                shifted_length,
            });
        }

        self.merge_at(original, start, &replacement)
    }

    /// Apply a staged replacement. Fails if the set changed since planning.
    pub fn commit(&mut self, staged: Staged) -> Result<(), ConflictError> {
        if staged.generation() != self.generation {
            return Err(ConflictError::StalePlan);
        }
        match staged {
            Staged::Direct {
                index, replacement, ..
            } => self.entries.insert(index, replacement),
            Staged::Merged {
                group, combined, ..
            } => {
                self.entries.splice(group, std::iter::once(combined));
            }
        }
        self.generation += 1;
        Ok(())
    }

    /// Whether any accepted replacement touching `range` inserts text
    /// containing `needle`.
    pub fn inserted_within(&self, range: Range<usize>, needle: &str) -> bool {
        self.entries.iter().any(|e| {
            e.offset <= range.end && e.end() >= range.start && e.text.contains(needle)
        })
    }

    /// Rewrite `original` with every accepted replacement.
    pub fn apply(&self, original: &str) -> Result<String, EditError> {
        apply_replacements(original, &self.entries)
    }

    fn collides(&self, r: &Replacement) -> bool {
        let first = self.entries.partition_point(|e| e.end() < r.offset);
        self.entries[first..]
            .iter()
            .take_while(|e| e.offset <= r.end())
            .any(|e| overlaps(e, r))
    }

    /// Position of original offset `position` in the rewritten text.
    ///
    /// An offset inside a replaced range maps to the last byte of that
    /// range's new text, so a span straddling an accepted edit comes out with
    /// a different length.
    fn shifted_position(&self, position: usize) -> usize {
        let mut position = position;
        let mut delta: isize = 0;
        for e in &self.entries {
            if e.end() <= position {
                delta += e.delta();
                continue;
            }
            if e.offset < position && e.offset + e.text.len() <= position {
                position = e.offset + e.text.len();
                if !e.text.is_empty() {
                    position -= 1;
                }
            }
            break;
        }
        (position as isize + delta) as usize
    }

    /// Splice `r` into the rewritten text at `start` and fold every accepted
    /// entry it touches into one combined replacement.
    fn merge_at(&self, original: &str, start: usize, r: &Replacement) -> Result<Staged, ConflictError> {
        let end = start + r.length;

        // Rewritten span of every entry, in order
        let mut spans = Vec::with_capacity(self.entries.len());
        let mut delta: isize = 0;
        for e in &self.entries {
            let s = (e.offset as isize + delta) as usize;
            spans.push(s..s + e.text.len());
            delta += e.delta();
        }

        let first = spans.partition_point(|span| span.end < start);
        let last = first + spans[first..].iter().take_while(|span| span.start <= end).count();
        let group = first..last;

        let (region_start, orig_start, orig_end, region_text) = if group.is_empty() {
            let before: isize = self.entries[..first].iter().map(Replacement::delta).sum();
            let orig_start = (start as isize - before) as usize;
            let orig_end = orig_start + r.length;
            (start, orig_start, orig_end, original[orig_start..orig_end].to_string())
        } else {
            let head = &self.entries[first];
            let tail = &self.entries[last - 1];
            let region_start = start.min(spans[first].start);
            let region_end = end.max(spans[last - 1].end);
            let orig_start = head.offset - (spans[first].start - region_start);
            let orig_end = tail.end() + (region_end - spans[last - 1].end);
            check_bounds(original, orig_start, orig_end)?;

            let mut text = String::with_capacity(region_end - region_start);
            let mut cursor = orig_start;
            for e in &self.entries[group.clone()] {
                text.push_str(&original[cursor..e.offset]);
                text.push_str(&e.text);
                cursor = e.end();
            }
            text.push_str(&original[cursor..orig_end]);
            (region_start, orig_start, orig_end, text)
        };

        let local = start - region_start;
        if !region_text.is_char_boundary(local) || !region_text.is_char_boundary(local + r.length) {
            return Err(ConflictError::CharBoundary { offset: r.offset });
        }

        let mut combined = String::with_capacity(region_text.len() + r.text.len());
        combined.push_str(&region_text[..local]);
        combined.push_str(&r.text);
        combined.push_str(&region_text[local + r.length..]);

        Ok(Staged::Merged {
            group,
            combined: Replacement::new(orig_start, orig_end - orig_start, combined),
            generation: self.generation,
        })
    }
}

fn sort_key(r: &Replacement) -> (usize, bool) {
    (r.offset, !r.is_insertion())
}

fn overlaps(a: &Replacement, b: &Replacement) -> bool {
    match (a.is_insertion(), b.is_insertion()) {
        (true, true) => a.offset == b.offset,
        (true, false) => b.offset < a.offset && a.offset < b.end(),
        (false, true) => a.offset < b.offset && b.offset < a.end(),
        (false, false) => a.offset < b.end() && b.offset < a.end(),
    }
}

fn check_bounds(original: &str, offset: usize, end: usize) -> Result<(), ConflictError> {
    if offset > end || end > original.len() {
        return Err(ConflictError::OutOfBounds {
            offset,
            end,
            source_len: original.len(),
        });
    }
    if !original.is_char_boundary(offset) {
        return Err(ConflictError::CharBoundary { offset });
    }
    if !original.is_char_boundary(end) {
        return Err(ConflictError::CharBoundary { offset: end });
    }
    Ok(())
}
