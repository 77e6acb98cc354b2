//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mhstore.
//
// Mhstore is free software: you can  redistribute it and/or modify it under
// the terms of  the GNU General Public  License as published by  the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mhstore is distributed  in the hope that  it will be useful,  but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Mhstore. If not, see <http://www.gnu.org/licenses/>.

//! Named sequences: arbitrary subsets of a folder's messages.
//!
//! A sequence stores its members as a plain ordered set; the range syntax is
//! only the storage and display form (see `model::RangeSet`). Members are
//! allowed to refer to messages not currently present in the folder —
//! callers may pre-declare future messages, and deletions leave stale
//! members behind — but such members are pruned at save time unless the
//! sequence is marked to preserve them.
//!
//! This layer stores and retrieves sequences by exact name only. Resolving
//! a command-line token into "number, range, or sequence name" is the
//! command grammar's job, not ours.

use std::collections::{BTreeMap, BTreeSet};

use crate::folder::model::MessageNumber;
use crate::support::error::Error;
use crate::support::sequence_name::check_name;

/// A named subset of a folder's message numbers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sequence {
    members: BTreeSet<MessageNumber>,
    /// Whether this sequence is written to the sequence file. A private
    /// (session-only) sequence never touches disk.
    persisted: bool,
    /// Keep members referring to absent messages across saves instead of
    /// pruning them.
    preserve_absent: bool,
    /// Write this sequence even when it has no members. Used for
    /// bookkeeping sequences that must survive across sessions.
    keep_if_empty: bool,
}

impl Sequence {
    pub fn new(persisted: bool) -> Self {
        Sequence {
            persisted,
            ..Sequence::default()
        }
    }

    pub fn members(&self) -> &BTreeSet<MessageNumber> {
        &self.members
    }

    pub fn contains(&self, n: MessageNumber) -> bool {
        self.members.contains(&n)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn set_persisted(&mut self, persisted: bool) {
        self.persisted = persisted;
    }

    pub fn preserves_absent(&self) -> bool {
        self.preserve_absent
    }

    pub fn set_preserve_absent(&mut self, preserve: bool) {
        self.preserve_absent = preserve;
    }

    pub fn keeps_if_empty(&self) -> bool {
        self.keep_if_empty
    }

    pub fn set_keep_if_empty(&mut self, keep: bool) {
        self.keep_if_empty = keep;
    }

    pub(crate) fn extend(
        &mut self,
        numbers: impl IntoIterator<Item = MessageNumber>,
    ) {
        self.members.extend(numbers);
    }

    pub(crate) fn retract(
        &mut self,
        numbers: impl IntoIterator<Item = MessageNumber>,
    ) {
        for n in numbers {
            self.members.remove(&n);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }
}

/// All the sequences of one folder, keyed by name.
///
/// Owned exclusively by that folder's `FolderIndex`; two folders never share
/// sequence state.
#[derive(Clone, Debug, Default)]
pub struct SequenceSet {
    sequences: BTreeMap<String, Sequence>,
}

impl SequenceSet {
    pub fn new() -> Self {
        SequenceSet::default()
    }

    /// Create an empty sequence under `name` if none exists.
    ///
    /// Defining an already-defined sequence is a no-op; in particular it
    /// does not change the existing sequence's persistence.
    pub fn define(&mut self, name: &str, persisted: bool) -> Result<(), Error> {
        check_name(name)?;
        self.sequences
            .entry(name.to_owned())
            .or_insert_with(|| Sequence::new(persisted));
        Ok(())
    }

    /// Add `numbers` to the sequence named `name`, creating it (persisted)
    /// on first reference.
    ///
    /// The numbers need not exist in the owning folder; absent members are
    /// tolerated in memory and dealt with at save time.
    pub fn add(
        &mut self,
        name: &str,
        numbers: impl IntoIterator<Item = MessageNumber>,
    ) -> Result<(), Error> {
        check_name(name)?;
        self.sequences
            .entry(name.to_owned())
            .or_insert_with(|| Sequence::new(true))
            .extend(numbers);
        Ok(())
    }

    /// Remove `numbers` from the sequence named `name`.
    ///
    /// Removing from an undefined sequence, or removing numbers that were
    /// not members, is a no-op.
    pub fn remove(
        &mut self,
        name: &str,
        numbers: impl IntoIterator<Item = MessageNumber>,
    ) {
        if let Some(seq) = self.sequences.get_mut(name) {
            seq.retract(numbers);
        }
    }

    /// Empty the sequence named `name` without deleting it.
    pub fn clear(&mut self, name: &str) {
        if let Some(seq) = self.sequences.get_mut(name) {
            seq.clear();
        }
    }

    /// Materialise the members of `name` in ascending order.
    ///
    /// An undefined name is an empty set, not an error; querying sequences
    /// that may not exist is routine throughout the suite.
    pub fn members(&self, name: &str) -> BTreeSet<MessageNumber> {
        self.sequences
            .get(name)
            .map(|seq| seq.members.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str, n: MessageNumber) -> bool {
        self.sequences
            .get(name)
            .map(|seq| seq.contains(n))
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Sequence> {
        self.sequences.get_mut(name)
    }

    /// Rename the sequence `old` to `new`.
    ///
    /// Unlike `delete`, renaming something that doesn't exist is an error,
    /// as is renaming onto a name already in use.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), Error> {
        check_name(new)?;
        if self.sequences.contains_key(new) {
            return Err(Error::SequenceExists(new.to_owned()));
        }

        let seq = self
            .sequences
            .remove(old)
            .ok_or_else(|| Error::NxSequence(old.to_owned()))?;
        self.sequences.insert(new.to_owned(), seq);
        Ok(())
    }

    /// Delete the sequence named `name`. No-op if it doesn't exist.
    pub fn delete(&mut self, name: &str) {
        self.sequences.remove(name);
    }

    /// Iterate over all sequences, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Sequence)> {
        self.sequences.iter().map(|(name, seq)| (name.as_str(), seq))
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Rewrite every member through the old-to-new `mapping` produced by a
    /// folder pack. Members with no entry in the mapping are dropped.
    pub fn remap(&mut self, mapping: &BTreeMap<MessageNumber, MessageNumber>) {
        for seq in self.sequences.values_mut() {
            seq.members = seq
                .members
                .iter()
                .filter_map(|n| mapping.get(n).copied())
                .collect();
        }
    }
}
