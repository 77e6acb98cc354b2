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

//! The in-memory index of one folder.
//!
//! A `FolderIndex` is an explicit handle: all per-folder state lives in it
//! and is discarded with it, so one process can hold several folders open
//! without interference. It tracks which message numbers physically exist
//! (as a bitmap), the low/high watermarks of numbers ever assigned, and the
//! designated current message, and it owns the folder's `SequenceSet`.
//!
//! Watermarks are monotonic: deleting messages, or a rescan that finds
//! fewer messages than before, never shrinks them. Only an explicit `pack`
//! resets the low end.
//!
//! Every mutating operation validates the folder invariants before
//! committing and fails with `Error::BrokenInvariant` instead of silently
//! repairing anything, leaving the index at its last consistent snapshot so
//! the caller can decide whether to abort or force a rescan.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, warn};

use crate::folder::model::{MessageNumber, RangeSet};
use crate::folder::persist;
use crate::folder::sequence::SequenceSet;
use crate::support::error::Error;
use crate::support::small_bitset::SmallBitset;
use crate::support::user_config::StoreConfig;

#[derive(Debug, Clone)]
pub struct FolderIndex {
    path: PathBuf,
    /// Smallest message number ever assigned, if any.
    low: Option<MessageNumber>,
    /// Largest message number ever assigned, if any. Never decreases except
    /// across `pack`.
    high: Option<MessageNumber>,
    current: Option<MessageNumber>,
    exists: SmallBitset,
    sequences: SequenceSet,
}

impl FolderIndex {
    /// Open the folder at `path`: scan its messages and load its persisted
    /// sequences and metadata.
    pub fn open(
        path: impl AsRef<Path>,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        persist::load(path.as_ref(), config)
    }

    /// Construct an index from a directory scan alone, with no persisted
    /// state applied. The persistence layer builds on this.
    pub(crate) fn scan(path: &Path) -> Result<Self, Error> {
        let exists = scan_directory(path)?;
        let low = exists.iter().next().map(|n| n as u32).and_then(MessageNumber::of);
        let high =
            exists.iter().last().map(|n| n as u32).and_then(MessageNumber::of);

        Ok(FolderIndex {
            path: path.to_owned(),
            low,
            high,
            current: None,
            exists,
            sequences: SequenceSet::new(),
        })
    }

    /// Re-scan the folder directory, refreshing the existence bitmap.
    ///
    /// Watermarks only grow; a current message whose file has vanished is
    /// dropped with a warning.
    pub fn rescan(&mut self) -> Result<(), Error> {
        let exists = scan_directory(&self.path)?;

        let scanned_low =
            exists.iter().next().map(|n| n as u32).and_then(MessageNumber::of);
        let scanned_high =
            exists.iter().last().map(|n| n as u32).and_then(MessageNumber::of);
        let low = min_watermark(self.low, scanned_low);
        let high = max_watermark(self.high, scanned_high);

        let current = match self.current {
            Some(cur) if !exists.contains(cur.0.get() as usize) => {
                warn!(
                    "{}: current message {} no longer exists",
                    self.path.display(),
                    cur
                );
                None
            }
            cur => cur,
        };

        verify(&exists, low, high, current)?;
        self.exists = exists;
        self.low = low;
        self.high = high;
        self.current = current;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn low(&self) -> Option<MessageNumber> {
        self.low
    }

    pub fn high(&self) -> Option<MessageNumber> {
        self.high
    }

    pub fn current(&self) -> Option<MessageNumber> {
        self.current
    }

    /// Return whether the message with the given number is physically
    /// present in the folder.
    pub fn exists(&self, n: MessageNumber) -> bool {
        self.exists.contains(n.0.get() as usize)
    }

    /// Iterate over the numbers of all present messages, ascending.
    pub fn messages<'a>(
        &'a self,
    ) -> impl Iterator<Item = MessageNumber> + 'a {
        self.exists
            .iter()
            .filter_map(|n| MessageNumber::of(n as u32))
    }

    pub fn message_count(&self) -> usize {
        self.exists.len()
    }

    pub fn sequences(&self) -> &SequenceSet {
        &self.sequences
    }

    pub fn sequences_mut(&mut self) -> &mut SequenceSet {
        &mut self.sequences
    }

    /// Return the number the next delivered message will get.
    pub fn next_number(&self) -> Result<MessageNumber, Error> {
        match self.high {
            None => Ok(MessageNumber::MIN),
            Some(high) => high
                .next()
                .ok_or(Error::BrokenInvariant("message numbers exhausted")),
        }
    }

    /// Assign the next message number: record it as existing and advance
    /// the high watermark. The caller writes the message file itself.
    pub fn allocate(&mut self) -> Result<MessageNumber, Error> {
        let n = self.next_number()?;
        let mut exists = self.exists.clone();
        exists.insert(n.0.get() as usize);
        let low = min_watermark(self.low, Some(n));
        let high = max_watermark(self.high, Some(n));

        verify(&exists, low, high, self.current)?;
        self.exists = exists;
        self.low = low;
        self.high = high;
        Ok(n)
    }

    /// Record that a message file with number `n` appeared in the folder
    /// (e.g. refiled from elsewhere), extending watermarks as needed.
    pub fn note_message(&mut self, n: MessageNumber) -> Result<(), Error> {
        let mut exists = self.exists.clone();
        exists.insert(n.0.get() as usize);
        let low = min_watermark(self.low, Some(n));
        let high = max_watermark(self.high, Some(n));

        verify(&exists, low, high, self.current)?;
        self.exists = exists;
        self.low = low;
        self.high = high;
        Ok(())
    }

    /// Record the deletion of `numbers`.
    ///
    /// Numbers are not compacted or reused and watermarks are untouched. If
    /// the current message was among the removed, it is cleared. Stale
    /// sequence members are left alone; they are pruned at save time.
    pub fn remove_messages(&mut self, numbers: &RangeSet) -> Result<(), Error> {
        let mut exists = self.exists.clone();
        for n in numbers.items() {
            exists.remove(n.0.get() as usize);
        }

        let current = match self.current {
            Some(cur) if numbers.contains(cur) => None,
            cur => cur,
        };

        verify(&exists, self.low, self.high, current)?;
        self.exists = exists;
        self.current = current;
        Ok(())
    }

    /// Designate `n` as the current message.
    pub fn set_current(&mut self, n: MessageNumber) -> Result<(), Error> {
        if !self.exists(n) {
            return Err(Error::NxMessage(n.0.get()));
        }
        self.current = Some(n);
        Ok(())
    }

    pub(crate) fn set_loaded_state(
        &mut self,
        low: Option<MessageNumber>,
        high: Option<MessageNumber>,
        current: Option<MessageNumber>,
        sequences: SequenceSet,
    ) -> Result<(), Error> {
        // Persisted watermarks only ever widen what the scan found.
        let low = min_watermark(self.low, low);
        let high = max_watermark(self.high, high);
        // A persisted current that no longer exists is dropped, not an
        // error; another process may have deleted the message since.
        let current = current.filter(|&cur| {
            let ok = self.exists(cur);
            if !ok {
                warn!(
                    "{}: persisted current message {} does not exist",
                    self.path.display(),
                    cur
                );
            }
            ok
        });

        verify(&self.exists, low, high, current)?;
        self.low = low;
        self.high = high;
        self.current = current;
        self.sequences = sequences;
        Ok(())
    }

    /// Compact the folder: rename every message file onto the contiguous
    /// range starting at 1 and return the old-to-new mapping.
    ///
    /// The index remaps its own current message, but deliberately not its
    /// sequences: the caller applies the returned mapping to any sequence
    /// set it cares about via `SequenceSet::remap`, which keeps this
    /// operation's responsibilities separate.
    ///
    /// Renaming is not transactional. If a rename fails partway, the
    /// directory is left with the renames that had already happened; the
    /// index rescans it before reporting the error so that it still
    /// reflects what is actually on disk.
    pub fn pack(
        &mut self,
    ) -> Result<BTreeMap<MessageNumber, MessageNumber>, Error> {
        let mut mapping = BTreeMap::new();
        let mut exists = SmallBitset::new();
        let mut next = MessageNumber::MIN;

        // Ascending order makes the renames collision-free: each target
        // number is <= its source and any old file with that number has
        // already been moved away.
        for old in self.messages().collect::<Vec<_>>() {
            let new = next;
            next = next
                .next()
                .ok_or(Error::BrokenInvariant("message numbers exhausted"))?;

            if new != old {
                if let Err(e) = fs::rename(
                    self.path.join(old.to_string()),
                    self.path.join(new.to_string()),
                ) {
                    if let Err(rescan_err) = self.rescan() {
                        warn!(
                            "{}: rescan after failed pack also failed: {}",
                            self.path.display(),
                            rescan_err
                        );
                    }
                    return Err(e.into());
                }
            }
            mapping.insert(old, new);
            exists.insert(new.0.get() as usize);
        }

        let low = if mapping.is_empty() {
            None
        } else {
            Some(MessageNumber::MIN)
        };
        let packed_high = mapping.values().rev().next().copied();
        let high = max_watermark(self.high, packed_high);
        let current =
            self.current.and_then(|cur| mapping.get(&cur).copied());

        verify(&exists, low, high, current)?;
        self.exists = exists;
        self.low = low;
        self.high = high;
        self.current = current;
        Ok(mapping)
    }
}

fn scan_directory(path: &Path) -> Result<SmallBitset, Error> {
    let mut exists = SmallBitset::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        if let Some(n) =
            name.to_str().and_then(MessageNumber::from_file_name)
        {
            exists.insert(n.0.get() as usize);
        }
    }

    Ok(exists)
}

fn min_watermark(
    a: Option<MessageNumber>,
    b: Option<MessageNumber>,
) -> Option<MessageNumber> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_watermark(
    a: Option<MessageNumber>,
    b: Option<MessageNumber>,
) -> Option<MessageNumber> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Check the folder invariants against candidate state.
fn verify(
    exists: &SmallBitset,
    low: Option<MessageNumber>,
    high: Option<MessageNumber>,
    current: Option<MessageNumber>,
) -> Result<(), Error> {
    fn broken(what: &'static str) -> Error {
        error!("Refusing folder mutation: {}", what);
        Error::BrokenInvariant(what)
    }

    if let Some(min) = exists.iter().next() {
        let max = exists.iter().last().unwrap();
        let low = low.map(|n| n.0.get() as usize).unwrap_or(usize::MAX);
        let high = high.map(|n| n.0.get() as usize).unwrap_or(0);
        if min < low || max > high {
            return Err(broken(
                "existing messages outside the low/high watermarks",
            ));
        }
    }

    if let Some(cur) = current {
        if !exists.contains(cur.0.get() as usize) {
            return Err(broken("current message does not exist"));
        }
    }

    Ok(())
}
