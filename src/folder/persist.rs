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

//! On-disk persistence for the folder index and sequences.
//!
//! Two files live in the folder directory alongside the messages:
//!
//! - The sequence file (`.mh_sequences` by default). Plain text, one
//!   definition per line in the form `name: range-text`, e.g.
//!   `unseen: 3 5-9`. Blank lines and lines starting with `#` are ignored.
//!   The reserved name `cur` carries the current message and loads into the
//!   folder index rather than the sequence set. The file is routinely
//!   hand-edited, so a line that fails to parse is skipped with a warning
//!   instead of poisoning the whole folder.
//!
//! - The metadata file (`.mh_folder` by default). A tiny TOML document
//!   holding the low/high watermarks so that numbers of long-deleted
//!   messages are not reused across sessions.
//!
//! Both files are written with the temp-then-rename discipline, so a crash
//! mid-save leaves the previous state intact. Writers serialise whole
//! load/mutate/save cycles through the folder's advisory lock; pure readers
//! skip the lock and simply tolerate the files changing between loads.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::folder::index::FolderIndex;
use crate::folder::model::{MessageNumber, RangeSet};
use crate::folder::sequence::SequenceSet;
use crate::support::error::Error;
use crate::support::file_ops::{spit, IgnoreKinds};
use crate::support::lock::FolderLock;
use crate::support::sequence_name::check_name;
use crate::support::user_config::{OrphanPolicy, StoreConfig};

/// The serialised form of the folder metadata file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
struct FolderMeta {
    low: Option<u32>,
    high: Option<u32>,
}

/// Load the folder at `path`: directory scan plus persisted metadata and
/// sequences.
///
/// This takes no lock; callers intending to save afterwards should hold the
/// folder lock around the whole cycle (see [`with_folder`]).
pub fn load(path: &Path, config: &StoreConfig) -> Result<FolderIndex, Error> {
    let mut index = FolderIndex::scan(path)?;

    let meta = read_meta(&path.join(&config.metadata_file))?;
    let (current, sequences) =
        read_sequences(&path.join(&config.sequence_file))?;

    index.set_loaded_state(
        meta.low.and_then(MessageNumber::of),
        meta.high.and_then(MessageNumber::of),
        current,
        sequences,
    )?;
    Ok(index)
}

/// Write the folder's sequence and metadata files.
///
/// Members of persisted sequences that refer to absent messages are pruned
/// (from the in-memory set as well as the file) unless the sequence is
/// marked to preserve them or the store-wide orphan policy says to keep
/// everything. Private sequences are never written; sequences left empty
/// are dropped from the file unless marked keep-if-empty.
pub fn save(index: &mut FolderIndex, config: &StoreConfig) -> Result<(), Error> {
    prune_absent(index, config);

    let mut text = String::new();
    if let Some(cur) = index.current() {
        let _ = writeln!(text, "cur: {}", cur);
    }
    for (name, seq) in index.sequences().iter() {
        if !seq.is_persisted() {
            continue;
        }
        if seq.is_empty() && !seq.keeps_if_empty() {
            continue;
        }

        if seq.is_empty() {
            // A bare `name:` line records a kept-while-empty sequence. It
            // only ever appears deliberately, which is what lets the loader
            // restore the keep-if-empty mark.
            let _ = writeln!(text, "{}:", name);
        } else {
            let ranges: RangeSet = seq.members().iter().collect();
            let _ = writeln!(text, "{}: {}", name, ranges);
        }
    }

    let folder = index.path().to_owned();
    spit(
        &folder,
        folder.join(&config.sequence_file),
        0o600,
        text.as_bytes(),
    )?;

    let meta = FolderMeta {
        low: index.low().map(|n| n.0.get()),
        high: index.high().map(|n| n.0.get()),
    };
    let meta_text = toml::to_string(&meta)
        .expect("folder metadata is always serialisable");
    spit(
        &folder,
        folder.join(&config.metadata_file),
        0o600,
        meta_text.as_bytes(),
    )?;

    Ok(())
}

/// Acquire the folder's exclusive advisory lock.
///
/// The lock target is a dedicated `<metadata_file>.lock` file rather than
/// the metadata file itself: the metadata file is replaced by rename on
/// every save, which would detach any flock held on the old inode.
pub fn lock_folder(
    path: &Path,
    config: &StoreConfig,
) -> Result<FolderLock, Error> {
    FolderLock::acquire(
        path.join(format!("{}.lock", config.metadata_file)),
        config.lock_timeout(),
    )
}

/// Run one locked load/mutate/save cycle against the folder at `path`.
///
/// The lock is held from before the load until the atomic writes complete,
/// so two concurrent writers can never interleave partial updates.
pub fn with_folder<R>(
    path: &Path,
    config: &StoreConfig,
    f: impl FnOnce(&mut FolderIndex) -> Result<R, Error>,
) -> Result<R, Error> {
    let _lock = lock_folder(path, config)?;
    let mut index = load(path, config)?;
    let ret = f(&mut index)?;
    save(&mut index, config)?;
    Ok(ret)
}

fn read_meta(path: &Path) -> Result<FolderMeta, Error> {
    let text = fs::read_to_string(path).ignore_not_found()?;
    if text.is_empty() {
        return Ok(FolderMeta::default());
    }

    match toml::from_str(&text) {
        Ok(meta) => Ok(meta),
        Err(e) => {
            // Unusable metadata must not make the folder unusable; the
            // watermarks get re-derived from the scan.
            warn!("{}: ignoring bad folder metadata: {}", path.display(), e);
            Ok(FolderMeta::default())
        }
    }
}

fn read_sequences(
    path: &Path,
) -> Result<(Option<MessageNumber>, SequenceSet), Error> {
    let text = fs::read_to_string(path).ignore_not_found()?;

    let mut current = None;
    let mut sequences = SequenceSet::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, ranges) = match line.find(':') {
            Some(colon) => {
                (line[..colon].trim_end(), line[colon + 1..].trim_start())
            }
            None => {
                warn!(
                    "{}:{}: skipping line with no colon",
                    path.display(),
                    lineno + 1
                );
                continue;
            }
        };

        if "cur" == name {
            match RangeSet::parse(ranges) {
                Ok(set) if 1 == set.len() => current = set.max(),
                _ => warn!(
                    "{}:{}: skipping unintelligible cur line",
                    path.display(),
                    lineno + 1
                ),
            }
            continue;
        }

        if let Err(e) = check_name(name) {
            warn!(
                "{}:{}: skipping sequence: {}",
                path.display(),
                lineno + 1,
                e
            );
            continue;
        }

        match RangeSet::parse(ranges) {
            Ok(set) => {
                // add() cannot fail here since the name already passed
                // validation, and duplicate definitions merge.
                let empty = set.is_empty();
                let _ = sequences.add(name, set.items());
                if empty {
                    // An empty definition is only ever written for a
                    // sequence kept while empty; restore that mark so the
                    // sequence survives the next save too.
                    if let Some(seq) = sequences.get_mut(name) {
                        seq.set_keep_if_empty(true);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "{}:{}: skipping sequence {:?}: {}",
                    path.display(),
                    lineno + 1,
                    name,
                    e
                );
            }
        }
    }

    Ok((current, sequences))
}

fn prune_absent(index: &mut FolderIndex, config: &StoreConfig) {
    if OrphanPolicy::Preserve == config.orphan_sequences {
        return;
    }

    let absent: Vec<(String, Vec<MessageNumber>)> = index
        .sequences()
        .iter()
        .filter(|(_, seq)| seq.is_persisted() && !seq.preserves_absent())
        .map(|(name, seq)| {
            (
                name.to_owned(),
                seq.members()
                    .iter()
                    .copied()
                    .filter(|&n| !index.exists(n))
                    .collect(),
            )
        })
        .filter(|(_, stale): &(_, Vec<MessageNumber>)| !stale.is_empty())
        .collect();

    for (name, stale) in absent {
        let ranges: RangeSet = stale.iter().collect();
        warn!(
            "{}: pruning absent messages {} from sequence {:?}",
            index.path().display(),
            ranges,
            name
        );
        index.sequences_mut().remove(&name, stale);
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::folder::model::MessageNumber as Mn;

    fn make_folder(numbers: &[u32]) -> tempfile::TempDir {
        let root = tempfile::TempDir::new().unwrap();
        for n in numbers {
            fs::write(root.path().join(n.to_string()), "x").unwrap();
        }
        root
    }

    fn sequence_file(root: &tempfile::TempDir) -> PathBuf {
        root.path().join(".mh_sequences")
    }

    #[test]
    fn save_load_round_trip() {
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2, 3, 5, 7, 8, 9]);

        let mut index = load(root.path(), &config).unwrap();
        index.set_current(Mn::u(5)).unwrap();
        index
            .sequences_mut()
            .add("unseen", vec![Mn::u(3), Mn::u(5)])
            .unwrap();
        index
            .sequences_mut()
            .add("flagged", vec![Mn::u(7), Mn::u(8), Mn::u(9)])
            .unwrap();
        save(&mut index, &config).unwrap();

        let text = fs::read_to_string(sequence_file(&root)).unwrap();
        assert_eq!("cur: 5\nflagged: 7-9\nunseen: 3 5\n", text);

        let reloaded = load(root.path(), &config).unwrap();
        assert_eq!(Some(Mn::u(5)), reloaded.current());
        assert_eq!(
            index.sequences().members("unseen"),
            reloaded.sequences().members("unseen")
        );
        assert_eq!(
            index.sequences().members("flagged"),
            reloaded.sequences().members("flagged")
        );
    }

    #[test]
    fn private_sequences_never_hit_disk() {
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2]);

        let mut index = load(root.path(), &config).unwrap();
        index.sequences_mut().define("scratch", false).unwrap();
        index
            .sequences_mut()
            .add("scratch", vec![Mn::u(1)])
            .unwrap();
        save(&mut index, &config).unwrap();

        let text = fs::read_to_string(sequence_file(&root)).unwrap();
        assert!(!text.contains("scratch"), "got: {:?}", text);

        let reloaded = load(root.path(), &config).unwrap();
        assert!(reloaded.sequences().get("scratch").is_none());
    }

    #[test]
    fn empty_sequences_dropped_unless_marked() {
        let config = StoreConfig::default();
        let root = make_folder(&[1]);

        let mut index = load(root.path(), &config).unwrap();
        index.sequences_mut().define("gone", true).unwrap();
        index.sequences_mut().define("kept", true).unwrap();
        index.sequences_mut().get_mut("kept").unwrap()
            .set_keep_if_empty(true);
        save(&mut index, &config).unwrap();

        let text = fs::read_to_string(sequence_file(&root)).unwrap();
        assert!(!text.contains("gone"));
        assert!(text.contains("kept:\n"), "got: {:?}", text);

        let reloaded = load(root.path(), &config).unwrap();
        assert!(reloaded.sequences().get("kept").is_some());
        assert!(reloaded.sequences().members("kept").is_empty());
    }

    #[test]
    fn keep_if_empty_survives_across_sessions() {
        let config = StoreConfig::default();
        let root = make_folder(&[1]);

        let mut index = load(root.path(), &config).unwrap();
        index.sequences_mut().define("bookkeeping", true).unwrap();
        index.sequences_mut().get_mut("bookkeeping").unwrap()
            .set_keep_if_empty(true);
        save(&mut index, &config).unwrap();

        // A fresh session that never touches the sequence must not lose it
        // on its own save.
        let mut index = load(root.path(), &config).unwrap();
        assert!(index.sequences().get("bookkeeping").unwrap()
            .keeps_if_empty());
        save(&mut index, &config).unwrap();

        let text = fs::read_to_string(sequence_file(&root)).unwrap();
        assert!(text.contains("bookkeeping:\n"), "got: {:?}", text);
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2, 3]);
        fs::write(
            sequence_file(&root),
            "# comment\n\
             \n\
             unseen: 1 3\n\
             no colon here\n\
             bad!name: 2\n\
             reversed: 3-1\n\
             flagged: 2\n",
        )
        .unwrap();

        let index = load(root.path(), &config).unwrap();
        assert_eq!(2, index.sequences().len());
        assert!(index.sequences().contains("unseen", Mn::u(1)));
        assert!(index.sequences().contains("flagged", Mn::u(2)));
        assert!(index.sequences().get("reversed").is_none());
    }

    #[test]
    fn stale_members_pruned_on_save() {
        // The canonical lifecycle: folder 1,2,3,5,7,8,9 with unseen: 3 5;
        // message 3 is deleted, the folder rescanned, and the next save
        // leaves only unseen: 5.
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2, 3, 5, 7, 8, 9]);
        fs::write(sequence_file(&root), "unseen: 3 5\n").unwrap();

        fs::remove_file(root.path().join("3")).unwrap();
        let mut index = load(root.path(), &config).unwrap();
        // Stale member tolerated in memory...
        assert!(index.sequences().contains("unseen", Mn::u(3)));

        save(&mut index, &config).unwrap();
        // ...but pruned on save, both in memory and on disk.
        assert!(!index.sequences().contains("unseen", Mn::u(3)));
        assert_eq!(
            "unseen: 5\n",
            fs::read_to_string(sequence_file(&root)).unwrap()
        );
    }

    #[test]
    fn preserve_marks_and_orphan_policy_defeat_pruning() {
        let config = StoreConfig::default();
        let root = make_folder(&[1]);

        let mut index = load(root.path(), &config).unwrap();
        index
            .sequences_mut()
            .add("predeclared", vec![Mn::u(10)])
            .unwrap();
        index.sequences_mut().get_mut("predeclared").unwrap()
            .set_preserve_absent(true);
        save(&mut index, &config).unwrap();
        assert!(fs::read_to_string(sequence_file(&root))
            .unwrap()
            .contains("predeclared: 10"));

        let mut preserve_all = StoreConfig::default();
        preserve_all.orphan_sequences = OrphanPolicy::Preserve;
        let mut index = load(root.path(), &config).unwrap();
        index.sequences_mut().add("stale", vec![Mn::u(9)]).unwrap();
        save(&mut index, &preserve_all).unwrap();
        assert!(fs::read_to_string(sequence_file(&root))
            .unwrap()
            .contains("stale: 9"));
    }

    #[test]
    fn watermarks_survive_via_metadata_file() {
        let config = StoreConfig::default();
        let root = make_folder(&[4, 5, 6]);

        let mut index = load(root.path(), &config).unwrap();
        save(&mut index, &config).unwrap();

        // All messages disappear; the watermarks persist so numbers are
        // not reused.
        for n in &[4, 5, 6] {
            fs::remove_file(root.path().join(n.to_string())).unwrap();
        }
        let index = load(root.path(), &config).unwrap();
        assert_eq!(0, index.message_count());
        assert_eq!(Some(Mn::u(4)), index.low());
        assert_eq!(Some(Mn::u(6)), index.high());
        assert_eq!(Mn::u(7), index.next_number().unwrap());
    }

    #[test]
    fn bad_metadata_is_tolerated() {
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2]);
        fs::write(root.path().join(".mh_folder"), "low = \"shoe\"").unwrap();

        let index = load(root.path(), &config).unwrap();
        assert_eq!(Some(Mn::u(1)), index.low());
        assert_eq!(Some(Mn::u(2)), index.high());
    }

    #[test]
    fn persisted_current_outside_folder_is_dropped() {
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2]);
        fs::write(sequence_file(&root), "cur: 9\n").unwrap();

        let index = load(root.path(), &config).unwrap();
        assert_eq!(None, index.current());
    }

    #[test]
    fn with_folder_serialises_writers() {
        let config = StoreConfig::default();
        let root = make_folder(&[1, 2, 3]);

        with_folder(root.path(), &config, |index| {
            index.sequences_mut().add("a", vec![Mn::u(1)])
        })
        .unwrap();
        with_folder(root.path(), &config, |index| {
            index.sequences_mut().add("b", vec![Mn::u(2)])
        })
        .unwrap();

        // Neither writer clobbered the other's update.
        let index = load(root.path(), &config).unwrap();
        assert!(index.sequences().contains("a", Mn::u(1)));
        assert!(index.sequences().contains("b", Mn::u(2)));

        // And a cycle already holding the lock excludes a second writer.
        let _lock = lock_folder(root.path(), &config).unwrap();
        let mut impatient = StoreConfig::default();
        impatient.lock_timeout_ms = 10;
        assert_matches!(
            Err(Error::LockTimeout),
            with_folder(root.path(), &impatient, |_| Ok(()))
        );
    }

    #[test]
    fn folder_isolation() {
        let config = StoreConfig::default();
        let root_a = make_folder(&[1]);
        let root_b = make_folder(&[1]);

        let mut a = load(root_a.path(), &config).unwrap();
        let mut b = load(root_b.path(), &config).unwrap();
        a.sequences_mut().add("unseen", vec![Mn::u(1)]).unwrap();
        save(&mut a, &config).unwrap();
        save(&mut b, &config).unwrap();

        let b = load(root_b.path(), &config).unwrap();
        assert!(b.sequences().get("unseen").is_none());
    }
}
