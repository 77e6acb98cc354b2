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

//! The folder store proper.
//!
//! Data flows through here as follows: a caller opens a folder, which scans
//! the directory for message files and asks the persistence layer for the
//! sequence and metadata files; the range codec in `model` expands each
//! persisted range into sequence members; the resulting `FolderIndex`
//! (which owns the folder's `SequenceSet`) is then queried and mutated in
//! memory; and a save re-encodes everything through the codec and writes it
//! back atomically under the folder lock.

pub mod index;
pub mod model;
pub mod persist;
pub mod sequence;

pub use self::index::FolderIndex;
pub use self::model::{MessageNumber, RangeSet};
pub use self::persist::{load, lock_folder, save, with_folder};
pub use self::sequence::{Sequence, SequenceSet};
