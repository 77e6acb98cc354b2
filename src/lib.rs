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

//! Mhstore is the message store underlying an MH-style command-line mail
//! suite.
//!
//! An MH folder is an ordinary directory whose messages are ordinary files
//! named by positive decimal integers. Alongside them live two small pieces
//! of bookkeeping: a sequence file (`.mh_sequences` by default) holding named
//! subsets of the folder's messages in a compact range syntax, and a metadata
//! file holding the folder's message-number watermarks.
//!
//! This crate owns that bookkeeping: the range codec shared between the
//! sequence file and the command line, the in-memory sequence sets, the
//! folder index with its existence bitmap and current-message tracking, and
//! the load/mutate/save persistence cycle with its advisory locking.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod folder;
pub mod support;

pub use crate::folder::index::FolderIndex;
pub use crate::folder::model::{MessageNumber, RangeSet};
pub use crate::folder::sequence::{Sequence, SequenceSet};
pub use crate::support::error::Error;
