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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A message specification (bare number or range token) failed to parse.
    ///
    /// Carries the offending token so callers can show it.
    #[error("Malformed message specification: {0:?}")]
    BadMessageSpec(String),
    /// A sequence name violates the naming grammar.
    #[error("Illegal sequence name: {0:?}")]
    UnsafeName(String),
    /// A sequence name collides with a pseudo-sequence token.
    #[error("Reserved sequence name: {0:?}")]
    ReservedName(String),
    /// A sequence with the given name already exists.
    #[error("Sequence already exists: {0:?}")]
    SequenceExists(String),
    /// No sequence with the given name exists.
    #[error("No such sequence: {0:?}")]
    NxSequence(String),
    /// Reference to a message number not present in the folder.
    #[error("Message {0} does not exist in this folder")]
    NxMessage(u32),
    /// An invariant was found violated during a mutating call. The mutation
    /// was aborted, leaving in-memory state at its last consistent snapshot.
    #[error("Folder index inconsistent: {0}")]
    BrokenInvariant(&'static str),
    /// The folder's advisory lock could not be acquired within the
    /// configured bound.
    #[error("Timed out waiting for folder lock")]
    LockTimeout,
    /// The store configuration cannot be understood.
    #[error("Bad store configuration: {0}")]
    BadConfig(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
}
