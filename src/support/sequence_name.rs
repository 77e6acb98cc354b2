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

//! The naming grammar for sequences.
//!
//! A sequence name must start with an ASCII letter and continue with ASCII
//! letters, digits, `-`, or `_`. Starting with a letter means no name can
//! ever lex as a message number or a range token, so the command-line
//! grammar can resolve a message specification as number, then range, then
//! sequence name without ambiguity.
//!
//! Names that collide with the pseudo-sequence tokens the suite gives
//! special meaning on the command line (`cur`, `all`, and friends) are also
//! rejected; `cur` in particular is written to the sequence file by the
//! store itself to carry the current message.

use lazy_static::lazy_static;
use regex::Regex;

use crate::support::error::Error;

/// Tokens that look like sequence names but are claimed by the message
/// specification grammar.
pub const RESERVED_NAMES: &[&str] =
    &["all", "cur", "first", "last", "new", "next", "prev"];

lazy_static! {
    static ref NAME_PATTERN: Regex =
        Regex::new("^[A-Za-z][A-Za-z0-9_-]*$").unwrap();
}

/// Return whether `name` matches the naming grammar, ignoring reservations.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Return whether `name` is one of the reserved pseudo-sequence tokens.
///
/// Reservation is case-sensitive; MH tradition is that the pseudo-sequences
/// are lowercase and user sequences may shadow-case them freely.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Validate `name` for use as a sequence name.
pub fn check_name(name: &str) -> Result<(), Error> {
    if !is_valid_name(name) {
        Err(Error::UnsafeName(name.to_owned()))
    } else if is_reserved_name(name) {
        Err(Error::ReservedName(name.to_owned()))
    } else {
        Ok(())
    }
}
