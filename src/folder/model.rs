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

use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use std::iter::FromIterator;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};

use crate::support::error::Error;

/// Identifies one message within a folder.
///
/// A message number is a positive integer; the message's file within the
/// folder directory is named by its plain decimal form with no leading
/// zeros. Zero is not a message number, which the representation enforces.
///
/// Numbers are assigned ascending as messages arrive and are not reused
/// after deletion (short of an explicit pack).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageNumber(pub NonZeroU32);

impl fmt::Debug for MessageNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MessageNumber({})", self.0.get())
    }
}

impl fmt::Display for MessageNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl MessageNumber {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { MessageNumber(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { MessageNumber(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(MessageNumber)
    }

    pub fn next(self) -> Option<Self> {
        self.0.get().checked_add(1).and_then(Self::of)
    }

    /// Parse a directory entry name as a message number.
    ///
    /// Only the canonical form counts: all ASCII digits, no leading zero, no
    /// sign, nothing else. Entries not in this form are simply not messages;
    /// whether a number's message is actually present in a folder is a
    /// separate question answered by the folder index.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.is_empty() || name.starts_with('0') {
            return None;
        }
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        name.parse().ok().and_then(Self::of)
    }

    #[cfg(test)]
    pub fn u(n: u32) -> Self {
        MessageNumber::of(n).unwrap()
    }
}

impl TryFrom<u32> for MessageNumber {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<MessageNumber> for u32 {
    fn from(n: MessageNumber) -> u32 {
        n.0.get()
    }
}

/// A set of message numbers held as a minimal sorted set of inclusive
/// ranges.
///
/// This is the in-memory side of the range syntax used on the command line
/// and in the sequence file: `"3"`, `"3-7"`, `"3 5-9 12"`. It does not
/// maintain information on the original fragmentation, ordering, or
/// duplication of its input, which is what makes the `Display` form
/// canonical: numbers sorted ascending, maximal runs of consecutive numbers
/// collapsed to `A-B`, a run of length one rendered as a bare integer,
/// tokens joined by single spaces. The empty set renders as the empty
/// string.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RangeSet {
    parts: std::collections::BTreeMap<u32, u32>,
}

impl RangeSet {
    /// Create a new, empty set.
    pub fn new() -> Self {
        RangeSet::default()
    }

    /// Create a set containing just the given number.
    pub fn just(n: MessageNumber) -> Self {
        let mut this = RangeSet::new();
        this.append(n);
        this
    }

    /// Create a set containing a single, simple range.
    pub fn range(start: MessageNumber, end: MessageNumber) -> Self {
        let mut this = RangeSet::new();
        this.insert(start, end);
        this
    }

    /// Append a single number to this set.
    ///
    /// The number must be strictly greater than all numbers already
    /// inserted.
    pub fn append(&mut self, n: MessageNumber) {
        let n: u32 = n.into();

        if let Some(end) = self.parts.values_mut().next_back() {
            assert!(n > *end);

            if n == *end + 1 {
                *end = n;
                return;
            }
        }

        self.parts.insert(n, n);
    }

    /// Insert the given inclusive range (which must be in the correct order)
    /// into this set.
    pub fn insert(&mut self, start_incl: MessageNumber, end_incl: MessageNumber) {
        assert!(end_incl >= start_incl);
        self.insert_raw(start_incl.into(), end_incl.into());
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // If this range overlaps any later ranges, fuse them.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            if let Some((following_start, following_end)) = following {
                if following_start - 1 <= end_incl {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                    continue;
                }
            }

            break;
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end + 1 >= start_incl {
                // Overlap with the new range
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        // No overlap
        self.parts.insert(start_incl, end_incl);
    }

    /// Return whether the given number is present in this set.
    pub fn contains(&self, n: MessageNumber) -> bool {
        let n: u32 = n.into();
        self.parts
            .range(..=n)
            .next_back()
            .filter(|&(_, &end)| end >= n)
            .is_some()
    }

    /// Return an iterator over the numbers in this set, strictly ascending.
    pub fn items<'a>(&'a self) -> impl Iterator<Item = MessageNumber> + 'a {
        self.parts
            .iter()
            .flat_map(|(&start, &end)| (start..=end).into_iter())
            .filter_map(MessageNumber::of)
    }

    /// Parse the textual form of a set of message numbers.
    ///
    /// The grammar is whitespace-separated tokens, each a positive integer
    /// or `A-B` with `A <= B`. A reversed range, a zero, or any non-numeric
    /// token fails; empty or all-whitespace input is the empty set.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        fn number(s: &str) -> Option<u32> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse().ok().filter(|&n| 0 != n)
        }

        let mut this = Self::new();
        for token in raw.split_whitespace() {
            let mut subs = token.splitn(2, '-');
            match (subs.next(), subs.next()) {
                (Some(only), None) => {
                    let only = number(only)
                        .ok_or_else(|| Error::BadMessageSpec(token.to_owned()))?;
                    this.insert_raw(only, only);
                }
                (Some(start), Some(end)) => {
                    let start = number(start)
                        .ok_or_else(|| Error::BadMessageSpec(token.to_owned()))?;
                    let end = number(end)
                        .ok_or_else(|| Error::BadMessageSpec(token.to_owned()))?;
                    // Unlike some other range syntaxes, a reversed range is
                    // an error rather than being silently swapped.
                    if start > end {
                        return Err(Error::BadMessageSpec(token.to_owned()));
                    }
                    this.insert_raw(start, end);
                }
                _ => return Err(Error::BadMessageSpec(token.to_owned())),
            }
        }

        Ok(this)
    }

    /// Return the total count of numbers in the set.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(start, end)| end - start + 1)
            .sum::<u32>() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Return the maximum number in the set.
    pub fn max(&self) -> Option<MessageNumber> {
        self.parts
            .values()
            .rev()
            .next()
            .copied()
            .and_then(MessageNumber::of)
    }

    /// Materialise the set in ascending order.
    pub fn to_set(&self) -> BTreeSet<MessageNumber> {
        self.items().collect()
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { " " };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}-{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[RangeSet {}]", self)
    }
}

impl FromIterator<MessageNumber> for RangeSet {
    fn from_iter<T: IntoIterator<Item = MessageNumber>>(it: T) -> Self {
        let mut this = Self::new();
        for n in it {
            let n: u32 = n.into();
            this.insert_raw(n, n);
        }
        this
    }
}

impl<'a> FromIterator<&'a MessageNumber> for RangeSet {
    fn from_iter<T: IntoIterator<Item = &'a MessageNumber>>(it: T) -> Self {
        it.into_iter().copied().collect()
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_rs(
        expected_content: &[u32],
        expected_string: &str,
        rangeset: RangeSet,
    ) {
        let actual: Vec<u32> =
            rangeset.items().map(|n| n.0.get()).collect();
        assert_eq!(expected_content, &actual[..]);
        assert_eq!(expected_string, &rangeset.to_string());
    }

    #[test]
    fn message_number_file_names() {
        assert_eq!(
            Some(MessageNumber::u(1)),
            MessageNumber::from_file_name("1")
        );
        assert_eq!(
            Some(MessageNumber::u(42)),
            MessageNumber::from_file_name("42")
        );
        assert_eq!(None, MessageNumber::from_file_name(""));
        assert_eq!(None, MessageNumber::from_file_name("0"));
        assert_eq!(None, MessageNumber::from_file_name("007"));
        assert_eq!(None, MessageNumber::from_file_name("-3"));
        assert_eq!(None, MessageNumber::from_file_name("12a"));
        assert_eq!(None, MessageNumber::from_file_name(".mh_sequences"));
    }

    #[test]
    fn rangeset_parsing() {
        assert_rs(&[1], "1", RangeSet::parse("1").unwrap());
        assert_rs(&[1, 2], "1-2", RangeSet::parse("1-2").unwrap());
        assert_rs(&[1, 3, 5], "1 3 5", RangeSet::parse("1 3 5").unwrap());
        assert_rs(&[1, 3, 5], "1 3 5", RangeSet::parse("3 1 5").unwrap());
        assert_rs(&[1, 3, 5], "1 3 5", RangeSet::parse("3 5 1").unwrap());
        assert_rs(
            &[1, 2, 9, 10],
            "1-2 9-10",
            RangeSet::parse("1-2 9-10").unwrap(),
        );
        assert_rs(
            &[3, 4, 5, 6, 7, 12],
            "3-7 12",
            RangeSet::parse("  3-7\t12 ").unwrap(),
        );

        // Adjacent and overlapping inputs collapse to the canonical form
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1 2 3 4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-2 3 4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-3 4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1 2-3 4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-2 3-4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-4 2-3").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("2-3 1-4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-4 2 4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-2 1-4").unwrap());
        assert_rs(&[1, 2, 3, 4], "1-4", RangeSet::parse("1-4 1-4").unwrap());

        // The worked example from the sequence file format
        assert_rs(
            &[1, 2, 3, 5, 6],
            "1-3 5-6",
            RangeSet::parse("1-3 5-6").unwrap(),
        );
    }

    #[test]
    fn rangeset_parse_boundaries() {
        assert!(RangeSet::parse("").unwrap().is_empty());
        assert!(RangeSet::parse(" \t ").unwrap().is_empty());

        assert_matches!(Err(Error::BadMessageSpec(_)), RangeSet::parse("0"));
        assert_matches!(Err(Error::BadMessageSpec(_)), RangeSet::parse("-1"));
        assert_matches!(Err(Error::BadMessageSpec(_)), RangeSet::parse("5-3"));
        assert_matches!(Err(Error::BadMessageSpec(_)), RangeSet::parse("0-3"));
        assert_matches!(Err(Error::BadMessageSpec(_)), RangeSet::parse("3-"));
        assert_matches!(Err(Error::BadMessageSpec(_)), RangeSet::parse("foo"));
        assert_matches!(
            Err(Error::BadMessageSpec(_)),
            RangeSet::parse("1 2x 3")
        );
        assert_matches!(
            Err(Error::BadMessageSpec(_)),
            RangeSet::parse("1-2-3")
        );
    }

    #[test]
    fn rangeset_append() {
        let mut rangeset = RangeSet::new();
        rangeset.append(MessageNumber::u(1));
        assert_eq!("1", &rangeset.to_string());
        rangeset.append(MessageNumber::u(2));
        assert_eq!("1-2", &rangeset.to_string());
        rangeset.append(MessageNumber::u(3));
        assert_eq!("1-3", &rangeset.to_string());
        rangeset.append(MessageNumber::u(5));
        assert_eq!("1-3 5", &rangeset.to_string());
        rangeset.append(MessageNumber::u(6));
        assert_eq!("1-3 5-6", &rangeset.to_string());
    }

    #[test]
    fn encoding_is_order_independent() {
        let a: RangeSet =
            [5u32, 1, 3, 2].iter().map(|&n| MessageNumber::u(n)).collect();
        let b: RangeSet =
            [1u32, 2, 3, 5].iter().map(|&n| MessageNumber::u(n)).collect();
        assert_eq!("1-3 5", &a.to_string());
        assert_eq!(a.to_string(), b.to_string());
    }

    proptest! {
        #[test]
        fn rangeset_properties(
            ranges in prop::collection::vec((1u32..30, 1u32..=10), 1..=5)
        ) {
            let mut expected = Vec::new();
            let mut rangeset = RangeSet::new();

            for &(start, extent) in &ranges {
                rangeset.insert(
                    MessageNumber::u(start),
                    MessageNumber::u(start + extent),
                );
                expected.extend((start..=start + extent).into_iter());
            }

            expected.sort();
            expected.dedup();

            // Ensure we built the correct set
            let actual: Vec<u32> = rangeset.items().map(
                |n| n.0.get()).collect();
            assert_eq!(expected, actual);

            // contains() works
            for i in 1..50 {
                assert_eq!(
                    expected.contains(&i),
                    rangeset.contains(MessageNumber::u(i)),
                    "Bad contains result for {}",
                    i
                );
            }

            // It can be stringified and parsed back into the same value,
            // and re-encoding the parse is byte-identical
            let encoded = rangeset.to_string();
            let reparsed = RangeSet::parse(&encoded).unwrap();
            assert_eq!(rangeset, reparsed);
            assert_eq!(encoded, reparsed.to_string());
        }
    }
}
