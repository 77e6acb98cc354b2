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

use std::fmt;
use std::iter;

/// A bitset memory-optimised for the case where no bits over 63 are
/// required, with no unsafe code.
///
/// The folder existence bitmap uses this: most MH folders hold fewer than 64
/// messages, so the common case stays inline as a single `u64` and only
/// larger folders pay for a heap vector.
///
/// This is internally just an inline `u64` and an `Option<Box<Vec<u64>>>`,
/// so that the inline overhead (relative to the `u64` alone) is only one
/// pointer.
#[derive(Clone, Default)]
pub struct SmallBitset {
    near: u64,
    far: Option<Box<Vec<u64>>>,
}

impl fmt::Debug for SmallBitset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SmallBitset")?;
        f.debug_list().entries(self.iter()).finish()
    }
}

impl SmallBitset {
    /// Initialise a new, empty bitset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `val` into the bitset.
    ///
    /// Returns true if the element was not already present.
    pub fn insert(&mut self, val: usize) -> bool {
        let (word, mask) = self.addr_mut(val);
        let ret = 0 == (*word & mask);
        *word |= mask;
        ret
    }

    /// Remove `val` from the bitset.
    ///
    /// Returns true if the element was present.
    pub fn remove(&mut self, val: usize) -> bool {
        let (word, mask) = self.addr_mut(val);
        let ret = 0 != (*word & mask);
        *word &= !mask;
        ret
    }

    /// Return whether the given element is currently in the bitset.
    pub fn contains(&self, val: usize) -> bool {
        let (word, mask) = self.addr(val);
        0 != (word & mask)
    }

    /// Return the number of elements in the bitset.
    pub fn len(&self) -> usize {
        static EMPTY: Vec<u64> = Vec::new();
        iter::once(self.near)
            .chain(
                self.far
                    .as_ref()
                    .map(|v| &**v)
                    .unwrap_or(&EMPTY)
                    .iter()
                    .copied(),
            )
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Remove all elements.
    pub fn clear(&mut self) {
        self.near = 0;
        self.far = None;
    }

    /// Iterate over all the values in the bitset, ascending.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = usize> + 'a {
        static EMPTY: Vec<u64> = Vec::new();
        iter::once(self.near)
            .chain(
                self.far
                    .as_ref()
                    .map(|v| &**v)
                    .unwrap_or(&EMPTY)
                    .iter()
                    .copied(),
            )
            .enumerate()
            .flat_map(move |(ix, word)| {
                (0..64)
                    .into_iter()
                    .filter(move |&bit| 0 != (word & (1 << bit)))
                    .map(move |bit| bit + ix * 64)
            })
    }

    fn addr_mut(&mut self, val: usize) -> (&mut u64, u64) {
        if val < 64 {
            (&mut self.near, 1 << val)
        } else {
            let ix = val / 64 - 1;
            let far = self.far.get_or_insert_with(|| Box::new(Vec::new()));
            if far.len() <= ix {
                far.resize(ix + 1, 0);
            }

            (&mut far[ix], 1 << (val % 64))
        }
    }

    fn addr(&self, val: usize) -> (u64, u64) {
        if val < 64 {
            (self.near, 1 << val)
        } else if let Some(far) = self.far.as_ref() {
            let ix = val / 64 - 1;
            (far.get(ix).copied().unwrap_or(0), 1 << (val % 64))
        } else {
            (0, 1 << (val % 64))
        }
    }
}

impl iter::FromIterator<usize> for SmallBitset {
    fn from_iter<T: IntoIterator<Item = usize>>(it: T) -> Self {
        let mut this = Self::new();
        for val in it {
            this.insert(val);
        }
        this
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic_operations_near_and_far() {
        let mut set = SmallBitset::new();
        assert!(set.is_empty());

        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert!(set.insert(63));
        assert!(set.insert(64));
        assert!(set.insert(1000));

        assert!(set.contains(1));
        assert!(set.contains(63));
        assert!(set.contains(64));
        assert!(set.contains(1000));
        assert!(!set.contains(2));
        assert!(!set.contains(999));

        assert_eq!(4, set.len());
        assert_eq!(vec![1, 63, 64, 1000], set.iter().collect::<Vec<_>>());

        assert!(set.remove(63));
        assert!(!set.remove(63));
        assert!(!set.remove(500));
        assert_eq!(vec![1, 64, 1000], set.iter().collect::<Vec<_>>());

        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(1));
    }
}
