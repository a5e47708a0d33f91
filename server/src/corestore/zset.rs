/*
 * Created on Thu Jul 27 2023
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2023, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The sorted-set engine. Members are ordered by `(score, member)`, the
//! same tie-break rule `ZRANGE`/`ZRANK` expect, backed by a `BTreeMap` for
//! O(log n) ordered lookups plus a `HashMap` for O(1) score lookups by
//! member.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// A wrapper giving `f64` a total order (`NaN` is never a legal score -
/// command handlers reject it before it reaches this type).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(pub f64);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZsetValue {
    by_rank: BTreeMap<(Score, Bytes), ()>,
    by_member: HashMap<Bytes, f64>,
}

impl ZsetValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Inserts or updates a member's score. Returns `true` if the member
    /// is newly added (as opposed to an existing member being re-scored).
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        if let Some(&old) = self.by_member.get(&member) {
            if old == score {
                return false;
            }
            self.by_rank.remove(&(Score(old), member.clone()));
            self.by_rank.insert((Score(score), member.clone()), ());
            self.by_member.insert(member, score);
            false
        } else {
            self.by_rank.insert((Score(score), member.clone()), ());
            self.by_member.insert(member, score);
            true
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).copied()
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        if let Some(score) = self.by_member.remove(member) {
            self.by_rank.remove(&(Score(score), Bytes::copy_from_slice(member)));
            true
        } else {
            false
        }
    }

    /// Zero-based rank in ascending `(score, member)` order
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        let key = (Score(score), Bytes::copy_from_slice(member));
        Some(self.by_rank.range(..key).count())
    }

    /// Members by ascending rank range, inclusive, Redis-style negative
    /// indices resolved by the caller before calling this
    pub fn range(&self, start: usize, stop: usize) -> Vec<(Bytes, f64)> {
        self.by_rank
            .keys()
            .skip(start)
            .take(stop.saturating_sub(start).saturating_add(1))
            .map(|(Score(s), m)| (m.clone(), *s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_score_then_member() {
        let mut z = ZsetValue::new();
        z.insert(Bytes::from("b"), 1.0);
        z.insert(Bytes::from("a"), 1.0);
        z.insert(Bytes::from("c"), 0.5);
        let all = z.range(0, usize::MAX);
        assert_eq!(
            all,
            vec![
                (Bytes::from("c"), 0.5),
                (Bytes::from("a"), 1.0),
                (Bytes::from("b"), 1.0),
            ]
        );
    }

    #[test]
    fn rank_and_rescoring() {
        let mut z = ZsetValue::new();
        z.insert(Bytes::from("a"), 5.0);
        z.insert(Bytes::from("b"), 10.0);
        assert_eq!(z.rank(b"a"), Some(0));
        assert_eq!(z.rank(b"b"), Some(1));
        z.insert(Bytes::from("a"), 20.0);
        assert_eq!(z.rank(b"a"), Some(1));
        assert_eq!(z.rank(b"b"), Some(0));
    }

    #[test]
    fn remove_drops_from_both_indices() {
        let mut z = ZsetValue::new();
        z.insert(Bytes::from("a"), 1.0);
        assert!(z.remove(b"a"));
        assert!(!z.remove(b"a"));
        assert_eq!(z.len(), 0);
    }
}
