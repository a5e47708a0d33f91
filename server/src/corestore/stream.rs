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

//! The stream engine: an append-only, strictly ordered log keyed by a
//! `(milliseconds, sequence)` pair, the way `XADD`/`XRANGE`/`XREAD` expect.

use bytes::Bytes;
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { ms, seq: 0 }
    }

    pub fn to_string(self) -> String {
        format!("{}-{}", self.ms, self.seq)
    }

    /// Parses `<ms>-<seq>`, `<ms>` (seq defaults to 0) or `<ms>-*` (seq
    /// picked automatically by the caller, signalled with `None`)
    pub fn parse(s: &[u8]) -> Option<(u64, Option<u64>)> {
        let s = std::str::from_utf8(s).ok()?;
        match s.split_once('-') {
            Some((ms, "*")) => Some((ms.parse().ok()?, None)),
            Some((ms, seq)) => Some((ms.parse().ok()?, Some(seq.parse().ok()?))),
            None => Some((s.parse().ok()?, Some(0))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamValue {
    entries: BTreeMap<StreamId, Vec<(Bytes, Bytes)>>,
    last_id: Option<StreamId>,
}

impl StreamValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id.unwrap_or(StreamId::MIN)
    }

    /// Appends a new entry, auto-incrementing the sequence when `seq` is
    /// `None`. Returns the assigned id, or `None` if the requested id
    /// would not be strictly greater than the last one appended.
    pub fn add(&mut self, ms: u64, seq: Option<u64>, fields: Vec<(Bytes, Bytes)>) -> Option<StreamId> {
        let id = match seq {
            Some(seq) => StreamId { ms, seq },
            None => match self.last_id {
                Some(last) if last.ms == ms => StreamId {
                    ms,
                    seq: last.seq + 1,
                },
                _ => StreamId { ms, seq: 0 },
            },
        };
        if let Some(last) = self.last_id {
            if id <= last {
                return None;
            }
        }
        self.entries.insert(id, fields);
        self.last_id = Some(id);
        Some(id)
    }

    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<(StreamId, &Vec<(Bytes, Bytes)>)> {
        self.entries
            .range(start..=end)
            .map(|(id, fields)| (*id, fields))
            .collect()
    }

    /// All entries with an id strictly greater than `after`, used by `XREAD`
    pub fn after(&self, after: StreamId) -> Vec<(StreamId, Vec<(Bytes, Bytes)>)> {
        self.entries
            .range((
                std::ops::Bound::Excluded(after),
                std::ops::Bound::Unbounded,
            ))
            .map(|(id, fields)| (*id, fields.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_strict_order() {
        let mut s = StreamValue::new();
        let id1 = s.add(1, Some(0), vec![(Bytes::from("a"), Bytes::from("1"))]).unwrap();
        let id2 = s.add(1, None, vec![(Bytes::from("a"), Bytes::from("2"))]).unwrap();
        assert_eq!(id1, StreamId { ms: 1, seq: 0 });
        assert_eq!(id2, StreamId { ms: 1, seq: 1 });
        assert!(s.add(1, Some(0), vec![]).is_none());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn after_excludes_the_cursor() {
        let mut s = StreamValue::new();
        let id1 = s.add(5, Some(0), vec![]).unwrap();
        let id2 = s.add(5, Some(1), vec![]).unwrap();
        let got = s.after(id1);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, id2);
    }
}
