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

//! # Pub/Sub
//!
//! Subscriber connections are registered against a channel (or a glob
//! pattern, for `PSUBSCRIBE`) by connection id. `PUBLISH` walks both
//! tables and pushes an already-encoded RESP message down each matching
//! subscriber's writer-task channel, the same `mpsc::UnboundedSender`
//! used for normal replies so a pushed message and a reply to a request
//! made on the same socket never interleave mid-frame.

use crate::{resp::Reply, util::glob::glob_match};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

pub type ConnId = u64;

#[derive(Default)]
pub struct PubSub {
    channels: Mutex<HashMap<Bytes, HashMap<ConnId, UnboundedSender<Bytes>>>>,
    patterns: Mutex<HashMap<Bytes, HashMap<ConnId, UnboundedSender<Bytes>>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: Bytes, id: ConnId, tx: UnboundedSender<Bytes>) {
        self.channels
            .lock()
            .entry(channel)
            .or_default()
            .insert(id, tx);
    }

    pub fn unsubscribe(&self, channel: &[u8], id: ConnId) {
        let mut guard = self.channels.lock();
        if let Some(subs) = guard.get_mut(channel) {
            subs.remove(&id);
            if subs.is_empty() {
                guard.remove(channel);
            }
        }
    }

    pub fn psubscribe(&self, pattern: Bytes, id: ConnId, tx: UnboundedSender<Bytes>) {
        self.patterns
            .lock()
            .entry(pattern)
            .or_default()
            .insert(id, tx);
    }

    pub fn punsubscribe(&self, pattern: &[u8], id: ConnId) {
        let mut guard = self.patterns.lock();
        if let Some(subs) = guard.get_mut(pattern) {
            subs.remove(&id);
            if subs.is_empty() {
                guard.remove(pattern);
            }
        }
    }

    /// Drops every subscription held by a connection that's closing
    pub fn drop_connection(&self, id: ConnId) {
        let mut channels = self.channels.lock();
        channels.retain(|_, subs| {
            subs.remove(&id);
            !subs.is_empty()
        });
        let mut patterns = self.patterns.lock();
        patterns.retain(|_, subs| {
            subs.remove(&id);
            !subs.is_empty()
        });
    }

    /// Publishes `payload` to `channel`, returning the number of
    /// subscribers (exact and pattern) it was delivered to
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> usize {
        let mut delivered = 0usize;
        if let Some(subs) = self.channels.lock().get(channel) {
            let msg = Reply::Array(vec![
                Reply::bulk(Bytes::from_static(b"message")),
                Reply::bulk(Bytes::copy_from_slice(channel)),
                Reply::bulk(Bytes::copy_from_slice(payload)),
            ])
            .to_bytes();
            for tx in subs.values() {
                if tx.send(msg.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        for (pattern, subs) in self.patterns.lock().iter() {
            if glob_match(pattern, channel) {
                let msg = Reply::Array(vec![
                    Reply::bulk(Bytes::from_static(b"pmessage")),
                    Reply::bulk(pattern.clone()),
                    Reply::bulk(Bytes::copy_from_slice(channel)),
                    Reply::bulk(Bytes::copy_from_slice(payload)),
                ])
                .to_bytes();
                for tx in subs.values() {
                    if tx.send(msg.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    pub fn channel_count(&self, channel: &[u8]) -> usize {
        self.channels.lock().get(channel).map_or(0, |s| s.len())
    }

    pub fn active_channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        self.channels
            .lock()
            .keys()
            .filter(|c| pattern.map_or(true, |p| glob_match(p, c)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn publish_reaches_exact_and_pattern_subscribers() {
        let ps = PubSub::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        ps.subscribe(Bytes::from("news"), 1, tx1);
        ps.psubscribe(Bytes::from("n*"), 2, tx2);
        let n = ps.publish(b"news", b"hello");
        assert_eq!(n, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn drop_connection_clears_all_subscriptions() {
        let ps = PubSub::new();
        let (tx, _rx) = unbounded_channel();
        ps.subscribe(Bytes::from("a"), 1, tx.clone());
        ps.psubscribe(Bytes::from("a*"), 1, tx);
        ps.drop_connection(1);
        assert_eq!(ps.channel_count(b"a"), 0);
        assert_eq!(ps.publish(b"a", b"x"), 0);
    }
}
