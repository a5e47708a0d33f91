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

//! # Replication
//!
//! A master tracks a monotonic `master_repl_offset`: the number of wire
//! bytes of write commands it has ever propagated. Every connected
//! replica gets those same bytes pushed down its own writer-task channel
//! (so propagation interleaves safely with any other traffic queued for
//! that socket) and periodically reports back how much of the stream it
//! has applied via `REPLCONF ACK <offset>`. `WAIT numreplicas timeout_ms`
//! blocks the caller until at least `numreplicas` have acknowledged the
//! offset current at the time `WAIT` was issued, or until the timeout
//! elapses.
//!
//! This module only tracks book-keeping. Forming the actual master link
//! and applying the inbound stream on a replica is [`client::run_replica_link`].

pub mod client;

use crate::{pubsub::ConnId, resp::encode_command};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc::UnboundedSender, Notify};

#[derive(Debug, Clone)]
pub enum Role {
    Master,
    Replica { host: String, port: u16 },
}

struct ReplicaHandle {
    tx: UnboundedSender<Bytes>,
    ack_offset: Arc<AtomicU64>,
}

pub struct ReplicationState {
    pub replid: String,
    role: Mutex<Role>,
    master_repl_offset: AtomicU64,
    replicas: Mutex<HashMap<ConnId, ReplicaHandle>>,
    ack_notify: Notify,
    replica_link: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ReplicationState {
    pub fn new(replid: String) -> Self {
        Self {
            replid,
            role: Mutex::new(Role::Master),
            master_repl_offset: AtomicU64::new(0),
            replicas: Mutex::new(HashMap::new()),
            ack_notify: Notify::new(),
            replica_link: Mutex::new(None),
        }
    }

    pub fn role(&self) -> Role {
        self.role.lock().clone()
    }

    pub fn set_role(&self, role: Role) {
        *self.role.lock() = role;
    }

    /// Records the task driving the outbound link to our master, so a
    /// later `REPLICAOF` can tear down the old link before starting a
    /// new one
    pub fn set_replica_task(&self, handle: tokio::task::JoinHandle<()>) {
        let mut guard = self.replica_link.lock();
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(handle);
    }

    /// Stops any outbound link to a master (used by `REPLICAOF NO ONE`
    /// and before establishing a new one)
    pub fn stop_replica_link(&self) {
        if let Some(old) = self.replica_link.lock().take() {
            old.abort();
        }
    }

    pub fn is_replica(&self) -> bool {
        matches!(*self.role.lock(), Role::Replica { .. })
    }

    pub fn offset(&self) -> u64 {
        self.master_repl_offset.load(Ordering::SeqCst)
    }

    pub fn set_offset(&self, offset: u64) {
        self.master_repl_offset.store(offset, Ordering::SeqCst);
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().len()
    }

    pub fn register_replica(&self, id: ConnId, tx: UnboundedSender<Bytes>) -> Arc<AtomicU64> {
        let ack_offset = Arc::new(AtomicU64::new(self.offset()));
        self.replicas.lock().insert(
            id,
            ReplicaHandle {
                tx,
                ack_offset: ack_offset.clone(),
            },
        );
        ack_offset
    }

    pub fn unregister_replica(&self, id: ConnId) {
        self.replicas.lock().remove(&id);
    }

    pub fn record_ack(&self, id: ConnId, offset: u64) {
        if let Some(handle) = self.replicas.lock().get(&id) {
            handle.ack_offset.store(offset, Ordering::SeqCst);
        }
        self.ack_notify.notify_waiters();
    }

    fn acked_count(&self, target: u64) -> usize {
        self.replicas
            .lock()
            .values()
            .filter(|h| h.ack_offset.load(Ordering::SeqCst) >= target)
            .count()
    }

    /// Propagates one already-dispatched write command to every connected
    /// replica and advances the master offset by the number of wire bytes
    /// sent. Returns the new offset.
    pub fn propagate(&self, args: &[Bytes]) -> u64 {
        let encoded = encode_command(args);
        self.master_repl_offset
            .fetch_add(encoded.len() as u64, Ordering::SeqCst);
        let guard = self.replicas.lock();
        for handle in guard.values() {
            let _ = handle.tx.send(encoded.clone());
        }
        self.offset()
    }

    /// Sends `REPLCONF GETACK *` to every replica to prompt a fresh ack
    pub fn request_acks(&self) {
        let getack = encode_command(&[Bytes::from("REPLCONF"), Bytes::from("GETACK"), Bytes::from("*")]);
        self.master_repl_offset
            .fetch_add(getack.len() as u64, Ordering::SeqCst);
        let guard = self.replicas.lock();
        for handle in guard.values() {
            let _ = handle.tx.send(getack.clone());
        }
    }

    /// Blocks until at least `numreplicas` have acked the offset current
    /// when this call began, or `timeout` elapses. Returns how many had
    /// acked by the time it returned.
    pub async fn wait(&self, numreplicas: usize, timeout: Duration) -> usize {
        let target = self.offset();
        if self.acked_count(target) >= numreplicas {
            return self.acked_count(target);
        }
        self.request_acks();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let acked = self.acked_count(target);
            if acked >= numreplicas {
                return acked;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return acked;
            }
            let _ = tokio::time::timeout(remaining, self.ack_notify.notified()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn propagate_advances_offset_and_fans_out() {
        let repl = ReplicationState::new("a".repeat(40));
        let (tx, mut rx) = unbounded_channel();
        repl.register_replica(1, tx);
        let before = repl.offset();
        let args = vec![Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")];
        let after = repl.propagate(&args);
        assert!(after > before);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_satisfied() {
        let repl = ReplicationState::new("a".repeat(40));
        let (tx, _rx) = unbounded_channel();
        let ack = repl.register_replica(1, tx);
        ack.store(repl.offset(), Ordering::SeqCst);
        let n = repl.wait(1, Duration::from_millis(50)).await;
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn wait_times_out_when_nobody_acks() {
        let repl = ReplicationState::new("a".repeat(40));
        let (tx, _rx) = unbounded_channel();
        repl.register_replica(1, tx);
        repl.propagate(&[Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")]);
        let n = repl.wait(1, Duration::from_millis(20)).await;
        assert_eq!(n, 0);
    }
}
