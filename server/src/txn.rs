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

//! # Per-connection transaction state
//!
//! `MULTI` flips a connection into queuing mode: every subsequent command
//! is appended to the queue and answered with `+QUEUED` instead of being
//! run, until `EXEC` or `DISCARD` (which drops it). `EXEC` holds
//! [`crate::state::AppState::exec_lock`] for the whole queue, the same
//! lock every other top-level command takes for its own duration, so no
//! other connection's command can interleave a keyspace mutation in the
//! middle of the batch: it appears to run atomically. Blocking commands
//! never block while queued this way: `EXEC` runs them with blocking
//! disabled, so a transaction can't suspend the connection that's
//! running it (and couldn't anyway, since it's holding `exec_lock` at the
//! time). A command that fails to even parse into a known,
//! correctly-aritied command while queuing marks the transaction dirty,
//! so that `EXEC` aborts the whole batch with `EXECABORT` rather than
//! partially applying it.

use crate::protocol::Query;

#[derive(Default)]
pub struct TxnState {
    queue: Vec<Query>,
    dirty: bool,
    active: bool,
}

impl TxnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn begin(&mut self) {
        self.active = true;
        self.dirty = false;
        self.queue.clear();
    }

    pub fn queue(&mut self, q: Query) {
        self.queue.push(q);
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Ends the transaction, handing back the queued commands for
    /// execution (or an empty vec if it was never begun)
    pub fn take(&mut self) -> Vec<Query> {
        self.active = false;
        self.dirty = false;
        std::mem::take(&mut self.queue)
    }

    pub fn discard(&mut self) {
        self.active = false;
        self.dirty = false;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn queues_until_exec() {
        let mut txn = TxnState::new();
        txn.begin();
        assert!(txn.is_active());
        txn.queue(Query::new(vec![Bytes::from("SET")]));
        txn.queue(Query::new(vec![Bytes::from("GET")]));
        let cmds = txn.take();
        assert_eq!(cmds.len(), 2);
        assert!(!txn.is_active());
    }

    #[test]
    fn dirty_flag_survives_until_taken() {
        let mut txn = TxnState::new();
        txn.begin();
        txn.mark_dirty();
        assert!(txn.is_dirty());
        txn.take();
        assert!(!txn.is_dirty());
    }

    #[test]
    fn discard_drops_queue() {
        let mut txn = TxnState::new();
        txn.begin();
        txn.queue(Query::new(vec![Bytes::from("SET")]));
        txn.discard();
        assert!(!txn.is_active());
        assert_eq!(txn.take().len(), 0);
    }
}
