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

//! The handles every connection task shares, bundled up so that
//! constructing a [`crate::dbnet::connection::ConnectionHandler`] doesn't
//! need a growing argument list every time a new subsystem is added.

use crate::{
    blocking::BlockingCoordinator, corestore::Corestore, pubsub::PubSub,
    replication::ReplicationState,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Clone)]
pub struct AppState {
    pub db: Corestore,
    pub blocking: Arc<BlockingCoordinator>,
    pub pubsub: Arc<PubSub>,
    pub repl: Arc<ReplicationState>,
    /// the port this server itself listens on, reported to a master via
    /// `REPLCONF listening-port` during the replica handshake
    pub listening_port: u16,
    /// served verbatim by `CONFIG GET dir`/`CONFIG GET dbfilename`
    pub dir: Arc<str>,
    pub dbfilename: Arc<str>,
    conn_id_gen: Arc<AtomicU64>,
    /// Serializes a `MULTI`/`EXEC` batch against every other top-level
    /// command on every other connection, so the batch appears atomic.
    /// Held for the whole batch by `EXEC`, and briefly by every
    /// single-command dispatch and by each non-blocking attempt a
    /// blocking command makes, so nothing can interleave a keyspace
    /// mutation in the middle of somebody else's batch. Never held
    /// across a blocking command's wait for [`crate::blocking::BlockingCoordinator`]
    /// to avoid stalling every other connection on this server.
    pub exec_lock: Arc<AsyncMutex<()>>,
}

impl AppState {
    pub fn new(
        db: Corestore,
        replid: String,
        listening_port: u16,
        dir: String,
        dbfilename: String,
    ) -> Self {
        Self {
            db,
            blocking: Arc::new(BlockingCoordinator::new()),
            pubsub: Arc::new(PubSub::new()),
            repl: Arc::new(ReplicationState::new(replid)),
            listening_port,
            dir: dir.into(),
            dbfilename: dbfilename.into(),
            conn_id_gen: Arc::new(AtomicU64::new(1)),
            exec_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn next_conn_id(&self) -> u64 {
        self.conn_id_gen.fetch_add(1, Ordering::Relaxed)
    }
}
