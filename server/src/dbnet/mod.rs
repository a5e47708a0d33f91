/*
 * Created on Sun Aug 21 2022
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2022, Sayan Nandan <ohsayan@outlook.com>
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

//! # Networking
//!
//! Everything to do with accepting TCP connections and driving each one
//! to completion lives here. A connection is two halves: a reader loop
//! parsing [`crate::protocol::Query`]s and feeding them to
//! [`crate::commands::dispatch`], and a writer task draining whatever
//! gets queued on its `push_tx` channel (ordinary replies, pub/sub
//! pushes and replication propagation all go through the same channel,
//! so nothing needs to lock the socket itself).

use std::{cell::Cell, time::Duration};
use tokio::time;

pub use self::listener::connect;

mod connection;
mod listener;
mod tcp;

pub const MAXIMUM_CONNECTION_LIMIT: usize = 50000;

/// A backoff implementation used in the accept loop: a transient
/// `accept()` error waits a little longer each time before giving up.
pub(self) struct NetBackoff {
    c: Cell<u8>,
}

impl NetBackoff {
    const MAX_BACKOFF: u8 = 64;

    pub const fn new() -> Self {
        Self { c: Cell::new(1) }
    }

    pub async fn spin(&self) {
        time::sleep(Duration::from_secs(self.c.get() as _)).await;
        self.c.set(self.c.get() << 1);
    }

    pub fn should_disconnect(&self) -> bool {
        self.c.get() > Self::MAX_BACKOFF
    }
}
