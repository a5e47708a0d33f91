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

//! `MULTI`/`EXEC`/`DISCARD`. Queuing itself happens in [`super::dispatch`];
//! this module only handles the three control commands.

use super::{is_write_command, ConnState};
use crate::{resp::Reply, state::AppState};

pub fn multi(conn: &mut ConnState) -> Reply {
    if conn.txn.is_active() {
        return Reply::Error("ERR MULTI calls can not be nested".into());
    }
    conn.txn.begin();
    Reply::ok()
}

pub fn discard(conn: &mut ConnState) -> Reply {
    if !conn.txn.is_active() {
        return Reply::Error("ERR DISCARD without MULTI".into());
    }
    conn.txn.discard();
    Reply::ok()
}

pub async fn exec(state: &AppState, conn: &mut ConnState) -> Reply {
    if !conn.txn.is_active() {
        return Reply::Error("ERR EXEC without MULTI".into());
    }
    if conn.txn.is_dirty() {
        conn.txn.take();
        return Reply::Error(
            "EXECABORT Transaction discarded because of previous errors.".into(),
        );
    }
    let queued = conn.txn.take();
    let mut results = Vec::with_capacity(queued.len());
    // Held for the whole batch: every other connection's top-level
    // command (and every blocking command's non-blocking retry) takes
    // the same lock, so nothing can interleave a keyspace mutation
    // between two commands of this transaction.
    let _guard = state.exec_lock.lock().await;
    for query in queued {
        let Some(name) = query.command_name() else {
            results.push(Reply::Error("ERR empty command".into()));
            continue;
        };
        let reply = match super::run_command(state, conn, &name, &query, false).await {
            Ok(r) => r,
            Err(e) => e.into_reply(),
        };
        if !matches!(reply, Reply::Error(_)) && is_write_command(&name) {
            state.repl.propagate(query.args());
        }
        results.push(reply);
    }
    Reply::Array(results)
}
