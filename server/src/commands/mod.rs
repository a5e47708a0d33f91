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

//! # Command dispatch
//!
//! [`dispatch`] is the single entry point every connection task calls
//! once it has parsed a [`Query`] off the wire. It is also the one place
//! that knows about `MULTI` queuing: while a connection is in a
//! transaction, every command except the small set that control the
//! transaction itself is appended to the queue and answered with
//! `+QUEUED` rather than executed.

pub mod generic;
pub mod lists;
pub mod pubsubcmd;
pub mod replicationcmd;
pub mod streams;
pub mod strings;
pub mod txncmd;
pub mod zsets;

use crate::{protocol::Query, pubsub::ConnId, resp::Reply, state::AppState, txn::TxnState};
use bytes::Bytes;
use std::collections::HashSet;
use tokio::sync::{broadcast, mpsc::UnboundedSender};

#[derive(Debug, Clone)]
pub enum CommandError {
    /// a type that doesn't support the requested operation was found at the key
    Wrongtype,
    /// a syntax, arity or semantic error, reported verbatim as a RESP error
    Err(String),
}

impl CommandError {
    pub fn into_reply(self) -> Reply {
        match self {
            CommandError::Wrongtype => Reply::Error(
                "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
            ),
            CommandError::Err(e) => Reply::Error(e),
        }
    }
}

pub type CommandResult = Result<Reply, CommandError>;

/// Per-connection state that outlives any single command: the
/// connection's id (used to key pub/sub and replica registries), its
/// transaction queue, and whether this link has been promoted to a
/// replica data channel by `PSYNC`.
pub struct ConnState {
    pub id: ConnId,
    pub txn: TxnState,
    pub push_tx: UnboundedSender<Bytes>,
    pub is_replica_link: bool,
    pub shutdown: broadcast::Receiver<()>,
    /// the channels and patterns this connection currently holds a
    /// subscription to; while non-empty, §4.7 restricts it to pub/sub
    /// and connection-control commands only
    pub channels: HashSet<Bytes>,
    pub patterns: HashSet<Bytes>,
}

impl ConnState {
    pub fn new(id: ConnId, push_tx: UnboundedSender<Bytes>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            id,
            txn: TxnState::new(),
            push_tx,
            is_replica_link: false,
            shutdown,
            channels: HashSet::new(),
            patterns: HashSet::new(),
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

/// Commands that control transactions and must never themselves be
/// queued by `MULTI`
fn is_txn_control(name: &[u8]) -> bool {
    matches!(name, b"MULTI" | b"EXEC" | b"DISCARD" | b"WATCH")
}

/// Whether a write command's effects should be propagated to replicas.
/// Read-only and connection/transaction-control commands never are.
pub fn is_write_command(name: &[u8]) -> bool {
    matches!(
        name,
        b"SET" | b"DEL" | b"EXPIRE" | b"PERSIST" | b"FLUSHALL" | b"INCR" | b"INCRBY"
            | b"RPUSH" | b"LPUSH" | b"LPOP" | b"RPOP"
            | b"XADD"
            | b"ZADD" | b"ZREM"
    )
}

/// While a connection has at least one active subscription, only these
/// commands are permitted (spec §4.7); everything else is rejected so a
/// subscriber can't accidentally run normal commands on a socket that's
/// about to receive interleaved `message` pushes.
fn is_allowed_while_subscribed(name: &[u8]) -> bool {
    matches!(
        name,
        b"SUBSCRIBE" | b"UNSUBSCRIBE" | b"PSUBSCRIBE" | b"PUNSUBSCRIBE" | b"PING" | b"QUIT"
    )
}

/// Commands that may suspend the connection for a while — waiting on
/// [`crate::blocking::BlockingCoordinator`], or (for `WAIT`) on replica
/// acks — and so must never hold `exec_lock` across that wait. `WAIT`
/// never touches the keyspace at all, so it needs no locking of its own.
fn is_blocking_command(name: &[u8]) -> bool {
    matches!(name, b"BLPOP" | b"BRPOP" | b"XREAD" | b"WAIT")
}

/// Checks a queued command's arity (and the few structural syntax rules
/// cheap to verify without touching the keyspace, e.g. `XADD`'s paired
/// field/value count) against what its handler would itself reject,
/// without running it. `MULTI` must catch these at queue time so the
/// whole batch gets `EXECABORT`'d (spec's "syntax errors before queueing
/// set error_sticky") rather than only failing the one bad command deep
/// inside an otherwise-successful `EXEC`.
fn validate_for_queue(name: &[u8], args: &[Bytes]) -> Result<(), CommandError> {
    let n = args.len();
    let ok = match name {
        b"ECHO" | b"SELECT" | b"TYPE" | b"KEYS" | b"GET" | b"INCR" | b"LLEN" | b"XLEN" | b"ZCARD" | b"PERSIST" | b"TTL" => n == 2,
        b"EXISTS" | b"DEL" => n >= 2,
        b"EXPIRE" | b"INCRBY" | b"ZSCORE" | b"ZRANK" => n == 3,
        b"CONFIG" => n == 3,
        b"LRANGE" | b"XRANGE" | b"ZRANGE" => n == 4,
        b"FLUSHALL" | b"DBSIZE" | b"INFO" => n == 1,
        b"SET" => n >= 3,
        b"RPUSH" | b"LPUSH" | b"BLPOP" | b"BRPOP" | b"ZREM" => n >= 3,
        b"LPOP" | b"RPOP" => n == 2 || n == 3,
        b"XADD" => n >= 5 && (n - 3) % 2 == 0,
        b"ZADD" => n >= 4 && n % 2 == 0,
        b"XREAD" => n >= 4,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(wrong_args(&String::from_utf8_lossy(name).to_ascii_lowercase()))
    }
}

pub async fn dispatch(state: &AppState, conn: &mut ConnState, query: Query) -> Reply {
    let Some(name) = query.command_name() else {
        return Reply::Error("ERR empty command".into());
    };

    if conn.subscription_count() > 0 && !is_allowed_while_subscribed(&name) {
        return Reply::Error(format!(
            "ERR Can't execute '{}': only (P|S)SUBSCRIBE / (P|S)UNSUBSCRIBE / PING / QUIT are allowed in this context",
            String::from_utf8_lossy(&name).to_ascii_lowercase()
        ));
    }

    if conn.txn.is_active() && !is_txn_control(&name) {
        if !generic::is_known_command(&name) {
            conn.txn.mark_dirty();
            return Reply::Error(format!("ERR unknown command '{}'", String::from_utf8_lossy(&name)));
        }
        if let Err(e) = validate_for_queue(&name, query.args()) {
            conn.txn.mark_dirty();
            return e.into_reply();
        }
        conn.txn.queue(query);
        return Reply::Simple("QUEUED");
    }

    // `BLPOP`/`BRPOP`/`XREAD BLOCK`/`WAIT` manage `exec_lock` themselves
    // (or don't need it at all), and `EXEC` takes it once for its whole
    // batch inside `txncmd::exec` — so none of those are wrapped here,
    // else the second lock attempt would deadlock against itself.
    let result = if is_blocking_command(&name) || name == b"EXEC" {
        run_command(state, conn, &name, &query, true).await
    } else {
        let _guard = state.exec_lock.lock().await;
        run_command(state, conn, &name, &query, true).await
    };
    let reply = match result {
        Ok(r) => r,
        Err(e) => e.into_reply(),
    };
    if !matches!(reply, Reply::Error(_)) && is_write_command(&name) {
        state.repl.propagate(query.args());
    }
    reply
}

/// `allow_block` is `false` when running inside `EXEC`: blocking commands
/// degrade to a single non-blocking attempt rather than suspending the
/// connection mid-transaction.
pub(crate) async fn run_command(
    state: &AppState,
    conn: &mut ConnState,
    name: &[u8],
    query: &Query,
    allow_block: bool,
) -> CommandResult {
    let args = query.args();
    match name {
        b"PING" => Ok(generic::ping(args)),
        b"ECHO" => generic::echo(args),
        b"SELECT" => generic::select(args),
        b"TYPE" => Ok(generic::type_cmd(state, args)),
        b"KEYS" => generic::keys(state, args),
        b"EXISTS" => generic::exists(state, args),
        b"DEL" => generic::del(state, args),
        b"EXPIRE" => generic::expire(state, args),
        b"PERSIST" => generic::persist(state, args),
        b"TTL" => generic::ttl(state, args),
        b"FLUSHALL" => Ok(generic::flushall(state)),
        b"DBSIZE" => Ok(generic::dbsize(state)),
        b"INFO" => Ok(generic::info(state)),
        b"CONFIG" => generic::config_get(state, args),

        b"SET" => strings::set(state, args),
        b"GET" => strings::get(state, args),
        b"INCR" => strings::incr(state, args),
        b"INCRBY" => strings::incrby(state, args),

        b"RPUSH" => lists::rpush(state, args),
        b"LPUSH" => lists::lpush(state, args),
        b"LPOP" => lists::lpop(state, args),
        b"RPOP" => lists::rpop(state, args),
        b"LLEN" => lists::llen(state, args),
        b"LRANGE" => lists::lrange(state, args),
        b"BLPOP" => lists::blpop(state, conn, args, true, allow_block).await,
        b"BRPOP" => lists::blpop(state, conn, args, false, allow_block).await,

        b"XADD" => streams::xadd(state, args),
        b"XLEN" => streams::xlen(state, args),
        b"XRANGE" => streams::xrange(state, args),
        b"XREAD" => streams::xread(state, conn, args, allow_block).await,

        b"ZADD" => zsets::zadd(state, args),
        b"ZSCORE" => zsets::zscore(state, args),
        b"ZRANK" => zsets::zrank(state, args),
        b"ZRANGE" => zsets::zrange(state, args),
        b"ZREM" => zsets::zrem(state, args),
        b"ZCARD" => zsets::zcard(state, args),

        b"MULTI" => Ok(txncmd::multi(conn)),
        b"EXEC" => Ok(txncmd::exec(state, conn).await),
        b"DISCARD" => Ok(txncmd::discard(conn)),

        b"SUBSCRIBE" => pubsubcmd::subscribe(state, conn, args),
        b"UNSUBSCRIBE" => pubsubcmd::unsubscribe(state, conn, args),
        b"PSUBSCRIBE" => pubsubcmd::psubscribe(state, conn, args),
        b"PUNSUBSCRIBE" => pubsubcmd::punsubscribe(state, conn, args),
        b"PUBLISH" => pubsubcmd::publish(state, args),

        b"REPLICAOF" | b"SLAVEOF" => replicationcmd::replicaof(state, args),
        b"REPLCONF" => replicationcmd::replconf(state, conn, args),
        b"PSYNC" => replicationcmd::psync(state, conn, args),
        b"WAIT" => replicationcmd::wait(state, args).await,

        _ => Err(CommandError::Err(format!(
            "ERR unknown command '{}'",
            String::from_utf8_lossy(name)
        ))),
    }
}

/// Reads argument `i` as a UTF-8 string, for commands where a non-UTF-8
/// argument is itself a syntax error (channel/pattern/key names are
/// treated as opaque bytes instead and never go through this)
pub(crate) fn arg_utf8<'a>(args: &'a [Bytes], i: usize) -> Result<&'a str, CommandError> {
    std::str::from_utf8(&args[i]).map_err(|_| CommandError::Err("ERR invalid UTF-8".into()))
}

pub(crate) fn wrong_args(name: &str) -> CommandError {
    CommandError::Err(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}
