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

//! The list engine: `RPUSH`/`LPUSH`/`LPOP`/`RPOP`/`LLEN`/`LRANGE`, plus
//! the blocking `BLPOP`/`BRPOP` built on [`crate::blocking`].

use super::{wrong_args, CommandError, CommandResult, ConnState};
use crate::{
    corestore::entry::{Data, Entry},
    resp::Reply,
    state::AppState,
};
use bytes::Bytes;
use std::time::{Duration, Instant};

fn push(state: &AppState, key: &[u8], values: &[Bytes], front: bool) -> CommandResult {
    let len = state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, key);
        let entry = ks
            .entry(Bytes::copy_from_slice(key))
            .or_insert_with(|| Entry::new(Data::List(Default::default())));
        let list = match &mut entry.data {
            Data::List(l) => l,
            _ => return Err(CommandError::Wrongtype),
        };
        for v in values {
            if front {
                list.push_front(v.clone());
            } else {
                list.push_back(v.clone());
            }
        }
        // Hand newly-available elements directly to any already-queued
        // `BLPOP`/`BRPOP` waiters, in the same critical section as the
        // push, per spec's result-slot handoff protocol — see
        // `blocking::BlockingCoordinator::serve_pops`.
        state.blocking.serve_pops(key, |want_front| {
            if want_front {
                list.pop_front()
            } else {
                list.pop_back()
            }
        });
        let len = list.len();
        if list.is_empty() {
            ks.remove(key);
        }
        Ok(len)
    })?;
    Ok(Reply::Integer(len as i64))
}

pub fn rpush(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 3 {
        return Err(wrong_args("rpush"));
    }
    push(state, &args[1], &args[2..], false)
}

pub fn lpush(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 3 {
        return Err(wrong_args("lpush"));
    }
    push(state, &args[1], &args[2..], true)
}

fn pop_one(state: &AppState, key: &[u8], front: bool) -> Result<Option<Bytes>, CommandError> {
    state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, key);
        let Some(entry) = ks.get_mut(key) else {
            return Ok(None);
        };
        let list = match &mut entry.data {
            Data::List(l) => l,
            _ => return Err(CommandError::Wrongtype),
        };
        let popped = if front { list.pop_front() } else { list.pop_back() };
        if list.is_empty() {
            ks.remove(key);
        }
        Ok(popped)
    })
}

fn pop_count(state: &AppState, key: &[u8], front: bool, count: usize) -> Result<Vec<Bytes>, CommandError> {
    state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, key);
        let Some(entry) = ks.get_mut(key) else {
            return Ok(Vec::new());
        };
        let list = match &mut entry.data {
            Data::List(l) => l,
            _ => return Err(CommandError::Wrongtype),
        };
        let mut out = Vec::with_capacity(count.min(list.len()));
        for _ in 0..count {
            match if front { list.pop_front() } else { list.pop_back() } {
                Some(v) => out.push(v),
                None => break,
            }
        }
        if list.is_empty() {
            ks.remove(key);
        }
        Ok(out)
    })
}

/// `LPOP key [count]`: with no count, bulk reply (or null if the list is
/// absent). With a count, always an array — empty if the list is absent.
pub fn lpop(state: &AppState, args: &[Bytes]) -> CommandResult {
    pop_cmd(state, args, "lpop", true)
}

/// `RPOP key [count]`, the mirror of [`lpop`].
pub fn rpop(state: &AppState, args: &[Bytes]) -> CommandResult {
    pop_cmd(state, args, "rpop", false)
}

fn pop_cmd(state: &AppState, args: &[Bytes], name: &'static str, front: bool) -> CommandResult {
    if args.len() < 2 || args.len() > 3 {
        return Err(wrong_args(name));
    }
    if args.len() == 2 {
        return match pop_one(state, &args[1], front)? {
            Some(v) => Ok(Reply::Bulk(v)),
            None => Ok(Reply::NullBulk),
        };
    }
    let count: i64 = super::arg_utf8(args, 2)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is out of range, must be positive".into()))?;
    if count < 0 {
        return Err(CommandError::Err("ERR value is out of range, must be positive".into()));
    }
    let popped = pop_count(state, &args[1], front, count as usize)?;
    Ok(Reply::Array(popped.into_iter().map(Reply::bulk).collect()))
}

pub fn llen(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("llen"));
    }
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::Integer(0)),
        Some(Data::List(l)) => Ok(Reply::Integer(l.len() as i64)),
        Some(_) => Err(CommandError::Wrongtype),
    }
}

/// Resolves a possibly-negative Redis-style index against `len`
fn resolve_index(idx: i64, len: usize) -> usize {
    if idx < 0 {
        (len as i64 + idx).max(0) as usize
    } else {
        idx as usize
    }
}

pub fn lrange(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 4 {
        return Err(wrong_args("lrange"));
    }
    let start: i64 = super::arg_utf8(args, 2)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    let stop: i64 = super::arg_utf8(args, 3)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::Array(vec![])),
        Some(Data::List(l)) => {
            let len = l.len();
            let start = resolve_index(start, len).min(len);
            let stop = resolve_index(stop, len).min(len.saturating_sub(1));
            if start > stop || len == 0 {
                return Ok(Reply::Array(vec![]));
            }
            Ok(Reply::Array(
                l.iter()
                    .skip(start)
                    .take(stop - start + 1)
                    .map(|v| Reply::bulk(v.clone()))
                    .collect(),
            ))
        }
        Some(_) => Err(CommandError::Wrongtype),
    }
}

/// `BLPOP`/`BRPOP key [key ...] timeout`: blocks on the first of any of
/// the given keys to have an element available, in FIFO order against
/// other blocked callers on the same key.
///
/// Inside `MULTI`/`EXEC`, `allow_block` is `false` and this degrades to a
/// single non-blocking attempt, matching Redis: a transaction can never
/// suspend the connection it's running on.
pub async fn blpop(
    state: &AppState,
    conn: &mut ConnState,
    args: &[Bytes],
    front: bool,
    allow_block: bool,
) -> CommandResult {
    if args.len() < 3 {
        return Err(wrong_args(if front { "blpop" } else { "brpop" }));
    }
    let keys: Vec<Bytes> = args[1..args.len() - 1].to_vec();
    let timeout_secs: f64 = super::arg_utf8(args, args.len() - 1)?
        .parse()
        .map_err(|_| CommandError::Err("ERR timeout is not a float or out of range".into()))?;
    if timeout_secs < 0.0 {
        return Err(CommandError::Err("ERR timeout is negative".into()));
    }
    if !allow_block {
        // Called only from inside `EXEC`, which already holds `exec_lock`
        // for the whole batch — taking it again here would deadlock.
        for key in &keys {
            if let Some(v) = pop_one(state, key, front)? {
                return Ok(Reply::Array(vec![Reply::bulk(key.clone()), Reply::bulk(v)]));
            }
        }
        return Ok(Reply::NullArray);
    }
    let deadline = if timeout_secs == 0.0 {
        None
    } else {
        Some(Instant::now() + Duration::from_secs_f64(timeout_secs))
    };

    {
        // Held only for this attempt, never across the wait below, so a
        // long/forever `BLPOP` never stalls every other connection.
        let _guard = state.exec_lock.lock().await;
        for key in &keys {
            if let Some(v) = pop_one(state, key, front)? {
                return Ok(Reply::Array(vec![Reply::bulk(key.clone()), Reply::bulk(v)]));
            }
        }
    }

    // Registered once and held for the rest of this call: a pusher on any
    // connection fills `waiter`'s result slot directly (under its own
    // keyspace-mutex critical section) rather than just waking us to race
    // a fresh pop — see `blocking::BlockingCoordinator::serve_pops`. A
    // spurious wake with the slot still empty just means loop and wait
    // again on the very same registration, per spec's protocol.
    let waiter = state.blocking.register_pop_waiter(&keys, front);
    loop {
        let woke = match deadline {
            Some(d) => {
                let remaining = d.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                tokio::select! {
                    _ = waiter.notified() => true,
                    _ = tokio::time::sleep(remaining) => false,
                    _ = conn.shutdown.recv() => false,
                }
            }
            None => {
                tokio::select! {
                    _ = waiter.notified() => true,
                    _ = conn.shutdown.recv() => false,
                }
            }
        };
        if !woke {
            break;
        }
        if let Some((key, value)) = waiter.take_value() {
            return Ok(Reply::Array(vec![Reply::bulk(key), Reply::bulk(value)]));
        }
        // spurious wake, slot still empty: loop back and wait again
    }
    match state.blocking.cancel_pop_waiter(&keys, &waiter) {
        Some((key, value)) => Ok(Reply::Array(vec![Reply::bulk(key), Reply::bulk(value)])),
        None => Ok(Reply::NullArray),
    }
}
