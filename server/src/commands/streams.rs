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

//! The stream engine: `XADD`/`XLEN`/`XRANGE`, and the blocking `XREAD
//! BLOCK`, built on [`crate::blocking`] the same way `BLPOP` is.

use super::{wrong_args, CommandError, CommandResult, ConnState};
use crate::{
    corestore::{
        entry::{Data, Entry},
        stream::StreamId,
    },
    resp::Reply,
    state::AppState,
};
use bytes::Bytes;
use std::time::{Duration, Instant};

/// The key used in the blocking coordinator for stream waiters, kept
/// distinct from a list of the same name so `BLPOP`/`XREAD BLOCK` on
/// identically-named keys never cross-wake each other
fn stream_wait_key(key: &[u8]) -> Bytes {
    let mut v = Vec::with_capacity(key.len() + 7);
    v.extend_from_slice(b"stream:");
    v.extend_from_slice(key);
    Bytes::from(v)
}

pub fn xadd(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 5 || (args.len() - 3) % 2 != 0 {
        return Err(wrong_args("xadd"));
    }
    let id_spec = &args[2];
    let auto_ms = id_spec.as_ref() == b"*";
    let (ms, seq) = if auto_ms {
        (StreamId::now().ms, None)
    } else {
        StreamId::parse(id_spec).ok_or_else(|| CommandError::Err("ERR Invalid stream ID specified as stream command argument".into()))?
    };
    let mut fields = Vec::with_capacity((args.len() - 3) / 2);
    let mut i = 3;
    while i < args.len() {
        fields.push((args[i].clone(), args[i + 1].clone()));
        i += 2;
    }
    let id = state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, &args[1]);
        let entry = ks
            .entry(args[1].clone())
            .or_insert_with(|| Entry::new(Data::Stream(Default::default())));
        let stream = match &mut entry.data {
            Data::Stream(s) => s,
            _ => return Err(CommandError::Wrongtype),
        };
        // `*` self-heals a clock that has gone backwards relative to the
        // stream's own last id, per the auto-generation rule
        let ms = if auto_ms { ms.max(stream.last_id().ms) } else { ms };
        // Reject 0-0 against the id that's actually about to be inserted,
        // after auto-seq resolution — `ms-*` forms resolve their seq the
        // same way `add` does, so checking the pre-resolution `seq`
        // argument alone would miss e.g. `0-*` against an empty stream.
        if !auto_ms && ms == 0 {
            let last = stream.last_id();
            let resolved_seq = match seq {
                Some(s) => s,
                None if last.ms == ms => last.seq + 1,
                None => 0,
            };
            if resolved_seq == 0 {
                return Err(CommandError::Err(
                    "ERR The ID specified in XADD must be greater than 0-0".into(),
                ));
            }
        }
        stream
            .add(ms, seq, fields)
            .ok_or_else(|| CommandError::Err("ERR The ID specified in XADD is equal or smaller than the target stream top item".into()))
    })?;
    state.blocking.notify_many(&stream_wait_key(&args[1]), 1);
    Ok(Reply::bulk(id.to_string()))
}

pub fn xlen(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("xlen"));
    }
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::Integer(0)),
        Some(Data::Stream(s)) => Ok(Reply::Integer(s.len() as i64)),
        Some(_) => Err(CommandError::Wrongtype),
    }
}

fn parse_range_bound(raw: &[u8], default: StreamId) -> Result<StreamId, CommandError> {
    if raw == b"-" {
        return Ok(StreamId::MIN);
    }
    if raw == b"+" {
        return Ok(StreamId::MAX);
    }
    match StreamId::parse(raw) {
        Some((ms, Some(seq))) => Ok(StreamId { ms, seq }),
        Some((ms, None)) => Ok(StreamId { ms, seq: default.seq }),
        None => Err(CommandError::Err("ERR Invalid stream ID specified as stream command argument".into())),
    }
}

pub fn xrange(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 4 {
        return Err(wrong_args("xrange"));
    }
    let start = parse_range_bound(&args[2], StreamId::MIN)?;
    let end = parse_range_bound(&args[3], StreamId::MAX)?;
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::Array(vec![])),
        Some(Data::Stream(s)) => Ok(Reply::Array(
            s.range(start, end)
                .into_iter()
                .map(|(id, fields)| entry_reply(id, fields))
                .collect(),
        )),
        Some(_) => Err(CommandError::Wrongtype),
    }
}

fn entry_reply(id: StreamId, fields: &[(Bytes, Bytes)]) -> Reply {
    let mut flat = Vec::with_capacity(fields.len() * 2);
    for (f, v) in fields {
        flat.push(Reply::bulk(f.clone()));
        flat.push(Reply::bulk(v.clone()));
    }
    Reply::Array(vec![Reply::bulk(id.to_string()), Reply::Array(flat)])
}

/// `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`
///
/// Inside `MULTI`/`EXEC`, `allow_block` is `false` and `BLOCK` is ignored:
/// a transaction never suspends the connection running it.
pub async fn xread(
    state: &AppState,
    conn: &mut ConnState,
    args: &[Bytes],
    allow_block: bool,
) -> CommandResult {
    let mut i = 1;
    let mut block_ms: Option<u64> = None;
    while i < args.len() {
        let upper = args[i].to_ascii_uppercase();
        match upper.as_slice() {
            b"BLOCK" => {
                let ms: u64 = super::arg_utf8(args, i + 1)?
                    .parse()
                    .map_err(|_| CommandError::Err("ERR timeout is not an integer or out of range".into()))?;
                block_ms = Some(ms);
                i += 2;
            }
            b"STREAMS" => {
                i += 1;
                break;
            }
            _ => return Err(CommandError::Err("ERR syntax error".into())),
        }
    }
    let remaining = &args[i..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return Err(CommandError::Err(
            "ERR Unbalanced XREAD list of streams: for each stream key an ID or '$' must be specified.".into(),
        ));
    }
    let n = remaining.len() / 2;
    let keys = &remaining[..n];
    let mut after_ids = Vec::with_capacity(n);
    for (idx, key) in keys.iter().enumerate() {
        let raw = &remaining[n + idx];
        let id = if raw.as_ref() == b"$" {
            state
                .db
                .get_cloned(key)
                .and_then(|d| match d {
                    Data::Stream(s) => Some(s.last_id()),
                    _ => None,
                })
                .unwrap_or(StreamId::MIN)
        } else {
            match StreamId::parse(raw) {
                Some((ms, Some(seq))) => StreamId { ms, seq },
                Some((ms, None)) => StreamId { ms, seq: 0 },
                None => return Err(CommandError::Err("ERR Invalid stream ID specified as stream command argument".into())),
            }
        };
        after_ids.push(id);
    }

    let deadline = if allow_block {
        block_ms.map(|ms| {
            if ms == 0 {
                None
            } else {
                Some(Instant::now() + Duration::from_millis(ms))
            }
        })
    } else {
        None
    };

    loop {
        // `allow_block == false` only when called from inside `EXEC`,
        // which already holds `exec_lock` for the whole batch — taking it
        // again here would deadlock, and a single non-blocking attempt
        // doesn't need it anyway. Otherwise it's held only for this
        // attempt, never across the wait below, so a long/forever
        // `XREAD BLOCK` never stalls every other connection.
        let read = || {
            let mut out = Vec::new();
            for (key, after) in keys.iter().zip(after_ids.iter()) {
                if let Some(Data::Stream(s)) = state.db.get_cloned(key) {
                    let entries = s.after(*after);
                    if !entries.is_empty() {
                        let items: Vec<Reply> = entries
                            .into_iter()
                            .map(|(id, fields)| entry_reply(id, &fields))
                            .collect();
                        out.push(Reply::Array(vec![Reply::bulk(key.clone()), Reply::Array(items)]));
                    }
                }
            }
            out
        };
        let out = if allow_block {
            let _guard = state.exec_lock.lock().await;
            read()
        } else {
            read()
        };
        if !out.is_empty() {
            return Ok(Reply::Array(out));
        }
        let Some(deadline) = deadline else {
            // no BLOCK requested: return immediately with a null reply
            return Ok(Reply::NullArray);
        };
        let wait_keys: Vec<Bytes> = keys.iter().map(|k| stream_wait_key(k)).collect();
        let notify = state.blocking.register_many(&wait_keys);
        let woke = match deadline {
            Some(d) => {
                let left = d.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    state.blocking.cancel_many(&wait_keys, &notify);
                    return Ok(Reply::NullArray);
                }
                tokio::select! {
                    _ = notify.notified() => true,
                    _ = tokio::time::sleep(left) => false,
                    _ = conn.shutdown.recv() => false,
                }
            }
            None => {
                tokio::select! {
                    _ = notify.notified() => true,
                    _ = conn.shutdown.recv() => false,
                }
            }
        };
        state.blocking.cancel_many(&wait_keys, &notify);
        if !woke {
            return Ok(Reply::NullArray);
        }
    }
}
