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

//! The string engine: `SET`/`GET`, with `SET`'s optional `EX`/`PX` expiry.

use super::{wrong_args, CommandError, CommandResult};
use crate::{corestore::entry::Data, resp::Reply, state::AppState};
use bytes::Bytes;
use std::time::Duration;

pub fn set(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 3 {
        return Err(wrong_args("set"));
    }
    let key = args[1].clone();
    let value = args[2].clone();
    let mut ttl: Option<Duration> = None;
    let mut i = 3;
    while i < args.len() {
        let opt = args[i].to_ascii_uppercase();
        match opt.as_slice() {
            b"EX" | b"PX" => {
                if ttl.is_some() {
                    // EX/PX are mutually exclusive, and either may appear
                    // only once
                    return Err(CommandError::Err("ERR syntax error".into()));
                }
                let raw = args
                    .get(i + 1)
                    .ok_or_else(|| CommandError::Err("ERR syntax error".into()))?;
                let n: u64 = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| CommandError::Err("ERR value is not an integer or out of range".into()))?;
                ttl = Some(if opt == b"EX" {
                    Duration::from_secs(n)
                } else {
                    Duration::from_millis(n)
                });
                i += 2;
            }
            _ => return Err(CommandError::Err("ERR syntax error".into())),
        }
    }
    state.db.set_string(key.clone(), value);
    if let Some(ttl) = ttl {
        state.db.set_expiry(&key, ttl);
    }
    Ok(Reply::ok())
}

pub fn get(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("get"));
    }
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::NullBulk),
        Some(Data::Str(s)) => Ok(Reply::Bulk(s)),
        Some(_) => Err(CommandError::Wrongtype),
    }
}

fn incr_by(state: &AppState, key: &[u8], delta: i64) -> CommandResult {
    state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, key);
        let entry = ks
            .entry(Bytes::copy_from_slice(key))
            .or_insert_with(|| crate::corestore::entry::Entry::new(Data::Str(Bytes::from_static(b"0"))));
        let current = match &entry.data {
            Data::Str(s) => s,
            _ => return Err(CommandError::Wrongtype),
        };
        let parsed: i64 = std::str::from_utf8(current)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CommandError::Err("ERR value is not an integer or out of range".into()))?;
        let next = parsed
            .checked_add(delta)
            .ok_or_else(|| CommandError::Err("ERR increment or decrement would overflow".into()))?;
        entry.data = Data::Str(Bytes::from(next.to_string()));
        Ok(Reply::Integer(next))
    })
}

pub fn incr(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("incr"));
    }
    incr_by(state, &args[1], 1)
}

pub fn incrby(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("incrby"));
    }
    let delta: i64 = super::arg_utf8(args, 2)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    incr_by(state, &args[1], delta)
}
