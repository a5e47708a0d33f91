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

//! The sorted-set engine: `ZADD`/`ZSCORE`/`ZRANK`/`ZRANGE`/`ZREM`/`ZCARD`.

use super::{wrong_args, CommandError, CommandResult};
use crate::{
    corestore::entry::{Data, Entry},
    resp::Reply,
    state::AppState,
};
use bytes::Bytes;

fn parse_score(raw: &[u8]) -> Result<f64, CommandError> {
    let s = std::str::from_utf8(raw).map_err(|_| CommandError::Err("ERR value is not a valid float".into()))?;
    let f: f64 = s
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not a valid float".into()))?;
    if f.is_nan() {
        return Err(CommandError::Err("ERR value is not a valid float".into()));
    }
    Ok(f)
}

pub fn zadd(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 4 || args.len() % 2 != 0 {
        return Err(wrong_args("zadd"));
    }
    let mut pairs = Vec::with_capacity((args.len() - 2) / 2);
    let mut i = 2;
    while i < args.len() {
        let score = parse_score(&args[i])?;
        let member = args[i + 1].clone();
        pairs.push((member, score));
        i += 2;
    }
    let added = state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, &args[1]);
        let entry = ks
            .entry(args[1].clone())
            .or_insert_with(|| Entry::new(Data::Zset(Default::default())));
        let zset = match &mut entry.data {
            Data::Zset(z) => z,
            _ => return Err(CommandError::Wrongtype),
        };
        let mut added = 0i64;
        for (member, score) in pairs {
            if zset.insert(member, score) {
                added += 1;
            }
        }
        Ok(added)
    })?;
    Ok(Reply::Integer(added))
}

pub fn zscore(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("zscore"));
    }
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::NullBulk),
        Some(Data::Zset(z)) => match z.score(&args[2]) {
            Some(score) => Ok(Reply::bulk(format_score(score))),
            None => Ok(Reply::NullBulk),
        },
        Some(_) => Err(CommandError::Wrongtype),
    }
}

pub fn zrank(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("zrank"));
    }
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::NullBulk),
        Some(Data::Zset(z)) => match z.rank(&args[2]) {
            Some(rank) => Ok(Reply::Integer(rank as i64)),
            None => Ok(Reply::NullBulk),
        },
        Some(_) => Err(CommandError::Wrongtype),
    }
}

pub fn zrange(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 4 {
        return Err(wrong_args("zrange"));
    }
    let start: i64 = super::arg_utf8(args, 2)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    let stop: i64 = super::arg_utf8(args, 3)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::Array(vec![])),
        Some(Data::Zset(z)) => {
            let len = z.len();
            if len == 0 {
                return Ok(Reply::Array(vec![]));
            }
            let resolve = |idx: i64| -> i64 {
                if idx < 0 {
                    (len as i64 + idx).max(0)
                } else {
                    idx
                }
            };
            let start = (resolve(start) as usize).min(len);
            let stop = (resolve(stop) as usize).min(len.saturating_sub(1));
            if start > stop {
                return Ok(Reply::Array(vec![]));
            }
            Ok(Reply::Array(
                z.range(start, stop)
                    .into_iter()
                    .map(|(m, _)| Reply::bulk(m))
                    .collect(),
            ))
        }
        Some(_) => Err(CommandError::Wrongtype),
    }
}

pub fn zrem(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 3 {
        return Err(wrong_args("zrem"));
    }
    let removed = state.db.with_keyspace(|ks| {
        crate::corestore::expire_if_needed(ks, &args[1]);
        let Some(entry) = ks.get_mut(args[1].as_ref()) else {
            return Ok(0i64);
        };
        let zset = match &mut entry.data {
            Data::Zset(z) => z,
            _ => return Err(CommandError::Wrongtype),
        };
        let mut removed = 0i64;
        for member in &args[2..] {
            if zset.remove(member) {
                removed += 1;
            }
        }
        let empty = zset.is_empty();
        if empty {
            ks.remove(args[1].as_ref());
        }
        Ok(removed)
    })?;
    Ok(Reply::Integer(removed))
}

pub fn zcard(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("zcard"));
    }
    match state.db.get_cloned(&args[1]) {
        None => Ok(Reply::Integer(0)),
        Some(Data::Zset(z)) => Ok(Reply::Integer(z.len() as i64)),
        Some(_) => Err(CommandError::Wrongtype),
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e17 {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}
