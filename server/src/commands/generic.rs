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

//! Connection-level and keyspace-generic commands: `PING`, `KEYS`,
//! `EXISTS`, `DEL`, `EXPIRE`, `TTL`, `TYPE`, `FLUSHALL`, `DBSIZE`, `INFO`.

use super::{wrong_args, CommandError, CommandResult};
use crate::{corestore::entry::Data, resp::Reply, state::AppState};
use bytes::Bytes;
use std::time::Duration;

pub fn is_known_command(name: &[u8]) -> bool {
    matches!(
        name,
        b"PING" | b"ECHO" | b"SELECT" | b"TYPE" | b"KEYS" | b"EXISTS" | b"DEL" | b"EXPIRE"
            | b"PERSIST" | b"TTL" | b"FLUSHALL" | b"DBSIZE" | b"INFO" | b"CONFIG"
            | b"SET" | b"GET" | b"INCR" | b"INCRBY"
            | b"RPUSH" | b"LPUSH" | b"LPOP" | b"RPOP" | b"LLEN" | b"LRANGE" | b"BLPOP" | b"BRPOP"
            | b"XADD" | b"XLEN" | b"XRANGE" | b"XREAD"
            | b"ZADD" | b"ZSCORE" | b"ZRANK" | b"ZRANGE" | b"ZREM" | b"ZCARD"
            | b"SUBSCRIBE" | b"UNSUBSCRIBE" | b"PSUBSCRIBE" | b"PUNSUBSCRIBE" | b"PUBLISH"
            | b"REPLICAOF" | b"SLAVEOF" | b"REPLCONF" | b"PSYNC" | b"WAIT"
    )
}

pub fn ping(args: &[Bytes]) -> Reply {
    match args.len() {
        1 => Reply::Simple("PONG"),
        2 => Reply::bulk(args[1].clone()),
        _ => wrong_args("ping").into_reply(),
    }
}

pub fn echo(args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("echo"));
    }
    Ok(Reply::bulk(args[1].clone()))
}

/// Only database 0 exists: the system has a single keyspace, so `SELECT
/// 0` is the only index ever accepted.
pub fn select(args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("select"));
    }
    match super::arg_utf8(args, 1)?.parse::<i64>() {
        Ok(0) => Ok(Reply::ok()),
        Ok(_) => Err(CommandError::Err("ERR DB index is out of range".into())),
        Err(_) => Err(CommandError::Err("ERR value is not an integer or out of range".into())),
    }
}

pub fn type_cmd(state: &AppState, args: &[Bytes]) -> Reply {
    if args.len() != 2 {
        return wrong_args("type").into_reply();
    }
    match state.db.get_cloned(&args[1]) {
        Some(data) => Reply::Simple(match data {
            Data::Str(_) => "string",
            Data::List(_) => "list",
            Data::Stream(_) => "stream",
            Data::Zset(_) => "zset",
        }),
        None => Reply::Simple("none"),
    }
}

pub fn keys(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("keys"));
    }
    let matched = state.db.keys_matching(&args[1]);
    Ok(Reply::Array(matched.into_iter().map(Reply::bulk).collect()))
}

pub fn exists(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 2 {
        return Err(wrong_args("exists"));
    }
    let count = args[1..].iter().filter(|k| state.db.exists(k)).count();
    Ok(Reply::Integer(count as i64))
}

pub fn del(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() < 2 {
        return Err(wrong_args("del"));
    }
    let count = args[1..].iter().filter(|k| state.db.remove(k)).count();
    Ok(Reply::Integer(count as i64))
}

pub fn expire(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("expire"));
    }
    let secs: i64 = super::arg_utf8(args, 2)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    if secs < 0 {
        let removed = state.db.remove(&args[1]);
        return Ok(Reply::Integer(removed as i64));
    }
    let ok = state.db.set_expiry(&args[1], Duration::from_secs(secs as u64));
    Ok(Reply::Integer(ok as i64))
}

pub fn persist(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("persist"));
    }
    Ok(Reply::Integer(state.db.persist(&args[1]) as i64))
}

pub fn ttl(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 2 {
        return Err(wrong_args("ttl"));
    }
    match state.db.ttl_remaining(&args[1]) {
        None => Ok(Reply::Integer(-2)),
        Some(None) => Ok(Reply::Integer(-1)),
        Some(Some(d)) => Ok(Reply::Integer(d.as_secs() as i64)),
    }
}

pub fn flushall(state: &AppState) -> Reply {
    state.db.flush();
    Reply::ok()
}

pub fn dbsize(state: &AppState) -> Reply {
    Reply::Integer(state.db.dbsize() as i64)
}

/// Only `dir` and `dbfilename` are recognized; any other parameter
/// returns an empty array, matching Redis' behavior for an unknown key
/// rather than erroring.
pub fn config_get(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("config|get"));
    }
    if !args[1].eq_ignore_ascii_case(b"GET") {
        return Err(CommandError::Err(format!(
            "ERR Unknown CONFIG subcommand '{}'",
            String::from_utf8_lossy(&args[1])
        )));
    }
    let param = args[2].to_ascii_lowercase();
    let value = match param.as_slice() {
        b"dir" => Some(state.dir.as_ref()),
        b"dbfilename" => Some(state.dbfilename.as_ref()),
        _ => None,
    };
    match value {
        Some(v) => Ok(Reply::Array(vec![
            Reply::bulk(Bytes::copy_from_slice(&param)),
            Reply::bulk(Bytes::from(v.to_string())),
        ])),
        None => Ok(Reply::Array(vec![])),
    }
}

pub fn info(state: &AppState) -> Reply {
    let role = match state.repl.role() {
        crate::replication::Role::Master => "master".to_string(),
        crate::replication::Role::Replica { host, port } => format!("slave,{host},{port}"),
    };
    let body = format!(
        "# Replication\r\nrole:{role}\r\nconnected_slaves:{}\r\nmaster_repl_offset:{}\r\nmaster_replid:{}\r\n",
        state.repl.replica_count(),
        state.repl.offset(),
        state.repl.replid,
    );
    Reply::bulk(Bytes::from(body))
}
