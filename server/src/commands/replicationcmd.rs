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

//! `REPLICAOF`/`SLAVEOF`, `REPLCONF`, `PSYNC` and `WAIT`.

use super::{wrong_args, CommandError, CommandResult, ConnState};
use crate::{
    replication::Role,
    resp::{encode_command, Reply},
    state::AppState,
};
use bytes::{Bytes, BytesMut};

pub fn replicaof(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("replicaof"));
    }
    let host = super::arg_utf8(args, 1)?.to_string();
    let port_arg = super::arg_utf8(args, 2)?;
    if host.eq_ignore_ascii_case("no") && port_arg.eq_ignore_ascii_case("one") {
        state.repl.stop_replica_link();
        state.repl.set_role(Role::Master);
        return Ok(Reply::ok());
    }
    let port: u16 = port_arg
        .parse()
        .map_err(|_| CommandError::Err("ERR Invalid master port".into()))?;
    state.repl.set_role(Role::Replica {
        host: host.clone(),
        port,
    });
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = crate::replication::client::run_replica_link(task_state, host, port).await {
            log::error!("replica link failed: {e}");
        }
    });
    state.repl.set_replica_task(handle);
    Ok(Reply::ok())
}

pub fn replconf(state: &AppState, conn: &mut ConnState, args: &[Bytes]) -> CommandResult {
    if args.len() < 2 {
        return Err(wrong_args("replconf"));
    }
    let sub = args[1].to_ascii_uppercase();
    match sub.as_slice() {
        b"ACK" => {
            if let Some(raw) = args.get(2) {
                if let Ok(offset) = std::str::from_utf8(raw).unwrap_or("").parse::<u64>() {
                    state.repl.record_ack(conn.id, offset);
                }
            }
            // REPLCONF ACK never gets a reply
            Ok(Reply::Raw(Bytes::new()))
        }
        b"GETACK" => {
            let offset = state.repl.offset();
            Ok(Reply::Array(vec![
                Reply::bulk(Bytes::from_static(b"REPLCONF")),
                Reply::bulk(Bytes::from_static(b"ACK")),
                Reply::bulk(Bytes::from(offset.to_string())),
            ]))
        }
        b"LISTENING-PORT" | b"CAPA" => Ok(Reply::ok()),
        _ => Ok(Reply::ok()),
    }
}

pub fn psync(state: &AppState, conn: &mut ConnState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("psync"));
    }
    conn.is_replica_link = true;
    let ack_offset = state.repl.register_replica(conn.id, conn.push_tx.clone());
    let _ = ack_offset;
    let offset = state.repl.offset();
    let mut out = BytesMut::new();
    out.extend_from_slice(format!("+FULLRESYNC {} {}\r\n", state.repl.replid, offset).as_bytes());
    let snapshot = render_snapshot(state);
    out.extend_from_slice(format!("${}\r\n", snapshot.len()).as_bytes());
    out.extend_from_slice(&snapshot);
    Ok(Reply::Raw(out.freeze()))
}

fn render_snapshot(state: &AppState) -> Bytes {
    let mut buf = BytesMut::new();
    for cmd in state.db.snapshot_commands() {
        buf.extend_from_slice(&encode_command(&cmd));
    }
    buf.freeze()
}

pub async fn wait(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("wait"));
    }
    let numreplicas: usize = super::arg_utf8(args, 1)?
        .parse()
        .map_err(|_| CommandError::Err("ERR value is not an integer or out of range".into()))?;
    let timeout_ms: u64 = super::arg_utf8(args, 2)?
        .parse()
        .map_err(|_| CommandError::Err("ERR timeout is not an integer or out of range".into()))?;
    let n = state
        .repl
        .wait(numreplicas, std::time::Duration::from_millis(timeout_ms))
        .await;
    Ok(Reply::Integer(n as i64))
}
