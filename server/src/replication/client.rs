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

//! The replica side of the master link: the handshake
//! (`PING` -> `REPLCONF listening-port` -> `REPLCONF capa psync2` ->
//! `PSYNC ? -1`), then an indefinite loop applying whatever the master
//! propagates.

use crate::{
    commands::{self, ConnState},
    protocol::{ParseError, Parser},
    resp::encode_command,
    state::AppState,
};
use bytes::{Bytes, BytesMut};
use libsky::TResult;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{broadcast, mpsc},
};

async fn send_and_expect_line(stream: &mut TcpStream, args: &[Bytes]) -> TResult<String> {
    stream.write_all(&encode_command(args)).await?;
    read_line(stream).await
}

async fn read_line(stream: &mut TcpStream) -> TResult<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err("connection closed during handshake".into());
        }
        if byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            buf.push(byte[0]);
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Reads exactly `len` bytes (the RDB-equivalent snapshot payload, sent
/// as a bulk string with no trailing CRLF)
async fn read_exact_bytes(stream: &mut TcpStream, len: usize) -> TResult<Bytes> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

pub async fn run_replica_link(state: AppState, host: String, port: u16) -> TResult<()> {
    let mut stream = TcpStream::connect((host.as_str(), port)).await?;

    let pong = send_and_expect_line(&mut stream, &[Bytes::from_static(b"PING")]).await?;
    log::info!("replica handshake: PING -> {pong}");

    let _ = send_and_expect_line(
        &mut stream,
        &[
            Bytes::from_static(b"REPLCONF"),
            Bytes::from_static(b"listening-port"),
            Bytes::from(state.listening_port.to_string()),
        ],
    )
    .await?;
    let _ = send_and_expect_line(
        &mut stream,
        &[
            Bytes::from_static(b"REPLCONF"),
            Bytes::from_static(b"capa"),
            Bytes::from_static(b"psync2"),
        ],
    )
    .await?;

    stream
        .write_all(&encode_command(&[
            Bytes::from_static(b"PSYNC"),
            Bytes::from_static(b"?"),
            Bytes::from_static(b"-1"),
        ]))
        .await?;
    let fullresync = read_line(&mut stream).await?;
    log::info!("replica handshake: {fullresync}");
    let mut parts = fullresync.trim_start_matches('+').split_whitespace();
    let _keyword = parts.next();
    let _master_replid = parts.next();
    let master_offset: u64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or("malformed FULLRESYNC line from master")?;

    // read the snapshot bulk header ($<len>) then the payload itself
    let header = read_line(&mut stream).await?;
    let len: usize = header
        .trim_start_matches('$')
        .parse()
        .map_err(|_| "malformed snapshot header from master")?;
    let snapshot = read_exact_bytes(&mut stream, len).await?;
    apply_snapshot(&state, &snapshot).await;
    // the bytes applied from the snapshot aren't part of the replicated
    // command stream's byte count, so the offset starts at what the
    // master told us, not at whatever propagate() churned it to above
    state.repl.set_offset(master_offset);

    // from here on, the master stream is just propagated write commands
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Bytes>();
    // the replica link never receives pub/sub pushes, but reuses the
    // same ConnState shape every other command handler expects
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let mut conn = ConnState::new(state.next_conn_id(), push_tx, shutdown_rx);
    let mut read_buf = BytesMut::with_capacity(libsky::BUF_CAP);
    let mut applied_offset = master_offset;

    loop {
        tokio::select! {
            res = stream.read_buf(&mut read_buf) => {
                let n = res?;
                if n == 0 {
                    return Err("master closed the replication stream".into());
                }
                loop {
                    let mut parser = Parser::new(&read_buf);
                    match parser.parse() {
                        Ok((query, consumed)) => {
                            applied_offset += consumed as u64;
                            let _ = read_buf.split_to(consumed);
                            if let Some(name) = query.command_name() {
                                if name == b"REPLCONF" {
                                    // GETACK from the master: report back how much we've applied
                                    stream
                                        .write_all(&encode_command(&[
                                            Bytes::from_static(b"REPLCONF"),
                                            Bytes::from_static(b"ACK"),
                                            Bytes::from(applied_offset.to_string()),
                                        ]))
                                        .await?;
                                } else {
                                    let _ = commands::dispatch(&state, &mut conn, query).await;
                                }
                            }
                        }
                        Err(ParseError::NotEnough) | Err(ParseError::Empty) => break,
                        Err(ParseError::BadPacket) => {
                            return Err("bad packet in replication stream".into());
                        }
                    }
                }
                state.repl.set_offset(applied_offset);
            }
            // drain anything queued for this pseudo-connection (there
            // shouldn't normally be any, since replicas don't publish)
            Some(_) = push_rx.recv() => {}
        }
    }
}

async fn apply_snapshot(state: &AppState, snapshot: &Bytes) {
    let mut rest: &[u8] = snapshot;
    let (push_tx, _push_rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let mut conn = ConnState::new(state.next_conn_id(), push_tx, shutdown_rx);
    while !rest.is_empty() {
        let mut parser = Parser::new(rest);
        match parser.parse() {
            Ok((query, consumed)) => {
                let _ = commands::dispatch(state, &mut conn, query).await;
                rest = &rest[consumed..];
            }
            Err(_) => break,
        }
    }
}
