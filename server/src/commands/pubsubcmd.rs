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

//! `SUBSCRIBE`/`UNSUBSCRIBE`/`PSUBSCRIBE`/`PUNSUBSCRIBE`/`PUBLISH`

use super::{wrong_args, CommandError, CommandResult, ConnState};
use crate::{resp::Reply, state::AppState};
use bytes::Bytes;

fn ack(kind: &'static str, channel: Option<Bytes>, count: usize) -> Reply {
    Reply::Array(vec![
        Reply::bulk(Bytes::from_static(kind.as_bytes())),
        channel.map(Reply::bulk).unwrap_or(Reply::NullBulk),
        Reply::Integer(count as i64),
    ])
}

pub fn subscribe(state: &AppState, conn: &mut ConnState, args: &[Bytes]) -> CommandResult {
    if args.len() < 2 {
        return Err(wrong_args("subscribe"));
    }
    for channel in &args[1..] {
        state.pubsub.subscribe(channel.clone(), conn.id, conn.push_tx.clone());
        conn.channels.insert(channel.clone());
        let msg = ack("subscribe", Some(channel.clone()), conn.subscription_count());
        let _ = conn.push_tx.send(msg.to_bytes());
    }
    // the handler writes no further reply; each subscription already
    // pushed its own ack frame through the writer channel
    Ok(Reply::Raw(Bytes::new()))
}

pub fn unsubscribe(state: &AppState, conn: &mut ConnState, args: &[Bytes]) -> CommandResult {
    let channels: Vec<Bytes> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        conn.channels.iter().cloned().collect()
    };
    if channels.is_empty() {
        let msg = ack("unsubscribe", None, conn.subscription_count());
        let _ = conn.push_tx.send(msg.to_bytes());
        return Ok(Reply::Raw(Bytes::new()));
    }
    for channel in &channels {
        state.pubsub.unsubscribe(channel, conn.id);
        conn.channels.remove(channel);
        let msg = ack("unsubscribe", Some(channel.clone()), conn.subscription_count());
        let _ = conn.push_tx.send(msg.to_bytes());
    }
    Ok(Reply::Raw(Bytes::new()))
}

pub fn psubscribe(state: &AppState, conn: &mut ConnState, args: &[Bytes]) -> CommandResult {
    if args.len() < 2 {
        return Err(wrong_args("psubscribe"));
    }
    for pattern in &args[1..] {
        state.pubsub.psubscribe(pattern.clone(), conn.id, conn.push_tx.clone());
        conn.patterns.insert(pattern.clone());
        let msg = ack("psubscribe", Some(pattern.clone()), conn.subscription_count());
        let _ = conn.push_tx.send(msg.to_bytes());
    }
    Ok(Reply::Raw(Bytes::new()))
}

pub fn punsubscribe(state: &AppState, conn: &mut ConnState, args: &[Bytes]) -> CommandResult {
    let patterns: Vec<Bytes> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        conn.patterns.iter().cloned().collect()
    };
    if patterns.is_empty() {
        let msg = ack("punsubscribe", None, conn.subscription_count());
        let _ = conn.push_tx.send(msg.to_bytes());
        return Ok(Reply::Raw(Bytes::new()));
    }
    for pattern in &patterns {
        state.pubsub.punsubscribe(pattern, conn.id);
        conn.patterns.remove(pattern);
        let msg = ack("punsubscribe", Some(pattern.clone()), conn.subscription_count());
        let _ = conn.push_tx.send(msg.to_bytes());
    }
    Ok(Reply::Raw(Bytes::new()))
}

pub fn publish(state: &AppState, args: &[Bytes]) -> CommandResult {
    if args.len() != 3 {
        return Err(wrong_args("publish"));
    }
    let n = state.pubsub.publish(&args[1], &args[2]);
    Ok(Reply::Integer(n as i64))
}
