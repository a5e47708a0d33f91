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

//! The tagged value stored against every key in the keyspace

use super::{stream::StreamValue, zset::ZsetValue};
use bytes::Bytes;
use std::{collections::VecDeque, time::Instant};

#[derive(Debug, Clone)]
pub enum Data {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Stream(StreamValue),
    Zset(ZsetValue),
}

impl Data {
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::Str(_) => "string",
            Data::List(_) => "list",
            Data::Stream(_) => "stream",
            Data::Zset(_) => "zset",
        }
    }
}

/// One keyspace slot: the tagged value plus an optional absolute expiry.
/// Expiry is checked lazily on access (see [`super::Corestore::expire_if_needed`])
/// rather than through a background sweep.
#[derive(Debug, Clone)]
pub struct Entry {
    pub data: Data,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() >= at)
    }

    pub fn as_str(&self) -> Option<&Bytes> {
        match &self.data {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&VecDeque<Bytes>> {
        match &self.data {
            Data::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match &mut self.data {
            Data::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut StreamValue> {
        match &mut self.data {
            Data::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_zset_mut(&mut self) -> Option<&mut ZsetValue> {
        match &mut self.data {
            Data::Zset(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_zset(&self) -> Option<&ZsetValue> {
        match &self.data {
            Data::Zset(z) => Some(z),
            _ => None,
        }
    }
}
