/*
 * Created on Mon Apr 26 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2021, Sayan Nandan <ohsayan@outlook.com>
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

//! # Reply encoding
//!
//! A [`Reply`] is built up by a command handler and then serialized onto
//! the wire by [`Reply::encode_into`]. Handlers never write directly to a
//! socket; they hand a `Reply` to the writer task over the per-connection
//! channel so that ordinary replies, pub/sub pushes and replication
//! propagation can all be multiplexed onto one socket without contending
//! on a shared write lock.

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(&'static str),
    SimpleOwned(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    NullBulk,
    Array(Vec<Reply>),
    NullArray,
    /// A raw, pre-encoded payload (used for RDB bulk transfer during
    /// full resync, which is a bulk string without a trailing CRLF)
    RawBulkHeader(usize),
    Raw(Bytes),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Simple("OK")
    }

    pub fn bulk(b: impl Into<Bytes>) -> Self {
        Reply::Bulk(b.into())
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        match self {
            Reply::Simple(s) => {
                out.put_u8(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::SimpleOwned(s) => {
                out.put_u8(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error(e) => {
                out.put_u8(b'-');
                out.extend_from_slice(e.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(i) => {
                out.put_u8(b':');
                out.extend_from_slice(i.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(b) => {
                out.put_u8(b'$');
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Reply::NullBulk => {
                out.extend_from_slice(b"$-1\r\n");
            }
            Reply::Array(items) => {
                out.put_u8(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode_into(out);
                }
            }
            Reply::NullArray => {
                out.extend_from_slice(b"*-1\r\n");
            }
            Reply::RawBulkHeader(len) => {
                out.put_u8(b'$');
                out.extend_from_slice(len.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Raw(b) => {
                out.extend_from_slice(b);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

impl From<Vec<Reply>> for Reply {
    fn from(v: Vec<Reply>) -> Self {
        Reply::Array(v)
    }
}

impl From<i64> for Reply {
    fn from(i: i64) -> Self {
        Reply::Integer(i)
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Bulk(Bytes::from(s))
    }
}

/// Encodes a client command into wire RESP, used by the replica-of
/// handshake and by propagation to downstream replicas
pub fn encode_command(args: &[Bytes]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u8(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.put_u8(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_simple_and_bulk() {
        assert_eq!(Reply::ok().to_bytes(), Bytes::from_static(b"+OK\r\n"));
        assert_eq!(
            Reply::bulk(Bytes::from_static(b"hi")).to_bytes(),
            Bytes::from_static(b"$2\r\nhi\r\n")
        );
        assert_eq!(Reply::NullBulk.to_bytes(), Bytes::from_static(b"$-1\r\n"));
    }

    #[test]
    fn encodes_nested_array() {
        let r = Reply::Array(vec![Reply::Integer(1), Reply::NullBulk]);
        assert_eq!(r.to_bytes(), Bytes::from_static(b"*2\r\n:1\r\n$-1\r\n"));
    }

    #[test]
    fn encodes_command_for_propagation() {
        let args = vec![Bytes::from("SET"), Bytes::from("a"), Bytes::from("b")];
        assert_eq!(
            encode_command(&args),
            Bytes::from_static(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\nb\r\n")
        );
    }
}
