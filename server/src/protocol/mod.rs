/*
 * Created on Tue May 03 2022
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2022, Sayan Nandan <ohsayan@outlook.com>
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

//! # The wire codec
//!
//! This module implements an incremental parser for the subset of RESP
//! (REdis Serialization Protocol) that commands arrive in: an array of
//! bulk strings. Inline commands and the other RESP types are only ever
//! produced by us, never expected from a client, and are handled by the
//! `resp` module instead.
//!
//! The parser never blocks and never copies: [`Parser::parse`] is called
//! every time more bytes land in the connection's read buffer, and it
//! either returns a fully parsed [`Query`] plus the number of bytes it
//! consumed, or a [`ParseError::NotEnough`] asking the caller to read more
//! and try again. This mirrors the incremental, restart-from-scratch
//! cursor parser used throughout this codebase, just over safe byte
//! slices instead of raw pointers because a TCP buffer is never the kind
//! of hot allocation where that trade is worth it.

use bytes::Bytes;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// the buffer doesn't yet contain a complete query
    NotEnough,
    /// the buffer is empty
    Empty,
    /// the client sent something that isn't valid RESP
    BadPacket,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// A fully parsed client query: an array of bulk string arguments, the
/// first of which is the command name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    args: Vec<Bytes>,
}

impl Query {
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
    pub fn len(&self) -> usize {
        self.args.len()
    }
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
    /// The command name, uppercased for dispatch
    pub fn command_name(&self) -> Option<Vec<u8>> {
        self.args.first().map(|a| a.to_ascii_uppercase())
    }
    pub fn into_args(self) -> Vec<Bytes> {
        self.args
    }
}

/// A cursor over an immutable byte slice. Every parse attempt starts a
/// fresh `Parser` over the connection's full read buffer; on
/// `NotEnough` the caller simply waits for more bytes and retries from
/// position zero. This keeps the parser itself trivially restartable
/// with no held state across calls.
pub struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Read one CRLF-terminated line (without the terminator), advancing
    /// past it. Accepts a bare `\n` too, for leniency with simple clients.
    fn read_line(&mut self) -> ParseResult<&'a [u8]> {
        let start = self.pos;
        let mut i = self.pos;
        while i < self.buf.len() && self.buf[i] != b'\n' {
            i += 1;
        }
        if i >= self.buf.len() {
            return Err(ParseError::NotEnough);
        }
        let mut end = i;
        if end > start && self.buf[end - 1] == b'\r' {
            end -= 1;
        }
        self.pos = i + 1;
        Ok(&self.buf[start..end])
    }

    fn read_exact(&mut self, len: usize) -> ParseResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ParseError::NotEnough);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Consume the trailing CRLF after a bulk string payload
    fn read_crlf(&mut self) -> ParseResult<()> {
        if self.remaining() >= 2 && &self.buf[self.pos..self.pos + 2] == b"\r\n" {
            self.pos += 2;
            Ok(())
        } else if self.remaining() >= 1 && self.buf[self.pos] == b'\n' {
            self.pos += 1;
            Ok(())
        } else {
            Err(ParseError::NotEnough)
        }
    }

    fn parse_len(line: &[u8]) -> ParseResult<i64> {
        let s = std::str::from_utf8(line).map_err(|_| ParseError::BadPacket)?;
        s.parse::<i64>().map_err(|_| ParseError::BadPacket)
    }

    fn parse_bulk_string(&mut self) -> ParseResult<Bytes> {
        match self.peek() {
            Some(b'$') => {
                self.pos += 1;
                let line = self.read_line()?;
                let len = Self::parse_len(line)?;
                if len < 0 {
                    return Err(ParseError::BadPacket);
                }
                let payload = self.read_exact(len as usize)?;
                self.read_crlf()?;
                Ok(Bytes::copy_from_slice(payload))
            }
            Some(_) => Err(ParseError::BadPacket),
            None => Err(ParseError::NotEnough),
        }
    }

    /// Parse one query: either a RESP array of bulk strings, or (as a
    /// convenience for `nc`/telnet-style testing) a bare inline line of
    /// space separated arguments.
    pub fn parse(&mut self) -> ParseResult<(Query, usize)> {
        if self.buf.is_empty() {
            return Err(ParseError::Empty);
        }
        match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                let line = self.read_line()?;
                let count = Self::parse_len(line)?;
                if count < 0 {
                    return Err(ParseError::BadPacket);
                }
                let mut args = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    args.push(self.parse_bulk_string()?);
                }
                Ok((Query::new(args), self.pos))
            }
            Some(_) => self.parse_inline(),
            None => Err(ParseError::NotEnough),
        }
    }

    fn parse_inline(&mut self) -> ParseResult<(Query, usize)> {
        let line = self.read_line()?;
        if line.is_empty() {
            return Ok((Query::new(Vec::new()), self.pos));
        }
        let args = line
            .split(|b| *b == b' ')
            .filter(|s| !s.is_empty())
            .map(Bytes::copy_from_slice)
            .collect();
        Ok((Query::new(args), self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(buf: &[u8]) -> ParseResult<(Query, usize)> {
        Parser::new(buf).parse()
    }

    #[test]
    fn parses_simple_array() {
        let buf = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        let (q, consumed) = parse_all(buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(q.args(), &[Bytes::from("GET"), Bytes::from("foo")]);
    }

    #[test]
    fn reports_not_enough_on_partial_header() {
        let buf = b"*2\r\n$3\r\nGET";
        assert_eq!(parse_all(buf), Err(ParseError::NotEnough));
    }

    #[test]
    fn reports_not_enough_on_partial_payload() {
        let buf = b"*1\r\n$5\r\nhel";
        assert_eq!(parse_all(buf), Err(ParseError::NotEnough));
    }

    #[test]
    fn parses_exactly_up_to_the_consumed_boundary_for_pipelining() {
        let buf = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (q1, c1) = parse_all(buf).unwrap();
        assert_eq!(q1.args(), &[Bytes::from("PING")]);
        let (q2, c2) = Parser::new(&buf[c1..]).parse().unwrap();
        assert_eq!(q2.args(), &[Bytes::from("PING")]);
        assert_eq!(c1 + c2, buf.len());
    }

    #[test]
    fn rejects_negative_bulk_length() {
        let buf = b"*1\r\n$-2\r\n";
        assert_eq!(parse_all(buf), Err(ParseError::BadPacket));
    }

    #[test]
    fn empty_buffer_is_empty_not_not_enough() {
        assert_eq!(parse_all(b""), Err(ParseError::Empty));
    }

    #[test]
    fn inline_command_for_telnet_style_clients() {
        let buf = b"PING\r\n";
        let (q, consumed) = parse_all(buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(q.args(), &[Bytes::from("PING")]);
    }
}
