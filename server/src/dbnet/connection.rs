/*
 * Created on Sun Aug 21 2022
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

use {
    crate::{
        commands::{self, ConnState},
        protocol::{ParseError, Parser},
        resp::Reply,
        state::AppState,
        util::error::SkyResult,
    },
    bytes::BytesMut,
    std::sync::Arc,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream,
        },
        sync::{broadcast, mpsc, Semaphore},
    },
};

/// Drives one client socket end to end: a reader loop that parses
/// queries off the wire and hands them to [`commands::dispatch`], and a
/// writer task that drains whatever gets pushed onto the connection's
/// `push_tx` channel (ordinary replies, pub/sub messages and
/// replication propagation all flow through the same queue so nothing
/// needs to serialize access to the raw socket).
pub struct ConnectionHandler {
    state: AppState,
    stream: Option<TcpStream>,
    climit: Arc<Semaphore>,
    termination_signal: broadcast::Receiver<()>,
    _term_sig_tx: mpsc::Sender<()>,
}

impl ConnectionHandler {
    pub fn new(
        state: AppState,
        stream: TcpStream,
        climit: Arc<Semaphore>,
        termination_signal: broadcast::Receiver<()>,
        _term_sig_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            state,
            stream: Some(stream),
            climit,
            termination_signal,
            _term_sig_tx,
        }
    }

    pub async fn run(&mut self) -> SkyResult<()> {
        let stream = self.stream.take().expect("run() called twice");
        let (read_half, write_half) = stream.into_split();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let conn_id = self.state.next_conn_id();
        let mut conn = ConnState::new(conn_id, push_tx, self.termination_signal.resubscribe());

        let writer_done = tokio::spawn(run_writer(write_half, push_rx));

        let result = self.read_loop(read_half, &mut conn).await;

        self.state.pubsub.drop_connection(conn_id);
        if conn.is_replica_link {
            self.state.repl.unregister_replica(conn_id);
        }
        // dropping conn's push_tx (by letting conn go out of scope at
        // the end of this function) closes the writer's channel, which
        // lets it drain and exit on its own
        drop(conn);
        let _ = writer_done.await;
        result
    }

    async fn read_loop(
        &mut self,
        mut read_half: OwnedReadHalf,
        conn: &mut ConnState,
    ) -> SkyResult<()> {
        let mut buf = BytesMut::with_capacity(libsky::BUF_CAP);
        loop {
            let query = tokio::select! {
                res = read_next_query(&mut read_half, &mut buf) => res?,
                _ = self.termination_signal.recv() => return Ok(()),
            };
            let Some(query) = query else { return Ok(()) };
            let reply = commands::dispatch(&self.state, conn, query).await;
            if !matches!(reply, Reply::Raw(ref b) if b.is_empty()) {
                let mut out = BytesMut::new();
                reply.encode_into(&mut out);
                if conn.push_tx.send(out.freeze()).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Reads and parses exactly one query, buffering partial reads across
/// calls. Returns `Ok(None)` on a clean EOF.
async fn read_next_query(
    read_half: &mut OwnedReadHalf,
    buf: &mut BytesMut,
) -> SkyResult<Option<crate::protocol::Query>> {
    loop {
        {
            let mut parser = Parser::new(buf);
            match parser.parse() {
                Ok((query, consumed)) => {
                    let _ = buf.split_to(consumed);
                    return Ok(Some(query));
                }
                Err(ParseError::NotEnough) | Err(ParseError::Empty) => {}
                Err(ParseError::BadPacket) => {
                    // drop the connection rather than try to resynchronize
                    // on a corrupt stream
                    return Ok(None);
                }
            }
        }
        let n = read_half.read_buf(buf).await?;
        if n == 0 {
            return Ok(None);
        }
    }
}

/// Drains `push_rx` and writes every chunk straight to the socket. Ends
/// when every `push_tx` clone (the connection's own, plus any held by
/// pub/sub or replication registries) has been dropped.
async fn run_writer(mut write_half: OwnedWriteHalf, mut push_rx: mpsc::UnboundedReceiver<bytes::Bytes>) {
    while let Some(chunk) = push_rx.recv().await {
        if write_half.write_all(&chunk).await.is_err() {
            return;
        }
    }
    let _ = write_half.shutdown().await;
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        // give the permit back to the accept loop's semaphore, even if
        // this handler is unwinding from a panic
        self.climit.add_permits(1);
    }
}
