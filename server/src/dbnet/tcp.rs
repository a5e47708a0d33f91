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

use {
    super::{connection::ConnectionHandler, listener::BaseListener, NetBackoff},
    crate::util::error::SkyResult,
    std::io::Result as IoResult,
    tokio::net::TcpStream,
};

/// The listener: takes a connection permit, accepts, spins up a
/// [`ConnectionHandler`] task per socket.
pub struct Listener {
    base: BaseListener,
}

impl Listener {
    pub fn new(base: BaseListener) -> Self {
        Self { base }
    }

    /// Drops this listener's handles to the shutdown broadcast and the
    /// termination channel, then waits for every in-flight connection to
    /// notice and finish tearing down.
    pub async fn shutdown(self) {
        self.base.release_self().await;
    }

    async fn accept(&mut self) -> IoResult<TcpStream> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                Ok((stream, _)) => return Ok(stream),
                Err(e) => {
                    if backoff.should_disconnect() {
                        return Err(e);
                    }
                }
            }
            backoff.spin().await;
        }
    }

    /// Runs the accept loop. Errors from individual `accept()` calls are
    /// absorbed by the backoff above; only a fatal, persistent failure
    /// propagates out and brings the server down.
    pub async fn run(&mut self) -> SkyResult<()> {
        loop {
            self.base.climit.clone().acquire_owned().await.unwrap().forget();
            let stream = match self.accept().await {
                Ok(s) => s,
                Err(e) => {
                    log::error!("accept loop terminating: {e}");
                    return Err(e.into());
                }
            };
            let mut handler = ConnectionHandler::new(
                self.base.state.clone(),
                stream,
                self.base.climit.clone(),
                self.base.signal.subscribe(),
                self.base.terminate_tx.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = handler.run().await {
                    log::error!("connection error: {e}");
                }
            });
        }
    }
}
