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
    super::tcp::Listener,
    crate::{
        state::AppState,
        util::error::{Error, SkyResult},
    },
    std::{net::IpAddr, sync::Arc},
    tokio::{
        net::TcpListener,
        sync::{broadcast, mpsc, Semaphore},
    },
};

/// Everything a single TCP listener needs, bundled so that adding the
/// replication listener later didn't mean threading five more arguments
/// through.
pub struct BaseListener {
    pub state: AppState,
    pub listener: TcpListener,
    pub climit: Arc<Semaphore>,
    pub signal: broadcast::Sender<()>,
    // dropped by every ConnectionHandler's shutdown path; once every
    // sender (including this one) is gone, `terminate_rx` yields None
    // and we know it's safe to exit
    pub terminate_tx: mpsc::Sender<()>,
    pub terminate_rx: mpsc::Receiver<()>,
}

impl BaseListener {
    pub async fn init(
        state: &AppState,
        host: IpAddr,
        port: u16,
        semaphore: Arc<Semaphore>,
        signal: broadcast::Sender<()>,
    ) -> SkyResult<Self> {
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| Error::ioerror_extra(e, format!("binding to port {port}")))?;
        Ok(Self {
            state: state.clone(),
            listener,
            climit: semaphore,
            signal,
            terminate_tx,
            terminate_rx,
        })
    }

    pub async fn release_self(self) {
        let Self {
            mut terminate_rx,
            terminate_tx,
            signal,
            ..
        } = self;
        drop(signal);
        drop(terminate_tx);
        let _ = terminate_rx.recv().await;
    }
}

/// Binds the listening socket and returns a ready-to-run [`Listener`].
pub async fn connect(
    host: IpAddr,
    port: u16,
    maxcon: usize,
    state: AppState,
    signal: broadcast::Sender<()>,
) -> SkyResult<Listener> {
    let climit = Arc::new(Semaphore::new(maxcon));
    let base = BaseListener::init(&state, host, port, climit, signal).await?;
    log::info!("server started on {host}:{port}");
    Ok(Listener::new(base))
}
