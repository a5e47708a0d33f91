/*
 * Created on Thu Jul 02 2020
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2020, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Skytable
//!
//! The `skyd` crate (or the `server` folder) is Skytable's database server and maybe
//! is the most important part of the project. There are several modules within this crate; see
//! the modules for their respective documentation.

mod blocking;
mod commands;
mod config;
mod corestore;
mod dbnet;
mod protocol;
mod pubsub;
mod replication;
mod resp;
mod state;
mod txn;
mod util;

use config::Config;
use corestore::Corestore;
use clap::Parser;
use libsky::{util::terminal, URL, VERSION};
use rand::Rng;
use state::AppState;
use std::{env, fs, io::Write, net::IpAddr, path::PathBuf, process};
use tokio::{signal, sync::broadcast};

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
/// Jemallocator - this is the default memory allocator for platforms other than msvc
static GLOBAL: Jemalloc = Jemalloc;

const PID_FILE: &str = ".sky_pid";

/// The terminal art for the startup banner
static TEXT: &str = "\n███████ ██   ██ ██    ██ ████████  █████  ██████  ██      ███████ \n██      ██  ██   ██  ██     ██    ██   ██ ██   ██ ██      ██      \n███████ █████     ████      ██    ███████ ██████  ██      █████   \n     ██ ██  ██     ██       ██    ██   ██ ██   ██ ██      ██      \n███████ ██   ██    ██       ██    ██   ██ ██████  ███████ ███████ \n                                                                  ";

/// A fresh 40-character hex replication ID, the same shape `INFO` and
/// the `PSYNC` handshake report as `master_replid`
fn generate_replid() -> String {
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}

/// On startup, check if a `.sky_pid` file already exists in the data
/// directory. If it does, another process is using this directory and we
/// refuse to start; otherwise claim it by writing our own PID.
fn run_pre_startup_tasks(dir: &str) -> fs::File {
    let path = PathBuf::from(dir).join(PID_FILE);
    if path.exists() {
        let pid = fs::read_to_string(&path).unwrap_or_else(|_| "unknown".to_owned());
        log::error!(
            "Startup failure: another process with PID {} is using the data directory",
            pid
        );
        process::exit(0x100);
    }
    let mut file = match fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(fle) => fle,
        Err(e) => {
            log::error!("Startup failure: failed to open pid file: {}", e);
            process::exit(0x100);
        }
    };
    if let Err(e) = file.write_all(process::id().to_string().as_bytes()) {
        log::error!("Startup failure: failed to write to pid file: {}", e);
        process::exit(0x100);
    }
    file
}

fn main() {
    env_logger::Builder::new()
        .parse_filters(&env::var("SKY_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let config = Config::parse();
    println!("Skytable v{} | {}\n{}", VERSION, URL, TEXT);

    let pid_file = run_pre_startup_tasks(&config.dir);
    let pid_path = PathBuf::from(&config.dir).join(PID_FILE);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(run(config));
    drop(runtime);

    drop(pid_file);
    if let Err(e) = fs::remove_file(&pid_path) {
        log::error!("Shutdown failure: failed to remove pid file: {}", e);
        process::exit(0x100);
    }
    let _ = terminal::write_info("Goodbye :)\n");
}

async fn run(config: Config) {
    let host: IpAddr = config
        .host
        .parse()
        .unwrap_or_else(|_| "127.0.0.1".parse().unwrap());
    let db = Corestore::new();
    let replid = generate_replid();
    let state = AppState::new(
        db,
        replid,
        config.port,
        config.dir.clone(),
        config.dbfilename.clone(),
    );

    if let Some((rhost, rport)) = config.parse_replicaof() {
        state.repl.set_role(replication::Role::Replica {
            host: rhost.clone(),
            port: rport,
        });
        let task_state = state.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = replication::client::run_replica_link(task_state, rhost, rport).await {
                log::error!("replica link failed: {e}");
            }
        });
        state.repl.set_replica_task(handle);
    }

    let (signal_tx, _) = broadcast::channel(1);
    let mut listener = match dbnet::connect(
        host,
        config.port,
        dbnet::MAXIMUM_CONNECTION_LIMIT,
        state,
        signal_tx,
    )
    .await
    {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to start server: {e}");
            process::exit(0x100);
        }
    };

    tokio::select! {
        r = listener.run() => {
            if let Err(e) = r {
                log::error!("listener exited with error: {e}");
            }
        }
        _ = signal::ctrl_c() => {
            log::info!("signal received, shutting down");
        }
    }
    log::info!("stopped accepting incoming connections");
    listener.shutdown().await;
}
