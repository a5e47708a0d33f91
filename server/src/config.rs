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

//! # Startup configuration
//!
//! A single `clap`-derived struct covering exactly the CLI surface this
//! server understands. There is no config file layering: everything is
//! passed on the command line, and `--dir`/`--dbfilename` are reported
//! back verbatim by `CONFIG GET` rather than feeding an on-disk loader.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "skyd", about = "An in-memory RESP key-value server")]
pub struct Config {
    /// The port to listen on
    #[arg(long, default_value_t = 6379)]
    pub port: u16,
    /// The host/interface to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Start as a replica of `HOST PORT` instead of a master
    #[arg(long, num_args = 2, value_names = ["HOST", "PORT"])]
    pub replicaof: Option<Vec<String>>,
    /// Reported verbatim by `CONFIG GET dir`; not used to load anything
    #[arg(long, default_value = ".")]
    pub dir: String,
    /// Reported verbatim by `CONFIG GET dbfilename`; not used to load anything
    #[arg(long, default_value = "data.db")]
    pub dbfilename: String,
}

impl Config {
    /// Parses `--replicaof`'s two positional values into `(host, port)`,
    /// failing fast on startup rather than once a connection is already
    /// accepted.
    pub fn parse_replicaof(&self) -> Option<(String, u16)> {
        let pair = self.replicaof.as_ref()?;
        let host = pair.first()?.clone();
        let port = pair.get(1)?.parse().ok()?;
        Some((host, port))
    }
}
