/*
 * Created on Mon Jul 20 2020
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

//! The core library for the server
//!
//! This contains small pieces shared across the binary crate that don't
//! deserve their own module: a generic top-level result type, the default
//! per-connection buffer capacity, and colored terminal output for the
//! startup banner.

pub mod util;
use std::error::Error;

/// A generic result for startup/IO level failures
pub type TResult<T> = Result<T, Box<dyn Error + Send + Sync>>;
/// The size of the read buffer in bytes
pub const BUF_CAP: usize = 8 * 1024; // 8 KB per-connection

/// The server version, reported by `INFO` and the startup banner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// The project URL printed on the startup banner
pub const URL: &str = "https://github.com/your-org/your-project";
