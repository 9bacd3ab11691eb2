/*
 * This file is part of cpusig.
 *
 * Copyright (C) 2025 cpusig contributors
 *
 * cpusig is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * cpusig is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with cpusig. If not, see <https://www.gnu.org/licenses/>.
 */

//! cpusig - CPU identification for x86 and ARM
//!
//! This library holds the command line front end: argument parsing, JSON
//! settings and logging setup. Decoding lives in `cs_core`, register access
//! in `cs_msr`.

pub mod cli;
pub mod config;
pub mod logger;

#[cfg(test)]
pub mod test_utils;
