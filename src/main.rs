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

use clap::Parser;
use tracing::debug;

use cpusig::cli::{self, Cli};
use cpusig::config::{self, Settings};
use cpusig::logger;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let settings: Settings = match &args.config {
        Some(path) => config::load_from(path)?,
        None => config::load_settings()?,
    };
    logger::init_logging(args.log_level.as_deref(), &settings.log_level);
    debug!(?settings, "Settings loaded");

    cli::run_cli(&args, &settings)
}
