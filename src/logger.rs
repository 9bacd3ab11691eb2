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

//! tracing-subscriber setup for the CLI

use std::env;

use tracing_subscriber::EnvFilter;

/// Filter directive to use: the `--log-level` flag, then `RUST_LOG`, then settings
pub fn resolve_level(flag: Option<&str>, rust_log: Option<String>, configured: &str) -> String {
    if let Some(level) = flag.filter(|l| !l.is_empty()) {
        return level.to_string();
    }
    if let Some(level) = rust_log.filter(|l| !l.is_empty()) {
        return level;
    }
    configured.to_string()
}

/// Install the global subscriber, logging to stderr
///
/// A subscriber installed earlier (e.g. by a test harness) is left in place.
pub fn init_logging(flag: Option<&str>, configured: &str) {
    let log_level = resolve_level(flag, env::var("RUST_LOG").ok(), configured);
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{log_level}': {e}, using 'warn'");
        EnvFilter::new("warn")
    });

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        let level = resolve_level(Some("trace"), Some("debug".into()), "warn");
        assert_eq!(level, "trace");
    }

    #[test]
    fn test_env_before_settings() {
        assert_eq!(resolve_level(None, Some("debug".into()), "warn"), "debug");
        assert_eq!(resolve_level(None, Some(String::new()), "warn"), "warn");
        assert_eq!(resolve_level(Some(""), None, "info"), "info");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(Some("off"), "warn");
        init_logging(Some("not a [valid filter"), "warn");
    }
}
