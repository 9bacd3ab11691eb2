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

//! CLI settings
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/cpusig/config.json`, or under the
//! platform config directory when XDG is unset. Every field is optional.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cs_error::{CpuidError, Result};
use cs_msr::ChannelOptions;
use serde::{Deserialize, Serialize};
use tracing::debug;

const APP_DIR: &str = "cpusig";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tracing filter directive, e.g. `info` or `cs_core=debug`
    pub log_level: String,
    /// Load the msr/cpuid/cpuctl module when a device is missing
    pub auto_load_modules: bool,
    /// RDMSR driver image for Windows
    pub driver_image: Option<PathBuf>,
    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            auto_load_modules: true,
            driver_image: None,
            pretty: true,
        }
    }
}

impl Settings {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            auto_load: self.auto_load_modules,
            driver_image: self.driver_image.clone(),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(Path::new(&xdg).join(APP_DIR).join(CONFIG_FILE));
        }
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Load settings from `path`; a missing file gives the defaults
pub fn load_from(path: &Path) -> Result<Settings> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }
        Err(e) => return Err(CpuidError::open(path, e)),
    };
    serde_json::from_str(&data)
        .map_err(|e| CpuidError::config(format!("{}: {e}", path.display())))
}

/// Load settings from the default location
pub fn load_settings() -> Result<Settings> {
    match config_path() {
        Some(path) => load_from(&path),
        None => Ok(Settings::default()),
    }
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CpuidError::open(parent, e))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).map_err(|e| CpuidError::open(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"pretty": false, "log_level": "debug"}}"#).unwrap();
        let settings = load_from(file.path()).unwrap();
        assert!(!settings.pretty);
        assert_eq!(settings.log_level, "debug");
        assert!(settings.auto_load_modules);
        assert_eq!(settings.driver_image, None);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_from(file.path()), Err(CpuidError::Config(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let settings = Settings {
            log_level: "cs_msr=trace".to_string(),
            auto_load_modules: false,
            driver_image: Some(PathBuf::from("/opt/TmpRdr.sys")),
            pretty: false,
        };
        save_to(&path, &settings).unwrap();
        assert_eq!(load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_channel_options_follow_settings() {
        let settings = Settings {
            auto_load_modules: false,
            ..Settings::default()
        };
        let options = settings.channel_options();
        assert!(!options.auto_load);
        assert_eq!(options.driver_image, None);
    }

    #[test]
    #[serial]
    fn test_xdg_config_home() {
        let dir = tempfile::tempdir().unwrap();
        let previous = env::var_os("XDG_CONFIG_HOME");
        env::set_var("XDG_CONFIG_HOME", dir.path());

        let path = config_path().unwrap();
        assert_eq!(path, dir.path().join("cpusig").join("config.json"));
        assert_eq!(load_settings().unwrap(), Settings::default());

        match previous {
            Some(value) => env::set_var("XDG_CONFIG_HOME", value),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
