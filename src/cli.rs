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

//! Command Line Interface
//!
//! Identification, raw dumps and MSR readings from the shell.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use cs_core::hypervisor;
use cs_core::{clock, CpuIdentity, Vendor};
use cs_msr::{msr_info, read_range, ChannelKind, MsrInfo, RegisterChannel};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "cpusig")]
#[command(version)]
#[command(about = "cpusig - CPU identification for x86 and ARM")]
#[command(long_about = "cpusig - CPU identification for x86 and ARM

Decodes vendor, family/model, feature flags, caches, core counts and the
marketing codename from CPUID leaves (x86) or the ID registers (ARM).

EXAMPLES:
    cpusig identify                     Identify the CPU running cpusig
    cpusig identify --snapshot raw.txt  Identify a saved raw dump
    cpusig dump --output raw.txt        Save the raw signature of this CPU
    cpusig list amd                     List known AMD codenames
    cpusig msr read 0x198 --range 15:8  Read bits of an MSR (root)
    cpusig msr info temperature         Core temperature from MSRs (root)

ENVIRONMENT VARIABLES:
    RUST_LOG=debug         Enable debug logging

FILES:
    ~/.config/cpusig/config.json        CLI settings")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Tracing filter, e.g. `debug` or `cs_core=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON on a single line
    #[arg(long, global = true)]
    pub compact: bool,

    /// Never load kernel modules for register access
    #[arg(long, global = true)]
    pub no_auto_load: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode the CPU and print the identity as JSON
    Identify {
        /// Decode a raw snapshot file instead of the live CPU
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Capture the raw signature in the snapshot text format
    Dump {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Logical CPU to capture on
        #[arg(long)]
        cpu: Option<usize>,
    },

    /// List the feature flags the CPU reports
    Features {
        /// Decode a raw snapshot file instead of the live CPU
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// List every codename known for a vendor
    List {
        /// Vendor name, e.g. intel, amd, arm, apple
        vendor: String,
    },

    /// Model-specific register access
    #[command(subcommand, about = "Read MSRs and values derived from them")]
    Msr(MsrCommands),

    /// Print the CPU clock in MHz
    Clock,

    /// Detect the hypervisor the CPU runs under
    Hypervisor,
}

// ============================================================================
// MSR Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum MsrCommands {
    /// Read a raw MSR
    Read {
        /// MSR index, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_msr_index)]
        index: u32,
        /// Logical CPU to read on
        #[arg(long, default_value_t = 0)]
        core: u32,
        /// Bit range HIGH:LOW to extract
        #[arg(long, value_parser = parse_bit_range)]
        range: Option<(u8, u8)>,
    },
    /// Derive a value: mperf, aperf, cur_multiplier, max_multiplier,
    /// temperature, throttling, voltage, bclk
    Info {
        which: MsrInfo,
        /// Logical CPU to read on
        #[arg(long, default_value_t = 0)]
        core: u32,
    },
}

pub fn parse_msr_index(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid MSR index '{s}': {e}"))
}

pub fn parse_bit_range(s: &str) -> Result<(u8, u8), String> {
    let (high, low) = s
        .split_once(':')
        .ok_or_else(|| format!("expected HIGH:LOW, got '{s}'"))?;
    let high = high.trim().parse::<u8>().map_err(|e| format!("bad high bit: {e}"))?;
    let low = low.trim().parse::<u8>().map_err(|e| format!("bad low bit: {e}"))?;
    Ok((high, low))
}

// ============================================================================
// CLI Execution
// ============================================================================

pub fn run_cli(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    let pretty = settings.pretty && !cli.compact;
    let mut settings = settings.clone();
    if cli.no_auto_load {
        settings.auto_load_modules = false;
    }

    match &cli.command {
        Commands::Identify { snapshot } => {
            let id = load_identity(snapshot.as_deref())?;
            emit(&to_json(&id, pretty)?)
        }
        Commands::Dump { output, cpu } => cmd_dump(output.as_deref(), *cpu),
        Commands::Features { snapshot } => {
            let id = load_identity(snapshot.as_deref())?;
            emit(&id.feature_names().join("\n"))
        }
        Commands::List { vendor } => {
            let vendor = Vendor::from_name(vendor)
                .ok_or_else(|| anyhow!("unknown vendor '{vendor}'"))?;
            emit(&cs_core::cpu_list(vendor).join("\n"))
        }
        Commands::Msr(sub) => cmd_msr(sub, &settings),
        Commands::Clock => {
            let mhz = clock::clock().context("clock measurement failed")?;
            emit(&format!("{mhz} MHz"))
        }
        Commands::Hypervisor => {
            let id = cs_core::identify_current()?;
            let name = hypervisor::detect(&id).map_or("none", |h| h.name());
            emit(name)
        }
    }
}

/// Identity of a snapshot file, or of the running CPU
pub fn load_identity(snapshot: Option<&Path>) -> anyhow::Result<CpuIdentity> {
    match snapshot {
        Some(path) => {
            let parsed = cs_core::load_snapshot(path)?;
            if !parsed.warnings.is_empty() {
                warn!(
                    path = %path.display(),
                    count = parsed.warnings.len(),
                    "Snapshot has unrecognised lines"
                );
            }
            Ok(cs_core::identify(&parsed.raw))
        }
        None => Ok(cs_core::identify_current()?),
    }
}

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn emit(text: &str) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}

fn cmd_dump(output: Option<&Path>, cpu: Option<usize>) -> anyhow::Result<()> {
    let raw = match cpu {
        Some(cpu) => cs_core::capture_on_cpu(cpu)?,
        None => cs_core::capture()?,
    };
    match output {
        Some(path) => {
            cs_core::save_snapshot(path, &raw)?;
            debug!(path = %path.display(), "Snapshot written");
            Ok(())
        }
        None => {
            let text = cs_core::raw::snapshot::serialize(&raw);
            io::stdout().lock().write_all(text.as_bytes())?;
            Ok(())
        }
    }
}

fn cmd_msr(cmd: &MsrCommands, settings: &Settings) -> anyhow::Result<()> {
    let options = settings.channel_options();
    match cmd {
        MsrCommands::Read { index, core, range } => {
            let mut channel = open_channel(*core, &options)?;
            let value = match range {
                Some((high, low)) => read_range(&mut channel, *index, *high, *low)?,
                None => channel.read_msr(*index)?,
            };
            channel.close()?;
            emit(&format!("{value:#x}"))
        }
        MsrCommands::Info { which, core } => {
            let vendor = cs_core::cached_identity().map_or(Vendor::Unknown, |id| id.vendor);
            let mut channel = open_channel(*core, &options)?;
            let value = msr_info(&mut channel, vendor, *which);
            channel.close()?;
            match value {
                Some(value) => emit(&format!("{which}: {value:.2}")),
                None => bail!("{which} is not available on this CPU"),
            }
        }
    }
}

fn open_channel(core: u32, options: &cs_msr::ChannelOptions) -> anyhow::Result<RegisterChannel> {
    if let Some(image) = &options.driver_image {
        if !image.exists() {
            bail!("driver image {} does not exist", image.display());
        }
    }
    RegisterChannel::open(core, ChannelKind::Msr, options).map_err(|e| {
        let hint = if e.is_channel_error() && !is_root() {
            " (MSR access usually needs root)"
        } else {
            ""
        };
        anyhow::Error::new(e).context(format!("cannot open the MSR driver of CPU {core}{hint}"))
    })
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{write_snapshot, CORTEX_A76_SNAPSHOT, SUMMIT_RIDGE_SNAPSHOT};
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_msr_index_formats() {
        assert_eq!(parse_msr_index("0x198"), Ok(0x198));
        assert_eq!(parse_msr_index("0XC0010063"), Ok(0xc001_0063));
        assert_eq!(parse_msr_index("408"), Ok(408));
        assert!(parse_msr_index("0xzz").is_err());
        assert!(parse_msr_index("-1").is_err());
    }

    #[test]
    fn test_bit_range() {
        assert_eq!(parse_bit_range("44:40"), Ok((44, 40)));
        assert_eq!(parse_bit_range(" 7 : 0 "), Ok((7, 0)));
        assert!(parse_bit_range("44").is_err());
        assert!(parse_bit_range("300:0").is_err());
    }

    #[test]
    fn test_parse_msr_read() {
        let cli = Cli::try_parse_from(["cpusig", "msr", "read", "0x19c", "--core", "2", "--range", "22:16"])
            .unwrap();
        match cli.command {
            Commands::Msr(MsrCommands::Read { index, core, range }) => {
                assert_eq!(index, 0x19c);
                assert_eq!(core, 2);
                assert_eq!(range, Some((22, 16)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_msr_info_names() {
        let cli = Cli::try_parse_from(["cpusig", "msr", "info", "max_multiplier"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Msr(MsrCommands::Info { which: MsrInfo::MaxMultiplier, core: 0 })
        ));
        assert!(Cli::try_parse_from(["cpusig", "msr", "info", "fan_speed"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["cpusig", "identify", "--compact", "--log-level", "debug"])
            .unwrap();
        assert!(cli.compact);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Identify { snapshot: None }));
    }

    #[test]
    fn test_unknown_vendor_is_an_error() {
        let cli = Cli::try_parse_from(["cpusig", "list", "acme"]).unwrap();
        let err = run_cli(&cli, &Settings::default()).unwrap_err();
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn test_identity_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "zen.txt", SUMMIT_RIDGE_SNAPSHOT);
        let id = load_identity(Some(&path)).unwrap();
        assert_eq!(id.vendor, Vendor::Amd);
        assert_eq!(id.codename, "Ryzen 7 (Summit Ridge)");

        let path = write_snapshot(dir.path(), "a76.txt", CORTEX_A76_SNAPSHOT);
        let id = load_identity(Some(&path)).unwrap();
        assert_eq!(id.vendor, Vendor::Arm);
        assert_eq!(id.brand_str, "Cortex-A76");
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_identity(Some(&dir.path().join("absent.txt"))).is_err());
    }

    #[test]
    fn test_to_json_compact() {
        let id = CpuIdentity::default();
        let compact = to_json(&id, false).unwrap();
        assert!(!compact.contains('\n'));
        assert!(to_json(&id, true).unwrap().contains('\n'));
    }
}
