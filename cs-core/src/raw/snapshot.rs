//! Flat text snapshots of a raw signature
//!
//! The native format is one `key=value` line per known slot:
//!
//! ```text
//! version=0.3.12
//! basic_cpuid[0]=0000000d 68747541 444d4163 69746e65
//! ext_cpuid[0]=8000001f 68747541 444d4163 69746e65
//! arm_midr=00000000410fd0c1
//! arm_id_aa64isar[0]=0000000000011120
//! ```
//!
//! AIDA64 CPUID dumps are recognised as well; only logical CPU #0 is imported.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use cs_error::{CpuidError, Result};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ArmRegister, CpuidRegs, RawSignature};
use crate::constants::{EXT_LEAF_BASE, SNAPSHOT_END_MARKER};

/// Names of the x86 register groups, in output order
const X86_GROUPS: [&str; 8] = [
    "basic_cpuid",
    "ext_cpuid",
    "intel_fn4",
    "intel_fn11",
    "intel_fn12h",
    "intel_fn14h",
    "amd_fn8000001dh",
    "amd_fn80000026h",
];

/// Header lines that identify an AIDA64 dump
const AIDA64_MARKERS: [&str; 3] = [
    "------[ Versions ]------",
    "------[ Logical CPU #0 ]------",
    "------[ CPUID Registers / Logical CPU #0 ]------",
];

/// A non-fatal problem found while reading a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotWarning {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

/// Result of reading a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSnapshot {
    pub raw: RawSignature,
    /// Value of the `version=` header, if any
    pub version: Option<String>,
    pub warnings: Vec<SnapshotWarning>,
}

impl ParsedSnapshot {
    fn new() -> Self {
        Self {
            raw: RawSignature::new(),
            version: None,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, line: usize, message: impl Into<String>) {
        let message = message.into();
        warn!(line, "{}", message);
        self.warnings.push(SnapshotWarning { line, message });
    }
}

fn x86_group<'a>(raw: &'a RawSignature, name: &str) -> Option<&'a [Option<CpuidRegs>]> {
    Some(match name {
        "basic_cpuid" => &raw.basic[..],
        "ext_cpuid" => &raw.extended[..],
        "intel_fn4" => &raw.intel_fn4[..],
        "intel_fn11" => &raw.intel_fn11[..],
        "intel_fn12h" => &raw.intel_fn12h[..],
        "intel_fn14h" => &raw.intel_fn14h[..],
        "amd_fn8000001dh" => &raw.amd_fn8000001dh[..],
        "amd_fn80000026h" => &raw.amd_fn80000026h[..],
        _ => return None,
    })
}

fn x86_group_mut<'a>(raw: &'a mut RawSignature, name: &str) -> Option<&'a mut [Option<CpuidRegs>]> {
    Some(match name {
        "basic_cpuid" => &mut raw.basic[..],
        "ext_cpuid" => &mut raw.extended[..],
        "intel_fn4" => &mut raw.intel_fn4[..],
        "intel_fn11" => &mut raw.intel_fn11[..],
        "intel_fn12h" => &mut raw.intel_fn12h[..],
        "intel_fn14h" => &mut raw.intel_fn14h[..],
        "amd_fn8000001dh" => &mut raw.amd_fn8000001dh[..],
        "amd_fn80000026h" => &mut raw.amd_fn80000026h[..],
        _ => return None,
    })
}

fn is_arm_group(name: &str) -> bool {
    ArmRegister::ALL
        .iter()
        .any(|reg| reg.snapshot_key().0 == name)
}

/// Render a raw signature in the native snapshot format
pub fn serialize(raw: &RawSignature) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "version={}", env!("CARGO_PKG_VERSION"));

    for name in X86_GROUPS {
        let Some(group) = x86_group(raw, name) else {
            continue;
        };
        for (i, regs) in group.iter().enumerate() {
            if let Some(r) = regs {
                let _ = writeln!(
                    out,
                    "{}[{}]={:08x} {:08x} {:08x} {:08x}",
                    name, i, r.eax, r.ebx, r.ecx, r.edx
                );
            }
        }
    }

    for reg in ArmRegister::ALL {
        if let Some(value) = raw.arm.get(reg) {
            let _ = match reg.snapshot_key() {
                (group, Some(i)) => writeln!(out, "{}[{}]={:016x}", group, i, value),
                (group, None) => writeln!(out, "{}={:016x}", group, value),
            };
        }
    }
    out
}

/// Split `name[i]`, `name` or the legacy `name<i>` key form
fn split_key(key: &str, line: usize) -> Result<(String, Option<usize>)> {
    if let Some(open) = key.find('[') {
        let close = key
            .find(']')
            .filter(|close| *close > open)
            .ok_or_else(|| CpuidError::bad_format(line, format!("unterminated index in '{}'", key)))?;
        let index = key[open + 1..close]
            .trim()
            .parse::<usize>()
            .map_err(|_| CpuidError::bad_format(line, format!("bad index in '{}'", key)))?;
        return Ok((key[..open].trim().to_string(), Some(index)));
    }

    // arm_id_aa64isar0 -> (arm_id_aa64isar, 0)
    let digits = key.len() - key.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 && key.starts_with("arm_") {
        let (group, index) = key.split_at(key.len() - digits);
        if is_arm_group(group) {
            if let Ok(index) = index.parse::<usize>() {
                return Ok((group.to_string(), Some(index)));
            }
        }
    }
    Ok((key.to_string(), None))
}

fn parse_hex_u32(token: &str, line: usize) -> Result<u32> {
    let digits = token.trim_start_matches("0x");
    u32::from_str_radix(digits, 16)
        .map_err(|_| CpuidError::bad_format(line, format!("bad hex value '{}'", token)))
}

fn parse_hex_u64(token: &str, line: usize) -> Result<u64> {
    let digits = token.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|_| CpuidError::bad_format(line, format!("bad hex value '{}'", token)))
}

/// Handle one `key=value` line of a native snapshot
fn parse_native_line(
    parsed: &mut ParsedSnapshot,
    line_no: usize,
    key: &str,
    value: &str,
) -> Result<()> {
    if key == "version" {
        parsed.version = Some(value.to_string());
        return Ok(());
    }

    let (name, index) = split_key(key, line_no)?;

    if let Some(group) = x86_group_mut(&mut parsed.raw, &name) {
        let index = index
            .ok_or_else(|| CpuidError::bad_format(line_no, format!("'{}' needs an index", name)))?;
        let len = group.len();
        let slot = group.get_mut(index).ok_or_else(|| {
            CpuidError::bad_format(line_no, format!("index {} out of range for {} (max {})", index, name, len - 1))
        })?;

        let words: Vec<&str> = value.split_whitespace().collect();
        if words.len() != 4 {
            return Err(CpuidError::bad_format(
                line_no,
                format!("expected 4 values, found {}", words.len()),
            ));
        }
        let mut regs = [0u32; 4];
        for (reg, word) in regs.iter_mut().zip(&words) {
            *reg = parse_hex_u32(word, line_no)?;
        }
        *slot = Some(CpuidRegs::from_array(regs));
        return Ok(());
    }

    if let Some(reg) = ArmRegister::from_snapshot_key(&name, index) {
        let words: Vec<&str> = value.split_whitespace().collect();
        if words.len() != 1 {
            return Err(CpuidError::bad_format(
                line_no,
                format!("expected 1 value, found {}", words.len()),
            ));
        }
        parsed.raw.arm.set(reg, Some(parse_hex_u64(words[0], line_no)?));
        return Ok(());
    }

    if is_arm_group(&name) {
        return Err(CpuidError::bad_format(
            line_no,
            format!("index {:?} out of range for {}", index, name),
        ));
    }

    parsed.warn(line_no, format!("'{}' not understood, line skipped", key));
    Ok(())
}

/// Number `n` of a `_____ Logical CPU #n _____` separator
fn section_number(line: &str) -> Option<u32> {
    let rest = line.trim_matches('_').trim();
    rest.strip_prefix("Logical CPU #")?.trim().parse().ok()
}

fn parse_native(text: &str) -> Result<ParsedSnapshot> {
    let mut parsed = ParsedSnapshot::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == SNAPSHOT_END_MARKER {
            break;
        }
        if line.starts_with('_') {
            match section_number(line) {
                Some(0) => continue,
                Some(n) => {
                    parsed.warn(
                        line_no,
                        format!("only logical CPU #0 is read, ignoring CPU #{} and later", n),
                    );
                    break;
                }
                None => {}
            }
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| CpuidError::bad_format(line_no, format!("missing '=' in '{}'", line)))?;
        parse_native_line(&mut parsed, line_no, key.trim(), value.trim())?;
    }

    debug!(
        version = parsed.version.as_deref().unwrap_or("none"),
        warnings = parsed.warnings.len(),
        "Parsed snapshot"
    );
    Ok(parsed)
}

fn is_aida64(text: &str) -> bool {
    text.lines().map(str::trim).any(|line| {
        AIDA64_MARKERS.contains(&line) || line.contains("CPU#000 AffMask: 0x")
    })
}

/// Logical CPU number of an AIDA64 section header
fn aida64_cpu(line: &str) -> Option<u32> {
    if let Some(rest) = line.strip_prefix("------[") {
        let inner = rest.strip_suffix("]------")?.trim();
        let number = inner.rsplit_once("Logical CPU #")?.1;
        return number.trim().parse().ok();
    }
    let rest = line.strip_prefix("CPU#")?;
    let (number, tail) = rest.split_once(' ')?;
    if !tail.starts_with("AffMask") {
        return None;
    }
    number.parse().ok()
}

/// `CPUID 00000004: 1C004121-01C0003F-0000003F-00000000 [SL 00]`
fn aida64_cpuid_line(line: &str) -> Option<(u32, CpuidRegs, Option<usize>)> {
    let rest = line.strip_prefix("CPUID ")?;
    let (addr, rest) = rest.split_once(':')?;
    let addr = u32::from_str_radix(addr.trim(), 16).ok()?;

    let mut words = rest.split_whitespace();
    let mut regs = [0u32; 4];
    let mut values = words.next()?.split('-');
    for reg in regs.iter_mut() {
        *reg = u32::from_str_radix(values.next()?, 16).ok()?;
    }

    let subleaf = match (words.next(), words.next()) {
        (Some("[SL"), Some(n)) => Some(n.trim_end_matches(']').parse().ok()?),
        _ => None,
    };
    Some((addr, CpuidRegs::from_array(regs), subleaf))
}

fn parse_aida64(text: &str) -> ParsedSnapshot {
    let mut parsed = ParsedSnapshot::new();
    let mut cpu = 0;
    let mut skipped_cpu = false;

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line == SNAPSHOT_END_MARKER {
            break;
        }
        if let Some(n) = aida64_cpu(line) {
            cpu = n;
            if n != 0 && !skipped_cpu {
                skipped_cpu = true;
                parsed.warn(i + 1, "only logical CPU #0 is read from AIDA64 dumps");
            }
            continue;
        }
        if cpu != 0 {
            continue;
        }

        let Some((addr, regs, subleaf)) = aida64_cpuid_line(line) else {
            continue;
        };
        let raw = &mut parsed.raw;
        if subleaf.unwrap_or(0) == 0 {
            if addr >= EXT_LEAF_BASE {
                raw.set_ext(addr, regs);
            } else {
                raw.set_basic(addr, regs);
            }
        }
        if let Some(subleaf) = subleaf {
            let group = match addr {
                0x04 => &mut raw.intel_fn4[..],
                0x0b => &mut raw.intel_fn11[..],
                0x12 => &mut raw.intel_fn12h[..],
                0x14 => &mut raw.intel_fn14h[..],
                0x8000_001d => &mut raw.amd_fn8000001dh[..],
                0x8000_0026 => &mut raw.amd_fn80000026h[..],
                _ => continue,
            };
            if let Some(slot) = group.get_mut(subleaf) {
                *slot = Some(regs);
            }
        }
    }

    debug!(warnings = parsed.warnings.len(), "Parsed AIDA64 dump");
    parsed
}

/// Parse a snapshot, auto-detecting the native and AIDA64 formats
pub fn parse(text: &str) -> Result<ParsedSnapshot> {
    if is_aida64(text) {
        Ok(parse_aida64(text))
    } else {
        parse_native(text)
    }
}

/// Write a snapshot of `raw` to `path`
pub fn save_snapshot(path: impl AsRef<Path>, raw: &RawSignature) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serialize(raw)).map_err(|e| CpuidError::open(path, e))?;
    debug!(path = %path.display(), "Saved snapshot");
    Ok(())
}

/// Read a snapshot from `path`
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<ParsedSnapshot> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| CpuidError::open(path, e))?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawSignature {
        let mut raw = RawSignature::new();
        raw.set_basic(0, CpuidRegs::new(0xd, 0x6874_7541, 0x444d_4163, 0x6974_6e65));
        raw.set_basic(1, CpuidRegs::new(0x0080_0f11, 0x0010_0800, 0x7ed8_320b, 0x178b_fbff));
        raw.set_ext(0x8000_0000, CpuidRegs::new(0x8000_001f, 0, 0, 0));
        raw.amd_fn8000001dh[0] = Some(CpuidRegs::new(0x121, 0x01c0_003f, 0x3f, 0));
        raw
    }

    #[test]
    fn test_round_trip_x86() {
        let raw = sample();
        let parsed = parse(&serialize(&raw)).unwrap();
        assert_eq!(parsed.raw, raw);
        assert_eq!(parsed.version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_round_trip_arm_and_zero_values() {
        let mut raw = RawSignature::new();
        raw.arm.midr = Some(0x410f_d0c1);
        raw.arm.id_aa64isar[0] = Some(0);
        raw.arm.id_pfr[2] = Some(0x11);
        let text = serialize(&raw);
        assert!(text.contains("arm_midr=00000000410fd0c1"));
        assert!(text.contains("arm_id_aa64isar[0]=0000000000000000"));
        assert_eq!(parse(&text).unwrap().raw, raw);
    }

    #[test]
    fn test_unknown_slots_not_written() {
        let text = serialize(&RawSignature::new());
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_unknown_key_is_warning() {
        let parsed = parse("basic_cpuid[0]=00000001 00000000 00000000 00000000\nfoo[0] = 1 2 3 4\n")
            .unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 2);
        assert!(parsed.raw.basic[0].is_some());
    }

    #[test]
    fn test_missing_equals_is_bad_format() {
        let err = parse("version=0.1\nbasic_cpuid[0] 1 2 3 4\n").unwrap_err();
        assert!(matches!(err, CpuidError::BadFormat { line: 2, .. }));
    }

    #[test]
    fn test_bad_values() {
        assert!(matches!(
            parse("basic_cpuid[0]=1 2 3\n"),
            Err(CpuidError::BadFormat { line: 1, .. })
        ));
        assert!(matches!(
            parse("basic_cpuid[0]=1 2 3 zz\n"),
            Err(CpuidError::BadFormat { .. })
        ));
        assert!(matches!(
            parse("intel_fn4[8]=1 2 3 4\n"),
            Err(CpuidError::BadFormat { .. })
        ));
        assert!(matches!(
            parse("arm_id_aa64isar[7]=0\n"),
            Err(CpuidError::BadFormat { .. })
        ));
    }

    #[test]
    fn test_legacy_arm_keys_and_spacing() {
        let parsed = parse("arm_midr = 410fd0c1\narm_id_aa64isar0=0000000000011120\n\n").unwrap();
        assert_eq!(parsed.raw.arm.midr, Some(0x410f_d0c1));
        assert_eq!(parsed.raw.arm.id_aa64isar[0], Some(0x11120));
    }

    #[test]
    fn test_end_marker_stops_parsing() {
        let text = format!(
            "basic_cpuid[0]=1 0 0 0\n{}\nthis is not a key value line\n",
            SNAPSHOT_END_MARKER
        );
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.raw.max_basic_leaf(), 1);
    }

    #[test]
    fn test_only_first_logical_cpu() {
        let text = "\
_________________ Logical CPU #0 _________________
basic_cpuid[0]=00000001 00000000 00000000 00000000
_________________ Logical CPU #1 _________________
basic_cpuid[0]=00000002 00000000 00000000 00000000
";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.raw.max_basic_leaf(), 1);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_aida64_dump() {
        let text = "\
------[ Versions ]------

Program Version : AIDA64 Extreme v6.00

------[ Logical CPU #0 ]------

CPUID 00000000: 00000016-756E6547-6C65746E-49656E69
CPUID 00000004: 1C004121-01C0003F-0000003F-00000000 [SL 00]
CPUID 00000004: 1C004122-01C0003F-0000003F-00000000 [SL 01]
CPUID 80000000: 80000008-00000000-00000000-00000000

------[ Logical CPU #1 ]------

CPUID 00000000: 0000000D-756E6547-6C65746E-49656E69
";
        let parsed = parse(text).unwrap();
        let raw = parsed.raw;
        assert_eq!(raw.max_basic_leaf(), 0x16);
        assert_eq!(raw.vendor_string().as_deref(), Some("GenuineIntel"));
        assert_eq!(raw.intel_fn4[0].map(|r| r.eax), Some(0x1c00_4121));
        assert_eq!(raw.intel_fn4[1].map(|r| r.eax), Some(0x1c00_4122));
        assert_eq!(raw.basic[4].map(|r| r.eax), Some(0x1c00_4121));
        assert_eq!(raw.max_ext_leaf(), 0x8000_0008);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.raw");
        let raw = sample();
        save_snapshot(&path, &raw).unwrap();
        assert_eq!(load_snapshot(&path).unwrap().raw, raw);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_snapshot(dir.path().join("missing.raw")).unwrap_err();
        assert!(matches!(err, CpuidError::Open { .. }));
    }
}
