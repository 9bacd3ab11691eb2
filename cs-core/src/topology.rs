//! Core and thread counts

use tracing::debug;

use crate::features::{FeatureSet, X86Feature};
use crate::raw::RawSignature;

/// Level types of the extended topology leaf (0x0B)
const LEVEL_SMT: u32 = 1;
const LEVEL_CORE: u32 = 2;

/// Logical processors per package from leaf 1, -1 when unknown
fn leaf1_logical(raw: &RawSignature) -> i32 {
    raw.basic_leaf(1)
        .map_or(-1, |leaf| ((leaf.ebx >> 16) & 0xff) as i32)
}

/// Counts from the extended topology leaf: (cores, logical)
fn extended_topology(raw: &RawSignature) -> Option<(i32, i32)> {
    if raw.max_basic_leaf() < 0x0b {
        return None;
    }

    let mut smt = 0;
    let mut core = 0;
    for regs in raw.intel_fn11.iter().flatten() {
        let count = (regs.ebx & 0xffff) as i32;
        match (regs.ecx >> 8) & 0xff {
            LEVEL_SMT => smt = count,
            LEVEL_CORE => core = count,
            _ => {}
        }
    }

    (smt > 0 && core > 0).then(|| (core / smt, core))
}

/// Apply the hyperthreading rules shared by every vendor
fn settle(
    cores: i32,
    logical: i32,
    flags: &mut FeatureSet<X86Feature>,
) -> (i32, i32) {
    if flags.contains(X86Feature::Ht) {
        if cores > 1 {
            (cores, logical)
        } else {
            let logical = logical.max(1);
            if logical == 1 {
                flags.clear(X86Feature::Ht);
            }
            (1, logical)
        }
    } else {
        let logical = logical.max(1);
        (logical, logical)
    }
}

/// Intel and Centaur: leaf 0x0B when present, else leaf 1 and leaf 4
pub fn decode_intel_cores(raw: &RawSignature, flags: &mut FeatureSet<X86Feature>) -> (i32, i32) {
    let (cores, logical) = match extended_topology(raw) {
        Some(counts) => counts,
        None => {
            let logical = leaf1_logical(raw);
            let leaf4 = raw.intel_fn4[0].or_else(|| raw.basic_leaf(4).copied());
            let cores = match leaf4 {
                Some(regs) if raw.max_basic_leaf() >= 4 => 1 + ((regs.eax >> 26) & 0x3f) as i32,
                _ => -1,
            };
            (cores, logical)
        }
    };
    debug!(cores, logical, "Intel topology");
    settle(cores, logical, flags)
}

/// AMD and Hygon: leaf 1 and 0x80000008, corrected for SMT on family 17h+
pub fn decode_amd_cores(
    raw: &RawSignature,
    ext_family: i32,
    flags: &mut FeatureSet<X86Feature>,
) -> (i32, i32) {
    let logical = leaf1_logical(raw);
    let mut cores = raw
        .ext_leaf(0x8000_0008)
        .map_or(-1, |leaf| 1 + (leaf.ecx & 0xff) as i32);

    if flags.contains(X86Feature::Ht) && cores > 1 && ext_family >= 23 {
        if let Some(ids) = raw.ext_leaf(0x8000_001e) {
            let threads_per_core = ((ids.ebx >> 8) & 0xff) as i32 + 1;
            cores /= threads_per_core;
        }
    }
    debug!(cores, logical, "AMD topology");
    settle(cores, logical, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::CpuidRegs;

    fn raw_with_leaf1(max: u32, logical: u32) -> RawSignature {
        let mut raw = RawSignature::new();
        raw.set_basic(0, CpuidRegs::new(max, 0x756e_6547, 0x6c65_746e, 0x4965_6e69));
        raw.set_basic(1, CpuidRegs::new(0x906ea, logical << 16, 0, 1 << 28));
        raw
    }

    fn ht() -> FeatureSet<X86Feature> {
        [X86Feature::Ht].into_iter().collect()
    }

    #[test]
    fn test_intel_leaf4_cores() {
        let mut raw = raw_with_leaf1(4, 16);
        raw.intel_fn4[0] = Some(CpuidRegs::new(7 << 26 | 0x121, 0, 0, 0));
        let mut flags = ht();
        assert_eq!(decode_intel_cores(&raw, &mut flags), (8, 16));
        assert!(flags.contains(X86Feature::Ht));
    }

    #[test]
    fn test_intel_extended_topology() {
        let mut raw = raw_with_leaf1(0x16, 16);
        raw.intel_fn11[0] = Some(CpuidRegs::new(1, 2, 0x100, 0));
        raw.intel_fn11[1] = Some(CpuidRegs::new(4, 12, 0x201, 0));
        let mut flags = ht();
        assert_eq!(decode_intel_cores(&raw, &mut flags), (6, 12));
    }

    #[test]
    fn test_single_logical_clears_ht() {
        let raw = raw_with_leaf1(1, 1);
        let mut flags = ht();
        assert_eq!(decode_intel_cores(&raw, &mut flags), (1, 1));
        assert!(!flags.contains(X86Feature::Ht));
    }

    #[test]
    fn test_no_ht_uses_logical_count() {
        let raw = raw_with_leaf1(1, 0);
        let mut flags = FeatureSet::new();
        assert_eq!(decode_intel_cores(&raw, &mut flags), (1, 1));
    }

    #[test]
    fn test_amd_zen_smt_division() {
        let mut raw = raw_with_leaf1(0xd, 16);
        raw.set_ext(0x8000_0000, CpuidRegs::new(0x8000_001f, 0, 0, 0));
        // 16 threads reported as "cores"
        raw.set_ext(0x8000_0008, CpuidRegs::new(0x3030, 0, 0x0000_400f, 0));
        // ThreadsPerCore = 1 (two threads)
        raw.set_ext(0x8000_001e, CpuidRegs::new(0, 0x0000_0100, 0, 0));
        let mut flags = ht();
        assert_eq!(decode_amd_cores(&raw, 23, &mut flags), (8, 16));
    }

    #[test]
    fn test_amd_pre_zen_keeps_core_count() {
        let mut raw = raw_with_leaf1(0xd, 4);
        raw.set_ext(0x8000_0000, CpuidRegs::new(0x8000_001e, 0, 0, 0));
        raw.set_ext(0x8000_0008, CpuidRegs::new(0x3030, 0, 0x0000_0003, 0));
        let mut flags = ht();
        assert_eq!(decode_amd_cores(&raw, 21, &mut flags), (4, 4));
    }
}
