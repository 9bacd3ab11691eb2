//! CPUID-related constants

/// Number of basic CPUID leaves kept in a raw signature
pub const BASIC_LEAVES: usize = 32;

/// Number of extended CPUID leaves kept in a raw signature
pub const EXT_LEAVES: usize = 32;

/// First extended CPUID leaf
pub const EXT_LEAF_BASE: u32 = 0x8000_0000;

/// Sub-leaves of the deterministic cache leaf (4) kept in a raw signature
pub const INTEL_FN4_SUBLEAVES: usize = 8;

/// Sub-leaves of the extended topology leaf (0x0B)
pub const INTEL_FN11_SUBLEAVES: usize = 4;

/// Sub-leaves of the SGX leaf (0x12)
pub const INTEL_FN12H_SUBLEAVES: usize = 4;

/// Sub-leaves of the processor trace leaf (0x14)
pub const INTEL_FN14H_SUBLEAVES: usize = 4;

/// Sub-leaves of the AMD cache topology leaf (0x8000001D)
pub const AMD_FN8000001DH_SUBLEAVES: usize = 4;

/// Sub-leaves of the AMD extended topology leaf (0x80000026)
pub const AMD_FN80000026H_SUBLEAVES: usize = 4;

/// First hypervisor CPUID leaf
pub const HYPERVISOR_LEAF: u32 = 0x4000_0000;

/// Length of the brand string assembled from leaves 0x80000002..4
pub const BRAND_STR_LEN: usize = 48;

/// Separator line ending the register section of a snapshot
pub const SNAPSHOT_END_MARKER: &str =
    "--------------------------------------------------------------------------------";

/// x86 vendor strings reported by leaf 0 (EBX, EDX, ECX)
pub mod vendor_str {
    pub const INTEL: &str = "GenuineIntel";
    pub const AMD: &str = "AuthenticAMD";
    pub const CYRIX: &str = "CyrixInstead";
    pub const NEXGEN: &str = "NexGenDriven";
    pub const TRANSMETA: &str = "GenuineTMx86";
    pub const UMC: &str = "UMC UMC UMC ";
    pub const CENTAUR: &str = "CentaurHauls";
    pub const ZHAOXIN: &str = "  Shanghai  ";
    pub const RISE: &str = "RiseRiseRise";
    pub const SIS: &str = "SiS SiS SiS ";
    pub const NSC: &str = "Geode by NSC";
    pub const HYGON: &str = "HygonGenuine";
}

/// Register field helpers
pub mod bits {
    /// Extract bits `high..=low` of a 64-bit value
    #[inline]
    pub fn field(value: u64, high: u8, low: u8) -> u64 {
        debug_assert!(high < 64 && low <= high);
        let width = u32::from(high - low) + 1;
        let shifted = value >> low;
        if width >= 64 {
            shifted
        } else {
            shifted & ((1u64 << width) - 1)
        }
    }

    /// Extract bits `high..=low` of a 32-bit register
    #[inline]
    pub fn field32(value: u32, high: u8, low: u8) -> u32 {
        field(u64::from(value), high, low) as u32
    }

    /// Test a single bit of a 32-bit register
    #[inline]
    pub fn bit(value: u32, index: u8) -> bool {
        (value >> index) & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::bits::*;

    #[test]
    fn test_field_extraction() {
        assert_eq!(field(0xABCD_0000_0000_1234, 63, 48), 0xABCD);
        assert_eq!(field(0x1234, 7, 4), 0x3);
        assert_eq!(field(u64::MAX, 63, 0), u64::MAX);
        assert_eq!(field32(0x0080_0f11, 11, 8), 0xf);
    }

    #[test]
    fn test_bit() {
        assert!(bit(0x8000_0000, 31));
        assert!(!bit(0x7fff_ffff, 31));
    }
}
