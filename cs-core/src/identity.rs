//! Decoded CPU description

use serde::Serialize;

use crate::features::{ArmFeature, FeatureLevel, FeatureSet, X86Feature};
use crate::raw::Architecture;

/// CPU vendor (x86 vendor string or ARM implementer)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Intel,
    Amd,
    Cyrix,
    NexGen,
    Transmeta,
    Umc,
    Centaur,
    Rise,
    Sis,
    Nsc,
    Hygon,
    Arm,
    Broadcom,
    Cavium,
    Dec,
    Fujitsu,
    Hisilicon,
    Infineon,
    Freescale,
    Nvidia,
    Apm,
    Qualcomm,
    Samsung,
    Marvell,
    Apple,
    Faraday,
    Microsoft,
    Phytium,
    Ampere,
    #[default]
    Unknown,
}

impl Vendor {
    pub const ALL: [Vendor; 30] = [
        Vendor::Intel,
        Vendor::Amd,
        Vendor::Cyrix,
        Vendor::NexGen,
        Vendor::Transmeta,
        Vendor::Umc,
        Vendor::Centaur,
        Vendor::Rise,
        Vendor::Sis,
        Vendor::Nsc,
        Vendor::Hygon,
        Vendor::Arm,
        Vendor::Broadcom,
        Vendor::Cavium,
        Vendor::Dec,
        Vendor::Fujitsu,
        Vendor::Hisilicon,
        Vendor::Infineon,
        Vendor::Freescale,
        Vendor::Nvidia,
        Vendor::Apm,
        Vendor::Qualcomm,
        Vendor::Samsung,
        Vendor::Marvell,
        Vendor::Apple,
        Vendor::Faraday,
        Vendor::Microsoft,
        Vendor::Phytium,
        Vendor::Ampere,
        Vendor::Unknown,
    ];

    /// Lowercase identifier, as accepted by [`Vendor::from_name`]
    pub fn name(self) -> &'static str {
        match self {
            Vendor::Intel => "intel",
            Vendor::Amd => "amd",
            Vendor::Cyrix => "cyrix",
            Vendor::NexGen => "nexgen",
            Vendor::Transmeta => "transmeta",
            Vendor::Umc => "umc",
            Vendor::Centaur => "centaur",
            Vendor::Rise => "rise",
            Vendor::Sis => "sis",
            Vendor::Nsc => "nsc",
            Vendor::Hygon => "hygon",
            Vendor::Arm => "arm",
            Vendor::Broadcom => "broadcom",
            Vendor::Cavium => "cavium",
            Vendor::Dec => "dec",
            Vendor::Fujitsu => "fujitsu",
            Vendor::Hisilicon => "hisilicon",
            Vendor::Infineon => "infineon",
            Vendor::Freescale => "freescale",
            Vendor::Nvidia => "nvidia",
            Vendor::Apm => "apm",
            Vendor::Qualcomm => "qualcomm",
            Vendor::Samsung => "samsung",
            Vendor::Marvell => "marvell",
            Vendor::Apple => "apple",
            Vendor::Faraday => "faraday",
            Vendor::Microsoft => "microsoft",
            Vendor::Phytium => "phytium",
            Vendor::Ampere => "ampere",
            Vendor::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|v| v.name() == name)
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Intended role of a core in a heterogeneous design
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    #[default]
    General,
    Performance,
    Efficiency,
    UltraPerformance,
}

/// One cache level; every field is -1 when undetermined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CacheInfo {
    pub size_kb: i32,
    pub associativity: i32,
    pub line_size: i32,
}

impl CacheInfo {
    pub const UNKNOWN: CacheInfo = CacheInfo {
        size_kb: -1,
        associativity: -1,
        line_size: -1,
    };

    pub fn new(size_kb: i32, associativity: i32, line_size: i32) -> Self {
        Self {
            size_kb,
            associativity,
            line_size,
        }
    }

    pub fn is_known(&self) -> bool {
        self.size_kb >= 0
    }
}

impl Default for CacheInfo {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Cache slots a decoder can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    L1Data,
    L1Instruction,
    L2,
    L3,
    L4,
}

/// Cache hierarchy of one core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CacheLevels {
    pub l1_data: CacheInfo,
    pub l1_instruction: CacheInfo,
    pub l2: CacheInfo,
    pub l3: CacheInfo,
    pub l4: CacheInfo,
}

impl CacheLevels {
    pub fn get(&self, slot: CacheSlot) -> &CacheInfo {
        match slot {
            CacheSlot::L1Data => &self.l1_data,
            CacheSlot::L1Instruction => &self.l1_instruction,
            CacheSlot::L2 => &self.l2,
            CacheSlot::L3 => &self.l3,
            CacheSlot::L4 => &self.l4,
        }
    }

    pub fn get_mut(&mut self, slot: CacheSlot) -> &mut CacheInfo {
        match slot {
            CacheSlot::L1Data => &mut self.l1_data,
            CacheSlot::L1Instruction => &mut self.l1_instruction,
            CacheSlot::L2 => &mut self.l2,
            CacheSlot::L3 => &mut self.l3,
            CacheSlot::L4 => &mut self.l4,
        }
    }
}

/// MIDR breakdown of an ARM core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArmInfo {
    pub implementer: u8,
    pub variant: u8,
    pub architecture: u8,
    pub part_num: u16,
    pub revision: u8,
}

/// Intel SGX capabilities (leaf 7 and leaf 0x12)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SgxInfo {
    pub present: bool,
    pub sgx1: bool,
    pub sgx2: bool,
    /// log2 of the maximum enclave size outside 64-bit mode
    pub max_enclave_32bit: u8,
    /// log2 of the maximum enclave size in 64-bit mode
    pub max_enclave_64bit: u8,
    pub misc_select: u32,
}

/// Everything known about one CPU
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuIdentity {
    pub architecture: Architecture,
    pub vendor: Vendor,
    pub vendor_str: String,
    pub brand_str: String,
    pub family: i32,
    pub model: i32,
    pub stepping: i32,
    pub ext_family: i32,
    pub ext_model: i32,
    pub codename: String,
    pub technology: String,
    pub x86_features: FeatureSet<X86Feature>,
    pub arm_features: FeatureSet<ArmFeature>,
    pub feature_level: FeatureLevel,
    pub caches: CacheLevels,
    pub num_cores: i32,
    pub num_logical_cpus: i32,
    /// Logical CPUs reported by the OS; -1 when decoded from a snapshot
    pub total_logical_cpus: i32,
    /// Width of the SSE execution units in bits
    pub sse_size: i32,
    pub purpose: Purpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm: Option<ArmInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sgx: Option<SgxInfo>,
    /// Score of the winning codename entry
    pub match_score: i32,
}

impl Default for CpuIdentity {
    fn default() -> Self {
        Self {
            architecture: Architecture::Unknown,
            vendor: Vendor::Unknown,
            vendor_str: String::new(),
            brand_str: String::new(),
            family: -1,
            model: -1,
            stepping: -1,
            ext_family: -1,
            ext_model: -1,
            codename: String::new(),
            technology: String::new(),
            x86_features: FeatureSet::new(),
            arm_features: FeatureSet::new(),
            feature_level: FeatureLevel::Unknown,
            caches: CacheLevels::default(),
            num_cores: -1,
            num_logical_cpus: -1,
            total_logical_cpus: -1,
            sse_size: -1,
            purpose: Purpose::General,
            arm: None,
            sgx: None,
            match_score: -1,
        }
    }
}

impl CpuIdentity {
    pub fn has_x86(&self, feature: X86Feature) -> bool {
        self.x86_features.contains(feature)
    }

    pub fn has_arm(&self, feature: ArmFeature) -> bool {
        self.arm_features.contains(feature)
    }

    /// Names of every set feature flag, x86 first
    pub fn feature_names(&self) -> Vec<&'static str> {
        let mut names = self.x86_features.names();
        names.extend(self.arm_features.names());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity_is_unknown() {
        let id = CpuIdentity::default();
        assert_eq!(id.vendor, Vendor::Unknown);
        assert_eq!(id.family, -1);
        assert!(!id.caches.l2.is_known());
        assert!(id.feature_names().is_empty());
    }

    #[test]
    fn test_vendor_names_round_trip() {
        for vendor in Vendor::ALL {
            assert_eq!(Vendor::from_name(vendor.name()), Some(vendor));
        }
        assert_eq!(Vendor::from_name("AMD"), Some(Vendor::Amd));
    }

    #[test]
    fn test_purpose_serializes_kebab_case() {
        let json = serde_json::to_string(&Purpose::UltraPerformance).unwrap();
        assert_eq!(json, r#""ultra-performance""#);
    }

    #[test]
    fn test_cache_slots() {
        let mut caches = CacheLevels::default();
        *caches.get_mut(CacheSlot::L3) = CacheInfo::new(8192, 16, 64);
        assert_eq!(caches.l3.size_kb, 8192);
        assert_eq!(caches.get(CacheSlot::L3).associativity, 16);
        assert!(!caches.get(CacheSlot::L4).is_known());
    }
}
