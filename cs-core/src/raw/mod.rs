//! Raw signature data model
//!
//! A [`RawSignature`] is the untouched output of the CPUID instruction (x86)
//! or the ID system registers (ARM) for one logical CPU. Every slot is an
//! `Option`: `None` means the leaf or register was never read, which is
//! distinct from a register that legitimately reads as zero.

pub mod capture;
pub mod snapshot;

use serde::{Deserialize, Serialize};

use crate::constants::{
    AMD_FN80000026H_SUBLEAVES, AMD_FN8000001DH_SUBLEAVES, BASIC_LEAVES, EXT_LEAF_BASE, EXT_LEAVES,
    INTEL_FN11_SUBLEAVES, INTEL_FN12H_SUBLEAVES, INTEL_FN14H_SUBLEAVES, INTEL_FN4_SUBLEAVES,
};

pub use capture::{capture, capture_on_cpu, cpuid_present};
pub use snapshot::{load_snapshot, save_snapshot, ParsedSnapshot, SnapshotWarning};

/// The four registers returned by one CPUID invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CpuidRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl CpuidRegs {
    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }

    pub fn to_array(self) -> [u32; 4] {
        [self.eax, self.ebx, self.ecx, self.edx]
    }

    pub fn from_array(regs: [u32; 4]) -> Self {
        Self::new(regs[0], regs[1], regs[2], regs[3])
    }

    /// Whether every register reads as zero
    pub fn is_zero(&self) -> bool {
        self.eax == 0 && self.ebx == 0 && self.ecx == 0 && self.edx == 0
    }
}

/// Architecture a raw signature was captured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    Arm,
    #[default]
    Unknown,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86 => write!(f, "x86"),
            Self::Arm => write!(f, "ARM"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// ARM identification registers
///
/// Discriminants follow the request numbering of the ARM register driver
/// (`ARM_IOC_READ_REG`), so a value can be sent to the driver as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum ArmRegister {
    Midr = 0,
    Mpidr,
    Revidr,
    IdAfr0,
    IdDfr0,
    IdDfr1,
    IdIsar0,
    IdIsar1,
    IdIsar2,
    IdIsar3,
    IdIsar4,
    IdIsar5,
    IdIsar6,
    IdMmfr0,
    IdMmfr1,
    IdMmfr2,
    IdMmfr3,
    IdMmfr4,
    IdMmfr5,
    IdPfr0,
    IdPfr1,
    IdPfr2,
    IdAa64Afr0,
    IdAa64Afr1,
    IdAa64Dfr0,
    IdAa64Dfr1,
    IdAa64Isar0,
    IdAa64Isar1,
    IdAa64Isar2,
    IdAa64Mmfr0,
    IdAa64Mmfr1,
    IdAa64Mmfr2,
    IdAa64Mmfr3,
    IdAa64Mmfr4,
    IdAa64Pfr0,
    IdAa64Pfr1,
    IdAa64Pfr2,
    IdAa64Smfr0,
    IdAa64Zfr0,
}

impl ArmRegister {
    pub const ALL: [ArmRegister; 39] = [
        Self::Midr,
        Self::Mpidr,
        Self::Revidr,
        Self::IdAfr0,
        Self::IdDfr0,
        Self::IdDfr1,
        Self::IdIsar0,
        Self::IdIsar1,
        Self::IdIsar2,
        Self::IdIsar3,
        Self::IdIsar4,
        Self::IdIsar5,
        Self::IdIsar6,
        Self::IdMmfr0,
        Self::IdMmfr1,
        Self::IdMmfr2,
        Self::IdMmfr3,
        Self::IdMmfr4,
        Self::IdMmfr5,
        Self::IdPfr0,
        Self::IdPfr1,
        Self::IdPfr2,
        Self::IdAa64Afr0,
        Self::IdAa64Afr1,
        Self::IdAa64Dfr0,
        Self::IdAa64Dfr1,
        Self::IdAa64Isar0,
        Self::IdAa64Isar1,
        Self::IdAa64Isar2,
        Self::IdAa64Mmfr0,
        Self::IdAa64Mmfr1,
        Self::IdAa64Mmfr2,
        Self::IdAa64Mmfr3,
        Self::IdAa64Mmfr4,
        Self::IdAa64Pfr0,
        Self::IdAa64Pfr1,
        Self::IdAa64Pfr2,
        Self::IdAa64Smfr0,
        Self::IdAa64Zfr0,
    ];

    /// Driver request number
    pub fn request(self) -> i32 {
        self as i32
    }

    /// Look a register up by its driver request number
    pub fn from_request(request: i32) -> Option<Self> {
        usize::try_from(request)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Whether the register only exists in the AArch64 register file
    pub fn is_aarch64_only(self) -> bool {
        self >= Self::IdAa64Afr0
    }

    /// Snapshot key: group name plus index within the group (if grouped)
    pub fn snapshot_key(self) -> (&'static str, Option<usize>) {
        use ArmRegister::*;
        match self {
            Midr => ("arm_midr", None),
            Mpidr => ("arm_mpidr", None),
            Revidr => ("arm_revidr", None),
            IdAfr0 => ("arm_id_afr", Some(0)),
            IdDfr0 => ("arm_id_dfr", Some(0)),
            IdDfr1 => ("arm_id_dfr", Some(1)),
            IdIsar0 => ("arm_id_isar", Some(0)),
            IdIsar1 => ("arm_id_isar", Some(1)),
            IdIsar2 => ("arm_id_isar", Some(2)),
            IdIsar3 => ("arm_id_isar", Some(3)),
            IdIsar4 => ("arm_id_isar", Some(4)),
            IdIsar5 => ("arm_id_isar", Some(5)),
            IdIsar6 => ("arm_id_isar", Some(6)),
            IdMmfr0 => ("arm_id_mmfr", Some(0)),
            IdMmfr1 => ("arm_id_mmfr", Some(1)),
            IdMmfr2 => ("arm_id_mmfr", Some(2)),
            IdMmfr3 => ("arm_id_mmfr", Some(3)),
            IdMmfr4 => ("arm_id_mmfr", Some(4)),
            IdMmfr5 => ("arm_id_mmfr", Some(5)),
            IdPfr0 => ("arm_id_pfr", Some(0)),
            IdPfr1 => ("arm_id_pfr", Some(1)),
            IdPfr2 => ("arm_id_pfr", Some(2)),
            IdAa64Afr0 => ("arm_id_aa64afr", Some(0)),
            IdAa64Afr1 => ("arm_id_aa64afr", Some(1)),
            IdAa64Dfr0 => ("arm_id_aa64dfr", Some(0)),
            IdAa64Dfr1 => ("arm_id_aa64dfr", Some(1)),
            IdAa64Isar0 => ("arm_id_aa64isar", Some(0)),
            IdAa64Isar1 => ("arm_id_aa64isar", Some(1)),
            IdAa64Isar2 => ("arm_id_aa64isar", Some(2)),
            IdAa64Mmfr0 => ("arm_id_aa64mmfr", Some(0)),
            IdAa64Mmfr1 => ("arm_id_aa64mmfr", Some(1)),
            IdAa64Mmfr2 => ("arm_id_aa64mmfr", Some(2)),
            IdAa64Mmfr3 => ("arm_id_aa64mmfr", Some(3)),
            IdAa64Mmfr4 => ("arm_id_aa64mmfr", Some(4)),
            IdAa64Pfr0 => ("arm_id_aa64pfr", Some(0)),
            IdAa64Pfr1 => ("arm_id_aa64pfr", Some(1)),
            IdAa64Pfr2 => ("arm_id_aa64pfr", Some(2)),
            IdAa64Smfr0 => ("arm_id_aa64smfr", Some(0)),
            IdAa64Zfr0 => ("arm_id_aa64zfr", Some(0)),
        }
    }

    /// Reverse of [`ArmRegister::snapshot_key`]
    pub fn from_snapshot_key(group: &str, index: Option<usize>) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|reg| reg.snapshot_key() == (group, index))
    }
}

/// ARM identification register file of one core
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArmRegisters {
    pub midr: Option<u64>,
    pub mpidr: Option<u64>,
    pub revidr: Option<u64>,
    pub id_afr0: Option<u64>,
    pub id_dfr: [Option<u64>; 2],
    pub id_isar: [Option<u64>; 7],
    pub id_mmfr: [Option<u64>; 6],
    pub id_pfr: [Option<u64>; 3],
    pub id_aa64afr: [Option<u64>; 2],
    pub id_aa64dfr: [Option<u64>; 2],
    pub id_aa64isar: [Option<u64>; 3],
    pub id_aa64mmfr: [Option<u64>; 5],
    pub id_aa64pfr: [Option<u64>; 3],
    pub id_aa64smfr: [Option<u64>; 1],
    pub id_aa64zfr: [Option<u64>; 1],
}

impl ArmRegisters {
    fn slot(&self, reg: ArmRegister) -> &Option<u64> {
        use ArmRegister::*;
        match reg {
            Midr => &self.midr,
            Mpidr => &self.mpidr,
            Revidr => &self.revidr,
            IdAfr0 => &self.id_afr0,
            IdDfr0 => &self.id_dfr[0],
            IdDfr1 => &self.id_dfr[1],
            IdIsar0 => &self.id_isar[0],
            IdIsar1 => &self.id_isar[1],
            IdIsar2 => &self.id_isar[2],
            IdIsar3 => &self.id_isar[3],
            IdIsar4 => &self.id_isar[4],
            IdIsar5 => &self.id_isar[5],
            IdIsar6 => &self.id_isar[6],
            IdMmfr0 => &self.id_mmfr[0],
            IdMmfr1 => &self.id_mmfr[1],
            IdMmfr2 => &self.id_mmfr[2],
            IdMmfr3 => &self.id_mmfr[3],
            IdMmfr4 => &self.id_mmfr[4],
            IdMmfr5 => &self.id_mmfr[5],
            IdPfr0 => &self.id_pfr[0],
            IdPfr1 => &self.id_pfr[1],
            IdPfr2 => &self.id_pfr[2],
            IdAa64Afr0 => &self.id_aa64afr[0],
            IdAa64Afr1 => &self.id_aa64afr[1],
            IdAa64Dfr0 => &self.id_aa64dfr[0],
            IdAa64Dfr1 => &self.id_aa64dfr[1],
            IdAa64Isar0 => &self.id_aa64isar[0],
            IdAa64Isar1 => &self.id_aa64isar[1],
            IdAa64Isar2 => &self.id_aa64isar[2],
            IdAa64Mmfr0 => &self.id_aa64mmfr[0],
            IdAa64Mmfr1 => &self.id_aa64mmfr[1],
            IdAa64Mmfr2 => &self.id_aa64mmfr[2],
            IdAa64Mmfr3 => &self.id_aa64mmfr[3],
            IdAa64Mmfr4 => &self.id_aa64mmfr[4],
            IdAa64Pfr0 => &self.id_aa64pfr[0],
            IdAa64Pfr1 => &self.id_aa64pfr[1],
            IdAa64Pfr2 => &self.id_aa64pfr[2],
            IdAa64Smfr0 => &self.id_aa64smfr[0],
            IdAa64Zfr0 => &self.id_aa64zfr[0],
        }
    }

    /// Value of a register, `None` when it was never read
    pub fn get(&self, reg: ArmRegister) -> Option<u64> {
        *self.slot(reg)
    }

    pub fn set(&mut self, reg: ArmRegister, value: Option<u64>) {
        use ArmRegister::*;
        let slot = match reg {
            Midr => &mut self.midr,
            Mpidr => &mut self.mpidr,
            Revidr => &mut self.revidr,
            IdAfr0 => &mut self.id_afr0,
            IdDfr0 | IdDfr1 => &mut self.id_dfr[reg as usize - IdDfr0 as usize],
            IdIsar0 | IdIsar1 | IdIsar2 | IdIsar3 | IdIsar4 | IdIsar5 | IdIsar6 => {
                &mut self.id_isar[reg as usize - IdIsar0 as usize]
            }
            IdMmfr0 | IdMmfr1 | IdMmfr2 | IdMmfr3 | IdMmfr4 | IdMmfr5 => {
                &mut self.id_mmfr[reg as usize - IdMmfr0 as usize]
            }
            IdPfr0 | IdPfr1 | IdPfr2 => &mut self.id_pfr[reg as usize - IdPfr0 as usize],
            IdAa64Afr0 | IdAa64Afr1 => &mut self.id_aa64afr[reg as usize - IdAa64Afr0 as usize],
            IdAa64Dfr0 | IdAa64Dfr1 => &mut self.id_aa64dfr[reg as usize - IdAa64Dfr0 as usize],
            IdAa64Isar0 | IdAa64Isar1 | IdAa64Isar2 => {
                &mut self.id_aa64isar[reg as usize - IdAa64Isar0 as usize]
            }
            IdAa64Mmfr0 | IdAa64Mmfr1 | IdAa64Mmfr2 | IdAa64Mmfr3 | IdAa64Mmfr4 => {
                &mut self.id_aa64mmfr[reg as usize - IdAa64Mmfr0 as usize]
            }
            IdAa64Pfr0 | IdAa64Pfr1 | IdAa64Pfr2 => {
                &mut self.id_aa64pfr[reg as usize - IdAa64Pfr0 as usize]
            }
            IdAa64Smfr0 => &mut self.id_aa64smfr[0],
            IdAa64Zfr0 => &mut self.id_aa64zfr[0],
        };
        *slot = value;
    }

    /// Whether any AArch64 ID register is known
    pub fn has_aarch64_view(&self) -> bool {
        ArmRegister::ALL
            .iter()
            .filter(|reg| reg.is_aarch64_only())
            .any(|reg| self.get(*reg).is_some())
    }
}

/// Raw CPUID / ID-register data of one logical CPU
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawSignature {
    pub basic: [Option<CpuidRegs>; BASIC_LEAVES],
    /// Extended leaves, index `i` holds leaf `0x80000000 + i`
    pub extended: [Option<CpuidRegs>; EXT_LEAVES],
    pub intel_fn4: [Option<CpuidRegs>; INTEL_FN4_SUBLEAVES],
    pub intel_fn11: [Option<CpuidRegs>; INTEL_FN11_SUBLEAVES],
    pub intel_fn12h: [Option<CpuidRegs>; INTEL_FN12H_SUBLEAVES],
    pub intel_fn14h: [Option<CpuidRegs>; INTEL_FN14H_SUBLEAVES],
    pub amd_fn8000001dh: [Option<CpuidRegs>; AMD_FN8000001DH_SUBLEAVES],
    pub amd_fn80000026h: [Option<CpuidRegs>; AMD_FN80000026H_SUBLEAVES],
    pub arm: ArmRegisters,
}

impl RawSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide which architecture the data belongs to
    pub fn architecture(&self) -> Architecture {
        if self.basic[0].is_some_and(|regs| !regs.is_zero()) {
            Architecture::X86
        } else if self.arm.midr.is_some_and(|midr| midr != 0) {
            Architecture::Arm
        } else {
            Architecture::Unknown
        }
    }

    /// Highest supported basic leaf, 0 when leaf 0 is unknown
    pub fn max_basic_leaf(&self) -> u32 {
        self.basic[0].map_or(0, |regs| regs.eax)
    }

    /// Highest supported extended leaf, 0 when leaf 0x80000000 is unknown
    pub fn max_ext_leaf(&self) -> u32 {
        self.extended[0].map_or(0, |regs| regs.eax)
    }

    /// A basic leaf, only if the CPU reports it as supported and it was read
    pub fn basic_leaf(&self, leaf: u32) -> Option<&CpuidRegs> {
        if leaf > self.max_basic_leaf() {
            return None;
        }
        self.basic.get(leaf as usize)?.as_ref()
    }

    /// An extended leaf by full leaf number (`0x8000_00xx`)
    pub fn ext_leaf(&self, leaf: u32) -> Option<&CpuidRegs> {
        if leaf < EXT_LEAF_BASE || leaf > self.max_ext_leaf() {
            return None;
        }
        self.extended
            .get((leaf - EXT_LEAF_BASE) as usize)?
            .as_ref()
    }

    /// Store a basic leaf (out-of-range leaves are ignored)
    pub fn set_basic(&mut self, leaf: u32, regs: CpuidRegs) {
        if let Some(slot) = self.basic.get_mut(leaf as usize) {
            *slot = Some(regs);
        }
    }

    /// Store an extended leaf by full leaf number
    pub fn set_ext(&mut self, leaf: u32, regs: CpuidRegs) {
        let index = leaf.wrapping_sub(EXT_LEAF_BASE) as usize;
        if let Some(slot) = self.extended.get_mut(index) {
            *slot = Some(regs);
        }
    }

    /// 12-character vendor string from leaf 0
    pub fn vendor_string(&self) -> Option<String> {
        let regs = self.basic[0]?;
        let mut bytes = Vec::with_capacity(12);
        for reg in [regs.ebx, regs.edx, regs.ecx] {
            bytes.extend_from_slice(&reg.to_le_bytes());
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 48-character brand string from leaves 0x80000002..4, leading spaces removed
    pub fn brand_string(&self) -> Option<String> {
        let mut bytes = Vec::with_capacity(crate::constants::BRAND_STR_LEN);
        for leaf in EXT_LEAF_BASE + 2..=EXT_LEAF_BASE + 4 {
            let regs = self.ext_leaf(leaf)?;
            for reg in regs.to_array() {
                bytes.extend_from_slice(&reg.to_le_bytes());
            }
        }
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let text = String::from_utf8_lossy(&bytes[..end]);
        Some(text.trim_start().to_string())
    }
}
