//! x86 feature flags and the bit tables shared by every x86 vendor

use super::{match_features, FeatureLevel, FeatureSet};
use crate::raw::{CpuidRegs, RawSignature};

feature_enum! {
    /// x86 CPU features
    pub enum X86Feature {
        Fpu => "fpu",
        Vme => "vme",
        De => "de",
        Pse => "pse",
        Tsc => "tsc",
        Msr => "msr",
        Pae => "pae",
        Mce => "mce",
        Cx8 => "cx8",
        Apic => "apic",
        Mtrr => "mtrr",
        Sep => "sep",
        Pge => "pge",
        Mca => "mca",
        Cmov => "cmov",
        Pat => "pat",
        Pse36 => "pse36",
        Pn => "pn",
        Clflush => "clflush",
        Dts => "dts",
        Acpi => "acpi",
        Mmx => "mmx",
        Fxsr => "fxsr",
        Sse => "sse",
        Sse2 => "sse2",
        Ss => "ss",
        Ht => "ht",
        Tm => "tm",
        Ia64 => "ia64",
        Pbe => "pbe",
        Pni => "pni",
        Pclmul => "pclmul",
        Dts64 => "dts64",
        Monitor => "monitor",
        DsCpl => "ds_cpl",
        Vmx => "vmx",
        Smx => "smx",
        Est => "est",
        Tm2 => "tm2",
        Ssse3 => "ssse3",
        Cid => "cid",
        Fma3 => "fma3",
        Cx16 => "cx16",
        Xtpr => "xtpr",
        Pdcm => "pdcm",
        Dca => "dca",
        Sse4_1 => "sse4_1",
        Sse4_2 => "sse4_2",
        X2apic => "x2apic",
        Movbe => "movbe",
        Popcnt => "popcnt",
        Aes => "aes",
        Xsave => "xsave",
        Osxsave => "osxsave",
        Avx => "avx",
        F16c => "f16c",
        Rdrand => "rdrand",
        Hypervisor => "hypervisor",
        Syscall => "syscall",
        Xd => "xd",
        Mmxext => "mmxext",
        FxsrOpt => "fxsr_opt",
        Amd3dnow => "3dnow",
        Amd3dnowExt => "3dnowext",
        Nx => "nx",
        Rdtscp => "rdtscp",
        Lm => "lm",
        LahfLm => "lahf_lm",
        CmpLegacy => "cmp_legacy",
        Svm => "svm",
        Abm => "abm",
        Sse4a => "sse4a",
        MisalignSse => "misalignsse",
        Amd3dnowPrefetch => "3dnowprefetch",
        Osvw => "osvw",
        Ibs => "ibs",
        Xop => "xop",
        Skinit => "skinit",
        Wdt => "wdt",
        Fma4 => "fma4",
        Tbm => "tbm",
        Topoext => "topoext",
        Ts => "ts",
        Fid => "fid",
        Vid => "vid",
        Ttp => "ttp",
        TmAmd => "tm_amd",
        Stc => "stc",
        Steps100Mhz => "100mhzsteps",
        Hwpstate => "hwpstate",
        ConstantTsc => "constant_tsc",
        Cpb => "cpb",
        AperfMperf => "aperfmperf",
        Pfi => "pfi",
        Pa => "pa",
        Fsgsbase => "fsgsbase",
        Sgx => "sgx",
        Bmi1 => "bmi1",
        Hle => "hle",
        Avx2 => "avx2",
        Smep => "smep",
        Bmi2 => "bmi2",
        Erms => "erms",
        Invpcid => "invpcid",
        Rtm => "rtm",
        Mpx => "mpx",
        Avx512f => "avx512f",
        Avx512dq => "avx512dq",
        Rdseed => "rdseed",
        Adx => "adx",
        Smap => "smap",
        Clflushopt => "clflushopt",
        Clwb => "clwb",
        Avx512pf => "avx512pf",
        Avx512er => "avx512er",
        Avx512cd => "avx512cd",
        ShaNi => "sha_ni",
        Avx512bw => "avx512bw",
        Avx512vl => "avx512vl",
        Avx512vbmi => "avx512vbmi",
        Umip => "umip",
        Pku => "pku",
        Ospke => "ospke",
        Waitpkg => "waitpkg",
        Avx512vbmi2 => "avx512vbmi2",
        Gfni => "gfni",
        Vaes => "vaes",
        Vpclmulqdq => "vpclmulqdq",
        Avx512vnni => "avx512vnni",
        Avx512bitalg => "avx512bitalg",
        Avx512vpopcntdq => "avx512vpopcntdq",
        Rdpid => "rdpid",
        Cldemote => "cldemote",
        Movdiri => "movdiri",
        Movdir64b => "movdir64b",
        Avx512_4vnniw => "avx512_4vnniw",
        Avx512_4fmaps => "avx512_4fmaps",
        Fsrm => "fsrm",
        Serialize => "serialize",
        Hybrid => "hybrid",
        AmxBf16 => "amx_bf16",
        AmxTile => "amx_tile",
        AmxInt8 => "amx_int8",
    }
}

/// Register of a CPUID leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuidReg {
    Eax,
    Ebx,
    Ecx,
    Edx,
}

impl CpuidReg {
    pub fn of(self, regs: &CpuidRegs) -> u32 {
        match self {
            CpuidReg::Eax => regs.eax,
            CpuidReg::Ebx => regs.ebx,
            CpuidReg::Ecx => regs.ecx,
            CpuidReg::Edx => regs.edx,
        }
    }
}

/// A bit table bound to one register of one leaf
#[derive(Debug, Clone, Copy)]
pub struct LeafTable {
    /// Full leaf number (`0x8000_00xx` for extended leaves)
    pub leaf: u32,
    pub reg: CpuidReg,
    pub bits: &'static [(u8, X86Feature)],
}

impl LeafTable {
    /// Apply the table when the leaf is supported and known
    pub fn apply(&self, raw: &RawSignature, set: &mut FeatureSet<X86Feature>) {
        let regs = if self.leaf >= crate::constants::EXT_LEAF_BASE {
            raw.ext_leaf(self.leaf)
        } else {
            raw.basic_leaf(self.leaf)
        };
        if let Some(regs) = regs {
            match_features(self.bits, self.reg.of(regs), set);
        }
    }
}

use X86Feature::*;

const LEAF1_EDX: &[(u8, X86Feature)] = &[
    (0, Fpu),
    (1, Vme),
    (2, De),
    (3, Pse),
    (4, Tsc),
    (5, Msr),
    (6, Pae),
    (7, Mce),
    (8, Cx8),
    (9, Apic),
    (11, Sep),
    (12, Mtrr),
    (13, Pge),
    (14, Mca),
    (15, Cmov),
    (16, Pat),
    (17, Pse36),
    (19, Clflush),
    (23, Mmx),
    (24, Fxsr),
    (25, Sse),
    (26, Sse2),
    (28, Ht),
];

const LEAF1_ECX: &[(u8, X86Feature)] = &[
    (0, Pni),
    (1, Pclmul),
    (3, Monitor),
    (9, Ssse3),
    (12, Fma3),
    (13, Cx16),
    (19, Sse4_1),
    (20, Sse4_2),
    (21, X2apic),
    (22, Movbe),
    (23, Popcnt),
    (25, Aes),
    (26, Xsave),
    (27, Osxsave),
    (28, Avx),
    (29, F16c),
    (30, Rdrand),
    (31, Hypervisor),
];

const LEAF7_EBX: &[(u8, X86Feature)] = &[
    (0, Fsgsbase),
    (3, Bmi1),
    (5, Avx2),
    (7, Smep),
    (8, Bmi2),
    (9, Erms),
    (10, Invpcid),
    (16, Avx512f),
    (17, Avx512dq),
    (18, Rdseed),
    (19, Adx),
    (20, Smap),
    (23, Clflushopt),
    (24, Clwb),
    (26, Avx512pf),
    (27, Avx512er),
    (28, Avx512cd),
    (29, ShaNi),
    (30, Avx512bw),
    (31, Avx512vl),
];

const LEAF7_ECX: &[(u8, X86Feature)] = &[
    (1, Avx512vbmi),
    (2, Umip),
    (3, Pku),
    (4, Ospke),
    (6, Avx512vbmi2),
    (8, Gfni),
    (9, Vaes),
    (10, Vpclmulqdq),
    (11, Avx512vnni),
    (12, Avx512bitalg),
    (14, Avx512vpopcntdq),
    (22, Rdpid),
];

const EXT1_EDX: &[(u8, X86Feature)] = &[(11, Syscall), (27, Rdtscp), (29, Lm)];

const EXT1_ECX: &[(u8, X86Feature)] = &[(0, LahfLm), (5, Abm)];

const EXT7_EDX: &[(u8, X86Feature)] = &[(8, ConstantTsc)];

/// Tables every x86 vendor applies
pub const X86_COMMON_TABLES: &[LeafTable] = &[
    LeafTable { leaf: 1, reg: CpuidReg::Edx, bits: LEAF1_EDX },
    LeafTable { leaf: 1, reg: CpuidReg::Ecx, bits: LEAF1_ECX },
    LeafTable { leaf: 7, reg: CpuidReg::Ebx, bits: LEAF7_EBX },
    LeafTable { leaf: 7, reg: CpuidReg::Ecx, bits: LEAF7_ECX },
    LeafTable { leaf: 0x8000_0001, reg: CpuidReg::Edx, bits: EXT1_EDX },
    LeafTable { leaf: 0x8000_0001, reg: CpuidReg::Ecx, bits: EXT1_ECX },
    LeafTable { leaf: 0x8000_0007, reg: CpuidReg::Edx, bits: EXT7_EDX },
];

const LEVEL_V1: &[X86Feature] = &[Cmov, Cx8, Fpu, Fxsr, Mmx, Sse, Sse2];
const LEVEL_V2: &[X86Feature] = &[Cx16, LahfLm, Popcnt, Pni, Sse4_1, Sse4_2, Ssse3];
const LEVEL_V3: &[X86Feature] = &[Avx, Avx2, Bmi1, Bmi2, F16c, Fma3, Abm, Movbe, Osxsave];
const LEVEL_V4: &[X86Feature] = &[Avx512f, Avx512bw, Avx512cd, Avx512dq, Avx512vl];

/// Highest x86-64 micro-architecture level satisfied by the flags
pub fn decode_x86_64_level(flags: &FeatureSet<X86Feature>) -> FeatureLevel {
    let levels = [
        (LEVEL_V1, FeatureLevel::X86_64V1),
        (LEVEL_V2, FeatureLevel::X86_64V2),
        (LEVEL_V3, FeatureLevel::X86_64V3),
        (LEVEL_V4, FeatureLevel::X86_64V4),
    ];

    let mut level = FeatureLevel::Unknown;
    for (required, candidate) in levels {
        if !flags.contains_all(required) {
            break;
        }
        level = candidate;
    }
    level
}
