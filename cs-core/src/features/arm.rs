//! ARM architecture features (FEAT_* names, lowercased)


feature_enum! {
    /// ARM architecture features
    pub enum ArmFeature {
        // ID_AA64DFR0 / ID_AA64DFR1
        TrbeExt => "trbe_ext",
        Brbe => "brbe",
        BrbeV1p1 => "brbev1p1",
        Mtpmu => "mtpmu",
        Trbe => "trbe",
        Trf => "trf",
        DoubleLock => "doublelock",
        Spe => "spe",
        SpeV1p1 => "spev1p1",
        SpeV1p2 => "spev1p2",
        SpeV1p3 => "spev1p3",
        SpeV1p4 => "spev1p4",
        Sebep => "sebep",
        PmuV3Ss => "pmuv3_ss",
        PmuV3 => "pmuv3",
        PmuV3p1 => "pmuv3p1",
        PmuV3p4 => "pmuv3p4",
        PmuV3p5 => "pmuv3p5",
        PmuV3p7 => "pmuv3p7",
        PmuV3p8 => "pmuv3p8",
        PmuV3p9 => "pmuv3p9",
        DebugV8p2 => "debugv8p2",
        DebugV8p4 => "debugv8p4",
        DebugV8p8 => "debugv8p8",
        DebugV8p9 => "debugv8p9",
        SpeDpfzs => "spe_dpfzs",
        Ebep => "ebep",
        Ite => "ite",
        Able => "able",
        Bwe => "bwe",
        PmuV3Icntr => "pmuv3_icntr",
        Spmu => "spmu",
        // ID_AA64ISAR0
        Rng => "rng",
        TlbiOs => "tlbios",
        TlbiRange => "tlbirange",
        FlagM => "flagm",
        FlagM2 => "flagm2",
        Fhm => "fhm",
        DotProd => "dotprod",
        Sm4 => "sm4",
        Sm3 => "sm3",
        Sha3 => "sha3",
        Rdm => "rdm",
        Tme => "tme",
        Lse => "lse",
        Lse128 => "lse128",
        Crc32 => "crc32",
        Sha256 => "sha256",
        Sha512 => "sha512",
        Sha1 => "sha1",
        Aes => "aes",
        Pmull => "pmull",
        // ID_AA64ISAR1
        Ls64 => "ls64",
        Ls64V => "ls64_v",
        Ls64AccData => "ls64_accdata",
        Xs => "xs",
        I8mm => "i8mm",
        Dgh => "dgh",
        Bf16 => "bf16",
        Ebf16 => "ebf16",
        SpecRes => "specres",
        SpecRes2 => "specres2",
        Sb => "sb",
        FrintTs => "frintts",
        PacImp => "pacimp",
        PacQarma5 => "pacqarma5",
        Lrcpc => "lrcpc",
        Lrcpc2 => "lrcpc2",
        Lrcpc3 => "lrcpc3",
        Fcma => "fcma",
        Jscvt => "jscvt",
        Pauth => "pauth",
        Epac => "epac",
        Pauth2 => "pauth2",
        Fpac => "fpac",
        FpacCombine => "fpaccombine",
        Dpb => "dpb",
        Dpb2 => "dpb2",
        // ID_AA64ISAR2
        Ats1a => "ats1a",
        Cssc => "cssc",
        Rprfm => "rprfm",
        PrfmSlc => "prfmslc",
        SysInstr128 => "sysinstr128",
        SysReg128 => "sysreg128",
        ClrBhb => "clrbhb",
        ConstPacField => "constpacfield",
        Hbc => "hbc",
        Mops => "mops",
        PacQarma3 => "pacqarma3",
        Rpres => "rpres",
        Wfxt => "wfxt",
        // ID_AA64MMFR0
        Ecv => "ecv",
        Fgt => "fgt",
        Fgt2 => "fgt2",
        Exs => "exs",
        Lpa2 => "lpa2",
        MixedEndEl0 => "mixedendel0",
        MixedEnd => "mixedend",
        Asid16 => "asid16",
        Lpa => "lpa",
        // ID_AA64MMFR1
        Ecbhb => "ecbhb",
        Cmow => "cmow",
        Tidcp1 => "tidcp1",
        Afp => "afp",
        Hcx => "hcx",
        Ets2 => "ets2",
        Twed => "twed",
        Xnx => "xnx",
        Pan => "pan",
        Pan2 => "pan2",
        Pan3 => "pan3",
        Lor => "lor",
        Hpds => "hpds",
        Hpds2 => "hpds2",
        Vhe => "vhe",
        Vmid16 => "vmid16",
        HafDbs => "hafdbs",
        Haft => "haft",
        // ID_AA64MMFR2
        E0pd => "e0pd",
        Evt => "evt",
        Bbm => "bbm",
        Ttl => "ttl",
        S2fwb => "s2fwb",
        Idst => "idst",
        Lse2 => "lse2",
        Ttst => "ttst",
        Ccidx => "ccidx",
        Lva => "lva",
        Lva3 => "lva3",
        Iesb => "iesb",
        LsmAoc => "lsmaoc",
        Uao => "uao",
        TtCnp => "ttcnp",
        // ID_AA64MMFR3
        Aderr => "aderr",
        Anerr => "anerr",
        D128 => "d128",
        Mec => "mec",
        Aie => "aie",
        S2poe => "s2poe",
        S1poe => "s1poe",
        S2pie => "s2pie",
        S1pie => "s1pie",
        Sctlr2 => "sctlr2",
        Tcr2 => "tcr2",
        // ID_AA64PFR0
        Csv3 => "csv3",
        Csv2 => "csv2",
        Csv2_2 => "csv2_2",
        Csv2_3 => "csv2_3",
        Rme => "rme",
        Dit => "dit",
        AmuV1 => "amuv1",
        AmuV1p1 => "amuv1p1",
        Sel2 => "sel2",
        Sve => "sve",
        Ras => "ras",
        DoubleFault => "doublefault",
        RasV1p1 => "rasv1p1",
        RasV2 => "rasv2",
        AdvSimd => "advsimd",
        Fp => "fp",
        Fp16 => "fp16",
        // ID_AA64PFR1
        Pfar => "pfar",
        DoubleFault2 => "doublefault2",
        The => "the",
        Gcs => "gcs",
        Nmi => "nmi",
        Csv2_1p1 => "csv2_1p1",
        Csv2_1p2 => "csv2_1p2",
        RngTrap => "rng_trap",
        Sme => "sme",
        Sme2 => "sme2",
        Mte => "mte",
        Mte2 => "mte2",
        Mte3 => "mte3",
        MteAsymFault => "mte_asym_fault",
        Ssbs => "ssbs",
        Ssbs2 => "ssbs2",
        Bti => "bti",
        // ID_AA64PFR2
        MteTaggedFar => "mte_tagged_far",
        MteStoreOnly => "mte_store_only",
        MtePerm => "mte_perm",
        // ID_AA64SMFR0
        SmeFa64 => "sme_fa64",
        Sme2p1 => "sme2p1",
        SmeI16i64 => "sme_i16i64",
        SmeF64f64 => "sme_f64f64",
        SveB16b16 => "sve_b16b16",
        SmeF16f16 => "sme_f16f16",
        // ID_AA64ZFR0
        F64mm => "f64mm",
        F32mm => "f32mm",
        SveSm4 => "sve_sm4",
        SveSha3 => "sve_sha3",
        SveBitPerm => "sve_bitperm",
        SveAes => "sve_aes",
        SvePmull128 => "sve_pmull128",
        Sve2 => "sve2",
        Sve2p1 => "sve2p1",
        // Derived from several fields
        Mpam => "mpam",
        MpamV0p1 => "mpamv0p1",
        MpamV1p1 => "mpamv1p1",
        MteAsync => "mte_async",
        MteCanonicalTags => "mte_canonical_tags",
        MteNoAddressTags => "mte_no_address_tags",
        Mte4 => "mte4",
    }
}
