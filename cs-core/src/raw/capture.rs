//! Live capture of the raw signature of the current CPU

use cs_error::{CpuidError, Result};
use tracing::debug;

use super::{CpuidRegs, RawSignature};

/// Whether the CPUID instruction (or the ARM ID register space) is usable
pub fn cpuid_present() -> bool {
    imp::present()
}

/// Execute CPUID with the given leaf and sub-leaf
pub fn exec_cpuid(leaf: u32, subleaf: u32) -> Result<CpuidRegs> {
    if !imp::present() {
        return Err(CpuidError::NoCpuid);
    }
    imp::exec(leaf, subleaf)
}

/// Capture the raw signature of whichever CPU the calling thread runs on
pub fn capture() -> Result<RawSignature> {
    if !imp::present() {
        return Err(CpuidError::NoCpuid);
    }
    let raw = imp::capture()?;
    debug!(
        architecture = %raw.architecture(),
        max_basic = raw.max_basic_leaf(),
        max_ext = format_args!("{:#x}", raw.max_ext_leaf()),
        "Captured raw signature"
    );
    Ok(raw)
}

/// Capture the raw signature of logical CPU `cpu`
///
/// The calling thread is pinned for the duration of the capture; its previous
/// affinity is restored afterwards, including on error.
pub fn capture_on_cpu(cpu: usize) -> Result<RawSignature> {
    let _guard = crate::affinity::pin_current_thread(cpu)?;
    capture()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod imp {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::__cpuid_count;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::__cpuid_count;

    use super::*;
    use crate::constants::{BASIC_LEAVES, EXT_LEAF_BASE, EXT_LEAVES};

    pub fn present() -> bool {
        #[cfg(target_arch = "x86")]
        {
            core::arch::x86::has_cpuid()
        }
        #[cfg(target_arch = "x86_64")]
        {
            true
        }
    }

    pub fn exec(leaf: u32, subleaf: u32) -> Result<CpuidRegs> {
        let r = __cpuid_count(leaf, subleaf);
        Ok(CpuidRegs::new(r.eax, r.ebx, r.ecx, r.edx))
    }

    fn fill(slots: &mut [Option<CpuidRegs>], leaf: u32) -> Result<()> {
        for (subleaf, slot) in slots.iter_mut().enumerate() {
            *slot = Some(exec(leaf, subleaf as u32)?);
        }
        Ok(())
    }

    pub fn capture() -> Result<RawSignature> {
        let mut raw = RawSignature::new();

        let leaf0 = exec(0, 0)?;
        raw.set_basic(0, leaf0);
        let max_basic = leaf0.eax.min(BASIC_LEAVES as u32 - 1);
        for leaf in 1..=max_basic {
            raw.set_basic(leaf, exec(leaf, 0)?);
        }

        let ext0 = exec(EXT_LEAF_BASE, 0)?;
        raw.set_ext(EXT_LEAF_BASE, ext0);
        if ext0.eax > EXT_LEAF_BASE {
            let max_ext = ext0.eax.min(EXT_LEAF_BASE + EXT_LEAVES as u32 - 1);
            for leaf in EXT_LEAF_BASE + 1..=max_ext {
                raw.set_ext(leaf, exec(leaf, 0)?);
            }
        }

        let max = leaf0.eax;
        if max >= 0x04 {
            fill(&mut raw.intel_fn4, 0x04)?;
        }
        if max >= 0x0b {
            fill(&mut raw.intel_fn11, 0x0b)?;
        }
        if max >= 0x12 {
            fill(&mut raw.intel_fn12h, 0x12)?;
        }
        if max >= 0x14 {
            fill(&mut raw.intel_fn14h, 0x14)?;
        }
        if ext0.eax >= 0x8000_001d {
            fill(&mut raw.amd_fn8000001dh, 0x8000_001d)?;
        }
        if ext0.eax >= 0x8000_0026 {
            fill(&mut raw.amd_fn80000026h, 0x8000_0026)?;
        }
        Ok(raw)
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
mod imp {
    use super::*;
    use crate::raw::ArmRegister;

    /// The kernel emulates EL0 reads of the ID register space
    const HWCAP_CPUID: libc::c_ulong = 1 << 11;

    macro_rules! mrs {
        ($reg:literal) => {{
            let value: u64;
            // SAFETY: HWCAP_CPUID guarantees the read is trapped and emulated.
            unsafe {
                core::arch::asm!(
                    concat!("mrs {}, ", $reg),
                    out(reg) value,
                    options(nomem, nostack, preserves_flags)
                )
            };
            value
        }};
    }

    pub fn present() -> bool {
        // SAFETY: getauxval has no preconditions.
        unsafe { libc::getauxval(libc::AT_HWCAP) & HWCAP_CPUID != 0 }
    }

    pub fn exec(_leaf: u32, _subleaf: u32) -> Result<CpuidRegs> {
        Err(CpuidError::NoCpuid)
    }

    /// AArch64 registers only: EL0 reads of the AArch32 ID registers are not
    /// emulated and would fault.
    pub fn capture() -> Result<RawSignature> {
        use ArmRegister::*;

        let mut raw = RawSignature::new();
        let arm = &mut raw.arm;
        arm.set(Midr, Some(mrs!("S3_0_C0_C0_0")));
        arm.set(Mpidr, Some(mrs!("S3_0_C0_C0_5")));
        arm.set(Revidr, Some(mrs!("S3_0_C0_C0_6")));
        arm.set(IdAa64Pfr0, Some(mrs!("S3_0_C0_C4_0")));
        arm.set(IdAa64Pfr1, Some(mrs!("S3_0_C0_C4_1")));
        arm.set(IdAa64Pfr2, Some(mrs!("S3_0_C0_C4_2")));
        arm.set(IdAa64Zfr0, Some(mrs!("S3_0_C0_C4_4")));
        arm.set(IdAa64Smfr0, Some(mrs!("S3_0_C0_C4_5")));
        arm.set(IdAa64Dfr0, Some(mrs!("S3_0_C0_C5_0")));
        arm.set(IdAa64Dfr1, Some(mrs!("S3_0_C0_C5_1")));
        arm.set(IdAa64Afr0, Some(mrs!("S3_0_C0_C5_4")));
        arm.set(IdAa64Afr1, Some(mrs!("S3_0_C0_C5_5")));
        arm.set(IdAa64Isar0, Some(mrs!("S3_0_C0_C6_0")));
        arm.set(IdAa64Isar1, Some(mrs!("S3_0_C0_C6_1")));
        arm.set(IdAa64Isar2, Some(mrs!("S3_0_C0_C6_2")));
        arm.set(IdAa64Mmfr0, Some(mrs!("S3_0_C0_C7_0")));
        arm.set(IdAa64Mmfr1, Some(mrs!("S3_0_C0_C7_1")));
        arm.set(IdAa64Mmfr2, Some(mrs!("S3_0_C0_C7_2")));
        arm.set(IdAa64Mmfr3, Some(mrs!("S3_0_C0_C7_3")));
        arm.set(IdAa64Mmfr4, Some(mrs!("S3_0_C0_C7_4")));
        Ok(raw)
    }
}

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    all(target_arch = "aarch64", target_os = "linux")
)))]
mod imp {
    use super::*;

    pub fn present() -> bool {
        false
    }

    pub fn exec(_leaf: u32, _subleaf: u32) -> Result<CpuidRegs> {
        Err(CpuidError::NoCpuid)
    }

    pub fn capture() -> Result<RawSignature> {
        Err(CpuidError::NoCpuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn test_capture_x86() {
        let raw = capture().unwrap();
        assert_eq!(raw.architecture(), crate::raw::Architecture::X86);
        assert!(raw.vendor_string().is_some());
        // Leaves above the reported maximum are never stored
        let max = raw.max_basic_leaf() as usize;
        assert!(raw.basic.iter().skip(max + 1).all(Option::is_none));
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn test_capture_is_stable() {
        let a = capture().unwrap();
        let b = capture().unwrap();
        assert_eq!(a.vendor_string(), b.vendor_string());
        assert_eq!(a.basic[0], b.basic[0]);
    }

    #[cfg(not(any(
        target_arch = "x86",
        target_arch = "x86_64",
        all(target_arch = "aarch64", target_os = "linux")
    )))]
    #[test]
    fn test_capture_unsupported() {
        assert!(matches!(capture(), Err(CpuidError::NoCpuid)));
    }
}
