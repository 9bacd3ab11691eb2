//! Hypervisor detection through the CPUID hypervisor leaf

use serde::Serialize;
use tracing::debug;

use crate::constants::HYPERVISOR_LEAF;
use crate::features::X86Feature;
use crate::identity::{CpuIdentity, Vendor};
use crate::raw::capture::exec_cpuid;
use crate::raw::CpuidRegs;

/// Hypervisor signatures of leaf 0x40000000 (EBX, ECX, EDX)
const SIGNATURES: &[(&str, Hypervisor)] = &[
    ("bhyve bhyve ", Hypervisor::Bhyve),
    ("Microsoft Hv", Hypervisor::HyperV),
    ("KVMKVMKVM", Hypervisor::Kvm),
    (" lrpepyh  vr", Hypervisor::Parallels),
    ("prl hyperv  ", Hypervisor::Parallels),
    ("TCGTCGTCGTCG", Hypervisor::Qemu),
    ("VBoxVBoxVBox", Hypervisor::VirtualBox),
    ("VMwareVMware", Hypervisor::Vmware),
    ("XenVMMXenVMM", Hypervisor::Xen),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hypervisor {
    Bhyve,
    HyperV,
    Kvm,
    Parallels,
    Qemu,
    VirtualBox,
    Vmware,
    Xen,
    Unknown,
}

impl Hypervisor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bhyve => "bhyve",
            Self::HyperV => "Hyper-V",
            Self::Kvm => "KVM",
            Self::Parallels => "Parallels",
            Self::Qemu => "QEMU",
            Self::VirtualBox => "VirtualBox",
            Self::Vmware => "VMware",
            Self::Xen => "Xen",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Hypervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Vendor signature stored in EBX, ECX, EDX of the hypervisor leaf
pub fn signature_string(regs: &CpuidRegs) -> String {
    let bytes: Vec<u8> = [regs.ebx, regs.ecx, regs.edx]
        .iter()
        .flat_map(|r| r.to_le_bytes())
        .collect();
    String::from_utf8_lossy(&bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Map a hypervisor signature to a known hypervisor
pub fn from_signature(signature: &str) -> Hypervisor {
    SIGNATURES
        .iter()
        .find(|(sig, _)| signature == *sig)
        .map_or(Hypervisor::Unknown, |(_, hv)| *hv)
}

/// Hypervisor hosting the current CPU, if the CPU reports one
///
/// Only Intel and AMD identities are considered. `None` means bare metal as
/// far as CPUID can tell.
pub fn detect(id: &CpuIdentity) -> Option<Hypervisor> {
    if !matches!(id.vendor, Vendor::Intel | Vendor::Amd) || !id.has_x86(X86Feature::Hypervisor) {
        return None;
    }
    let hypervisor = match exec_cpuid(HYPERVISOR_LEAF, 0) {
        Ok(regs) => from_signature(&signature_string(&regs)),
        Err(e) => {
            debug!(error = %e, "Hypervisor leaf unavailable");
            Hypervisor::Unknown
        }
    };
    debug!(%hypervisor, "Hypervisor detected");
    Some(hypervisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs_from(signature: &[u8; 12]) -> CpuidRegs {
        let word = |i: usize| u32::from_le_bytes([signature[i], signature[i + 1], signature[i + 2], signature[i + 3]]);
        CpuidRegs::new(HYPERVISOR_LEAF, word(0), word(4), word(8))
    }

    #[test]
    fn test_known_signatures() {
        assert_eq!(from_signature(&signature_string(&regs_from(b"VMwareVMware"))), Hypervisor::Vmware);
        assert_eq!(from_signature(&signature_string(&regs_from(b"KVMKVMKVM\0\0\0"))), Hypervisor::Kvm);
        assert_eq!(from_signature(&signature_string(&regs_from(b"Microsoft Hv"))), Hypervisor::HyperV);
        assert_eq!(from_signature(&signature_string(&regs_from(b"prl hyperv  "))), Hypervisor::Parallels);
    }

    #[test]
    fn test_unknown_signature() {
        assert_eq!(from_signature("ACRNACRNACRN"), Hypervisor::Unknown);
    }

    #[test]
    fn test_needs_hypervisor_flag() {
        let id = CpuIdentity {
            vendor: Vendor::Intel,
            ..CpuIdentity::default()
        };
        assert_eq!(detect(&id), None);

        let mut id = CpuIdentity {
            vendor: Vendor::Arm,
            ..CpuIdentity::default()
        };
        id.x86_features.set(X86Feature::Hypervisor);
        assert_eq!(detect(&id), None);
    }
}
