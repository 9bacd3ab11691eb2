//! Raw signature to CPU identity

use tracing::debug;

use crate::identity::CpuIdentity;
use crate::raw::{Architecture, RawSignature};
use crate::vendor;

/// Decode a raw signature into a CPU identity
///
/// Decoding never fails; anything the signature does not determine is left
/// at its unknown value. `total_logical_cpus` is not known from a signature
/// alone and stays -1 (see [`crate::system::identify_current`]).
pub fn identify(raw: &RawSignature) -> CpuIdentity {
    match raw.architecture() {
        Architecture::X86 => vendor::identify_x86(raw),
        Architecture::Arm => vendor::arm::identify(raw),
        Architecture::Unknown => {
            debug!("Empty signature, nothing to identify");
            CpuIdentity::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Vendor;
    use crate::raw::CpuidRegs;

    #[test]
    fn test_empty_signature() {
        let id = identify(&RawSignature::new());
        assert_eq!(id, CpuIdentity::default());
        assert_eq!(id.architecture, Architecture::Unknown);
    }

    #[test]
    fn test_dispatch_by_architecture() {
        let mut raw = RawSignature::new();
        raw.set_basic(0, CpuidRegs::new(1, 0x756e_6547, 0x6c65_746e, 0x4965_6e69));
        let id = identify(&raw);
        assert_eq!(id.architecture, Architecture::X86);
        assert_eq!(id.vendor, Vendor::Intel);

        let mut raw = RawSignature::new();
        raw.arm.midr = Some(0x410f_d034);
        let id = identify(&raw);
        assert_eq!(id.architecture, Architecture::Arm);
        assert_eq!(id.brand_str, "Cortex-A53");
    }

    #[test]
    fn test_identify_is_deterministic() {
        let mut raw = RawSignature::new();
        raw.set_basic(0, CpuidRegs::new(1, 0x6874_7541, 0x444d_4163, 0x6974_6e65));
        raw.set_basic(1, CpuidRegs::new(0x0080_0f11, 0x0010_0800, 0x7ed8_320b, 0x178b_fbff));
        assert_eq!(identify(&raw), identify(&raw));
    }
}
