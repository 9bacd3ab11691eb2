//! Register indices, device paths and driver constants

/// Model-specific register indices
pub mod msr {
    /// Maximum performance frequency clock count
    pub const IA32_MPERF: u32 = 0xe7;
    /// Actual performance frequency clock count
    pub const IA32_APERF: u32 = 0xe8;
    /// P6-era bus ratio in [26:22]
    pub const EBL_CR_POWERON: u32 = 0x2a;
    /// Maximum non-turbo ratio in [15:8]
    pub const PLATFORM_INFO: u32 = 0xce;
    /// Current ratio in [44:40], core voltage in [47:32]
    pub const PERF_STATUS: u32 = 0x198;
    pub const THERM_STATUS: u32 = 0x19c;
    /// TjMax in [23:16]
    pub const TEMPERATURE_TARGET: u32 = 0x1a2;
    /// AMD current P-state in [2:0]
    pub const AMD_PSTATE_STATUS: u32 = 0xc001_0063;
    /// AMD P-state 0 definition; P-state n is at +n
    pub const AMD_PSTATE_0: u32 = 0xc001_0064;
}

/// Kernel modules providing the register devices
pub mod modules {
    pub const LINUX_MSR: &str = "msr";
    pub const LINUX_CPUID: &str = "cpuid";
    pub const FREEBSD: &str = "cpuctl";
}

/// `_IOWR('c', 0x1, cpuctl_msr_args_t)`
pub const CPUCTL_RDMSR: u64 = 0xc010_6301;

/// `_IOWR('c', 0xB0, read_reg_t)` of the ARM register driver
pub const ARM_IOC_READ_REG: u64 = 0xc010_63b0;

/// Request value the ARM driver echoes for an unsupported register
pub const ARM_REQUEST_INVALID: i32 = -1;

/// Windows RDMSR driver
pub mod driver {
    pub const SERVICE_NAME: &str = "TmpRdr";
    pub const DISPLAY_NAME: &str = "RDMSR Executor Driver";
    pub const DEVICE_PATH: &str = r"\\.\Global\TmpRdr";
    pub const IMAGE_FILE: &str = "TmpRdr.sys";

    const FILE_DEVICE_UNKNOWN: u32 = 0x22;
    const METHOD_BUFFERED: u32 = 0;
    const FILE_READ_WRITE_ACCESS: u32 = 3;

    /// `CTL_CODE(device, function, method, access)`
    pub const fn ctl_code(device: u32, function: u32, method: u32, access: u32) -> u32 {
        (device << 16) | (access << 14) | (function << 2) | method
    }

    pub const IOCTL_RDMSR: u32 =
        ctl_code(FILE_DEVICE_UNKNOWN, 0x803, METHOD_BUFFERED, FILE_READ_WRITE_ACCESS);

    /// Service status polling bounds in milliseconds
    pub const POLL_MIN_MS: u32 = 1_000;
    pub const POLL_MAX_MS: u32 = 10_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdmsr_ioctl_code() {
        assert_eq!(driver::IOCTL_RDMSR, 0x0022_e00c);
    }
}
