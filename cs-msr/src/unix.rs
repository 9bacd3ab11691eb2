//! Register devices of Linux and the BSDs
//!
//! MSRs are read with `pread` on Linux and the `CPUCTL_RDMSR` ioctl on
//! FreeBSD; ARM registers go through the `ARM_IOC_READ_REG` ioctl of the
//! cpuid device on both.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use cs_core::ArmRegister;
use cs_error::{CpuidError, Result};
use tracing::{debug, info};

use crate::channel::{ChannelKind, ChannelOptions, Register, RegisterBackend};
use crate::constants::{modules, ARM_IOC_READ_REG, ARM_REQUEST_INVALID, CPUCTL_RDMSR};

/// How registers are read from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// 8-byte `pread` at the MSR index
    Pread,
    /// FreeBSD `CPUCTL_RDMSR`
    Cpuctl,
    /// ARM register driver ioctl
    ArmIoctl,
}

#[repr(C)]
struct CpuctlMsrArgs {
    msr: libc::c_int,
    data: u64,
}

#[repr(C)]
struct ReadRegRequest {
    request: i32,
    value: u64,
}

#[derive(Debug)]
struct DeviceBackend {
    file: Option<File>,
    path: PathBuf,
    access: Access,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn device_path(core: u32, kind: ChannelKind) -> PathBuf {
    match kind {
        ChannelKind::Msr => PathBuf::from(format!("/dev/cpu/{core}/msr")),
        ChannelKind::SystemRegisters => PathBuf::from(format!("/dev/cpu/{core}/cpuid")),
    }
}

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
fn device_path(core: u32, kind: ChannelKind) -> PathBuf {
    match kind {
        ChannelKind::Msr => PathBuf::from(format!("/dev/cpuctl{core}")),
        ChannelKind::SystemRegisters => PathBuf::from(format!("/dev/cpuid{core}")),
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn access_for(kind: ChannelKind) -> Access {
    match kind {
        ChannelKind::Msr => Access::Pread,
        ChannelKind::SystemRegisters => Access::ArmIoctl,
    }
}

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
fn access_for(kind: ChannelKind) -> Access {
    match kind {
        ChannelKind::Msr => Access::Cpuctl,
        ChannelKind::SystemRegisters => Access::ArmIoctl,
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn load_module(kind: ChannelKind) -> bool {
    let module = match kind {
        ChannelKind::Msr => modules::LINUX_MSR,
        ChannelKind::SystemRegisters => modules::LINUX_CPUID,
    };
    run_loader("modprobe", &[module])
}

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
fn load_module(_kind: ChannelKind) -> bool {
    run_loader("kldload", &["-n", modules::FREEBSD])
}

fn run_loader(program: &str, args: &[&str]) -> bool {
    info!(program, ?args, "Loading register driver module");
    match Command::new(program).args(args).stderr(Stdio::null()).status() {
        Ok(status) => status.success(),
        Err(e) => {
            debug!(program, error = %e, "Module loader failed to run");
            false
        }
    }
}

fn is_readable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions
    unsafe { libc::geteuid() == 0 }
}

/// Make sure the device node exists, loading the module at most once
fn ensure_device(
    path: &Path,
    options: &ChannelOptions,
    root: bool,
    load: impl FnOnce() -> bool,
) -> Result<()> {
    if path.exists() {
        if is_readable(path) {
            return Ok(());
        }
        return Err(CpuidError::no_driver(format!(
            "{} exists but is not readable",
            path.display()
        )));
    }
    if !options.auto_load {
        return Err(CpuidError::no_driver(format!("{} not found", path.display())));
    }
    if !root {
        return Err(CpuidError::no_driver(format!(
            "{} not found and loading the driver requires root",
            path.display()
        )));
    }
    if !load() {
        return Err(CpuidError::no_driver("failed to load the driver module"));
    }
    Ok(())
}

fn open_device(path: &Path, kind: ChannelKind) -> Result<File> {
    File::open(path).map_err(|e| match (e.raw_os_error(), kind) {
        (Some(libc::EIO), ChannelKind::Msr) => CpuidError::NoRdmsr,
        (Some(libc::EIO), ChannelKind::SystemRegisters) => CpuidError::NoCpuid,
        _ => CpuidError::no_driver(format!("cannot open {}: {e}", path.display())),
    })
}

pub(crate) fn open(
    core: u32,
    kind: ChannelKind,
    options: &ChannelOptions,
) -> Result<Box<dyn RegisterBackend>> {
    let path = device_path(core, kind);
    ensure_device(&path, options, is_root(), || load_module(kind))?;
    let file = open_device(&path, kind)?;
    debug!(path = %path.display(), "Opened register device");
    Ok(Box::new(DeviceBackend {
        file: Some(file),
        path,
        access: access_for(kind),
    }))
}

impl DeviceBackend {
    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or(CpuidError::InvalidHandle)
    }

    fn read_pread(&self, index: u32) -> Result<u64> {
        let mut buf = [0u8; 8];
        let n = self
            .file()?
            .read_at(&mut buf, u64::from(index))
            .map_err(|e| CpuidError::invalid_msr(index, e.to_string()))?;
        if n != buf.len() {
            return Err(CpuidError::invalid_msr(index, format!("short read of {n} bytes")));
        }
        Ok(u64::from_ne_bytes(buf))
    }

    fn read_cpuctl(&self, index: u32) -> Result<u64> {
        let mut args = CpuctlMsrArgs {
            msr: index as libc::c_int,
            data: 0,
        };
        let fd = self.file()?.as_raw_fd();
        // SAFETY: args matches cpuctl_msr_args_t and outlives the call
        let rc = unsafe { libc::ioctl(fd, CPUCTL_RDMSR as _, &mut args as *mut CpuctlMsrArgs) };
        if rc != 0 {
            return Err(CpuidError::invalid_msr(index, io::Error::last_os_error().to_string()));
        }
        Ok(args.data)
    }

    fn read_arm(&self, register: Register) -> Result<u64> {
        let Register::System(reg) = register else {
            return Err(CpuidError::InvalidRequest(register.request()));
        };
        let mut request = ReadRegRequest {
            request: reg.request(),
            value: 0,
        };
        let fd = self.file()?.as_raw_fd();
        // SAFETY: request matches the driver's read_reg_t and outlives the call
        let rc = unsafe {
            libc::ioctl(fd, ARM_IOC_READ_REG as _, &mut request as *mut ReadRegRequest)
        };
        if rc != 0 {
            return Err(CpuidError::Ioctl(io::Error::last_os_error()));
        }
        arm_reply(reg, request.request, request.value)
    }
}

/// Value of a completed ARM register request
///
/// The driver echoes `ARM_REQUEST_INVALID` for registers it does not know.
/// Registers shared with AArch32 are 32 bits wide.
fn arm_reply(reg: ArmRegister, echoed: i32, value: u64) -> Result<u64> {
    if echoed == ARM_REQUEST_INVALID {
        return Err(CpuidError::InvalidRequest(reg.request()));
    }
    if reg.is_aarch64_only() {
        Ok(value)
    } else {
        Ok(value & 0xffff_ffff)
    }
}

impl RegisterBackend for DeviceBackend {
    fn read(&mut self, register: Register) -> Result<u64> {
        match (self.access, register) {
            (Access::Pread, Register::Msr(index)) => self.read_pread(index),
            (Access::Cpuctl, Register::Msr(index)) => self.read_cpuctl(index),
            (Access::ArmIoctl, _) => self.read_arm(register),
            (_, other) => Err(CpuidError::InvalidRequest(other.request())),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => {
                debug!(path = %self.path.display(), "Closing register device");
                drop(file);
                Ok(())
            }
            None => Err(CpuidError::InvalidHandle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_existing_device_needs_no_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let options = ChannelOptions::default();
        ensure_device(file.path(), &options, false, || panic!("must not load")).unwrap();
    }

    #[test]
    fn test_missing_device_without_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msr");
        let err = ensure_device(&path, &ChannelOptions::default(), false, || true).unwrap_err();
        assert!(matches!(err, CpuidError::NoDriver(_)));
    }

    #[test]
    fn test_auto_load_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msr");
        let options = ChannelOptions {
            auto_load: false,
            ..ChannelOptions::default()
        };
        let mut loads = 0;
        let err = ensure_device(&path, &options, true, || {
            loads += 1;
            true
        })
        .unwrap_err();
        assert!(matches!(err, CpuidError::NoDriver(_)));
        assert_eq!(loads, 0);
    }

    #[test]
    fn test_failed_load_is_no_driver() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msr");
        let err = ensure_device(&path, &ChannelOptions::default(), true, || false).unwrap_err();
        assert!(matches!(err, CpuidError::NoDriver(_)));
    }

    #[test]
    fn test_pread_at_msr_offset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut image = vec![0u8; 0x20];
        image[0x10..0x18].copy_from_slice(&0x1122_3344_5566_7788u64.to_ne_bytes());
        file.write_all(&image).unwrap();

        let mut backend = DeviceBackend {
            file: Some(File::open(file.path()).unwrap()),
            path: file.path().to_path_buf(),
            access: Access::Pread,
        };
        assert_eq!(backend.read(Register::Msr(0x10)).unwrap(), 0x1122_3344_5566_7788);
        assert!(matches!(
            backend.read(Register::Msr(0x1c)),
            Err(CpuidError::InvalidMsr { index: 0x1c, .. })
        ));
        assert!(matches!(
            backend.read(Register::System(ArmRegister::Midr)),
            Err(CpuidError::InvalidRequest(0))
        ));

        backend.close().unwrap();
        assert!(matches!(backend.read(Register::Msr(0x10)), Err(CpuidError::InvalidHandle)));
    }

    #[test]
    fn test_arm_invalid_echo() {
        let err = arm_reply(ArmRegister::IdIsar0, ARM_REQUEST_INVALID, 0x1234).unwrap_err();
        assert!(matches!(err, CpuidError::InvalidRequest(r) if r == ArmRegister::IdIsar0.request()));
    }

    #[test]
    fn test_arm_value_width() {
        let raw = 0xdead_beef_1101_1010;
        let midr = ArmRegister::Midr;
        assert_eq!(arm_reply(midr, midr.request(), raw).unwrap(), 0x1101_1010);
        let isar = ArmRegister::IdAa64Isar0;
        assert_eq!(arm_reply(isar, isar.request(), raw).unwrap(), raw);
    }
}
