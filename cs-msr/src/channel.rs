//! Register channel: an open handle to the register driver of one core

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use cs_core::{cached_identity, total_cpus, Architecture, ArmRegister, X86Feature};
use cs_error::{CpuidError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::platform;

/// A register a channel can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// x86 model-specific register
    Msr(u32),
    /// ARM identification or system register
    System(ArmRegister),
}

impl Register {
    /// Request number reported in `InvalidRequest` errors
    pub fn request(self) -> i32 {
        match self {
            Self::Msr(index) => index as i32,
            Self::System(reg) => reg.request(),
        }
    }
}

/// Platform driver behind a channel
#[cfg_attr(test, mockall::automock)]
pub trait RegisterBackend: Send {
    fn read(&mut self, register: Register) -> Result<u64>;
    fn close(&mut self) -> Result<()>;
}

/// Which driver a channel talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// x86 MSR driver
    Msr,
    /// ARM register driver
    SystemRegisters,
}

/// Options for opening a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOptions {
    /// Load the kernel module when the device is missing (root only)
    pub auto_load: bool,
    /// RDMSR driver image to install on Windows
    pub driver_image: Option<PathBuf>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            auto_load: true,
            driver_image: None,
        }
    }
}

static DRIVER_IMAGE: OnceLock<&'static [u8]> = OnceLock::new();

/// Register a built-in Windows driver image, used when the options name none
///
/// Returns false when an image was already registered.
pub fn register_driver_image(image: &'static [u8]) -> bool {
    DRIVER_IMAGE.set(image).is_ok()
}

pub(crate) fn registered_driver_image() -> Option<&'static [u8]> {
    DRIVER_IMAGE.get().copied()
}

enum ChannelState {
    Open(Box<dyn RegisterBackend>),
    Closed,
}

/// Open register channel of one logical CPU
pub struct RegisterChannel {
    core: u32,
    kind: ChannelKind,
    state: ChannelState,
}

/// Whether the current CPU can execute RDMSR at all
fn msr_supported() -> bool {
    match cached_identity() {
        Ok(id) if id.architecture == Architecture::X86 => id.has_x86(X86Feature::Msr),
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "No identity to check MSR support against");
            false
        }
    }
}

impl RegisterChannel {
    /// Open the register driver of logical CPU `core`
    pub fn open(core: u32, kind: ChannelKind, options: &ChannelOptions) -> Result<Self> {
        let total = total_cpus() as u32;
        if core >= total {
            return Err(CpuidError::InvalidCoreNumber { core, total });
        }
        if kind == ChannelKind::Msr && !msr_supported() {
            return Err(CpuidError::NoRdmsr);
        }

        let backend = platform::open(core, kind, options)?;
        info!(core, ?kind, "Register channel open");
        Ok(Self::from_backend(core, kind, backend))
    }

    /// Wrap an already opened backend
    pub fn from_backend(core: u32, kind: ChannelKind, backend: Box<dyn RegisterBackend>) -> Self {
        Self {
            core,
            kind,
            state: ChannelState::Open(backend),
        }
    }

    pub fn core(&self) -> u32 {
        self.core
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ChannelState::Open(_))
    }

    /// Read a model-specific register
    pub fn read_msr(&mut self, index: u32) -> Result<u64> {
        self.read(Register::Msr(index))
    }

    /// Read an ARM identification/system register
    pub fn read_system_register(&mut self, reg: ArmRegister) -> Result<u64> {
        self.read(Register::System(reg))
    }

    fn read(&mut self, register: Register) -> Result<u64> {
        match &mut self.state {
            ChannelState::Open(backend) => backend.read(register),
            ChannelState::Closed => Err(CpuidError::InvalidHandle),
        }
    }

    /// Release the driver; the channel cannot be used afterwards
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ChannelState::Closed) {
            ChannelState::Open(mut backend) => {
                debug!(core = self.core, "Closing register channel");
                backend.close()
            }
            ChannelState::Closed => Err(CpuidError::InvalidHandle),
        }
    }
}

impl fmt::Debug for RegisterChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterChannel")
            .field("core", &self.core)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for RegisterChannel {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(core = self.core, "Register channel dropped while open, closing");
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close register channel");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn closing_backend() -> MockRegisterBackend {
        let mut backend = MockRegisterBackend::new();
        backend.expect_close().times(1).returning(|| Ok(()));
        backend
    }

    #[test]
    fn test_read_through_backend() {
        let mut backend = closing_backend();
        backend
            .expect_read()
            .with(eq(Register::Msr(0x198)))
            .returning(|_| Ok(0x1f00_0000_1c00));
        let mut channel = RegisterChannel::from_backend(0, ChannelKind::Msr, Box::new(backend));

        assert_eq!(channel.read_msr(0x198).unwrap(), 0x1f00_0000_1c00);
        channel.close().unwrap();
    }

    #[test]
    fn test_closed_channel_rejects_use() {
        let mut channel =
            RegisterChannel::from_backend(0, ChannelKind::Msr, Box::new(closing_backend()));
        channel.close().unwrap();
        assert!(!channel.is_open());
        assert!(matches!(channel.read_msr(0x10), Err(CpuidError::InvalidHandle)));
        assert!(matches!(channel.close(), Err(CpuidError::InvalidHandle)));
    }

    #[test]
    fn test_drop_closes_open_channel() {
        // close() is expected exactly once; the mock verifies on drop
        let channel = RegisterChannel::from_backend(
            1,
            ChannelKind::SystemRegisters,
            Box::new(closing_backend()),
        );
        drop(channel);
    }

    #[test]
    fn test_invalid_core_number() {
        let core = total_cpus() as u32;
        let err = RegisterChannel::open(core, ChannelKind::Msr, &ChannelOptions::default())
            .unwrap_err();
        assert!(matches!(err, CpuidError::InvalidCoreNumber { .. }));
    }

    #[test]
    fn test_backend_errors_propagate() {
        let mut backend = closing_backend();
        backend
            .expect_read()
            .returning(|r| Err(CpuidError::InvalidRequest(r.request())));
        let mut channel =
            RegisterChannel::from_backend(0, ChannelKind::SystemRegisters, Box::new(backend));
        let err = channel.read_system_register(ArmRegister::IdAa64Pfr0).unwrap_err();
        assert!(matches!(err, CpuidError::InvalidRequest(r) if r == ArmRegister::IdAa64Pfr0.request()));
    }

    #[test]
    fn test_default_options() {
        let options = ChannelOptions::default();
        assert!(options.auto_load);
        let parsed: ChannelOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, options);
    }
}
