//! Privileged register access for cpusig
//!
//! Reads model-specific registers on x86 and identification/system
//! registers on ARM through the OS driver of each platform:
//! - Linux: `/dev/cpu/<n>/msr` and `/dev/cpu/<n>/cpuid` (modules `msr`, `cpuid`)
//! - FreeBSD: `/dev/cpuctl<n>` and `/dev/cpuid<n>` (module `cpuctl`)
//! - Windows: the `TmpRdr` kernel driver, installed on demand

mod channel;
pub mod constants;
pub mod info;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
mod unix;
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
use unix as platform;

#[cfg(windows)]
mod win;
#[cfg(windows)]
use win as platform;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    windows
)))]
mod stub;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    windows
)))]
use stub as platform;

pub use channel::{
    register_driver_image, ChannelKind, ChannelOptions, Register, RegisterBackend,
    RegisterChannel,
};
#[cfg(test)]
pub use channel::MockRegisterBackend;
pub use info::{msr_info, perf_rate, read_range, MsrInfo};

pub use cs_error::{CpuidError, Result};
