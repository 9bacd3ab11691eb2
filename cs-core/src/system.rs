//! Identity of the machine we are running on
//!
//! The live identity never changes during the life of the process, so it is
//! captured and decoded once and shared afterwards.

use std::sync::OnceLock;

use cs_error::{CpuidError, Result};
use tracing::{debug, warn};

use crate::identify::identify;
use crate::identity::CpuIdentity;
use crate::raw::capture;

/// Identity of the current CPU, computed on first use
static CACHED_IDENTITY: OnceLock<Result<CpuIdentity>> = OnceLock::new();

/// Capture and identify the CPU the calling thread runs on
///
/// Unlike [`identify`], this also fills in the number of logical CPUs
/// reported by the OS.
pub fn identify_current() -> Result<CpuIdentity> {
    let raw = capture()?;
    let mut id = identify(&raw);
    id.total_logical_cpus = total_cpus() as i32;
    debug!(
        vendor = %id.vendor,
        codename = %id.codename,
        total = id.total_logical_cpus,
        "Identified current CPU"
    );
    Ok(id)
}

/// Shared identity of the current CPU
///
/// The first call captures; every later call returns the same result,
/// including a capture failure.
pub fn cached_identity() -> std::result::Result<&'static CpuIdentity, &'static CpuidError> {
    CACHED_IDENTITY
        .get_or_init(|| {
            identify_current().inspect_err(|e| warn!(error = %e, "Live identification failed"))
        })
        .as_ref()
}

/// Number of logical CPUs online
pub fn total_cpus() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n > 0 {
            return n as usize;
        }
    }
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::cpuid_present;

    #[test]
    fn test_total_cpus_positive() {
        assert!(total_cpus() >= 1);
    }

    #[test]
    fn test_cached_identity_is_stable() {
        let first = cached_identity().map(|id| id as *const CpuIdentity);
        let second = cached_identity().map(|id| id as *const CpuIdentity);
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            _ => panic!("cached identity changed between calls"),
        }
    }

    #[test]
    fn test_live_identity_has_total() {
        if !cpuid_present() {
            return;
        }
        if let Ok(id) = identify_current() {
            assert_eq!(id.total_logical_cpus, total_cpus() as i32);
        }
    }
}
