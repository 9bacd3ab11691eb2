//! Pinning the current thread to one logical CPU
//!
//! [`pin_current_thread`] returns a guard; the previous affinity is restored
//! when the guard is dropped.

use cs_error::{CpuidError, Result};
use tracing::{debug, warn};

/// Restores the saved thread affinity on drop
pub struct AffinityGuard {
    cpu: usize,
    saved: imp::SavedAffinity,
}

impl std::fmt::Debug for AffinityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityGuard").field("cpu", &self.cpu).finish()
    }
}

impl AffinityGuard {
    /// Logical CPU the thread is pinned to
    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

impl Drop for AffinityGuard {
    fn drop(&mut self) {
        if let Err(e) = imp::restore(&self.saved) {
            warn!(cpu = self.cpu, error = %e, "Failed to restore thread affinity");
        }
    }
}

/// Pin the calling thread to logical CPU `cpu`
pub fn pin_current_thread(cpu: usize) -> Result<AffinityGuard> {
    let saved = imp::pin(cpu)?;
    debug!(cpu, "Pinned current thread");
    Ok(AffinityGuard { cpu, saved })
}

#[cfg(target_os = "linux")]
mod imp {
    use std::{io, mem};

    use libc::cpu_set_t;

    use super::*;

    pub type SavedAffinity = cpu_set_t;

    pub fn current() -> io::Result<cpu_set_t> {
        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut cpuset: cpu_set_t = unsafe { mem::zeroed() };

        // 0 means current thread.
        // SAFETY: No safety requirements beyond passing valid arguments.
        let result =
            unsafe { libc::sched_getaffinity(0, mem::size_of::<cpu_set_t>(), &mut cpuset) };
        if result == 0 {
            Ok(cpuset)
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn set_current(cpuset: &cpu_set_t) -> io::Result<()> {
        // SAFETY: No safety requirements beyond passing valid arguments.
        let result = unsafe { libc::sched_setaffinity(0, mem::size_of::<cpu_set_t>(), cpuset) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub fn pin(cpu: usize) -> Result<SavedAffinity> {
        let max = mem::size_of::<cpu_set_t>() * 8;
        if cpu >= max {
            return Err(CpuidError::InvalidCoreNumber {
                core: cpu as u32,
                total: max as u32,
            });
        }

        let saved = current()?;

        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut target: cpu_set_t = unsafe { mem::zeroed() };
        // SAFETY: cpu is below the set capacity, checked above.
        unsafe { libc::CPU_SET(cpu, &mut target) };
        set_current(&target)?;
        Ok(saved)
    }

    pub fn restore(saved: &SavedAffinity) -> Result<()> {
        set_current(saved)?;
        Ok(())
    }
}

#[cfg(windows)]
mod imp {
    use windows::Win32::System::SystemInformation::GROUP_AFFINITY;
    use windows::Win32::System::Threading::{GetCurrentThread, SetThreadGroupAffinity};

    use super::*;

    pub type SavedAffinity = GROUP_AFFINITY;

    fn set_current(affinity: &GROUP_AFFINITY) -> Result<GROUP_AFFINITY> {
        let mut previous = GROUP_AFFINITY::default();
        // This is a pseudo handle and does not need to be closed.
        // SAFETY: Nothing required, just an FFI call.
        let current_thread = unsafe { GetCurrentThread() };
        // SAFETY: Both pointers reference live stack values.
        unsafe { SetThreadGroupAffinity(current_thread, affinity, Some(&mut previous)) }
            .map_err(|e| CpuidError::Io(e.into()))?;
        Ok(previous)
    }

    /// Logical CPUs are numbered group by group, 64 per group
    pub fn pin(cpu: usize) -> Result<SavedAffinity> {
        let group = u16::try_from(cpu / 64).map_err(|_| CpuidError::InvalidCoreNumber {
            core: cpu as u32,
            total: u16::MAX as u32 * 64,
        })?;
        let target = GROUP_AFFINITY {
            Group: group,
            Mask: 1 << (cpu % 64),
            ..Default::default()
        };
        set_current(&target)
    }

    pub fn restore(saved: &SavedAffinity) -> Result<()> {
        set_current(saved).map(|_| ())
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod imp {
    use super::*;

    pub struct SavedAffinity;

    pub fn pin(_cpu: usize) -> Result<SavedAffinity> {
        Err(CpuidError::not_implemented(
            "thread affinity is not supported on this platform",
        ))
    }

    pub fn restore(_saved: &SavedAffinity) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    fn is_set(cpu: usize, set: &libc::cpu_set_t) -> bool {
        // SAFETY: CPU_ISSET only reads the set and cpu is within its capacity.
        unsafe { libc::CPU_ISSET(cpu, set) }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_guard_restores_affinity() {
        let capacity = std::mem::size_of::<libc::cpu_set_t>() * 8;
        let before = imp::current().unwrap();
        let allowed = (0..capacity).find(|cpu| is_set(*cpu, &before)).unwrap();

        {
            let guard = pin_current_thread(allowed).unwrap();
            assert_eq!(guard.cpu(), allowed);
            let pinned = imp::current().unwrap();
            assert!(is_set(allowed, &pinned));
            assert_eq!((0..capacity).filter(|cpu| is_set(*cpu, &pinned)).count(), 1);
        }

        let after = imp::current().unwrap();
        for cpu in 0..capacity {
            assert_eq!(is_set(cpu, &before), is_set(cpu, &after), "cpu {}", cpu);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pin_out_of_range() {
        let err = pin_current_thread(1 << 20).unwrap_err();
        assert!(matches!(err, CpuidError::InvalidCoreNumber { .. }));
    }
}
