//! CPU clock estimation
//!
//! The OS is asked first; otherwise the time stamp counter is sampled
//! against the system clock over a busy-wait interval.

use std::time::{Duration, Instant};

use cs_error::Result;
use tracing::debug;

/// Intervals shorter than this give unreliable readings
const MIN_MARK_INTERVAL_US: u64 = 10_000;

/// Measurement interval used by [`clock`] when the OS does not know
const DEFAULT_MEASURE_MS: u64 = 200;

/// Read the time stamp counter
pub fn rdtsc() -> Result<u64> {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC is available on every x86-64 CPU
        Ok(unsafe { core::arch::x86_64::_rdtsc() })
    }
    #[cfg(target_arch = "x86")]
    {
        if !crate::raw::cpuid_present() {
            return Err(cs_error::CpuidError::NoRdtsc);
        }
        // SAFETY: CPUID-capable x86 CPUs implement RDTSC
        Ok(unsafe { core::arch::x86::_rdtsc() })
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        Err(cs_error::CpuidError::NoRdtsc)
    }
}

/// A time stamp counter reading paired with a system clock reading
#[derive(Debug, Clone, Copy)]
pub struct TscMark {
    tsc: u64,
    started: Instant,
    ticks: u64,
    elapsed_us: u64,
}

impl TscMark {
    /// Take a mark now
    pub fn mark() -> Result<Self> {
        Ok(Self {
            tsc: rdtsc()?,
            started: Instant::now(),
            ticks: 0,
            elapsed_us: 0,
        })
    }

    /// Record the interval since [`TscMark::mark`]
    pub fn unmark(&mut self) -> Result<()> {
        let now = rdtsc()?;
        self.elapsed_us = self.started.elapsed().as_micros() as u64;
        self.ticks = now.wrapping_sub(self.tsc);
        Ok(())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// Clock in MHz over the marked interval, -1 when it is too short
    pub fn clock_by_mark(&self) -> i32 {
        if self.elapsed_us < MIN_MARK_INTERVAL_US {
            return -1;
        }
        (self.ticks / self.elapsed_us) as i32
    }
}

/// Measure the clock by busy-waiting for `millis` milliseconds
pub fn clock_measure(millis: u64) -> Result<i32> {
    let mut mark = TscMark::mark()?;
    let interval = Duration::from_millis(millis);
    while mark.started.elapsed() < interval {
        std::hint::spin_loop();
    }
    mark.unmark()?;
    let mhz = mark.clock_by_mark();
    debug!(millis, ticks = mark.ticks, mhz, "Measured clock");
    Ok(mhz)
}

/// Clock in MHz as reported by the OS
pub fn clock_by_os() -> Option<i32> {
    imp::clock_by_os()
}

/// Best-effort clock in MHz: the OS value, else a measurement
pub fn clock() -> Result<i32> {
    match clock_by_os() {
        Some(mhz) if mhz > 0 => Ok(mhz),
        _ => clock_measure(DEFAULT_MEASURE_MS),
    }
}

/// Parse the first `cpu MHz` line of /proc/cpuinfo
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_cpuinfo_mhz(cpuinfo: &str) -> Option<i32> {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("cpu MHz"))
        .find_map(|line| line.split_once(':'))
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
        .map(|mhz| mhz.round() as i32)
}

#[cfg(target_os = "linux")]
mod imp {
    pub fn clock_by_os() -> Option<i32> {
        let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
        super::parse_cpuinfo_mhz(&cpuinfo)
    }
}

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
mod imp {
    use std::process::Command;

    pub fn clock_by_os() -> Option<i32> {
        let output = Command::new("sysctl")
            .args(["-n", "hw.clockrate"])
            .output()
            .ok()?;
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd", target_os = "dragonfly")))]
mod imp {
    pub fn clock_by_os() -> Option<i32> {
        None
    }
}
