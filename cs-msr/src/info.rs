//! Derived MSR values: multipliers, temperature, voltage and bus clock

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use cs_core::clock::clock_measure;
use cs_core::constants::bits::field;
use cs_core::Vendor;
use cs_error::{CpuidError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::channel::RegisterChannel;
use crate::constants::msr;

const PERF_DELAY: Duration = Duration::from_millis(10);
const CLOCK_MEASURE_MS: u64 = 100;

/// Read bits `high..=low` of an MSR
pub fn read_range(channel: &mut RegisterChannel, index: u32, high: u8, low: u8) -> Result<u64> {
    if high > 63 || low > high {
        return Err(CpuidError::InvalidRange { high, low });
    }
    let value = channel.read_msr(index)?;
    Ok(field(value, high, low))
}

/// Increment rate of a counter MSR per microsecond over a short busy delay
///
/// `None` when the counter or the clock did not move forward.
pub fn perf_rate(channel: &mut RegisterChannel, index: u32) -> Result<Option<u64>> {
    let x = channel.read_msr(index)?;
    let start = Instant::now();
    while start.elapsed() < PERF_DELAY {
        std::hint::spin_loop();
    }
    let y = channel.read_msr(index)?;
    let micros = start.elapsed().as_micros() as u64;

    if micros == 0 || x > y {
        debug!(index, x, y, "Counter did not advance");
        return Ok(None);
    }
    Ok(Some((y - x) / micros))
}

/// Value that [`msr_info`] can derive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsrInfo {
    Mperf,
    Aperf,
    CurMultiplier,
    MaxMultiplier,
    Temperature,
    Throttling,
    Voltage,
    Bclk,
}

impl MsrInfo {
    pub const ALL: [MsrInfo; 8] = [
        Self::Mperf,
        Self::Aperf,
        Self::CurMultiplier,
        Self::MaxMultiplier,
        Self::Temperature,
        Self::Throttling,
        Self::Voltage,
        Self::Bclk,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mperf => "mperf",
            Self::Aperf => "aperf",
            Self::CurMultiplier => "cur_multiplier",
            Self::MaxMultiplier => "max_multiplier",
            Self::Temperature => "temperature",
            Self::Throttling => "throttling",
            Self::Voltage => "voltage",
            Self::Bclk => "bclk",
        }
    }
}

impl fmt::Display for MsrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MsrInfo {
    type Err = CpuidError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|info| info.name() == wanted)
            .ok_or_else(|| CpuidError::NotFound(s.to_string()))
    }
}

/// Derive `which` from the MSRs of an open channel
///
/// Unreadable registers and values the vendor does not report give `None`.
pub fn msr_info(channel: &mut RegisterChannel, vendor: Vendor, which: MsrInfo) -> Option<f64> {
    let mut clock = || match clock_measure(CLOCK_MEASURE_MS) {
        Ok(mhz) if mhz > 0 => Some(f64::from(mhz)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Clock measurement failed");
            None
        }
    };
    derive(channel, vendor, which, &mut clock)
}

fn derive(
    channel: &mut RegisterChannel,
    vendor: Vendor,
    which: MsrInfo,
    clock: &mut dyn FnMut() -> Option<f64>,
) -> Option<f64> {
    let value = match which {
        MsrInfo::Mperf => rate(channel, msr::IA32_MPERF),
        MsrInfo::Aperf => rate(channel, msr::IA32_APERF),
        MsrInfo::CurMultiplier => cur_multiplier(channel, vendor, clock),
        MsrInfo::MaxMultiplier => max_multiplier(channel, vendor),
        MsrInfo::Temperature => temperature(channel, vendor),
        MsrInfo::Throttling => None,
        MsrInfo::Voltage => voltage(channel, vendor),
        MsrInfo::Bclk => bclk(channel, vendor, clock),
    };
    trace!(%which, ?value, "MSR info");
    value
}

fn range(channel: &mut RegisterChannel, index: u32, high: u8, low: u8) -> Option<u64> {
    match read_range(channel, index, high, low) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(index, error = %e, "MSR read failed");
            None
        }
    }
}

fn rate(channel: &mut RegisterChannel, index: u32) -> Option<f64> {
    match perf_rate(channel, index) {
        Ok(rate) => rate.map(|r| r as f64),
        Err(e) => {
            debug!(index, error = %e, "Counter read failed");
            None
        }
    }
}

fn max_multiplier(channel: &mut RegisterChannel, vendor: Vendor) -> Option<f64> {
    if vendor == Vendor::Intel {
        if let Some(ratio) = range(channel, msr::PLATFORM_INFO, 15, 8).filter(|r| *r > 0) {
            return Some(ratio as f64);
        }
    }
    range(channel, msr::PERF_STATUS, 44, 40)
        .filter(|r| *r > 0)
        .map(|r| r as f64)
}

fn bclk(
    channel: &mut RegisterChannel,
    vendor: Vendor,
    clock: &mut dyn FnMut() -> Option<f64>,
) -> Option<f64> {
    let multiplier = max_multiplier(channel, vendor)?;
    Some(clock()? / multiplier)
}

fn cur_multiplier(
    channel: &mut RegisterChannel,
    vendor: Vendor,
    clock: &mut dyn FnMut() -> Option<f64>,
) -> Option<f64> {
    if vendor == Vendor::Intel {
        let bus = bclk(channel, vendor, clock)?;
        return Some(clock()? / bus);
    }
    range(channel, msr::EBL_CR_POWERON, 26, 22).map(|r| r as f64)
}

fn temperature(channel: &mut RegisterChannel, vendor: Vendor) -> Option<f64> {
    if vendor != Vendor::Intel {
        return None;
    }
    if range(channel, msr::THERM_STATUS, 32, 31)? == 0 {
        return None;
    }
    let readout = range(channel, msr::THERM_STATUS, 22, 16)?;
    let target = range(channel, msr::TEMPERATURE_TARGET, 23, 16)?;
    Some(target as f64 - readout as f64)
}

fn voltage(channel: &mut RegisterChannel, vendor: Vendor) -> Option<f64> {
    match vendor {
        Vendor::Intel => range(channel, msr::PERF_STATUS, 47, 32)
            .filter(|v| *v > 0)
            .map(|v| v as f64 / 8192.0),
        Vendor::Amd | Vendor::Hygon => {
            let pstate = range(channel, msr::AMD_PSTATE_STATUS, 2, 0)? as u32;
            let vid = range(channel, msr::AMD_PSTATE_0 + pstate, 15, 9)?;
            Some(1.550 - 0.0125 * vid as f64)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelKind, MockRegisterBackend, Register};
    use std::collections::HashMap;

    fn channel_with(values: &[(u32, u64)]) -> RegisterChannel {
        let values: HashMap<u32, u64> = values.iter().copied().collect();
        let mut backend = MockRegisterBackend::new();
        backend.expect_read().returning(move |register| match register {
            Register::Msr(index) => values
                .get(&index)
                .copied()
                .ok_or_else(|| CpuidError::invalid_msr(index, "not present")),
            other => Err(CpuidError::InvalidRequest(other.request())),
        });
        backend.expect_close().returning(|| Ok(()));
        RegisterChannel::from_backend(0, ChannelKind::Msr, Box::new(backend))
    }

    fn fixed_clock(mhz: f64) -> impl FnMut() -> Option<f64> {
        move || Some(mhz)
    }

    #[test]
    fn test_read_range_bounds() {
        let mut channel = channel_with(&[(0x198, 0x1c00)]);
        assert_eq!(read_range(&mut channel, 0x198, 15, 8).unwrap(), 0x1c);
        assert!(matches!(
            read_range(&mut channel, 0x198, 64, 0),
            Err(CpuidError::InvalidRange { high: 64, low: 0 })
        ));
        assert!(matches!(
            read_range(&mut channel, 0x198, 3, 4),
            Err(CpuidError::InvalidRange { high: 3, low: 4 })
        ));
        assert!(matches!(
            read_range(&mut channel, 0x199, 7, 0),
            Err(CpuidError::InvalidMsr { index: 0x199, .. })
        ));
    }

    #[test]
    fn test_perf_rate_advancing_counter() {
        let mut backend = MockRegisterBackend::new();
        let mut reads = 0u64;
        backend.expect_read().returning(move |_| {
            reads += 1;
            Ok(reads * 1_000_000)
        });
        backend.expect_close().returning(|| Ok(()));
        let mut channel = RegisterChannel::from_backend(0, ChannelKind::Msr, Box::new(backend));

        let rate = perf_rate(&mut channel, msr::IA32_MPERF).unwrap();
        assert!(matches!(rate, Some(r) if r > 0));
    }

    #[test]
    fn test_perf_rate_counter_going_back() {
        let mut backend = MockRegisterBackend::new();
        let mut next = 500u64;
        backend.expect_read().returning(move |_| {
            next -= 100;
            Ok(next)
        });
        backend.expect_close().returning(|| Ok(()));
        let mut channel = RegisterChannel::from_backend(0, ChannelKind::Msr, Box::new(backend));

        assert_eq!(perf_rate(&mut channel, msr::IA32_APERF).unwrap(), None);
    }

    #[test]
    fn test_info_names() {
        assert_eq!("temperature".parse::<MsrInfo>().unwrap(), MsrInfo::Temperature);
        assert_eq!("cur-multiplier".parse::<MsrInfo>().unwrap(), MsrInfo::CurMultiplier);
        assert_eq!("BCLK".parse::<MsrInfo>().unwrap(), MsrInfo::Bclk);
        assert!(matches!("fan".parse::<MsrInfo>(), Err(CpuidError::NotFound(_))));
        for info in MsrInfo::ALL {
            assert_eq!(info.to_string().parse::<MsrInfo>().unwrap(), info);
        }
    }

    #[test]
    fn test_intel_max_multiplier_prefers_platform_info() {
        let mut channel = channel_with(&[(msr::PLATFORM_INFO, 0x2400), (msr::PERF_STATUS, 0)]);
        assert_eq!(max_multiplier(&mut channel, Vendor::Intel), Some(36.0));

        let mut channel = channel_with(&[(msr::PLATFORM_INFO, 0), (msr::PERF_STATUS, 0x1c << 40)]);
        assert_eq!(max_multiplier(&mut channel, Vendor::Intel), Some(28.0));
    }

    #[test]
    fn test_intel_clock_derived_values() {
        let mut channel = channel_with(&[(msr::PLATFORM_INFO, 0x2400)]);
        let mut clock = fixed_clock(3600.0);
        assert_eq!(
            derive(&mut channel, Vendor::Intel, MsrInfo::Bclk, &mut clock),
            Some(100.0)
        );
        assert_eq!(
            derive(&mut channel, Vendor::Intel, MsrInfo::CurMultiplier, &mut clock),
            Some(36.0)
        );
    }

    #[test]
    fn test_non_intel_cur_multiplier() {
        let mut channel = channel_with(&[(msr::EBL_CR_POWERON, 0x10 << 22)]);
        let mut clock = || -> Option<f64> { panic!("clock must not be measured") };
        assert_eq!(
            derive(&mut channel, Vendor::Amd, MsrInfo::CurMultiplier, &mut clock),
            Some(16.0)
        );
    }

    #[test]
    fn test_intel_temperature() {
        let therm = (1u64 << 31) | (35 << 16);
        let mut channel =
            channel_with(&[(msr::THERM_STATUS, therm), (msr::TEMPERATURE_TARGET, 100 << 16)]);
        assert_eq!(temperature(&mut channel, Vendor::Intel), Some(65.0));

        let mut invalid =
            channel_with(&[(msr::THERM_STATUS, 35 << 16), (msr::TEMPERATURE_TARGET, 100 << 16)]);
        assert_eq!(temperature(&mut invalid, Vendor::Intel), None);
        assert_eq!(temperature(&mut channel, Vendor::Amd), None);
    }

    #[test]
    fn test_voltage() {
        let mut intel = channel_with(&[(msr::PERF_STATUS, 0x2000u64 << 32)]);
        assert_eq!(voltage(&mut intel, Vendor::Intel), Some(1.0));

        let mut amd = channel_with(&[
            (msr::AMD_PSTATE_STATUS, 2),
            (msr::AMD_PSTATE_0 + 2, 40 << 9),
        ]);
        let v = voltage(&mut amd, Vendor::Amd).unwrap();
        assert!((v - 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_throttling_is_never_reported() {
        let mut channel = channel_with(&[]);
        let mut clock = fixed_clock(1000.0);
        assert_eq!(
            derive(&mut channel, Vendor::Intel, MsrInfo::Throttling, &mut clock),
            None
        );
    }

    #[test]
    fn test_unreadable_register_is_none() {
        let mut channel = channel_with(&[]);
        let mut clock = fixed_clock(1000.0);
        for which in [MsrInfo::MaxMultiplier, MsrInfo::Temperature, MsrInfo::Voltage, MsrInfo::Bclk] {
            assert_eq!(derive(&mut channel, Vendor::Intel, which, &mut clock), None);
        }
    }
}
