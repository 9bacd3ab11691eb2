//! cpusig core library
//!
//! Identifies x86 and ARM processors from their raw CPUID leaves or ID
//! registers.
//!
//! # Module Structure
//!
//! - `raw/` - raw signature, live capture and the snapshot text format
//! - `features/` - feature flag sets, x86 tables and architecture levels
//! - `vendor/` - per-vendor decoding and codename databases
//! - `identify` - raw signature to [`CpuIdentity`]
//!
//! # Example
//!
//! ```no_run
//! use cs_core::{identify, load_snapshot};
//!
//! let parsed = load_snapshot("raw.txt").unwrap();
//! let id = identify(&parsed.raw);
//! println!("{} ({})", id.codename, id.feature_level);
//! ```

// Grouped modules
pub mod features;
pub mod raw;
pub mod vendor;

// Standalone modules
pub mod affinity;
pub mod cache;
pub mod clock;
pub mod constants;
pub mod hypervisor;
pub mod identify;
pub mod identity;
pub mod matcher;
pub mod pattern;
pub mod system;
pub mod topology;

pub use cs_error::{CpuidError, Result};

pub use features::{ArmFeature, Feature, FeatureLevel, FeatureSet, X86Feature};
pub use hypervisor::Hypervisor;
pub use identify::identify;
pub use identity::{ArmInfo, CacheInfo, CacheLevels, CpuIdentity, Purpose, SgxInfo, Vendor};
pub use matcher::cpu_list;
pub use raw::{
    capture, capture_on_cpu, cpuid_present, load_snapshot, save_snapshot, ArmRegister,
    ArmRegisters, Architecture, CpuidRegs, ParsedSnapshot, RawSignature, SnapshotWarning,
};
pub use system::{cached_identity, identify_current, total_cpus};
