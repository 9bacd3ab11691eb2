//! CPU feature flags
//!
//! Features are closed enumerations ([`X86Feature`], [`ArmFeature`]) stored
//! in a fixed-size [`FeatureSet`]. Each feature carries the lowercase name
//! used in `/proc/cpuinfo` style listings.

use std::fmt;
use std::marker::PhantomData;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

pub use arm::ArmFeature;
pub use x86::{decode_x86_64_level, CpuidReg, LeafTable, X86Feature, X86_COMMON_TABLES};

/// Capacity of a [`FeatureSet`] in flags
pub const MAX_FEATURES: usize = 256;

/// A member of a closed feature enumeration
pub trait Feature: Copy + Eq + fmt::Debug + 'static {
    /// Every feature, in declaration order
    const ALL: &'static [Self];

    /// Position of the feature inside a [`FeatureSet`]
    fn index(self) -> usize;

    /// Lowercase feature name
    fn name(self) -> &'static str;

    /// Look a feature up by its lowercase name
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Declare a feature enumeration together with its [`Feature`] impl
macro_rules! feature_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $label:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($variant,)*
        }

        impl $crate::features::Feature for $name {
            const ALL: &'static [Self] = &[$(Self::$variant,)*];

            fn index(self) -> usize {
                self as usize
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)*
                }
            }
        }

        const _: () = assert!(
            <$name as $crate::features::Feature>::ALL.len() <= $crate::features::MAX_FEATURES
        );

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::features::Feature::name(*self))
            }
        }
    };
}

mod arm;
mod x86;

/// Fixed-size set of feature flags
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FeatureSet<F> {
    bits: [u64; MAX_FEATURES / 64],
    _marker: PhantomData<F>,
}

impl<F: Feature> Default for FeatureSet<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Feature> FeatureSet<F> {
    pub fn new() -> Self {
        Self {
            bits: [0; MAX_FEATURES / 64],
            _marker: PhantomData,
        }
    }

    pub fn set(&mut self, feature: F) {
        let i = feature.index();
        self.bits[i / 64] |= 1 << (i % 64);
    }

    /// Clear a flag. Only topology decoding does this (hyperthreading on a
    /// single logical CPU).
    pub fn clear(&mut self, feature: F) {
        let i = feature.index();
        self.bits[i / 64] &= !(1 << (i % 64));
    }

    pub fn contains(&self, feature: F) -> bool {
        let i = feature.index();
        self.bits[i / 64] & (1 << (i % 64)) != 0
    }

    pub fn contains_all(&self, features: &[F]) -> bool {
        features.iter().all(|f| self.contains(*f))
    }

    pub fn insert_if(&mut self, feature: F, present: bool) {
        if present {
            self.set(feature);
        }
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Set features in declaration order
    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        F::ALL.iter().copied().filter(move |f| self.contains(*f))
    }

    /// Names of the set features in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Feature::name).collect()
    }
}

impl<F: Feature> FromIterator<F> for FeatureSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut set = Self::new();
        for feature in iter {
            set.set(feature);
        }
        set
    }
}

impl<F: Feature> fmt::Debug for FeatureSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Feature::name)).finish()
    }
}

impl<F: Feature> Serialize for FeatureSet<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for feature in self.iter() {
            seq.serialize_element(feature.name())?;
        }
        seq.end()
    }
}

/// Apply a bit table to a register: every `(bit, feature)` whose bit is set
/// marks the feature present.
pub fn match_features<F: Feature>(table: &[(u8, F)], register: u32, set: &mut FeatureSet<F>) {
    for (bit, feature) in table {
        if (register >> bit) & 1 == 1 {
            set.set(*feature);
        }
    }
}

/// Architecture compliance level
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum FeatureLevel {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "x86-64-v1")]
    X86_64V1,
    #[serde(rename = "x86-64-v2")]
    X86_64V2,
    #[serde(rename = "x86-64-v3")]
    X86_64V3,
    #[serde(rename = "x86-64-v4")]
    X86_64V4,
    #[serde(rename = "ARMv4")]
    ArmV4,
    #[serde(rename = "ARMv4T")]
    ArmV4T,
    #[serde(rename = "ARMv5")]
    ArmV5,
    #[serde(rename = "ARMv5T")]
    ArmV5T,
    #[serde(rename = "ARMv5TE")]
    ArmV5TE,
    #[serde(rename = "ARMv5TEJ")]
    ArmV5TEJ,
    #[serde(rename = "ARMv6")]
    ArmV6,
    #[serde(rename = "ARMv6-M")]
    ArmV6M,
    #[serde(rename = "ARMv7-A")]
    ArmV7A,
    #[serde(rename = "ARMv7-R")]
    ArmV7R,
    #[serde(rename = "ARMv7-M")]
    ArmV7M,
    #[serde(rename = "ARMv7E-M")]
    ArmV7EM,
    #[serde(rename = "ARMv8.0-A")]
    ArmV8_0A,
    #[serde(rename = "ARMv8.1-A")]
    ArmV8_1A,
    #[serde(rename = "ARMv8.2-A")]
    ArmV8_2A,
    #[serde(rename = "ARMv8.3-A")]
    ArmV8_3A,
    #[serde(rename = "ARMv8.4-A")]
    ArmV8_4A,
    #[serde(rename = "ARMv8.5-A")]
    ArmV8_5A,
    #[serde(rename = "ARMv8.6-A")]
    ArmV8_6A,
    #[serde(rename = "ARMv8.7-A")]
    ArmV8_7A,
    #[serde(rename = "ARMv8.8-A")]
    ArmV8_8A,
    #[serde(rename = "ARMv8.9-A")]
    ArmV8_9A,
    #[serde(rename = "ARMv8.0-R")]
    ArmV8_0R,
    #[serde(rename = "ARMv8.0-M")]
    ArmV8_0M,
    #[serde(rename = "ARMv8.1-M")]
    ArmV8_1M,
    #[serde(rename = "ARMv9.0-A")]
    ArmV9_0A,
    #[serde(rename = "ARMv9.1-A")]
    ArmV9_1A,
    #[serde(rename = "ARMv9.2-A")]
    ArmV9_2A,
    #[serde(rename = "ARMv9.3-A")]
    ArmV9_3A,
    #[serde(rename = "ARMv9.4-A")]
    ArmV9_4A,
}

impl FeatureLevel {
    /// Number of levels, for per-level counter arrays
    pub const COUNT: usize = FeatureLevel::ArmV9_4A as usize + 1;

    pub fn name(self) -> &'static str {
        use FeatureLevel::*;
        match self {
            Unknown => "unknown",
            X86_64V1 => "x86-64-v1",
            X86_64V2 => "x86-64-v2",
            X86_64V3 => "x86-64-v3",
            X86_64V4 => "x86-64-v4",
            ArmV4 => "ARMv4",
            ArmV4T => "ARMv4T",
            ArmV5 => "ARMv5",
            ArmV5T => "ARMv5T",
            ArmV5TE => "ARMv5TE",
            ArmV5TEJ => "ARMv5TEJ",
            ArmV6 => "ARMv6",
            ArmV6M => "ARMv6-M",
            ArmV7A => "ARMv7-A",
            ArmV7R => "ARMv7-R",
            ArmV7M => "ARMv7-M",
            ArmV7EM => "ARMv7E-M",
            ArmV8_0A => "ARMv8.0-A",
            ArmV8_1A => "ARMv8.1-A",
            ArmV8_2A => "ARMv8.2-A",
            ArmV8_3A => "ARMv8.3-A",
            ArmV8_4A => "ARMv8.4-A",
            ArmV8_5A => "ARMv8.5-A",
            ArmV8_6A => "ARMv8.6-A",
            ArmV8_7A => "ARMv8.7-A",
            ArmV8_8A => "ARMv8.8-A",
            ArmV8_9A => "ARMv8.9-A",
            ArmV8_0R => "ARMv8.0-R",
            ArmV8_0M => "ARMv8.0-M",
            ArmV8_1M => "ARMv8.1-M",
            ArmV9_0A => "ARMv9.0-A",
            ArmV9_1A => "ARMv9.1-A",
            ArmV9_2A => "ARMv9.2-A",
            ArmV9_3A => "ARMv9.3-A",
            ArmV9_4A => "ARMv9.4-A",
        }
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut set = FeatureSet::<X86Feature>::new();
        assert!(set.is_empty());
        set.set(X86Feature::Sse2);
        set.set(X86Feature::Ht);
        assert!(set.contains(X86Feature::Sse2));
        assert_eq!(set.len(), 2);
        set.clear(X86Feature::Ht);
        assert!(!set.contains(X86Feature::Ht));
        assert_eq!(set.names(), vec!["sse2"]);
    }

    #[test]
    fn test_high_index_features() {
        let last = *ArmFeature::ALL.last().unwrap();
        let mut set = FeatureSet::<ArmFeature>::new();
        set.set(last);
        assert!(set.contains(last));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![last]);
    }

    #[test]
    fn test_match_features() {
        let table = [(0, X86Feature::Fpu), (4, X86Feature::Tsc), (31, X86Feature::Pbe)];
        let mut set = FeatureSet::new();
        match_features(&table, 0x8000_0011, &mut set);
        assert!(set.contains(X86Feature::Fpu));
        assert!(set.contains(X86Feature::Tsc));
        assert!(set.contains(X86Feature::Pbe));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_serialize_as_names() {
        let set: FeatureSet<X86Feature> = [X86Feature::Avx2, X86Feature::Fpu].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["fpu","avx2"]"#);
    }

    #[test]
    fn test_feature_names_unique() {
        let mut names: Vec<_> = X86Feature::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), X86Feature::ALL.len());

        let mut names: Vec<_> = ArmFeature::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ArmFeature::ALL.len());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(X86Feature::from_name("sse4_2"), Some(X86Feature::Sse4_2));
        assert_eq!(ArmFeature::from_name("sve2"), Some(ArmFeature::Sve2));
        assert_eq!(X86Feature::from_name("nope"), None);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(FeatureLevel::ArmV8_5A.to_string(), "ARMv8.5-A");
        assert_eq!(
            serde_json::to_string(&FeatureLevel::X86_64V3).unwrap(),
            r#""x86-64-v3""#
        );
        assert!(FeatureLevel::ArmV8_9A < FeatureLevel::ArmV9_0A);
    }
}
