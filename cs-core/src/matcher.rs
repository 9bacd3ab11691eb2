//! Weighted codename matching against the vendor databases

use tracing::debug;

use crate::identity::{CpuIdentity, Vendor};
use crate::pattern::{clean_brand, match_pattern};

/// Brand pattern with the score bonus it grants on a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrandPattern {
    pub pattern: &'static str,
    pub weight: i32,
}

/// One row of a codename database. `None` fields match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchEntry {
    pub family: Option<i32>,
    pub model: Option<i32>,
    pub stepping: Option<i32>,
    pub ext_family: Option<i32>,
    pub ext_model: Option<i32>,
    pub cores: Option<i32>,
    pub l2: Option<i32>,
    pub l3: Option<i32>,
    pub brand: Option<BrandPattern>,
    pub codename: &'static str,
    pub technology: &'static str,
}

const fn wild(value: i32) -> Option<i32> {
    if value < 0 {
        None
    } else {
        Some(value)
    }
}

/// Start a database row from family, model, stepping, ext_family, ext_model.
/// Negative values are wildcards.
pub const fn cpu(family: i32, model: i32, stepping: i32, ext_family: i32, ext_model: i32) -> MatchEntry {
    MatchEntry {
        family: wild(family),
        model: wild(model),
        stepping: wild(stepping),
        ext_family: wild(ext_family),
        ext_model: wild(ext_model),
        cores: None,
        l2: None,
        l3: None,
        brand: None,
        codename: "",
        technology: "",
    }
}

impl MatchEntry {
    pub const fn cores(mut self, cores: i32) -> Self {
        self.cores = wild(cores);
        self
    }

    /// L2 and L3 sizes in KB
    pub const fn cache(mut self, l2: i32, l3: i32) -> Self {
        self.l2 = wild(l2);
        self.l3 = wild(l3);
        self
    }

    pub const fn brand(mut self, pattern: &'static str, weight: i32) -> Self {
        self.brand = Some(BrandPattern { pattern, weight });
        self
    }

    pub const fn name(mut self, codename: &'static str, technology: &'static str) -> Self {
        self.codename = codename;
        self.technology = technology;
        self
    }

    /// Score of this entry against an identity whose brand was already cleaned
    fn score_cleaned(&self, identity: &CpuIdentity, brand: &str) -> i32 {
        let exact = |field: Option<i32>, value: i32, points: i32| match field {
            Some(expected) if expected == value => points,
            _ => 0,
        };

        let mut score = exact(self.family, identity.family, 2)
            + exact(self.model, identity.model, 2)
            + exact(self.stepping, identity.stepping, 2)
            + exact(self.ext_family, identity.ext_family, 2)
            + exact(self.ext_model, identity.ext_model, 2)
            + exact(self.cores, identity.num_cores, 2)
            + exact(self.l2, identity.caches.l2.size_kb, 1)
            + exact(self.l3, identity.caches.l3.size_kb, 1);

        if let Some(brand_pattern) = self.brand {
            if match_pattern(brand, brand_pattern.pattern) > 0 {
                score += brand_pattern.weight;
            }
        }
        score
    }
}

/// Score one entry against an identity
pub fn score(entry: &MatchEntry, identity: &CpuIdentity) -> i32 {
    entry.score_cleaned(identity, &clean_brand(&identity.brand_str))
}

/// Pick the best database row and write its codename and technology into the
/// identity. Ties go to the earlier row. Returns the winning score, -1 for an
/// empty table.
pub fn match_codename(table: &[MatchEntry], identity: &mut CpuIdentity) -> i32 {
    let brand = clean_brand(&identity.brand_str);

    let mut best: Option<(&MatchEntry, i32)> = None;
    for entry in table {
        let s = entry.score_cleaned(identity, &brand);
        if best.map_or(true, |(_, top)| s > top) {
            best = Some((entry, s));
        }
    }

    let Some((entry, top)) = best else {
        identity.match_score = -1;
        return -1;
    };

    debug!(
        codename = entry.codename,
        score = top,
        "Matched codename"
    );
    identity.codename = entry.codename.to_string();
    identity.technology = entry.technology.to_string();
    identity.match_score = top;
    top
}

/// Distinct codenames of a table, in table order
fn distinct_codenames(table: &[MatchEntry]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for entry in table {
        if !names.iter().any(|n| n == entry.codename) {
            names.push(entry.codename.to_string());
        }
    }
    names
}

/// Every CPU name the databases know for a vendor
///
/// x86 vendors list codenames; ARM implementers list part names.
pub fn cpu_list(vendor: Vendor) -> Vec<String> {
    match vendor {
        Vendor::Intel => distinct_codenames(crate::vendor::intel::CODENAMES),
        Vendor::Amd => distinct_codenames(crate::vendor::amd::CODENAMES),
        Vendor::Hygon => distinct_codenames(crate::vendor::amd::HYGON_CODENAMES),
        Vendor::Centaur => distinct_codenames(crate::vendor::centaur::CODENAMES),
        other => crate::vendor::arm::parts::part_names(other)
            .into_iter()
            .filter(|name| name != "unknown")
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CacheInfo;

    fn identity(family: i32, model: i32, ext_family: i32, ext_model: i32, brand: &str) -> CpuIdentity {
        CpuIdentity {
            family,
            model,
            ext_family,
            ext_model,
            brand_str: brand.to_string(),
            ..CpuIdentity::default()
        }
    }

    #[test]
    fn test_score_fields() {
        let mut id = identity(6, 14, 6, 158, "Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz");
        id.num_cores = 6;
        id.caches.l2 = CacheInfo::new(256, 4, 64);

        let entry = cpu(6, 14, -1, 6, 158).cores(6).cache(256, -1);
        assert_eq!(score(&entry, &id), 2 + 2 + 2 + 2 + 2 + 1);

        let entry = cpu(-1, -1, -1, 6, 158).brand("Core(TM) i7-8###K", 6);
        assert_eq!(score(&entry, &id), 4 + 6);
    }

    #[test]
    fn test_brand_is_cleaned_before_matching() {
        let id = identity(6, 0, 6, 0, "Intel(R)  Xeon(R) CPU   E5-2690 v4");
        let entry = cpu(-1, -1, -1, -1, -1).brand("Xeon(R) E5-2690", 5);
        assert_eq!(score(&entry, &id), 5);
    }

    #[test]
    fn test_tie_goes_to_earlier_entry() {
        let table = [
            cpu(15, -1, -1, -1, -1).name("First", "14 nm"),
            cpu(15, -1, -1, -1, -1).name("Second", "7 nm"),
        ];
        let mut id = identity(15, 1, 23, 1, "");
        assert_eq!(match_codename(&table, &mut id), 2);
        assert_eq!(id.codename, "First");
        assert_eq!(id.technology, "14 nm");
        assert_eq!(id.match_score, 2);
    }

    #[test]
    fn test_all_zero_scores_pick_first() {
        let table = [
            cpu(-1, -1, -1, -1, -1).name("Unknown", ""),
            cpu(3, -1, -1, -1, -1).name("Other", ""),
        ];
        let mut id = identity(15, 1, 23, 1, "");
        assert_eq!(match_codename(&table, &mut id), 0);
        assert_eq!(id.codename, "Unknown");
    }

    #[test]
    fn test_empty_table() {
        let mut id = CpuIdentity::default();
        assert_eq!(match_codename(&[], &mut id), -1);
        assert!(id.codename.is_empty());
    }

    #[test]
    fn test_cpu_list_deduplicates() {
        let amd = cpu_list(Vendor::Amd);
        assert!(amd.iter().any(|n| n == "Ryzen 7 (Summit Ridge)"));
        let mut sorted = amd.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), amd.len());
    }

    #[test]
    fn test_cpu_list_arm_parts() {
        let arm = cpu_list(Vendor::Arm);
        assert!(arm.iter().any(|n| n == "Cortex-A53"));
        assert!(cpu_list(Vendor::Unknown).is_empty());
    }
}
