//! Cache categories and the per-instance category registry

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A class of cached report. Each category has its own subdirectory and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    InfographieDepartements,
    InfographieRegions,
    InfographiePays,
    InfographieCommunesExcursion,
    InfographieIndicateursCles,
    InfographiePeriodes,
    TdbDepartementsTouristes,
    TdbRegionsTouristes,
    TdbPaysTouristes,
    TdbAgeTouristes,
    TdbCspTouristes,
    TdbDepartementsExcursionnistes,
    TdbRegionsExcursionnistes,
    TdbPaysExcursionnistes,
    TdbAgeExcursionnistes,
    TdbCspExcursionnistes,
    TdbComparison,
    TdbFilters,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 18] = [
        CacheCategory::InfographieDepartements,
        CacheCategory::InfographieRegions,
        CacheCategory::InfographiePays,
        CacheCategory::InfographieCommunesExcursion,
        CacheCategory::InfographieIndicateursCles,
        CacheCategory::InfographiePeriodes,
        CacheCategory::TdbDepartementsTouristes,
        CacheCategory::TdbRegionsTouristes,
        CacheCategory::TdbPaysTouristes,
        CacheCategory::TdbAgeTouristes,
        CacheCategory::TdbCspTouristes,
        CacheCategory::TdbDepartementsExcursionnistes,
        CacheCategory::TdbRegionsExcursionnistes,
        CacheCategory::TdbPaysExcursionnistes,
        CacheCategory::TdbAgeExcursionnistes,
        CacheCategory::TdbCspExcursionnistes,
        CacheCategory::TdbComparison,
        CacheCategory::TdbFilters,
    ];

    /// Stable name used in cache keys, stats and configuration
    pub fn name(self) -> &'static str {
        match self {
            CacheCategory::InfographieDepartements => "infographie_departements",
            CacheCategory::InfographieRegions => "infographie_regions",
            CacheCategory::InfographiePays => "infographie_pays",
            CacheCategory::InfographieCommunesExcursion => "infographie_communes_excursion",
            CacheCategory::InfographieIndicateursCles => "infographie_indicateurs_cles",
            CacheCategory::InfographiePeriodes => "infographie_periodes",
            CacheCategory::TdbDepartementsTouristes => "tdb_departements_touristes",
            CacheCategory::TdbRegionsTouristes => "tdb_regions_touristes",
            CacheCategory::TdbPaysTouristes => "tdb_pays_touristes",
            CacheCategory::TdbAgeTouristes => "tdb_age_touristes",
            CacheCategory::TdbCspTouristes => "tdb_csp_touristes",
            CacheCategory::TdbDepartementsExcursionnistes => "tdb_departements_excursionnistes",
            CacheCategory::TdbRegionsExcursionnistes => "tdb_regions_excursionnistes",
            CacheCategory::TdbPaysExcursionnistes => "tdb_pays_excursionnistes",
            CacheCategory::TdbAgeExcursionnistes => "tdb_age_excursionnistes",
            CacheCategory::TdbCspExcursionnistes => "tdb_csp_excursionnistes",
            CacheCategory::TdbComparison => "tdb_comparison",
            CacheCategory::TdbFilters => "tdb_filters",
        }
    }

    /// Directory, relative to the cache root, holding this category's files
    pub fn subdirectory(self) -> &'static str {
        match self {
            CacheCategory::InfographieDepartements => "infographie/departements",
            CacheCategory::InfographieRegions => "infographie/regions",
            CacheCategory::InfographiePays => "infographie/pays",
            CacheCategory::InfographieCommunesExcursion => "infographie/communes_excursion",
            CacheCategory::InfographieIndicateursCles => "infographie/indicateurs_cles",
            CacheCategory::InfographiePeriodes => "infographie/periodes",
            CacheCategory::TdbDepartementsTouristes => "tableau_bord/departements_touristes",
            CacheCategory::TdbRegionsTouristes => "tableau_bord/regions_touristes",
            CacheCategory::TdbPaysTouristes => "tableau_bord/pays_touristes",
            CacheCategory::TdbAgeTouristes => "tableau_bord/age_touristes",
            CacheCategory::TdbCspTouristes => "tableau_bord/csp_touristes",
            CacheCategory::TdbDepartementsExcursionnistes => {
                "tableau_bord/departements_excursionnistes"
            }
            CacheCategory::TdbRegionsExcursionnistes => "tableau_bord/regions_excursionnistes",
            CacheCategory::TdbPaysExcursionnistes => "tableau_bord/pays_excursionnistes",
            CacheCategory::TdbAgeExcursionnistes => "tableau_bord/age_excursionnistes",
            CacheCategory::TdbCspExcursionnistes => "tableau_bord/csp_excursionnistes",
            CacheCategory::TdbComparison => "tableau_bord/comparison",
            CacheCategory::TdbFilters => "tableau_bord/filters",
        }
    }

    /// Default time-to-live in seconds
    pub fn default_ttl_secs(self) -> u64 {
        match self {
            CacheCategory::InfographieDepartements
            | CacheCategory::InfographieRegions
            | CacheCategory::InfographieCommunesExcursion => 14_400, // 4h
            CacheCategory::InfographiePays => 21_600, // 6h, heaviest query
            CacheCategory::InfographieIndicateursCles => 7_200,
            CacheCategory::InfographiePeriodes => 86_400,
            CacheCategory::TdbAgeTouristes
            | CacheCategory::TdbCspTouristes
            | CacheCategory::TdbAgeExcursionnistes
            | CacheCategory::TdbCspExcursionnistes => 7_200,
            CacheCategory::TdbComparison => 1_800,
            CacheCategory::TdbDepartementsTouristes
            | CacheCategory::TdbRegionsTouristes
            | CacheCategory::TdbPaysTouristes
            | CacheCategory::TdbDepartementsExcursionnistes
            | CacheCategory::TdbRegionsExcursionnistes
            | CacheCategory::TdbPaysExcursionnistes
            | CacheCategory::TdbFilters => 3_600,
        }
    }

    /// Visitor classification token used as the filename prefix, if any
    pub fn classification(self) -> Option<&'static str> {
        let name = self.name();
        if name.contains("excursionnistes") {
            Some("excursionnistes")
        } else if name.contains("touristes") || name.starts_with("infographie") {
            Some("touristes")
        } else {
            None
        }
    }

    /// Memory-tier key prefix shared by every key of this category
    pub fn key_prefix(self) -> String {
        format!("{}:", self.name())
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheCategory {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        CacheCategory::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| CacheError::UnknownCategory(s.to_string()))
    }
}

/// Effective settings of one enabled category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    pub category: CacheCategory,
    pub ttl_secs: u64,
}

impl CategorySpec {
    pub fn subdirectory(&self) -> &'static str {
        self.category.subdirectory()
    }
}

/// Categories enabled for a cache instance, with their effective TTL.
///
/// Built once at startup; TTLs never change afterwards.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    specs: BTreeMap<CacheCategory, CategorySpec>,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CategoryRegistry {
    /// Every known category with its default TTL
    pub fn standard() -> Self {
        let specs = CacheCategory::ALL
            .iter()
            .map(|&category| {
                (
                    category,
                    CategorySpec {
                        category,
                        ttl_secs: category.default_ttl_secs(),
                    },
                )
            })
            .collect();
        Self { specs }
    }

    /// Restrict the registry to the given categories, keeping their TTLs
    pub fn only(self, categories: &[CacheCategory]) -> Self {
        let specs = self
            .specs
            .into_iter()
            .filter(|(c, _)| categories.contains(c))
            .collect();
        Self { specs }
    }

    pub fn with_ttl_override(mut self, category: CacheCategory, ttl_secs: u64) -> Result<Self> {
        if ttl_secs == 0 {
            return Err(CacheError::InvalidTtl {
                category: category.name().to_string(),
                ttl_secs,
            });
        }
        self.specs
            .insert(category, CategorySpec { category, ttl_secs });
        Ok(self)
    }

    /// Apply comma-separated `name=seconds` overrides, e.g.
    /// `tdb_comparison=900,infographie_pays=43200`.
    pub fn with_overrides(self, overrides: &str) -> Result<Self> {
        let mut registry = self;
        for pair in overrides.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, secs) = pair.split_once('=').ok_or_else(|| {
                CacheError::Config(format!("expected name=seconds, got '{}'", pair))
            })?;
            let category: CacheCategory = name.trim().parse()?;
            let ttl_secs = secs.trim().parse::<u64>().map_err(|e| {
                CacheError::Config(format!("invalid TTL '{}' for {}: {}", secs.trim(), name, e))
            })?;
            registry = registry.with_ttl_override(category, ttl_secs)?;
        }
        Ok(registry)
    }

    pub fn get(&self, category: CacheCategory) -> Option<&CategorySpec> {
        self.specs.get(&category)
    }

    pub fn ttl_secs(&self, category: CacheCategory) -> Option<u64> {
        self.get(category).map(|spec| spec.ttl_secs)
    }

    /// Enabled categories in stable order
    pub fn iter(&self) -> impl Iterator<Item = &CategorySpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
