use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical GICS sectors used when no `SECTORS` override is configured.
pub const DEFAULT_SECTORS: [&str; 11] = [
    "communication_services",
    "consumer_discretionary",
    "consumer_staples",
    "energy",
    "financials",
    "health_care",
    "industrials",
    "information_technology",
    "materials",
    "real_estate",
    "utilities",
];

/// Sector identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sector(String);

impl Sector {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Sector {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

/// The fixed set of N sectors every batch must cover exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorUniverse {
    sectors: Vec<Sector>,
}

impl SectorUniverse {
    /// Builds a universe, dropping duplicate ids while keeping first-seen order.
    pub fn new(sectors: impl IntoIterator<Item = Sector>) -> Self {
        let mut seen = HashSet::new();
        let sectors = sectors
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();
        Self { sectors }
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn contains(&self, sector: &Sector) -> bool {
        self.sectors.contains(sector)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter()
    }
}

impl Default for SectorUniverse {
    fn default() -> Self {
        Self::new(DEFAULT_SECTORS.iter().map(|s| Sector::from(*s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_universe_has_eleven_sectors() {
        let u = SectorUniverse::default();
        assert_eq!(u.len(), 11);
        assert!(u.contains(&Sector::from("energy")));
    }

    #[test]
    fn duplicates_are_collapsed() {
        let u = SectorUniverse::new(["a", "b", "a"].into_iter().map(Sector::from));
        assert_eq!(u.len(), 2);
        assert_eq!(
            u.iter().map(Sector::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }
}
