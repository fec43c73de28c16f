//! Configurations shipped inside every engine version.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A configuration the engine provides under a fixed identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundledConfig {
    SunChecks,
    GoogleChecks,
}

impl BundledConfig {
    /// All bundled configurations, in display order.
    pub const ALL: [Self; 2] = [Self::SunChecks, Self::GoogleChecks];

    /// Identifier stored as the location of a bundled location.
    pub fn id(&self) -> &'static str {
        match self {
            Self::SunChecks => "bundled-sun-checks",
            Self::GoogleChecks => "bundled-google-checks",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SunChecks => "Sun Checks",
            Self::GoogleChecks => "Google Checks",
        }
    }

    /// Name of the resource inside an engine's scope.
    pub fn resource_name(&self) -> &'static str {
        match self {
            Self::SunChecks => "sun_checks.xml",
            Self::GoogleChecks => "google_checks.xml",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|config| config.id() == id.trim())
    }
}

impl fmt::Display for BundledConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for config in BundledConfig::ALL {
            assert_eq!(BundledConfig::from_id(config.id()), Some(config));
        }
        assert_eq!(BundledConfig::from_id("bundled-other"), None);
    }
}
