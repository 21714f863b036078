//! Supported carbon registries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A third-party registry that certifies offset projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registry {
    /// Verra Verified Carbon Standard
    Vcs,
    /// Gold Standard
    GoldStandard,
    /// Climate Action Reserve
    Car,
    /// American Carbon Registry
    Acr,
}

impl Registry {
    /// Id prefix used by this registry, e.g. `VCS` in `VCS-1001`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Vcs => "VCS",
            Self::GoldStandard => "GS",
            Self::Car => "CAR",
            Self::Acr => "ACR",
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vcs => "vcs",
            Self::GoldStandard => "gold_standard",
            Self::Car => "car",
            Self::Acr => "acr",
        }
    }

    /// All registries.
    pub fn all() -> [Self; 4] {
        [Self::Vcs, Self::GoldStandard, Self::Car, Self::Acr]
    }

    /// Registry that issued an id, from its prefix.
    ///
    /// The part after the prefix may only hold ASCII letters, digits, `.`,
    /// `_` and `-`.
    pub fn from_registry_id(registry_id: &str) -> Option<Self> {
        let (prefix, rest) = registry_id.trim().split_once('-')?;
        if rest.is_empty() || !rest.chars().all(is_id_char) {
            return None;
        }
        Self::all()
            .into_iter()
            .find(|r| r.prefix().eq_ignore_ascii_case(prefix))
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
