//! Blend presets — named equity/crypto weight pairs.
//!
//! The table is data: either the built-in QUARTZ set or a TOML file of the form
//!
//! ```toml
//! [presets.QUARTZ9]
//! equity = 9
//! crypto = 1
//! ```
//!
//! Names are matched case-insensitively and stored upper-case.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// One named weighting. Only the ratio matters; weights need not sum to anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlendPreset {
    pub equity: u32,
    pub crypto: u32,
}

impl BlendPreset {
    pub fn new(equity: u32, crypto: u32) -> Self {
        Self { equity, crypto }
    }
}

/// Why a requested token does not name a preset. Always the caller's fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Symbol is required")]
    EmptyToken,

    #[error("Invalid symbol: {token}")]
    UnknownPreset { token: String },
}

/// Normalised names that collide with fixed HTTP routes.
pub const RESERVED_NAMES: &[&str] = &["HEALTH"];

/// Problems loading a preset table.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("read preset file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse preset TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("preset table is empty")]
    Empty,

    #[error("preset name must not be blank")]
    BlankName,

    #[error("preset name {name} is reserved")]
    ReservedName { name: String },

    #[error("preset {name} appears more than once (names are case-insensitive)")]
    Duplicate { name: String },

    #[error("preset {name} has a zero weight (equity={equity}, crypto={crypto})")]
    ZeroWeight { name: String, equity: u32, crypto: u32 },
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    presets: BTreeMap<String, BlendPreset>,
}

/// The enumerated set of presets a request may name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetTable {
    presets: BTreeMap<String, BlendPreset>,
}

impl PresetTable {
    /// Build a table, normalising names and rejecting zero weights and reserved names.
    pub fn new<I, S>(entries: I) -> Result<Self, PresetError>
    where
        I: IntoIterator<Item = (S, BlendPreset)>,
        S: AsRef<str>,
    {
        let mut presets = BTreeMap::new();
        for (name, preset) in entries {
            let name = normalize(name.as_ref());
            if name.is_empty() {
                return Err(PresetError::BlankName);
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(PresetError::ReservedName { name });
            }
            if preset.equity == 0 || preset.crypto == 0 {
                return Err(PresetError::ZeroWeight {
                    name,
                    equity: preset.equity,
                    crypto: preset.crypto,
                });
            }
            if presets.insert(name.clone(), preset).is_some() {
                return Err(PresetError::Duplicate { name });
            }
        }
        if presets.is_empty() {
            return Err(PresetError::Empty);
        }
        Ok(Self { presets })
    }

    /// QUARTZ9 (9/1), QUARTZ7 (7/3), QUARTZ5 (5/5).
    pub fn builtin() -> Self {
        let presets = [
            ("QUARTZ9", BlendPreset::new(9, 1)),
            ("QUARTZ7", BlendPreset::new(7, 3)),
            ("QUARTZ5", BlendPreset::new(5, 5)),
        ]
        .into_iter()
        .map(|(name, preset)| (name.to_string(), preset))
        .collect();
        Self { presets }
    }

    /// Load a table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PresetError> {
        let content = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a table from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, PresetError> {
        let file: PresetFile = toml::from_str(content)?;
        Self::new(file.presets)
    }

    /// Resolve a request token, ignoring case and surrounding whitespace.
    pub fn resolve(&self, token: &str) -> Result<(&str, BlendPreset), ResolveError> {
        let name = normalize(token);
        if name.is_empty() {
            return Err(ResolveError::EmptyToken);
        }
        self.presets
            .get_key_value(&name)
            .map(|(name, preset)| (name.as_str(), *preset))
            .ok_or_else(|| ResolveError::UnknownPreset {
                token: token.to_string(),
            })
    }

    /// Iterate presets in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BlendPreset)> {
        self.presets.iter().map(|(name, preset)| (name.as_str(), preset))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(token: &str) -> String {
    token.trim().to_ascii_uppercase()
}
