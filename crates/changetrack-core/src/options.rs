use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options controlling how far wrapping reaches into an object graph.
///
/// Loadable from the `[tracking]` table of a TOML file:
///
/// ```toml
/// [tracking]
/// make_complex_properties_trackable = true
/// make_collection_properties_trackable = false
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackOptions {
    /// Wrap objects held by complex properties and relay their changes.
    #[serde(default = "default_true")]
    pub make_complex_properties_trackable: bool,
    /// Wrap collections (and their elements) and intercept Add/Remove/Clear.
    #[serde(default = "default_true")]
    pub make_collection_properties_trackable: bool,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            make_complex_properties_trackable: default_true(),
            make_collection_properties_trackable: default_true(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    tracking: TrackOptions,
}

impl TrackOptions {
    #[must_use]
    pub const fn with_complex_properties(mut self, trackable: bool) -> Self {
        self.make_complex_properties_trackable = trackable;
        self
    }

    #[must_use]
    pub const fn with_collection_properties(mut self, trackable: bool) -> Self {
        self.make_collection_properties_trackable = trackable;
        self
    }

    /// Parse the `[tracking]` table of a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or a key has the
    /// wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: OptionsFile =
            toml::from_str(content).context("Failed to parse tracking options")?;
        Ok(file.tracking)
    }

    /// Load options from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

const fn default_true() -> bool {
    true
}
