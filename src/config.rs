//! Agent configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. The extension table is not configurable; it is filled in code.

use destroyclaim_engine::{ModeSupport, SupportBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Which side of each mode pair the agent accepts.
    pub modes: ModeSupport,
    /// Accepted model versions and destroy reasons.
    pub claims: ClaimsConfig,
    /// Where the data the agent can destroy lives.
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsConfig {
    pub model_versions: Vec<String>,
    /// Checked only for strict-mode claims.
    pub destroy_reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory scanned for content hashes.
    pub root: PathBuf,
    /// Glob, relative to `root`, selecting indexed files.
    pub pattern: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            modes: ModeSupport::all(),
            claims: ClaimsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            model_versions: vec!["1.0.0".into()],
            destroy_reasons: vec![
                "security/integrity/malicious-data".into(),
                "compliance/laws/personal-data/gdpr".into(),
            ],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            pattern: "**/*".into(),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl AgentConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Render as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// A builder seeded with the configured modes, versions and reasons.
    pub fn support_builder(&self) -> SupportBuilder {
        SupportBuilder::from_config(
            self.modes,
            &self.claims.model_versions,
            &self.claims.destroy_reasons,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [modes]
            normal = true
            real = true

            [storage]
            root = "/srv/data"
            "#,
        )
        .unwrap();
        assert!(config.modes.normal);
        assert!(!config.modes.strict);
        assert_eq!(config.storage.root, PathBuf::from("/srv/data"));
        assert_eq!(config.storage.pattern, "**/*");
        assert_eq!(config.claims, ClaimsConfig::default());
    }

    #[test]
    fn default_renders_and_parses_back() {
        let rendered = AgentConfig::default().to_toml();
        assert!(rendered.contains("[modes]"));
        let parsed: AgentConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, AgentConfig::default());
    }
}
