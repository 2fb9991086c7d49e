//! Crate configuration: which providers take part in a federated search,
//! per-provider credentials, remembered form inputs, and the result-list
//! sort order.
//!
//! Settings are loaded from a TOML file (default
//! `<config dir>/bibfetch/config.toml`) merged with `BIBFETCH_`-prefixed
//! environment variables.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Ordering applied by the sortable result-list view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    AuthorNewestTitle,
    AuthorOldestTitle,
    NewestAuthorTitle,
    OldestAuthorTitle,
}

/// Zotero API credentials, either configured by the user or produced by the
/// OAuth exchange in [`crate::zotero`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoteroSettings {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub private_key: String,
}

/// Per-provider API credentials supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// `name -> enabled` for the provider fleet; providers not listed are
    /// enabled by default.
    #[serde(default)]
    pub search_engines: HashMap<String, bool>,

    #[serde(default)]
    pub zotero: ZoteroSettings,

    /// Per-provider credentials, keyed by the provider's machine name.
    #[serde(default)]
    pub credentials: HashMap<String, EngineCredentials>,

    /// Remembered last-used form inputs, `provider name -> field -> value`.
    #[serde(default)]
    pub engine_forms: HashMap<String, HashMap<String, String>>,

    #[serde(default)]
    pub sort_order: SortOrder,
}

impl Settings {
    /// Load settings from the default location, tolerating a missing file.
    pub fn load() -> Result<Self> {
        let path = default_config_path();
        Self::load_from(&path)
    }

    /// Load settings from an explicit path, merged with environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("BIBFETCH").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Persist the settings as TOML, creating parent directories as
    /// needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| crate::error::Error::InvalidInput {
            field: "settings".to_string(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Whether the named provider participates in federated searches.
    /// Unknown providers default to enabled.
    #[must_use]
    pub fn is_engine_enabled(&self, name: &str) -> bool {
        self.search_engines.get(name).copied().unwrap_or(true)
    }

    pub fn set_engine_enabled(&mut self, name: &str, enabled: bool) {
        self.search_engines.insert(name.to_string(), enabled);
    }

    #[must_use]
    pub fn credentials_for(&self, name: &str) -> EngineCredentials {
        self.credentials.get(name).cloned().unwrap_or_default()
    }

    /// Remembered form input for one provider's search form.
    #[must_use]
    pub fn form_value(&self, engine: &str, field: &str) -> Option<&str> {
        self.engine_forms
            .get(engine)
            .and_then(|form| form.get(field))
            .map(String::as_str)
    }

    pub fn remember_form_value(&mut self, engine: &str, field: &str, value: &str) {
        self.engine_forms
            .entry(engine.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bibfetch")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_engines_are_enabled_by_default() {
        let settings = Settings::default();
        assert!(settings.is_engine_enabled("arxivorg"));
    }

    #[test]
    fn disabled_engine_round_trip() {
        let mut settings = Settings::default();
        settings.set_engine_enabled("jstor", false);
        assert!(!settings.is_engine_enabled("jstor"));
        assert!(settings.is_engine_enabled("pubmed"));
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sort_order = "newest_author_title"

[search_engines]
jstor = false

[zotero]
user_id = "12345"
private_key = "abcdef"

[engine_forms.arxivorg]
free_text = "quantum error correction"
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.sort_order, SortOrder::NewestAuthorTitle);
        assert!(!settings.is_engine_enabled("jstor"));
        assert_eq!(settings.zotero.user_id, "12345");
        assert_eq!(
            settings.form_value("arxivorg", "free_text"),
            Some("quantum error correction")
        );
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut settings = Settings::default();
        settings.set_engine_enabled("mathscinet", false);
        settings.zotero.user_id = "987".to_string();
        settings.sort_order = SortOrder::OldestAuthorTitle;
        settings.save_to(&path).unwrap();

        let reloaded = Settings::load_from(&path).unwrap();
        assert!(!reloaded.is_engine_enabled("mathscinet"));
        assert_eq!(reloaded.zotero.user_id, "987");
        assert_eq!(reloaded.sort_order, SortOrder::OldestAuthorTitle);
    }

    #[test]
    fn remember_form_value_overwrites() {
        let mut settings = Settings::default();
        settings.remember_form_value("pubmed", "term", "crispr");
        settings.remember_form_value("pubmed", "term", "cas9");
        assert_eq!(settings.form_value("pubmed", "term"), Some("cas9"));
    }
}
