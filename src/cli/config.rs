use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tillbook.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: String,
    pub teller: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: "tillbook.db".into(),
            teller: std::env::var("USER").unwrap_or_else(|_| "teller".into()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    database: Option<String>,
    teller: Option<String>,
}

impl Settings {
    /// Overlay values from a TOML document.
    pub fn apply_toml(&mut self, raw: &str) -> Result<()> {
        let file: FileSettings = toml::from_str(raw).context("Invalid configuration file")?;
        if let Some(v) = file.database {
            self.database = v;
        }
        if let Some(v) = file.teller {
            self.teller = v;
        }
        Ok(())
    }

    /// Overlay `TILLBOOK_*` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TILLBOOK_DATABASE") {
            self.database = v;
        }
        if let Some(v) = lookup("TILLBOOK_TELLER") {
            self.teller = v;
        }
    }
}

/// Resolve settings: defaults, then the config file, then the environment,
/// then command-line flags.
pub fn load_settings(
    config_path: Option<&Path>,
    database: Option<String>,
    teller: Option<String>,
) -> Result<Settings> {
    let mut settings = Settings::default();

    match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            settings.apply_toml(&raw)?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                settings.apply_toml(&raw)?;
            }
        }
    }

    settings.apply_env(|key| std::env::var(key).ok());

    if let Some(v) = database {
        settings.database = v;
    }
    if let Some(v) = teller {
        settings.teller = v;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_toml_overrides_defaults() {
        let mut settings = Settings::default();
        settings
            .apply_toml("database = \"/var/lib/till.db\"\nteller = \"alice\"\n")
            .unwrap();

        assert_eq!(settings.database, "/var/lib/till.db");
        assert_eq!(settings.teller, "alice");
    }

    #[test]
    fn test_partial_toml_keeps_other_values() {
        let mut settings = Settings::default();
        settings.apply_toml("teller = \"bob\"").unwrap();

        assert_eq!(settings.database, "tillbook.db");
        assert_eq!(settings.teller, "bob");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let mut settings = Settings::default();
        assert!(settings.apply_toml("databse = \"typo.db\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([("TILLBOOK_TELLER", "carol")]);
        let mut settings = Settings::default();
        settings.apply_toml("teller = \"bob\"").unwrap();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.teller, "carol");
        assert_eq!(settings.database, "tillbook.db");
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"from-file.db\"").unwrap();
        writeln!(file, "teller = \"file-teller\"").unwrap();

        let settings =
            load_settings(Some(file.path()), None, Some("flag-teller".to_string())).unwrap();

        assert_eq!(settings.teller, "flag-teller");
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_settings(Some(&missing), None, None).is_err());
    }
}
