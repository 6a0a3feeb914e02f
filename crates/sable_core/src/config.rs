use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::decay::{DecayConfig, DecayTable};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SableConfig {
    pub store: StoreConfig,
    /// `[decay.<name>]` overrides of the built-in decay table. Names are
    /// emotion types or body parameters; `tension` is both and one entry
    /// covers the two.
    pub decay: HashMap<String, DecayConfig>,
    pub identity: IdentityConfig,
    pub classifier: ClassifierConfig,
    pub logbook: LogbookConfig,
}

impl SableConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: SableConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SABLE_DB_PATH") {
            self.store.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SABLE_CLASSIFIER_COMMAND") {
            self.classifier.command = v;
        }
        if let Ok(v) = std::env::var("SABLE_CLASSIFIER_MODEL") {
            self.classifier.model = v;
        }
        if let Ok(v) = std::env::var("SABLE_CLASSIFIER_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.classifier.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SABLE_LOGBOOK_DIR") {
            self.logbook.dir = Some(PathBuf::from(v));
        }
    }

    /// Built-in decay table with the `[decay]` overrides applied.
    pub fn decay_table(&self) -> DecayTable {
        DecayTable::with_overrides(self.decay.iter().map(|(k, v)| (k.clone(), *v)))
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `None` means `~/.sable/consciousness.db`.
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Seed traits applied on `init` (trait → strength).
    pub traits: BTreeMap<String, f32>,
    pub core_values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Executable that answers the emotion-analysis prompt on stdout.
    pub command: String,
    /// Arguments placed before `--system-prompt`.
    pub args: Vec<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["-p".to_string()],
            model: "haiku".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogbookConfig {
    /// Directory for markdown entries. `None` means `~/.sable/logbook`.
    pub dir: Option<PathBuf>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SableConfig::default();
        assert!(cfg.store.db_path.is_none());
        assert_eq!(cfg.classifier.command, "claude");
        assert_eq!(cfg.classifier.timeout_secs, 10);
        assert!(cfg.decay.is_empty());
        assert_eq!(cfg.decay_table().get("fear"), DecayConfig::new(120.0, 0.05));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[store]
db_path = "data/sable.db"

[decay.fear]
half_life_secs = 30.0
baseline = 0.0

[decay.energy]
half_life_secs = 7200.0
baseline = 0.6

[identity]
traits = { curiosity = 0.8, skepticism = 0.7 }
core_values = ["honesty"]

[classifier]
command = "my-classifier"
args = []
model = "small"
timeout_secs = 3

[logbook]
dir = "notes"
"#;
        let cfg: SableConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.store.db_path, Some(PathBuf::from("data/sable.db")));
        let table = cfg.decay_table();
        assert_eq!(table.get("fear"), DecayConfig::new(30.0, 0.0));
        assert_eq!(table.get("energy"), DecayConfig::new(7200.0, 0.6));
        assert_eq!(table.get("joy"), DecayConfig::new(300.0, 0.15));
        assert_eq!(cfg.identity.traits["curiosity"], 0.8);
        assert_eq!(cfg.identity.core_values, vec!["honesty".to_string()]);
        assert_eq!(cfg.classifier.command, "my-classifier");
        assert!(cfg.classifier.args.is_empty());
        assert_eq!(cfg.classifier.timeout_secs, 3);
        assert_eq!(cfg.logbook.dir, Some(PathBuf::from("notes")));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let cfg: SableConfig = toml::from_str("[classifier]\nmodel = \"sonnet\"\n").unwrap();
        assert_eq!(cfg.classifier.model, "sonnet");
        assert_eq!(cfg.classifier.command, "claude");
        assert_eq!(cfg.classifier.args, vec!["-p".to_string()]);
    }

    #[test]
    fn test_load_file_and_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[classifier]\ntimeout_secs = 4\n").unwrap();

        std::env::set_var("SABLE_LOGBOOK_DIR", "/tmp/sable-logbook-test");
        let cfg = SableConfig::load(&path).unwrap();
        std::env::remove_var("SABLE_LOGBOOK_DIR");

        assert_eq!(cfg.classifier.timeout_secs, 4);
        assert_eq!(cfg.logbook.dir, Some(PathBuf::from("/tmp/sable-logbook-test")));

        let cfg = SableConfig::load_or_default("/nonexistent/sable.toml");
        assert_eq!(cfg.classifier.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[store\n").unwrap();
        assert!(SableConfig::load(&path).is_err());
    }
}
