//! Loading run settings, datasets and impact methods from disk
//!
//! Settings files are YAML. Datasets and characterization methods may be
//! YAML or JSON, chosen by file extension.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use lcimc_core::config::RunConfig;
use lcimc_core::lcia::CharacterizationMethod;
use lcimc_core::model::{Dataset, OutputSelection};

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io { path, message } => {
                write!(f, "cannot read {}: {}", path.display(), message)
            }
            SettingsError::Parse { path, message } => {
                write!(f, "cannot parse {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

fn parse<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, SettingsError> {
    let parse_error = |message: String| SettingsError::Parse {
        path: path.to_path_buf(),
        message,
    };
    if is_yaml(path) {
        serde_saphyr::from_str(content).map_err(|e| parse_error(e.to_string()))
    } else {
        serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, SettingsError> {
    let content = fs::read_to_string(path).map_err(|e| SettingsError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse(path, &content)
}

/// Run settings from a YAML file
pub fn load_run_config(path: &Path) -> Result<RunConfig, SettingsError> {
    let content = fs::read_to_string(path).map_err(|e| SettingsError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    run_config_from_yaml(&content).map_err(|e| SettingsError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn run_config_from_yaml(yaml: &str) -> Result<RunConfig, serde_saphyr::Error> {
    serde_saphyr::from_str(yaml)
}

pub fn load_dataset(path: &Path) -> Result<Dataset, SettingsError> {
    load(path)
}

pub fn load_method(path: &Path) -> Result<CharacterizationMethod, SettingsError> {
    load(path)
}

/// Command-line values that take precedence over a settings file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub iterations: Option<usize>,
    pub workers: Option<usize>,
    /// Replaces the configured selection when any flag is set
    pub outputs: Option<OutputSelection>,
}

impl Overrides {
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(outputs) = self.outputs {
            config.outputs = outputs;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_yaml_settings() {
        let yaml = r#"
seed: 7
iterations: 50
workers: 2
outputs:
  Inventory: true
  Supply: true
  Matrices: false
domains:
  - name: land_use
    input_rules:
      - name_contains: "Transformation, from"
    output_rules:
      - name_contains: "Transformation, to"
"#;
        let config = run_config_from_yaml(yaml).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.iterations, 50);
        assert_eq!(config.worker_count(), 2);
        assert!(config.outputs.supply && !config.outputs.matrices);
        assert_eq!(config.domains.len(), 1);
        assert_eq!(config.domains[0].elementary_scale, 1.0);
        assert_eq!(config.functional_unit_amount, 1.0);
    }

    #[test]
    fn test_overrides_win() {
        let config = RunConfig {
            iterations: 10,
            seed: Some(1),
            ..RunConfig::default()
        };
        let overrides = Overrides {
            iterations: Some(20),
            outputs: Some(OutputSelection::all()),
            ..Overrides::default()
        };
        let config = overrides.apply(config);
        assert_eq!(config.iterations, 20);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.outputs, OutputSelection::all());
    }

    #[test]
    fn test_dataset_format_from_extension() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("db.json");
        fs::write(&json, r#"{"name": "db", "activities": [], "flows": []}"#).unwrap();
        assert_eq!(load_dataset(&json).unwrap().name, "db");

        let yaml = dir.path().join("db.yaml");
        fs::write(&yaml, "name: db\nactivities: []\nflows: []\n").unwrap();
        assert_eq!(load_dataset(&yaml).unwrap().name, "db");

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_dataset(&missing),
            Err(SettingsError::Io { .. })
        ));
    }
}
