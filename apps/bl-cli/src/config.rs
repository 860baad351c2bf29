use anyhow::{Context, Result};
use device_registry::{DuplicatePolicy, FailureMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manifest files or directories, resolved in this order.
    pub manifests: Vec<String>,
    pub duplicates: DuplicatePolicy,
    pub failure: FailureMode,
    /// Legacy-command cross-reference table.
    pub xref: String,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifests: vec!["configs/devices.yml".to_string()],
            duplicates: DuplicatePolicy::Reject,
            failure: FailureMode::Strict,
            xref: "docs/spec_xref.md".to_string(),
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub environment: String,
    pub startup_module: String,
    pub program: String,
    /// `{module}` is replaced by `startup_module`.
    pub args: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            environment: "bluesky_2024_3".to_string(),
            startup_module: "id12_common.startup".to_string(),
            program: "ipython".to_string(),
            args: vec![
                "-i".to_string(),
                "-c".to_string(),
                "from {module} import *".to_string(),
            ],
        }
    }
}

impl SessionConfig {
    pub fn command_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{module}", &self.startup_module))
            .collect()
    }
}

impl Config {
    /// Read the config, or fall back to defaults when the file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("reading config: {path}"))?;
            serde_json::from_str(&contents).with_context(|| format!("parsing config: {path}"))
        } else {
            tracing::debug!(path, "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing config: {path}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bl.json");
        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bl.json");
        let path = path.to_str().unwrap();
        let mut cfg = Config::default();
        cfg.failure = FailureMode::Lenient;
        cfg.manifests.push("configs/site".into());
        cfg.save(path).unwrap();
        assert_eq!(Config::load(path).unwrap(), cfg);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bl.json");
        fs::write(&path, r#"{"duplicates": "overwrite"}"#).unwrap();
        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.duplicates, DuplicatePolicy::Overwrite);
        assert_eq!(cfg.session.program, "ipython");
    }

    #[test]
    fn test_module_placeholder() {
        let s = SessionConfig::default();
        assert_eq!(
            s.command_args(),
            vec!["-i", "-c", "from id12_common.startup import *"]
        );
    }

    #[test]
    fn test_shipped_config_parses() {
        let cfg: Config = serde_json::from_str(include_str!("../../../configs/bl.json")).unwrap();
        assert_eq!(cfg.manifests, vec!["configs/devices.yml"]);
        assert_eq!(cfg.session, SessionConfig::default());
    }
}
