//! File-based configuration: the application file and the batch file.
//!
//! Both are JSON objects merged over built-in defaults (`#[serde(default)]`),
//! so an empty object, or an empty file, yields the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CritiqueError, Result};
use crate::pipeline::{CallOptions, DEFAULT_MAX_ITERATIONS};
use crate::resolver::{ConfigResolver, ExperimentRequest};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Interactive chat.
    #[default]
    Cli,
    /// CSV batch experiment.
    Exp,
}

/// Paths for the batch runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpModuleConfig {
    pub input_csv: PathBuf,
    pub output_csv: PathBuf,
    pub config: PathBuf,
}

impl Default for ExpModuleConfig {
    fn default() -> Self {
        Self {
            input_csv: PathBuf::from("EXP001/in.csv"),
            output_csv: PathBuf::from("EXP001/out.csv"),
            config: PathBuf::from("EXP001/exp_config.json"),
        }
    }
}

impl ExpModuleConfig {
    /// All three files live in one experiment directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            input_csv: dir.join("in.csv"),
            output_csv: dir.join("out.csv"),
            config: dir.join("exp_config.json"),
        }
    }

    fn rebase(&mut self, base: &Path) {
        for path in [&mut self.input_csv, &mut self.output_csv, &mut self.config] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RunMode,
    /// Log every prompt/response pair.
    #[serde(alias = "test_mode")]
    pub verbose: bool,
    /// Experiment request used when none is given on the command line.
    #[serde(alias = "experiment")]
    pub version: ExperimentRequest,
    pub openai_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    /// Extra named presets, merged over the built-in ones.
    pub experiment_presets: BTreeMap<String, Value>,
    pub max_iterations: usize,
    pub step_timeout_secs: Option<u64>,
    pub exp_module: ExpModuleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            verbose: false,
            version: ExperimentRequest::Default,
            openai_api_key: None,
            tavily_api_key: None,
            openai_base_url: None,
            experiment_presets: BTreeMap::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            step_timeout_secs: None,
            exp_module: ExpModuleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. Relative `exp_module` paths are resolved against
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: AppConfig = read_json(path)?;
        if let Some(dir) = path.parent() {
            config.exp_module.rebase(dir);
        }
        debug!(path = %path.display(), mode = ?config.mode, "loaded configuration");
        Ok(config)
    }

    pub fn resolver(&self) -> ConfigResolver {
        ConfigResolver::new().with_presets(&self.experiment_presets)
    }

    pub fn call_options(&self) -> CallOptions {
        let mut options = CallOptions::default().with_max_iterations(self.max_iterations);
        if let Some(secs) = self.step_timeout_secs.filter(|s| *s > 0) {
            options = options.with_step_timeout(Duration::from_secs(secs));
        }
        options
    }
}

/// Per-row settings in a batch file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    pub runs: Option<u32>,
    #[serde(alias = "experiment")]
    pub version: Option<ExperimentRequest>,
}

/// Batch file: defaults plus per-row overrides keyed by case id or `rowN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub default_runs: u32,
    #[serde(alias = "default_experiment")]
    pub default_version: ExperimentRequest,
    /// Skip the first CSV record.
    pub has_header: bool,
    pub rows: BTreeMap<String, RowConfig>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_runs: 1,
            default_version: ExperimentRequest::Default,
            has_header: false,
            rows: BTreeMap::new(),
        }
    }
}

impl BatchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Row settings for `case_id`, falling back to the positional alias.
    pub fn row(&self, case_id: &str, alias: &str) -> Option<&RowConfig> {
        self.rows.get(case_id).or_else(|| self.rows.get(alias))
    }
}

fn read_json<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    let text = std::fs::read_to_string(path).map_err(|e| {
        CritiqueError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text)
        .map_err(|e| CritiqueError::Config(format!("invalid JSON in {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "config.json", "  \n");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.mode, RunMode::Cli);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.version, ExperimentRequest::Default);
        assert_eq!(config.exp_module.input_csv, dir.path().join("EXP001/in.csv"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CritiqueError::Config(_)));
    }

    #[test]
    fn aliases_and_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "config.json",
            r#"{
                "mode": "exp",
                "test_mode": true,
                "experiment": "budget",
                "step_timeout_secs": 30,
                "exp_module": {"input_csv": "/abs/in.csv"}
            }"#,
        );
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.mode, RunMode::Exp);
        assert!(config.verbose);
        assert_eq!(config.version, ExperimentRequest::named("budget"));
        assert_eq!(config.exp_module.input_csv, PathBuf::from("/abs/in.csv"));
        assert_eq!(config.exp_module.output_csv, dir.path().join("EXP001/out.csv"));

        let options = config.call_options();
        assert_eq!(options.step_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn object_experiment_becomes_overrides() {
        let config: AppConfig =
            serde_json::from_str(r#"{"version": {"default_model": "gpt-5"}}"#).unwrap();
        assert!(matches!(config.version, ExperimentRequest::Overrides(_)));
    }

    #[test]
    fn custom_presets_reach_the_resolver() {
        let config: AppConfig = serde_json::from_str(
            r#"{"experiment_presets": {"cheap": {"default_model": "gpt-4o-mini"}}}"#,
        )
        .unwrap();
        let resolver = config.resolver();
        assert!(resolver.preset_names().any(|n| n == "cheap"));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "config.json", "{ nope");
        assert!(matches!(
            AppConfig::load(&path).unwrap_err(),
            CritiqueError::Config(msg) if msg.contains("invalid JSON")
        ));
    }

    #[test]
    fn malformed_batch_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "exp_config.json", r#"{"rows": [1, 2]}"#);
        match BatchConfig::load(&path).unwrap_err() {
            CritiqueError::Config(msg) => {
                assert!(msg.contains("invalid JSON"));
                assert!(msg.contains("exp_config.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn batch_rows_fall_back_to_positional_key() {
        let config: BatchConfig = serde_json::from_str(
            r#"{
                "default_runs": 2,
                "default_experiment": "budget",
                "rows": {
                    "case-a": {"runs": 3},
                    "row2": {"experiment": "max-grounding"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.default_runs, 2);
        assert_eq!(config.default_version, ExperimentRequest::named("budget"));
        assert_eq!(config.row("case-a", "row1").and_then(|r| r.runs), Some(3));
        assert_eq!(
            config.row("case-b", "row2").and_then(|r| r.version.clone()),
            Some(ExperimentRequest::named("max-grounding"))
        );
        assert!(config.row("case-c", "row3").is_none());
    }
}
