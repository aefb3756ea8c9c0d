//! Harness configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use botcheck_common::{reference, RuleTable, TemplateStore, VariableBindings};

use crate::context::Randomization;
use crate::driver::DriverConfig;
use crate::error::HarnessResult;

/// Prefix of environment variables that override default bindings
pub const VAR_ENV_PREFIX: &str = "BOTCHECK_VAR_";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory of scenario YAML files; absent uses the built-in scenarios
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenarios_dir: Option<PathBuf>,

    /// Rule file; absent uses the reference rule set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,

    /// Where results are written
    pub output_dir: PathBuf,

    /// Browser session
    pub session: SessionConfig,

    /// Waits and polling
    pub timing: TimingConfig,

    /// Run termination and cleanup
    pub run: RunConfig,

    /// Default bindings layered over the reference defaults
    pub variables: BTreeMap<String, String>,

    /// Per-run value pools
    pub randomization: Randomization,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: None,
            rules_file: None,
            output_dir: PathBuf::from("test-results"),
            session: SessionConfig::default(),
            timing: TimingConfig::default(),
            run: RunConfig::default(),
            variables: BTreeMap::new(),
            randomization: Randomization::reference(),
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chat to open (the bot's contact name)
    pub contact_name: String,

    /// Run the browser headless
    pub headless: bool,

    /// Persistent browser profile, keeps the chat login between runs
    pub session_dir: PathBuf,

    /// Node.js binary used for the browser bridge
    pub node_binary: String,

    /// Bound of a single bridge request
    pub bridge_timeout_ms: u64,

    /// How long to wait for the chat app to be logged in
    pub login_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            contact_name: "Twilio".to_string(),
            headless: false,
            session_dir: PathBuf::from(".botcheck/session"),
            node_binary: "node".to_string(),
            bridge_timeout_ms: 120_000,
            login_timeout_ms: 180_000,
        }
    }
}

/// Waits used while aggregating a bot turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub first_fragment_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub first_fragment_grace_ms: u64,
    pub settle_ms: u64,
    pub aggregation_backoff_ms: Vec<u64>,
    pub cancel_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            first_fragment_timeout_ms: 45_000,
            poll_interval_ms: 200,
            first_fragment_grace_ms: 1_500,
            settle_ms: 5_000,
            aggregation_backoff_ms: vec![2_000, 1_000],
            cancel_settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Message sent to abandon a flow before clearing the chat
    pub cancel_keyword: String,

    /// Per-run wall-clock bound; absent is unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,

    /// Identical replies in a row that count as a loop
    pub history_len: usize,

    /// Clear the chat before each run
    pub reset_conversation: bool,

    /// Consecutive unmatched turns tolerated; absent is unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle_turns: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cancel_keyword: "cancelar".to_string(),
            deadline_ms: None,
            history_len: crate::context::DEFAULT_HISTORY_LEN,
            reset_conversation: true,
            max_idle_turns: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file; a missing file yields defaults
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `BOTCHECK_VAR_<NAME>=value` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_vars(std::env::vars());
    }

    /// Apply `BOTCHECK_VAR_<NAME>=value` overrides from the given pairs
    pub fn apply_env_vars<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
                if name.is_empty() {
                    continue;
                }
                let name = name.to_lowercase();
                debug!("Binding {} from environment", name);
                self.variables.insert(name, value);
            }
        }
    }

    /// Reference defaults overlaid with configured variables
    pub fn bindings(&self) -> HarnessResult<VariableBindings> {
        let mut bindings = VariableBindings::new(reference::reference_defaults());
        for (name, value) in &self.variables {
            bindings.set_default(name, value.clone())?;
        }
        Ok(bindings)
    }

    /// The configured rule file, or the reference rule set
    pub fn rule_table(&self) -> HarnessResult<RuleTable> {
        match &self.rules_file {
            Some(path) => {
                let table = RuleTable::from_file(path)?;
                info!("Loaded {} rule(s) from {}", table.len(), path.display());
                Ok(table)
            }
            None => Ok(reference::reference_rules()?),
        }
    }

    /// The configured scenario directory, or the built-in scenarios
    pub fn template_store(&self) -> HarnessResult<TemplateStore> {
        match &self.scenarios_dir {
            Some(dir) => Ok(TemplateStore::load_dir(dir)?),
            None => Ok(TemplateStore::from_scenarios(reference::reference_scenarios())?),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        let ms = Duration::from_millis;
        DriverConfig {
            first_fragment_timeout: ms(self.timing.first_fragment_timeout_ms),
            poll_interval: ms(self.timing.poll_interval_ms),
            first_fragment_grace: ms(self.timing.first_fragment_grace_ms),
            settle: ms(self.timing.settle_ms),
            aggregation_backoff: self
                .timing
                .aggregation_backoff_ms
                .iter()
                .copied()
                .map(ms)
                .collect(),
            cancel_settle: ms(self.timing.cancel_settle_ms),
            cancel_keyword: self.run.cancel_keyword.clone(),
            deadline: self.run.deadline_ms.map(ms),
            reset_conversation: self.run.reset_conversation,
            max_idle_turns: self.run.max_idle_turns,
        }
    }

    /// Path of the suite results file
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(crate::runner::RESULTS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.driver_config(), DriverConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("botcheck.toml");

        let mut config = HarnessConfig::default();
        config.run.deadline_ms = Some(600_000);
        config.run.max_idle_turns = Some(3);
        config.variables.insert("crop_name".into(), "centeno".into());
        config.save(&path).unwrap();

        assert_eq!(HarnessConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("botcheck.toml");
        std::fs::write(
            &path,
            r#"
[session]
contact_name = "AgroBot"

[timing]
settle_ms = 8000
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.session.contact_name, "AgroBot");
        assert_eq!(config.session.node_binary, "node");
        assert_eq!(config.timing.settle_ms, 8000);
        assert_eq!(config.timing.first_fragment_timeout_ms, 45_000);
        assert_eq!(config.run.cancel_keyword, "cancelar");
    }

    #[test]
    fn test_env_overrides_bindings() {
        let mut config = HarnessConfig::default();
        config.apply_env_vars(vec![
            ("BOTCHECK_VAR_CROP_NAME".to_string(), "centeno".to_string()),
            ("BOTCHECK_VAR_".to_string(), "ignored".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);

        let bindings = config.bindings().unwrap();
        assert_eq!(bindings.get("crop_name"), Some("centeno"));
        assert_eq!(bindings.default_value("crop_name"), Some("centeno"));
        assert_eq!(bindings.get("brand"), Some("GrainMaster"));
        assert_eq!(config.variables.len(), 1);
    }

    #[test]
    fn test_invalid_variable_name_rejected() {
        let mut config = HarnessConfig::default();
        config.variables.insert("bad-name".into(), "x".into());
        assert!(config.bindings().is_err());
    }

    #[test]
    fn test_default_sources() {
        let config = HarnessConfig::default();
        assert!(!config.rule_table().unwrap().is_empty());
        assert!(config.template_store().unwrap().get("create_crop").is_some());
        assert_eq!(
            config.results_path(),
            PathBuf::from("test-results/botcheck-results.json")
        );
    }
}
