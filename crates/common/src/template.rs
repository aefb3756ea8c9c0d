//! Scenario templates and variable bindings
//!
//! A scenario ("intent") is a named list of starter templates with `{var}`
//! placeholders. Placeholders are materialized against a [`VariableBindings`]
//! table that is reset to its defaults at the start of every run.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex"));

static VARIABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("name regex"));

/// Substitute every `{name}` with its bound value.
///
/// Unknown names are left as the literal `{name}` so a missing binding shows
/// up in the conversation instead of failing the run.
pub fn materialize(template: &str, vars: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Materialize a list of templates
pub fn materialize_all(templates: &[String], vars: &BTreeMap<String, String>) -> Vec<String> {
    templates.iter().map(|t| materialize(t, vars)).collect()
}

/// Names of the placeholders used by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Mutable variable table with a snapshot of its defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableBindings {
    values: BTreeMap<String, String>,
    defaults: BTreeMap<String, String>,
}

impl VariableBindings {
    /// Create bindings whose current values equal the given defaults
    pub fn new(defaults: BTreeMap<String, String>) -> Self {
        Self {
            values: defaults.clone(),
            defaults,
        }
    }

    /// Current value of a variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Default value of a variable
    pub fn default_value(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    /// Bind a variable for the current run
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        if !VARIABLE_NAME.is_match(name) {
            return Err(Error::InvalidVariableName(name.to_string()));
        }
        self.values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Bind several variables at once
    pub fn with_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Change a default (and the current value) permanently
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.set(name, value.clone())?;
        self.defaults.insert(name.to_string(), value);
        Ok(())
    }

    /// Restore every variable to its default; variables bound during the
    /// run that have no default are dropped.
    pub fn reset_to_defaults(&mut self) {
        self.values = self.defaults.clone();
    }

    /// Current values
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Default values
    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    /// Materialize a template against the current values
    pub fn materialize(&self, template: &str) -> String {
        materialize(template, &self.values)
    }
}

/// A named test case with one or more starter templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name of the scenario (the bot intent it exercises)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Starter templates, each driven as its own run
    pub templates: Vec<String>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, templates: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            templates,
        }
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// Ordered collection of scenarios
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStore {
    scenarios: Vec<Scenario>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate scenario names
    pub fn from_scenarios(scenarios: Vec<Scenario>) -> Result<Self> {
        let mut store = Self::new();
        for scenario in scenarios {
            store.insert(scenario)?;
        }
        Ok(store)
    }

    /// Load every `*.yaml` / `*.yml` scenario file under a directory.
    ///
    /// Files are visited in path order so batches are reproducible.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let scenario = Scenario::from_file(entry.path())?;
            debug!(
                "Loaded scenario {} ({} templates) from {}",
                scenario.name,
                scenario.templates.len(),
                entry.path().display()
            );
            store.insert(scenario)?;
        }

        Ok(store)
    }

    /// Add a scenario
    pub fn insert(&mut self, scenario: Scenario) -> Result<()> {
        if self.get(&scenario.name).is_some() {
            return Err(Error::DuplicateScenario(scenario.name));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Look up a scenario by name
    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// All scenarios in load order
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Total number of starter templates
    pub fn template_count(&self) -> usize {
        self.scenarios.iter().map(|s| s.templates.len()).sum()
    }

    /// Keep only the named scenarios, in the order given
    pub fn select_names(&self, names: &[String]) -> Result<Self> {
        let mut selected = Self::new();
        for name in names {
            let scenario = self
                .get(name)
                .ok_or_else(|| Error::ScenarioNotFound(name.clone()))?;
            selected.insert(scenario.clone())?;
        }
        Ok(selected)
    }

    /// Keep only scenarios carrying a tag
    pub fn filter_by_tag(&self, tag: &str) -> Self {
        Self {
            scenarios: self
                .scenarios
                .iter()
                .filter(|s| s.tags.iter().any(|t| t == tag))
                .cloned()
                .collect(),
        }
    }
}

/// One explicitly selected starter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub intent: String,
    pub example: String,
}

/// An explicit list of starters to run instead of whole scenarios
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub examples: Vec<SelectionEntry>,
}

impl Selection {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Group the selected starters by scenario, in first-appearance order
    pub fn into_store(self) -> TemplateStore {
        let mut scenarios: Vec<Scenario> = Vec::new();
        for entry in self.examples {
            match scenarios.iter_mut().find(|s| s.name == entry.intent) {
                Some(scenario) => scenario.templates.push(entry.example),
                None => scenarios.push(Scenario::new(entry.intent, vec![entry.example])),
            }
        }
        TemplateStore { scenarios }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_materialize_known_variable() {
        assert_eq!(materialize("Hola {nombre}", &vars(&[("nombre", "Ana")])), "Hola Ana");
    }

    #[test]
    fn test_materialize_keeps_unknown_placeholder() {
        let out = materialize("Hola {nombre}, {missing}", &vars(&[("nombre", "Ana")]));
        assert_eq!(out, "Hola Ana, {missing}");
    }

    #[test]
    fn test_materialize_repeated_and_accented() {
        let out = materialize(
            "{crop_name} y {crop_name} para {cliente}",
            &vars(&[("crop_name", "maíz"), ("cliente", "El Cortijo")]),
        );
        assert_eq!(out, "maíz y maíz para El Cortijo");
    }

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(
            placeholders("Pon {price} al {product_name} {price}"),
            vec!["price", "product_name", "price"]
        );
    }

    #[test]
    fn test_bindings_reset_restores_defaults() {
        let mut bindings = VariableBindings::new(vars(&[("brand", "GrainMaster")]));
        bindings.set("brand", "GrainMaster_x1y2").unwrap();
        bindings.set("extra", "1").unwrap();
        assert_eq!(bindings.get("brand"), Some("GrainMaster_x1y2"));

        bindings.reset_to_defaults();
        assert_eq!(bindings.get("brand"), Some("GrainMaster"));
        assert_eq!(bindings.get("extra"), None);
    }

    #[test]
    fn test_bindings_reject_invalid_name() {
        let mut bindings = VariableBindings::default();
        assert!(matches!(
            bindings.set("no spaces", "x"),
            Err(Error::InvalidVariableName(_))
        ));
        assert!(bindings.set("", "x").is_err());
    }

    #[test]
    fn test_parse_scenario_yaml() {
        let yaml = r#"
name: create_crop
description: Crop creation flows
tags:
  - create
templates:
  - crear cultivo
  - registra cultivo {crop_name}, variedad {variety_name}
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "create_crop");
        assert_eq!(scenario.templates.len(), 2);
        assert_eq!(scenario.tags, vec!["create"]);
    }

    #[test]
    fn test_load_dir_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "name: list_crops\ntags: [query]\ntemplates: [listar cultivos]\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: create_crop\ntags: [create]\ntemplates: [crear cultivo]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = TemplateStore::load_dir(dir.path()).unwrap();
        let names: Vec<_> = store.scenarios().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["create_crop", "list_crops"]);

        let queries = store.filter_by_tag("query");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries.scenarios()[0].name, "list_crops");
    }

    #[test]
    fn test_duplicate_scenario_rejected() {
        let result = TemplateStore::from_scenarios(vec![
            Scenario::new("a", vec!["x".into()]),
            Scenario::new("a", vec!["y".into()]),
        ]);
        assert!(matches!(result, Err(Error::DuplicateScenario(name)) if name == "a"));
    }

    #[test]
    fn test_selection_groups_by_first_appearance() {
        let json = r#"{"examples": [
            {"intent": "create_crop", "example": "crear cultivo"},
            {"intent": "list_crops", "example": "listar cultivos"},
            {"intent": "create_crop", "example": "registrar cultivo"}
        ]}"#;
        let store = Selection::from_json(json).unwrap().into_store();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("create_crop").unwrap().templates,
            vec!["crear cultivo", "registrar cultivo"]
        );
        assert_eq!(store.template_count(), 3);
    }
}
