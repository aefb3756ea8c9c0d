//! List scenarios and their templates

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use botcheck_common::Scenario;
use botcheck_harness::HarnessConfig;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Print every template, materialized with the default variables
    #[arg(long)]
    pub templates: bool,
}

#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub tags: Vec<String>,
    pub templates: usize,
    pub description: String,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
            templates: scenario.templates.len(),
            description: scenario.description.clone(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Tags", "Templates", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tags.join(", "),
            self.templates.to_string(),
            self.description.clone(),
        ]
    }
}

#[derive(Serialize)]
pub struct TemplateDisplay {
    pub scenario: String,
    pub template: String,
    pub starter: String,
}

impl TableDisplay for TemplateDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Template", "Starter"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.scenario.clone(), self.template.clone(), self.starter.clone()]
    }
}

pub async fn execute(args: ListArgs, config: HarnessConfig, format: OutputFormat) -> Result<()> {
    let mut store = config.template_store()?;
    if let Some(tag) = &args.tag {
        store = store.filter_by_tag(tag);
    }

    if args.templates {
        let bindings = config.bindings()?;
        let rows: Vec<TemplateDisplay> = store
            .scenarios()
            .iter()
            .flat_map(|scenario| {
                scenario.templates.iter().map(|template| TemplateDisplay {
                    scenario: scenario.name.clone(),
                    template: template.clone(),
                    starter: botcheck_common::materialize(template, bindings.defaults()),
                })
            })
            .collect();
        print_list(&rows, format);
    } else {
        let rows: Vec<ScenarioDisplay> = store.scenarios().iter().map(ScenarioDisplay::from).collect();
        print_list(&rows, format);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_row() {
        let mut scenario = Scenario::new("create_crop", vec!["crear cultivo".into()]);
        scenario.tags = vec!["create".into(), "crop".into()];

        let row = ScenarioDisplay::from(&scenario).row();
        assert_eq!(row[0], "create_crop");
        assert_eq!(row[1], "create, crop");
        assert_eq!(row[2], "1");
        assert_eq!(row.len(), ScenarioDisplay::headers().len());
    }
}
