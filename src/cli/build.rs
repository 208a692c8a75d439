//! `yakka build`: resolve a project and build targets.
//!
//! Items are classified by their shape:
//!
//! - `name!` is a target to build (the `!` is dropped)
//! - `+name` is a feature
//! - anything else is a component

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;
use tracing::debug;

use super::CliConfig;
use crate::project::{BuildRequest, Project};

#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Components, `+features` and `targets!`
    #[arg(required = true, value_name = "ITEM")]
    items: Vec<String>,

    /// Maximum number of commands run at once
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Fail on unknown components instead of fetching them
    #[arg(long)]
    no_fetch: bool,
}

/// Command line items sorted by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildItems {
    pub components: Vec<String>,
    pub features: Vec<String>,
    pub targets: Vec<String>,
}

pub fn parse_items<S: AsRef<str>>(items: &[S]) -> BuildItems {
    let mut parsed = BuildItems::default();
    for item in items {
        let item = item.as_ref().trim();
        if let Some(target) = item.strip_suffix('!') {
            if !target.is_empty() {
                parsed.targets.push(target.to_string());
            }
        } else if let Some(feature) = item.strip_prefix('+') {
            if !feature.is_empty() {
                parsed.features.push(feature.to_string());
            }
        } else if !item.is_empty() {
            parsed.components.push(item.to_string());
        }
    }
    parsed
}

impl BuildCommand {
    pub async fn execute(self, workspace: &Path, config: &CliConfig) -> Result<()> {
        let items = parse_items(&self.items);
        debug!("Build items: {items:?}");

        let request = BuildRequest {
            components: items.components,
            features: items.features,
            targets: items.targets,
            fetch: !self.no_fetch,
            show_progress: config.show_progress(),
            max_jobs: self.jobs.filter(|jobs| *jobs > 0),
        };

        let mut project = Project::open(workspace).await?;
        let outcome = project.build(&request).await?;

        if config.log_level.is_none() {
            return Ok(());
        }
        let report = &outcome.report;
        if request.targets.is_empty() {
            println!(
                "{} {} resolved, summary at {}",
                "✓".green(),
                outcome.project_name.bold(),
                outcome.summary_path.display()
            );
        } else if report.executed.is_empty() {
            println!("{} {} is up to date", "✓".green(), outcome.project_name.bold());
        } else {
            println!(
                "{} Built {} ({} executed, {} up to date)",
                "✓".green(),
                outcome.project_name.bold(),
                report.executed.len(),
                report.up_to_date.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_are_classified_by_shape() {
        let items = parse_items(&["board", "+debug", "firmware.elf!", "rtos", "+", "!"]);
        assert_eq!(
            items,
            BuildItems {
                components: vec!["board".to_string(), "rtos".to_string()],
                features: vec!["debug".to_string()],
                targets: vec!["firmware.elf".to_string()],
            }
        );
    }

    #[test]
    fn test_target_suffix_wins_over_feature_prefix() {
        let items = parse_items(&["+odd!"]);
        assert_eq!(items.targets, vec!["+odd"]);
        assert!(items.features.is_empty());
    }
}
