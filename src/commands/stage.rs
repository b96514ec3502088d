use clap::{Args, Subcommand};
use serde::Serialize;

use stagehand::stage::{self, Stage};

use super::CmdResult;

#[derive(Args)]
pub struct StageArgs {
    #[command(subcommand)]
    pub command: StageCommand,
}

#[derive(Subcommand)]
pub enum StageCommand {
    /// List configured stages
    List,
    /// Show a stage's configuration
    Show {
        /// Stage ID
        id: String,
    },
    /// Create a stage from a JSON spec (inline, @file, or - for stdin)
    Create {
        /// JSON spec including an "id" field
        spec: String,
    },
    /// Merge a JSON patch into a stage
    Set {
        /// Stage ID
        id: String,
        /// JSON patch (inline, @file, or - for stdin)
        spec: String,
    },
    /// Delete a stage
    Delete {
        /// Stage ID
        id: String,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    List {
        command: String,
        stages: Vec<StageSummary>,
    },
    Show {
        command: String,
        stage: Stage,
    },
    Mutated {
        command: String,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_fields: Option<Vec<String>>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub id: String,
    pub application: String,
    pub hosts: usize,
}

pub fn run(args: StageArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<StageOutput> {
    let output = match args.command {
        StageCommand::List => {
            let stages = stage::list()?
                .into_iter()
                .map(|s| StageSummary {
                    id: s.id.clone(),
                    application: s.application.clone(),
                    hosts: s.hosts.len(),
                })
                .collect();
            StageOutput::List {
                command: "stage.list".to_string(),
                stages,
            }
        }
        StageCommand::Show { id } => StageOutput::Show {
            command: "stage.show".to_string(),
            stage: stage::load(&id)?,
        },
        StageCommand::Create { spec } => {
            let created = stage::create(&spec)?;
            StageOutput::Mutated {
                command: "stage.create".to_string(),
                id: created.id,
                updated_fields: None,
            }
        }
        StageCommand::Set { id, spec } => {
            let (_, updated_fields) = stage::merge(&id, &spec)?;
            StageOutput::Mutated {
                command: "stage.set".to_string(),
                id,
                updated_fields: Some(updated_fields),
            }
        }
        StageCommand::Delete { id } => {
            stage::delete(&id)?;
            StageOutput::Mutated {
                command: "stage.delete".to_string(),
                id,
                updated_fields: None,
            }
        }
    };

    Ok((output, 0))
}
