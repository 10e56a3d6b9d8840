use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::connector::Connector;
use crate::model::story::{StoryList, TaskList};

#[derive(Debug, PartialEq)]
pub enum Command {
    Iterations(IterationFilter),
    Stories(StoryRequest),
    Help,
}

#[derive(Debug, PartialEq)]
pub enum IterationFilter {
    Project(String),
    User(String),
}

#[derive(Debug, PartialEq)]
pub enum StorySelection {
    Iteration {
        iteration: String,
        project: Option<String>,
    },
    Ids(Vec<String>),
}

#[derive(Debug, PartialEq)]
pub struct StoryRequest {
    pub selection: StorySelection,
    pub tasks: bool,
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct StoryReport<'a> {
    stories: &'a StoryList,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<&'a TaskList>,
}

/// Parse everything after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };
    match command.as_str() {
        "iterations" => parse_iterations_args(&args[1..]).map(Command::Iterations),
        "stories" => parse_stories_args(&args[1..]).map(Command::Stories),
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command: {other}\n\nRun `standup help` for usage."),
    }
}

fn flag_value(args: &[String], i: usize, flag: &str) -> Result<String> {
    match args.get(i) {
        Some(value) if !value.starts_with('-') => Ok(value.clone()),
        _ => bail!("Missing value for {flag} flag"),
    }
}

/// Parse `standup iterations` arguments.
///
/// Supported forms:
///   standup iterations --project "Apollo"
///   standup iterations --user "alice@example.com"
pub fn parse_iterations_args(args: &[String]) -> Result<IterationFilter> {
    let mut filter = None;
    let mut i = 0;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-p" | "--project" | "-u" | "--user" => {
                i += 1;
                let value = flag_value(args, i, flag)?;
                if filter.is_some() {
                    bail!("Use either --project or --user, not both");
                }
                filter = Some(if flag.ends_with("project") || flag == "-p" {
                    IterationFilter::Project(value)
                } else {
                    IterationFilter::User(value)
                });
            }
            other => bail!("Unexpected argument: {other}"),
        }
        i += 1;
    }

    filter.ok_or_else(|| {
        anyhow::anyhow!("Usage: standup iterations (--project <name> | --user <name>)")
    })
}

/// Parse `standup stories` arguments.
///
/// Supported forms:
///   standup stories --iteration "Sprint 1" [--project "Apollo"]
///   standup stories US12 DE7
///   ... [--tasks] [-o report.json]
pub fn parse_stories_args(args: &[String]) -> Result<StoryRequest> {
    let mut iteration = None;
    let mut project = None;
    let mut ids: Vec<String> = Vec::new();
    let mut tasks = false;
    let mut output = None;
    let mut i = 0;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-i" | "--iteration" => {
                i += 1;
                iteration = Some(flag_value(args, i, flag)?);
            }
            "-p" | "--project" => {
                i += 1;
                project = Some(flag_value(args, i, flag)?);
            }
            "-o" | "--output" => {
                i += 1;
                output = Some(PathBuf::from(flag_value(args, i, flag)?));
            }
            "-t" | "--tasks" => tasks = true,
            other if other.starts_with('-') => bail!("Unknown flag: {other}"),
            id => ids.push(id.to_string()),
        }
        i += 1;
    }

    let selection = match (iteration, ids.is_empty()) {
        (Some(_), false) => bail!("Give either --iteration or story IDs, not both"),
        (Some(iteration), true) => StorySelection::Iteration { iteration, project },
        (None, false) if project.is_some() => bail!("--project needs --iteration"),
        (None, false) => StorySelection::Ids(ids),
        (None, true) => bail!(
            "Usage: standup stories (--iteration <name> [--project <name>] | <ID>...) [--tasks] [-o <file>]"
        ),
    };

    Ok(StoryRequest {
        selection,
        tasks,
        output,
    })
}

pub async fn run(command: Command, connector: &dyn Connector) -> Result<()> {
    match command {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Iterations(filter) => {
            let iterations = match &filter {
                IterationFilter::Project(project) => {
                    connector.list_iterations_for_project(project).await
                }
                IterationFilter::User(user) => connector.list_iterations_involving_user(user).await,
            }
            .with_context(|| format!("Failed to list iterations from {}", connector.name()))?;
            let json = serde_json::to_string_pretty(&iterations)?;
            write_output(&json, None)
        }
        Command::Stories(request) => {
            let json = story_report(&request, connector).await?;
            write_output(&json, request.output.as_deref())
        }
    }
}

async fn story_report(request: &StoryRequest, connector: &dyn Connector) -> Result<String> {
    let stories = match &request.selection {
        StorySelection::Iteration {
            iteration,
            project: Some(project),
        } => {
            connector
                .retrieve_stories_for_project_iteration(project, iteration)
                .await
        }
        StorySelection::Iteration {
            iteration,
            project: None,
        } => connector.retrieve_stories_for_iteration(iteration).await,
        StorySelection::Ids(ids) => connector.retrieve_stories(ids).await,
    }
    .with_context(|| format!("Failed to retrieve stories from {}", connector.name()))?;

    let tasks = if request.tasks {
        Some(
            connector
                .retrieve_tasks(&stories)
                .await
                .with_context(|| format!("Failed to retrieve tasks from {}", connector.name()))?,
        )
    } else {
        None
    };

    let report = StoryReport {
        stories: &stories,
        tasks: tasks.as_ref(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn write_output(json: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn print_help() {
    println!("standup: iteration, story and task reports from Rally\n");
    println!("USAGE:");
    println!("  standup iterations --project <name>   Iterations of a project");
    println!("  standup iterations --user <name>      Iterations a user has capacity in");
    println!("  standup stories --iteration <name>    Stories and defects of an iteration");
    println!("  standup stories <ID>...               Stories and defects by formatted ID");
    println!();
    println!("STORIES OPTIONS:");
    println!("  -p, --project <name>  Restrict --iteration to one project");
    println!("  -t, --tasks           Include the tasks of every story");
    println!("  -o, --output <file>   Write the JSON report to a file");
    println!();
    println!("CONFIG:");
    println!("  ~/.standup/config.toml [rally] section, or RALLY_SERVER / RALLY_USERNAME / RALLY_PASSWORD");
    println!("  RUST_LOG controls log output on stderr (default: info)");
}
