mod cli;

use upload_studio::{app::App, config};
use us_core::{ProjectId, StepStatus};
use us_db::models::Step;
use us_pipeline::{NewStep, ProjectView};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "upload_studio=trace,us_pipeline=trace,us_db=debug,us_core=debug".to_string()
        } else {
            "upload_studio=info,us_pipeline=info,us_db=warn".to_string()
        }
    });

    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("upload-studio {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let app = App::open(config)?;
            if !matches!(command, Commands::Recover | Commands::Executors) {
                app.recover()?;
            }
            dispatch(&app, command)
        }
    }
}

fn dispatch(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Create {
            name,
            media_type,
            steps,
        } => {
            let view = app.studio.create_project(&name, media_type, &steps)?;
            println!("{}", view.project.id);
            Ok(())
        }
        Commands::List => list_projects(app),
        Commands::Show { project, json } => show_project(app, project, json),
        Commands::AppendStep {
            project,
            executor,
            step_config,
        } => {
            let step = app
                .studio
                .append_step(project, &new_step(executor, step_config))?;
            println!("Appended step {} ({})", step.index, step.id);
            Ok(())
        }
        Commands::InsertStep {
            project,
            index,
            executor,
            step_config,
        } => {
            let step = app
                .studio
                .insert_step(project, index, &new_step(executor, step_config))?;
            println!("Inserted step {} ({})", step.index, step.id);
            Ok(())
        }
        Commands::RemoveStep { project, index } => {
            let step = app.studio.remove_step(project, index)?;
            println!("Removed step {} ({})", index, step.executor_name);
            Ok(())
        }
        Commands::RunOne { project } => {
            let step = app.runner().run_one(project)?;
            print_step_outcome(&step);
            Ok(())
        }
        Commands::RunAll { project } => {
            let ran = app.runner().run_all(project)?;
            if ran.is_empty() {
                println!("Nothing to run");
            }
            for step in &ran {
                print_step_outcome(step);
            }
            let view = app.studio.get_project(project)?;
            println!("Project status: {}", view.status);
            Ok(())
        }
        Commands::Reset { project, from } => {
            let view = app.studio.reset(project, from)?;
            println!(
                "Reset from step {from}; cursor at {}, status {}",
                view.project.current_step_index, view.status
            );
            Ok(())
        }
        Commands::AckWarning { step, warning } => {
            let warning = app.studio.ack_warning(step, warning)?;
            println!("Acknowledged: {}", warning.message);
            Ok(())
        }
        Commands::Finish { project } => {
            app.studio.finish_project(project)?;
            println!("Project {project} finished");
            Ok(())
        }
        Commands::Delete { project } => {
            app.studio.delete_project(project)?;
            println!("Project {project} deleted");
            Ok(())
        }
        Commands::Recover => {
            let count = app.recover()?;
            println!("Recovered {count} interrupted step(s)");
            Ok(())
        }
        Commands::Executors => {
            for name in app.registry.names() {
                println!("{name}");
            }
            Ok(())
        }
        // handled in main without opening the store
        Commands::Validate { .. } | Commands::Version => Ok(()),
    }
}

fn new_step(executor: String, config: Option<serde_json::Value>) -> NewStep {
    match config {
        Some(config) => NewStep::new(executor, config),
        None => NewStep::bare(executor),
    }
}

fn print_step_outcome(step: &Step) {
    println!(
        "Step {} ({}): {}",
        step.index, step.executor_name, step.status
    );
}

fn list_projects(app: &App) -> Result<()> {
    let projects = app.studio.list_projects()?;
    if projects.is_empty() {
        println!("No projects");
        return Ok(());
    }
    for summary in projects {
        println!(
            "{}  {:<10} {:>2} step(s)  {}",
            summary.project.id, summary.status.as_str(), summary.step_count, summary.project.name
        );
    }
    Ok(())
}

fn show_project(app: &App, project_id: ProjectId, json: bool) -> Result<()> {
    let view = app.studio.get_project(project_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    print_project(&view);
    Ok(())
}

fn print_project(view: &ProjectView) {
    let project = &view.project;
    println!("Project: {} ({})", project.name, project.id);
    println!("Media type: {}", project.media_type);
    println!("Status: {}", view.status);
    println!("Cursor: {}", project.current_step_index);
    if project.is_finished {
        println!("Finished: yes");
    }
    if let Some(ref holder) = project.locked_by {
        println!("Locked by: {holder}");
    }
    println!("Data: {}", view.root_path.display());

    println!("\nSteps: {}", view.steps.len());
    for step_view in &view.steps {
        let step = &step_view.step;
        let marker = if step.index == project.current_step_index && !project.is_finished {
            ">"
        } else {
            " "
        };
        println!(
            "{marker} [{}] {:<9} {}  ({})",
            step.index, step.status.as_str(), step_view.description, step.id
        );
        for warning in &step_view.warnings {
            let state = if warning.acked { "acked" } else { "unacked" };
            println!("      warning {} [{state}]: {}", warning.id, warning.message);
        }
        if step.status == StepStatus::Errors {
            for error in &step_view.errors {
                println!("      error: {}", error.message.lines().next().unwrap_or_default());
            }
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            let warnings = config.validate();
            println!("✓ Configuration is valid");
            println!("  Database: {}", config.storage.db_path.display());
            println!("  Media root: {}", config.storage.media_root.display());
            println!("  Worker: {}", config.runner.worker_id);
            println!("  Lock lease: {}s", config.runner.lock_lease_secs);
            println!(
                "  Allowed commands: {}",
                if config.executors.exec.allowed_commands.is_empty() {
                    "any".to_string()
                } else {
                    config.executors.exec.allowed_commands.join(", ")
                }
            );
            for warning in warnings {
                println!("  warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Database: {}", config.storage.db_path.display());
            println!("  Media root: {}", config.storage.media_root.display());
        }
    }

    Ok(())
}
