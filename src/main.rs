use anyhow::{bail, Context, Result};
use regpipe::cli::commands::{
    AdjustCommand, ClearCommand, RunCommand, ShiftCommand, StatusCommand, TransformCommand,
};
use regpipe::cli::output::*;
use regpipe::cli::{Cli, Command};
use regpipe::core::config::RegistrationConfig;
use regpipe::core::params::{self, MissingKeyPolicy};
use regpipe::engine::{ElastixEngine, EngineConfig};
use regpipe::execution::{Registration, RegistrationEvent};
use regpipe::persistence::Workspace;
use regpipe::spatial::{EntityKind, SpatialEntity, Volume};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = cli.config.as_deref();
    match &cli.command {
        Command::Run(cmd) => run_registration(cmd, config).await?,
        Command::Status(cmd) => show_status(cmd, config)?,
        Command::Transform(cmd) => apply_transform(cmd, config).await?,
        Command::Clear(cmd) => clear_steps(cmd, config)?,
        Command::Adjust(cmd) => adjust_parameters(cmd)?,
        Command::Shift(cmd) => shift_parameters(cmd)?,
    }

    Ok(())
}

async fn run_registration(cmd: &RunCommand, config_path: Option<&Path>) -> Result<()> {
    let config_path = config_path.context("`run` needs --config")?;
    let config = RegistrationConfig::from_file(config_path)
        .context("Failed to load registration config")?;

    println!(
        "{} Loaded configuration {} ({} steps)",
        INFO,
        style(config_path.display()).bold(),
        config.steps.len()
    );

    let fixed = config
        .fixed
        .as_ref()
        .map(Volume::read)
        .transpose()
        .context("Failed to read fixed image")?;
    let moving = config
        .moving
        .as_ref()
        .map(Volume::read)
        .transpose()
        .context("Failed to read moving image")?;

    let mut workspace = Workspace::open(
        &config.workdir,
        fixed.as_ref(),
        moving.as_ref(),
        config.overwrite || cmd.overwrite,
    )?;
    configure_steps(&mut workspace, &config)?;

    let engine = Arc::new(ElastixEngine::new(config.engine.clone()));
    let mut registration = Registration::new(workspace, engine);

    let progress = create_progress_bar(registration.workspace().steps().len());
    let bar = progress.clone();
    registration.add_event_handler(move |event| {
        bar.println(format_registration_event(&event));
        match &event {
            RegistrationEvent::StepStarted { step, .. } => bar.set_message(step.clone()),
            RegistrationEvent::StepCompleted { .. } | RegistrationEvent::StepSkipped { .. } => {
                bar.inc(1)
            }
            _ => {}
        }
    });

    let result = registration.register(cmd.step.as_deref()).await;
    progress.finish_and_clear();

    match result {
        Ok(()) => {
            println!(
                "\n{} Registration in {} completed {}",
                CHECK,
                style(config.workdir.display()).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(e) => {
            println!("\n{} Registration {}", CROSS, style("failed").red());
            if let Some(output) = e.captured_output() {
                println!("{}", format_output(output, 20));
            }
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Add configured steps to a fresh working directory; an existing one keeps
/// its steps and only gains explicitly named steps it does not have yet
fn configure_steps(workspace: &mut Workspace, config: &RegistrationConfig) -> Result<()> {
    let fresh = workspace.steps().is_empty();
    for step in &config.steps {
        let exists = step
            .name
            .as_deref()
            .is_some_and(|name| workspace.step(name).is_some());
        if !fresh && (step.name.is_none() || exists) {
            continue;
        }
        let overrides = step.parameter_overrides()?;
        workspace
            .add_step(&step.pfile, step.name.as_deref(), &overrides)
            .with_context(|| format!("Failed to add step for {}", step.pfile.display()))?;
    }

    if workspace.steps().len() != config.steps.len() {
        warn!(
            "Working directory has {} steps, configuration lists {}",
            workspace.steps().len(),
            config.steps.len()
        );
    }
    Ok(())
}

/// Working directory and engine settings from the command line or config
fn resolve_target(workdir: Option<&PathBuf>, config_path: Option<&Path>) -> Result<(PathBuf, EngineConfig)> {
    let config = config_path
        .map(RegistrationConfig::from_file)
        .transpose()
        .context("Failed to load registration config")?;
    let engine = config
        .as_ref()
        .map(|c| c.engine.clone())
        .unwrap_or_default();

    let workdir = match (workdir, config) {
        (Some(dir), _) => dir.clone(),
        (None, Some(config)) => config.workdir,
        (None, None) => bail!("Either --workdir or --config is required"),
    };
    if !workdir.is_dir() {
        bail!("Working directory doesn't exist: {}", workdir.display());
    }
    Ok((workdir, engine))
}

fn show_status(cmd: &StatusCommand, config_path: Option<&Path>) -> Result<()> {
    let (workdir, _) = resolve_target(cmd.workdir.as_ref(), config_path)?;
    let workspace = Workspace::open(&workdir, None, None, false)?;
    let summary = workspace.summary();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary(&summary));
    }
    Ok(())
}

async fn apply_transform(cmd: &TransformCommand, config_path: Option<&Path>) -> Result<()> {
    let (workdir, engine_config) = resolve_target(cmd.workdir.as_ref(), config_path)?;
    let kind = match &cmd.kind {
        Some(kind) => kind.parse::<EntityKind>()?,
        None => EntityKind::detect(&cmd.input)?,
    };

    let entity = SpatialEntity::load(&cmd.input, kind)
        .with_context(|| format!("Failed to load {} {}", kind, cmd.input.display()))?;

    let workspace = Workspace::open(&workdir, None, None, false)?;
    let mut registration = Registration::new(workspace, Arc::new(ElastixEngine::new(engine_config)));
    registration.add_event_handler(|event| println!("{}", format_registration_event(&event)));

    let transformed = registration
        .transform(&entity, cmd.step_ref(), cmd.invert)
        .await?;
    transformed.save(&cmd.output)?;

    println!("{} Wrote {}", CHECK, style(cmd.output.display()).bold());
    Ok(())
}

fn clear_steps(cmd: &ClearCommand, config_path: Option<&Path>) -> Result<()> {
    let (workdir, _) = resolve_target(cmd.workdir.as_ref(), config_path)?;
    let mut workspace = Workspace::open(&workdir, None, None, false)?;

    match &cmd.step {
        Some(step) => {
            workspace.remove_step(step)?;
            println!("{} Removed step {}", CHECK, style(step).cyan());
        }
        None => {
            let count = workspace.steps().len();
            workspace.clear()?;
            println!("{} Removed {} steps", CHECK, count);
        }
    }
    Ok(())
}

fn adjust_parameters(cmd: &AdjustCommand) -> Result<()> {
    let policy = if cmd.strict {
        MissingKeyPolicy::Strict
    } else {
        MissingKeyPolicy::Append
    };
    let overrides = cmd.overrides();
    params::adjust(&cmd.input, &cmd.output, &overrides, policy)
        .with_context(|| format!("Failed to adjust {}", cmd.input.display()))?;

    println!(
        "{} Wrote {} ({} values set)",
        CHECK,
        style(cmd.output.display()).bold(),
        overrides.len()
    );
    Ok(())
}

fn shift_parameters(cmd: &ShiftCommand) -> Result<()> {
    params::shift_translation(&cmd.tfile, cmd.dx, cmd.dy, cmd.dz, &cmd.output)
        .with_context(|| format!("Failed to shift {}", cmd.tfile.display()))?;

    println!(
        "{} Wrote {} (translation shifted by {}, {}, {})",
        CHECK,
        style(cmd.output.display()).bold(),
        cmd.dx,
        cmd.dy,
        cmd.dz
    );
    Ok(())
}
