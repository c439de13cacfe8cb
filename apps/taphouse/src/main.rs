//! taphouse - Homebrew operations with a live log
//!
//! Parses the command line, runs one operation through the ops crate while
//! printing its output as it arrives, and renders the final report.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands};
use crate::display::{CommandOutput, LiveLog, OutputRenderer};
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use std::process;
use std::time::Duration;
use taphouse_config::Config;
use taphouse_errors::UserFacingError;
use taphouse_events::{EventEmitter, EventReceiver};
use taphouse_ops::{OperationReport, OperationRequest, OpsContextBuilder, OpsCtx, StateQuery};
use taphouse_platform::PlatformCommand;
use taphouse_types::{ColorChoice, OutputFormat};
use tokio::select;
use tracing::{error, info};

/// How an operation is run and shown
struct RunOptions {
    timeout: Option<Duration>,
    /// Print output lines as they arrive
    live: bool,
    keep_escapes: bool,
}

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    match run(cli).await {
        Ok(code) => {
            info!(code, "Command completed");
            process::exit(code);
        }
        Err(e) => {
            error!("Application error: {}", e);
            if json_mode {
                println!("{}", error_json(&e));
            } else {
                eprintln!("Error: {e}");
            }
            process::exit(1);
        }
    }
}

/// Main application logic, returns the process exit code
async fn run(cli: Cli) -> Result<i32, CliError> {
    info!("Starting taphouse v{}", env!("CARGO_PKG_VERSION"));

    // File config (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global)?;

    let json = cli.global.json || config.general.default_output == OutputFormat::Json;
    let colors_enabled = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stdout().features().colors_supported(),
    };
    let options = RunOptions {
        timeout: cli.global.timeout.map(Duration::from_secs),
        live: !json,
        keep_escapes: config.general.color == ColorChoice::Always
            || (colors_enabled && !config.runner.strip_ansi),
    };

    let (event_sender, event_receiver) = taphouse_events::channel();
    let ctx = OpsContextBuilder::new()
        .with_config(config.clone())
        .with_event_sender(event_sender)
        .build()?;

    ctx.tx.emit_debug_with_context(
        "configuration loaded",
        format!(
            "brew={} merge_stderr={} service_settle_ms={}",
            config.brew.executable, config.runner.merge_stderr, config.reconcile.service_settle_ms
        ),
    );

    let renderer = OutputRenderer::new(json, config.general.color);
    let handler = EventHandler::new(colors_enabled, cli.global.debug, json);

    let output =
        execute_command_with_events(cli.command, &ctx, &options, event_receiver, &handler).await?;
    renderer.render(&output)?;

    Ok(output.exit_code())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    ctx: &OpsCtx,
    options: &RunOptions,
    mut event_receiver: EventReceiver,
    event_handler: &EventHandler,
) -> Result<CommandOutput, CliError> {
    let mut command_future = Box::pin(execute_command(command, ctx, options));
    let mut events_open = true;

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            event = event_receiver.recv(), if events_open => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => events_open = false,
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    ctx: &OpsCtx,
    options: &RunOptions,
) -> Result<CommandOutput, CliError> {
    let brew = &ctx.config.brew;
    let request = match command {
        Commands::List => {
            refresh(ctx, StateQuery::Installed).await?;
            return Ok(CommandOutput::Installed(ctx.state.snapshot().installed.items));
        }
        Commands::Outdated => {
            refresh(ctx, StateQuery::Outdated).await?;
            return Ok(CommandOutput::Outdated(ctx.state.snapshot().outdated.items));
        }
        Commands::Services => {
            refresh(ctx, StateQuery::Services).await?;
            return Ok(CommandOutput::Services(ctx.state.snapshot().services.items));
        }

        Commands::Install { packages } => OperationRequest::install(brew, packages)?,
        Commands::Uninstall { packages } => OperationRequest::uninstall(brew, packages)?,
        Commands::Upgrade { packages } => OperationRequest::upgrade(brew, packages)?,
        Commands::Update => OperationRequest::update(brew),
        Commands::Cleanup => OperationRequest::cleanup(brew),
        Commands::Import { brewfile } => OperationRequest::import_brewfile(brew, brewfile)?,
        Commands::Service { action, name } => OperationRequest::service(brew, action, name)?,
        Commands::Unquarantine { path } => OperationRequest::remove_quarantine(path)?,
        Commands::Exec { label, command } => exec_request(label, command)?,
    };

    let report = run_operation(ctx, request, options).await?;
    Ok(CommandOutput::Report(report))
}

/// Re-read one section into the state store
async fn refresh(ctx: &OpsCtx, section: StateQuery) -> Result<(), CliError> {
    ctx.reconciler().refresh(&[section]).await?;
    Ok(())
}

/// Drive one operation to its end. Ctrl-C and the optional timeout both
/// cancel it through the controller's cancel handle.
async fn run_operation(
    ctx: &OpsCtx,
    request: OperationRequest,
    options: &RunOptions,
) -> Result<OperationReport, CliError> {
    let mut controller = ctx.controller();
    if options.live {
        controller.subscribe(LiveLog::new(options.keep_escapes));
    }
    controller.start(request)?;

    let handle = controller
        .cancel_handle()
        .ok_or_else(|| taphouse_errors::Error::internal("operation started without a process"))?;

    let interrupt = tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        }
    });
    let deadline = options.timeout.map(|limit| {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            handle.cancel()
        })
    });

    let report = controller.finish().await;
    interrupt.abort();

    let timed_out = match deadline {
        Some(task) if task.is_finished() => task.await.unwrap_or(false),
        Some(task) => {
            task.abort();
            false
        }
        None => false,
    };
    if let (true, Some(limit)) = (timed_out, options.timeout) {
        ctx.tx.emit_warning_with_context(
            "operation timed out",
            format!("cancelled after {}s", limit.as_secs()),
        );
    }

    Ok(report?)
}

/// Build an arbitrary command request from `exec -- <program> [args...]`
fn exec_request(label: Option<String>, command: Vec<String>) -> Result<OperationRequest, CliError> {
    let mut parts = command.into_iter();
    let Some(program) = parts.next() else {
        return Err(CliError::InvalidArguments(
            "exec needs a program to run".to_string(),
        ));
    };

    let mut cmd = PlatformCommand::new(program);
    cmd.args(parts);
    let label = label.unwrap_or_else(|| cmd.descriptor().to_string());
    Ok(OperationRequest::custom(label, cmd)?)
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        let log_dir = Config::logs_dir();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            if !json_mode {
                eprintln!("Warning: Failed to create log directory: {e}");
            }
        }

        let log_file = log_dir.join(format!(
            "taphouse-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| {
                                tracing_subscriber::EnvFilter::new(
                                    "info,taphouse=debug,taphouse_ops=debug,taphouse_platform=debug",
                                )
                            },
                        ),
                    )
                    .init();

                if !json_mode {
                    eprintln!("Debug logging enabled: {}", log_file.display());
                }
                return;
            }
            Err(e) => {
                if !json_mode {
                    eprintln!("Warning: Failed to create log file: {e}");
                }
            }
        }
    }

    if json_mode {
        // Keep stdout and stderr clean for the JSON document
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else {
        // Events are already shown to the user, so only errors reach stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
            )
            .init();
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs) -> Result<(), CliError> {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if global.json {
        config.general.default_output = OutputFormat::Json;
    }
    if let Some(brew) = &global.brew {
        if brew.trim().is_empty() {
            return Err(CliError::InvalidArguments(
                "--brew must name an executable".to_string(),
            ));
        }
        config.brew.executable.clone_from(brew);
    }
    if global.timeout == Some(0) {
        return Err(CliError::InvalidArguments(
            "--timeout must be at least one second".to_string(),
        ));
    }
    Ok(())
}

fn error_json(error: &CliError) -> serde_json::Value {
    match error {
        CliError::Ops(e) => serde_json::json!({
            "error": e.user_message(),
            "code": e.user_code(),
            "hint": e.user_hint(),
            "retryable": e.is_retryable(),
        }),
        other => serde_json::json!({ "error": other.to_string() }),
    }
}
