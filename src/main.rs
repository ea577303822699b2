//! nitro-proxy: serve a front-end build through a proxy-capable server.
//!
//! This is the entry point. It parses the command line, builds the
//! supervision and launch components for the chosen command, and renders any
//! failure as a single tagged error line.

mod config;
mod error;
mod locator;
mod logger;
mod orchestrator;
mod process;
mod prompt;
mod routes;
mod scanner;
mod supervisor;
mod title;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Args, Parser, Subcommand};

use crate::config::{Config, FrontendKind};
use crate::error::{Error, Result};
use crate::locator::{ProcessLocator, SupervisionTarget};
use crate::logger::{green, Logger};
use crate::orchestrator::{
    BuildOptions, CommandServerBuilder, LaunchOrchestrator, ScriptFrontendBuilder,
    StartCmdOptions, StartOptions,
};
use crate::process::LaunchSpec;
use crate::prompt::TerminalPrompt;
use crate::scanner::{PlatformLister, ProcessLister};
use crate::supervisor::{DetachStrategy, OsTerminator, ProcessSupervisor, StopOutcome, Terminator};

const DEFAULT_RUNTIME: &str = "node";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "nitro-proxy",
    version,
    about = "Serve a front-end build with proxy routes and manage the server process",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the front-end output into a server.
    Build(BuildArgs),
    /// Start the built server.
    Start {
        /// Port the server listens on (sets NITRO_PORT).
        #[arg(long)]
        port: Option<u16>,
        /// Run in the background.
        #[arg(long)]
        silent: bool,
    },
    /// Start an arbitrary command.
    StartCmd {
        /// Comma-separated program and arguments (e.g. "node,server.mjs").
        #[arg(long)]
        commands: String,
        /// Working directory.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Run in the background.
        #[arg(long)]
        silent: bool,
        /// Title marker used by `stop` and `find`.
        #[arg(long)]
        title: Option<String>,
    },
    /// Stop a running server.
    Stop {
        #[command(flatten)]
        target: TargetArgs,
        /// Kill the whole process tree of the first match.
        #[arg(long, overrides_with = "no_tree")]
        tree: bool,
        /// Kill every match on its own.
        #[arg(long, overrides_with = "tree")]
        no_tree: bool,
    },
    /// Find a running server.
    Find {
        #[command(flatten)]
        target: TargetArgs,
    },
    #[command(hide = true)]
    Relay {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Project root.
    #[arg(value_name = "DIR")]
    root: Option<PathBuf>,
    /// Project root (takes precedence over the positional form).
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Minify the server bundle.
    #[arg(long, overrides_with = "no_minify")]
    minify: bool,
    #[arg(long, overrides_with = "minify")]
    no_minify: bool,
    /// Server engine preset.
    #[arg(long)]
    preset: Option<String>,
    /// Port baked into the server build.
    #[arg(long)]
    port: Option<u16>,
    /// Front-end build tool.
    #[arg(long = "type", value_enum)]
    frontend: Option<FrontendKind>,
    /// Rebuild the front-end even if its output exists.
    #[arg(long)]
    force: bool,
    /// Answer yes to confirmations.
    #[arg(long, short = 'y')]
    yes: bool,
}

/// Raw values; parsing happens in `SupervisionTarget::select` so a bad value
/// falls through to the next addressing mode.
#[derive(Debug, Args)]
struct TargetArgs {
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    pid: Option<String>,
    /// Title marker (default: "nitro-proxy").
    #[arg(long)]
    title: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logger::init();
    let cli = Cli::parse();
    let root = Logger::new("nitro-proxy");
    let logger = root.with_tag(command_name(&cli.command));

    match run(cli.command, &logger).await {
        Ok(code) => exit_code(code),
        Err(err) => {
            logger.error(err.to_string());
            ExitCode::FAILURE
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Build(_) => "build",
        Commands::Start { .. } => "start",
        Commands::StartCmd { .. } => "start-cmd",
        Commands::Stop { .. } => "stop",
        Commands::Find { .. } => "find",
        Commands::Relay { .. } => "relay",
    }
}

async fn run(command: Commands, logger: &Logger) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    match command {
        Commands::Build(args) => build(args, cwd, logger).await,
        Commands::Start { port, silent } => {
            let config = load_config(&cwd)?;
            let options = StartOptions {
                cwd,
                port,
                silent,
                title: title_of(&config),
            };
            let supervisor = supervisor(&config, logger);
            orchestrator::start(&supervisor, &options, logger).await
        }
        Commands::StartCmd {
            commands,
            dir,
            silent,
            title,
        } => {
            let config = load_config(&cwd)?;
            let options = StartCmdOptions {
                cwd: dir.unwrap_or(cwd),
                commands,
                silent,
                title,
            };
            let supervisor = supervisor(&config, logger);
            orchestrator::start_cmd(&supervisor, &options, logger).await
        }
        Commands::Stop {
            target,
            tree,
            no_tree,
        } => {
            let config = load_config(&cwd)?;
            let supervisor = supervisor(&config, logger);
            Ok(stop(&supervisor, &config, &target, tree || !no_tree, logger).await)
        }
        Commands::Find { target } => {
            let config = load_config(&cwd)?;
            let supervisor = supervisor(&config, logger);
            Ok(find(&supervisor, &config, &target, logger).await)
        }
        Commands::Relay { mut command } => {
            let program = command.remove(0);
            supervisor::run_attached(&LaunchSpec::new(program, command)).await
        }
    }
}

async fn build(args: BuildArgs, cwd: PathBuf, logger: &Logger) -> Result<i32> {
    let root = match args.dir.or(args.root) {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    let config = load_config(&root)?;
    let minify = if args.no_minify {
        Some(false)
    } else if args.minify {
        Some(true)
    } else {
        None
    };

    let orchestrator = LaunchOrchestrator::new(
        TerminalPrompt {
            assume_yes: args.yes,
        },
        ScriptFrontendBuilder::new(logger.with_tag("frontend")),
        CommandServerBuilder::new(
            config.server.build_command.clone(),
            logger.with_tag("server"),
        ),
        logger.clone(),
    );
    let options = BuildOptions {
        root,
        minify,
        preset: args.preset,
        port: args.port,
        frontend: args.frontend,
        force: args.force,
    };
    let report = orchestrator.build(config, options).await?;
    logger.debug(format!(
        "{} proxy routes, front-end rebuilt: {}, output {}",
        report.routes,
        report.rebuilt_frontend,
        report.output.display()
    ));
    Ok(0)
}

/// Stops the addressed process. Every outcome is logged; the exit status is
/// always 0.
async fn stop<L: ProcessLister, T: Terminator>(
    supervisor: &ProcessSupervisor<L, T>,
    config: &Config,
    args: &TargetArgs,
    tree: bool,
    logger: &Logger,
) -> i32 {
    let Some(target) = select_target(config, args, logger) else {
        return 0;
    };
    let logger = logger.with_tag(target.mode());
    logger.info(format!("stopping by {}", target));
    match supervisor.stop(&target, tree).await {
        StopOutcome::Stopped { pids, failures } => {
            for pid in pids {
                logger.success(format!("killed pid {}", green(pid.to_string())));
            }
            for failure in failures {
                logger.error(format!("failed to kill pid {}: {}", failure.pid, failure.reason));
            }
        }
        StopOutcome::NotFound(message) => logger.warn(message),
        StopOutcome::LookupFailed(message) => logger.error(message),
    }
    0
}

/// What `find` reports for one addressing mode.
#[derive(Debug, PartialEq, Eq)]
enum FindReport {
    Found(Vec<String>),
    NotFound(String),
    Failed(String),
}

async fn locate<L: ProcessLister>(
    locator: &ProcessLocator<L>,
    target: &SupervisionTarget,
) -> FindReport {
    let found: Result<Vec<String>> = match target {
        SupervisionTarget::Port(port) => locator
            .find_by_port(*port)
            .await
            .map(|pid| pid.map(|pid| format!("pid {}", pid)).into_iter().collect()),
        SupervisionTarget::Pid(pid) => locator.find_by_pid(*pid).await.map(|record| {
            record
                .map(|record| format!("pid {} \u{2192} {}", record.pid, record.command_line))
                .into_iter()
                .collect()
        }),
        SupervisionTarget::Title(title) => locator.find_by_title(title).await.map(|records| {
            records
                .into_iter()
                .map(|record| format!("pid {} \u{2192} {}", record.pid, record.command_line))
                .collect()
        }),
    };
    match found {
        Ok(lines) if lines.is_empty() => FindReport::NotFound(
            Error::NotFound(format!("no process found by {}", target)).to_string(),
        ),
        Ok(lines) => FindReport::Found(lines),
        Err(err) => FindReport::Failed(err.to_string()),
    }
}

/// Reports the addressed process. The exit status is always 0.
async fn find<L: ProcessLister, T: Terminator>(
    supervisor: &ProcessSupervisor<L, T>,
    config: &Config,
    args: &TargetArgs,
    logger: &Logger,
) -> i32 {
    let Some(target) = select_target(config, args, logger) else {
        return 0;
    };
    let logger = logger.with_tag(target.mode());
    match locate(supervisor.locator(), &target).await {
        FindReport::Found(lines) => {
            for line in lines {
                logger.success(line);
            }
        }
        FindReport::NotFound(message) => logger.warn(message),
        FindReport::Failed(message) => logger.error(message),
    }
    0
}

fn select_target(config: &Config, args: &TargetArgs, logger: &Logger) -> Option<SupervisionTarget> {
    let default_title = title_of(config);
    let title = args.title.as_deref().unwrap_or(&default_title);
    let target = SupervisionTarget::select(
        args.port.as_deref(),
        args.pid.as_deref(),
        Some(title),
        logger,
    );
    if target.is_none() {
        logger.error("nothing to look for: pass --port, --pid or --title");
    }
    target
}

fn supervisor(config: &Config, logger: &Logger) -> ProcessSupervisor<PlatformLister, OsTerminator> {
    let runtime = config.runtime.as_deref().unwrap_or(DEFAULT_RUNTIME);
    ProcessSupervisor::new(
        ProcessLocator::new(PlatformLister::detect(runtime), logger.clone()),
        OsTerminator,
        DetachStrategy::detect(),
        logger.clone(),
    )
}

fn load_config(root: &std::path::Path) -> Result<Config> {
    config::load_project_config(root).map_err(|err| Error::config(format!("{:#}", err)))
}

fn title_of(config: &Config) -> String {
    config
        .title
        .clone()
        .unwrap_or_else(|| title::DEFAULT_TITLE.to_string())
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}
