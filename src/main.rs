mod app;
mod attach;
mod cli;
mod config;
mod error;
mod input;
mod k8s;
mod merge;
mod model;
mod patch;
mod profile;
mod resolver;
mod selector;
mod session;
mod table;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::{PickerOutcome, ProfilePicker};
use attach::KubectlAttacher;
use clap::Parser;
use cli::{CliArgs, Command, RunArgs};
use config::PickerStyle;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use error::ConfigError;
use futures::StreamExt;
use k8s::{KubeGateway, KubeSelection};
use profile::Catalog;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use resolver::Overrides;
use session::{SessionOutcome, SessionRequest, run_debug_session};
use std::io::{self, Stdout};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    if let Err(error) = init_tracing(&args.log_filter) {
        eprintln!("Error: {error:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {}", compact_error(&error));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(io::stderr)
        .try_init();

    Ok(())
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command {
        Command::Version => {
            print_version();
            Ok(ExitCode::SUCCESS)
        }
        Command::List(list) => {
            let (catalog, _) = load_catalog(args.config.as_deref())?;
            table::print_profiles(catalog.sorted_view(), list.wide);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => {
            let (catalog, _) = load_catalog(args.config.as_deref())?;
            let errors = catalog.validate();
            if !errors.is_empty() {
                return Err(ConfigError::Invalid(errors).into());
            }
            println!("all profiles are valid");
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(run) => run_session(args.config.as_deref(), run).await,
    }
}

fn load_catalog(path: Option<&Path>) -> Result<(Catalog, PickerStyle)> {
    let config = config::load(path)?;
    let catalog = Catalog::load(config.profiles, config.kubectl_path)
        .with_context(|| format!("invalid profile config {}", config.source.display()))?;
    Ok((catalog, config.style))
}

async fn run_session(config_path: Option<&Path>, args: RunArgs) -> Result<ExitCode> {
    let (catalog, style) = load_catalog(config_path)?;
    let profile = match args.profile {
        Some(profile) => profile,
        None => match pick_profile(&catalog, style).await? {
            Some(profile) => profile,
            None => return Ok(ExitCode::from(INTERRUPTED)),
        },
    };

    let invoked_as = attach::invoked_as();
    let tool = attach::resolve_tool_path(catalog.tool_path(), invoked_as.as_deref())?;
    let selection = KubeSelection {
        context: args.context.clone(),
        kubeconfig: args.kubeconfig.clone(),
    };
    let gateway = KubeGateway::connect(&selection).await?;
    let attacher = KubectlAttacher::new(tool, args.context, args.kubeconfig, args.quiet);

    let request = SessionRequest {
        profile,
        targets: args.pods,
        overrides: Overrides {
            image: args.image,
            container_name: args.container,
        },
        context_namespace: args
            .namespace
            .unwrap_or_else(|| gateway.default_namespace().to_string()),
        timeout: args.timeout.map(Duration::from_secs),
        quiet: args.quiet,
    };
    debug!(context = gateway.context(), ?request, "starting debug session");

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));
    let result = run_debug_session(&catalog, &gateway, &attacher, &request, &cancel).await;
    interrupt.abort();

    match result {
        Ok(SessionOutcome::Detached(session)) => {
            info!(
                pod = %session.target,
                profile = %session.profile.name,
                container = %session.container_name,
                "detached from debug container"
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(SessionOutcome::Cancelled(Some(session))) => {
            debug!(
                pod = %session.target,
                phase = %session.phase,
                "debug session interrupted"
            );
            Ok(ExitCode::from(INTERRUPTED))
        }
        Ok(SessionOutcome::Cancelled(None)) => {
            debug!("debug session interrupted before the pod was patched");
            Ok(ExitCode::from(INTERRUPTED))
        }
        Err(_) if cancel.is_cancelled() => Ok(ExitCode::from(INTERRUPTED)),
        Err(error) => Err(error.into()),
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        debug!("interrupt received");
        cancel.cancel();
    }
}

async fn pick_profile(catalog: &Catalog, style: PickerStyle) -> Result<Option<String>> {
    let profiles = catalog.interactive_profiles();
    if profiles.is_empty() {
        anyhow::bail!("no profile defines matchLabels; pass --profile and a pod name instead");
    }

    let mut picker = ProfilePicker::new(profiles, style);
    let mut terminal = init_terminal()?;
    let run_result = run_picker(&mut terminal, &mut picker).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(selected), Ok(())) => Ok(selected),
    }
}

async fn run_picker(terminal: &mut TuiTerminal, picker: &mut ProfilePicker) -> Result<Option<String>> {
    let mut events = EventStream::new();
    loop {
        match picker.outcome() {
            Some(PickerOutcome::Selected(name)) => return Ok(Some(name.clone())),
            Some(PickerOutcome::Cancelled) => return Ok(None),
            None => {}
        }

        terminal
            .draw(|frame| ui::render(frame, picker))
            .context("failed to draw profile picker")?;

        let Some(event) = events.next().await else {
            return Ok(None);
        };
        if let Event::Key(key) = event.context("failed to read terminal event")?
            && key.kind == KeyEventKind::Press
            && let Some(action) = input::map_key(key)
        {
            picker.apply_action(action);
        }
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

fn print_version() {
    println!("kubectl-dpm {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  git commit: {}",
        option_env!("DPM_GIT_COMMIT").unwrap_or("unknown")
    );
    println!(
        "  build date: {}",
        option_env!("DPM_BUILD_DATE").unwrap_or("unknown")
    );
    println!(
        "  platform:   {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 3 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
