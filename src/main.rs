mod api;
mod app;
mod catalog;
mod cli;
mod config;
mod demo;
mod group;
mod input;
mod k8s;
mod model;
mod ui;
mod view;

use anyhow::{Context, Result};
use api::{Backend, DashboardApi};
use app::App;
use catalog::VersionCatalog;
use clap::Parser;
use cli::CliArgs;
use config::ClusterRegistry;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use k8s::KubeGateway;
use model::{CombinedResources, ResourceKind, UpdateResponse};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::File;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use view::{ClusterResourceViewModel, LoadRequest, UpdateRequest, ViewCommand, ViewOptions};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Result of a spawned request, handed back to the loop.
enum Outcome {
    Loaded(LoadRequest, Result<CombinedResources>),
    Checked(UpdateRequest, Result<UpdateResponse>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref(), args.snapshot)?;

    let settings = config::load_settings(args.config.as_deref())?;
    info!(
        source = settings.source.as_deref().unwrap_or("built-in defaults"),
        clusters = settings.registry.clusters().len(),
        "configuration loaded"
    );

    let options = build_view_options(&args, &settings.registry);
    let backend = Backend::new(
        KubeGateway::new(settings.registry.clone(), settings.fetch_timeout),
        VersionCatalog::new(&settings.latest_versions),
    );
    let view = ClusterResourceViewModel::new(settings.registry, options);

    if args.snapshot {
        return print_snapshot(view, &backend).await;
    }

    let mut app = App::new(view);
    run(&mut app, &backend, args.refresh_secs).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>, to_stderr: bool) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
    } else if to_stderr {
        let _ = builder.with_writer(io::stderr).try_init();
    } else {
        let _ = builder.with_writer(io::sink).try_init();
    }

    Ok(())
}

fn build_view_options(args: &CliArgs, registry: &ClusterRegistry) -> ViewOptions {
    for cluster in &args.clusters {
        if registry.get(cluster).is_none() {
            warn!(cluster = %cluster, "cluster id is not registered");
        }
    }

    let kinds = args
        .kinds
        .iter()
        .filter_map(|token| {
            let kind = ResourceKind::from_token(token);
            if kind.is_none() {
                warn!(kind = %token, "ignoring unknown resource kind");
            }
            kind
        })
        .collect();

    ViewOptions {
        clusters: args.clusters.clone(),
        namespaces: args.namespaces.clone(),
        kinds,
        only_divergent: args.only_divergent,
        check_updates: args.check_updates,
    }
}

async fn print_snapshot(mut view: ClusterResourceViewModel, backend: &Backend) -> Result<()> {
    view.load_all_data(backend).await;
    let rendered = serde_json::to_string_pretty(&view.snapshot())
        .context("failed to serialize snapshot")?;
    println!("{rendered}");
    Ok(())
}

async fn run(app: &mut App, backend: &Backend, refresh_secs: u64) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, backend, refresh_secs).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    backend: &Backend,
    refresh_secs: u64,
) -> Result<()> {
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<Outcome>();
    dispatch(backend, app.refresh(), &outcome_tx);

    let mut reader = EventStream::new();
    let auto_refresh = refresh_secs > 0;
    let period = Duration::from_secs(refresh_secs.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(key) {
                            debug!("action={action:?}");
                            let commands = app.apply_action(action);
                            dispatch(backend, commands, &outcome_tx);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            Some(outcome) = outcome_rx.recv() => {
                match outcome {
                    Outcome::Loaded(request, result) => {
                        let commands = app.apply_load(request, result);
                        dispatch(backend, commands, &outcome_tx);
                    }
                    Outcome::Checked(request, result) => {
                        app.apply_update_check(request, result);
                    }
                }
            }
            _ = ticker.tick(), if auto_refresh => {
                if !app.view().loading() {
                    let commands = app.refresh();
                    dispatch(backend, commands, &outcome_tx);
                }
            }
        }
    }

    Ok(())
}

/// Runs each command on its own task; results come back as [`Outcome`]s.
fn dispatch(backend: &Backend, commands: Vec<ViewCommand>, tx: &mpsc::UnboundedSender<Outcome>) {
    for command in commands {
        let backend = backend.clone();
        let tx = tx.clone();
        match command {
            ViewCommand::Load(request) => {
                tokio::spawn(async move {
                    let result = backend
                        .get_all_clusters_resources(&request.cluster_ids)
                        .await;
                    let _ = tx.send(Outcome::Loaded(request, result));
                });
            }
            ViewCommand::CheckUpdates(request) => {
                tokio::spawn(async move {
                    let result = backend.check_for_updates(&request.resources).await;
                    let _ = tx.send(Outcome::Checked(request, result));
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build_view_options;
    use crate::cli::CliArgs;
    use crate::config::ClusterRegistry;
    use crate::model::ResourceKind;
    use clap::Parser;

    #[test]
    fn unknown_kinds_are_dropped_from_options() {
        let args = CliArgs::parse_from(["skew", "-k", "sts", "-k", "pods", "-n", "backend"]);

        let options = build_view_options(&args, &ClusterRegistry::default());

        assert_eq!(options.kinds, [ResourceKind::StatefulSets]);
        assert_eq!(options.namespaces, ["backend"]);
        assert!(options.clusters.is_empty());
    }
}
