//! Terminal dispatch console: plan collection tours, assign crews, and watch the fleet.

mod app;
mod input;
mod ui;

use std::{
    collections::BTreeSet,
    env,
    fs::File,
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use tokio::time::Instant;
use tourdispatch_core::{
    DispatchConfig, DispatchError, DispatchHandle, DispatchSession, DispatchState, LiveTracker,
    config::LoggingConfig,
    model::{Category, CollectionPointId, FillThreshold, TourId},
};
use tourdispatch_provider_rest as rest;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::app::App;
use crate::input::Action;

const DEFAULT_CONFIG: &str = "tourdispatch.toml";
const PRUNE_EVERY: StdDuration = StdDuration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    // Settings + logging
    let config_path = env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let config = DispatchConfig::from_file(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_logging(&config.logging)?;
    info!(config = %config_path.display(), base_url = %config.api.base_url, "starting");

    // HTTP + session setup
    let client = Client::builder()
        .user_agent(config.api.user_agent.as_str())
        .timeout(config.api.timeout())
        .build()?;
    let backend = rest::plugin(client, &config.api.base_url);
    let tracker = LiveTracker::start(
        Arc::clone(&backend.vehicles),
        config.tracking.poll_interval(),
        config.tracking.on_failure,
    );
    let session = DispatchSession::new(backend, &config);
    let (handle, session_task) = DispatchHandle::spawn(session);
    dispatch(&handle, Request::Start);

    // App state
    let app = App::new(
        handle.clone(),
        tracker.markers(),
        &config.planning,
        config.planning.threshold()?,
    );

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let terminal_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(terminal_backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    tracker.stop().await;
    handle.shutdown().await;
    session_task.await?;
    info!("bye");

    res
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let file = File::options()
        .create(true)
        .append(true)
        .open(&config.file)
        .with_context(|| format!("opening log file {}", config.file.display()))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_unset| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;
    Ok(())
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    let mut last_prune = Instant::now();
    loop {
        // Draw current UI
        terminal.draw(|frame| ui::draw(frame, &app))?;

        if last_prune.elapsed() >= PRUNE_EVERY {
            app.handle.prune_notices();
            last_prune = Instant::now();
        }

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            let state = app.snapshot();
            let action = input::handle_key_event(key, &mut app, &state);
            if action == Action::Quit {
                break;
            }
            if let Some(request) = Request::from_action(action, &app, &state) {
                dispatch(&app.handle, request);
            }
        }
    }

    Ok(())
}

/// Session command issued from the event loop.
enum Request {
    Start,
    Plan {
        categories: BTreeSet<Category>,
        threshold: FillThreshold,
    },
    AssignAll,
    AssignTour(TourId),
    DiscardAll,
    DiscardTour(TourId),
    Terminate,
    Focus(usize),
    SelectStop {
        tour_index: usize,
        collection_point: CollectionPointId,
    },
    ClearSelection,
}

impl Request {
    fn from_action(action: Action, app: &App, state: &DispatchState) -> Option<Self> {
        let focused = || state.active_tour().map(|view| view.id().clone());
        match action {
            Action::None | Action::Quit => None,
            Action::Plan => Some(Self::Plan {
                categories: app.categories.clone(),
                threshold: app.threshold,
            }),
            Action::AssignAll => Some(Self::AssignAll),
            Action::AssignFocused => focused().map(Self::AssignTour),
            Action::DiscardAll => Some(Self::DiscardAll),
            Action::DiscardFocused => focused().map(Self::DiscardTour),
            Action::Terminate => Some(Self::Terminate),
            Action::Focus(index) => Some(Self::Focus(index)),
            Action::SelectStop {
                tour_index,
                collection_point,
            } => Some(Self::SelectStop {
                tour_index,
                collection_point,
            }),
            Action::ClearSelection => Some(Self::ClearSelection),
        }
    }
}

/// Run a session command in the background. Failures already surface as notices in the
/// published state, so they are only logged here.
fn dispatch(handle: &DispatchHandle, request: Request) {
    let handle = handle.clone();
    tokio::spawn(async move {
        let outcome = match request {
            Request::Start => handle.start().await,
            Request::Plan {
                categories,
                threshold,
            } => handle.plan(categories, threshold).await.map(drop),
            Request::AssignAll => handle.assign_all().await.map(drop),
            Request::AssignTour(tour) => handle.assign_one(tour).await.map(drop),
            Request::DiscardAll => handle.discard_all().await.map(drop),
            Request::DiscardTour(tour) => handle.discard_one(tour).await,
            Request::Terminate => handle.terminate_planning().await.map(drop),
            Request::Focus(index) => handle.focus(index).await,
            Request::SelectStop {
                tour_index,
                collection_point,
            } => handle.select_stop(tour_index, collection_point).await,
            Request::ClearSelection => handle.clear_selection().await,
        };
        match outcome {
            Ok(()) | Err(DispatchError::SessionClosed) => {}
            Err(err) => debug!(error = %err, "command finished with an error"),
        }
    });
}
