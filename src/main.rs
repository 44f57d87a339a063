use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use airb_core::{
    Config, FsContentResolver, GeminiClient, HostCapabilities, MediaResolver, ReplyController,
};
use app::App;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|_| Config::new());
    let settings = config.resolve()?;

    init_logging()?;
    info!(?settings, "starting airb");

    let capabilities = HostCapabilities::detect(settings.platform_level);
    let media = MediaResolver::new(capabilities);
    info!(
        platform_level = capabilities.platform_level,
        strategy = ?media.strategy(),
        "image decoder selected"
    );

    let controller = ReplyController::new(GeminiClient::new(&settings), FsContentResolver, media);
    let mut app = App::new(controller, settings.model.clone());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = tui::EventHandler::new();
    let mut state_rx = app.controller.subscribe();

    while !app.should_quit {
        app.sync_state();
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event)?,
                None => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if app.send_task.is_some() {
        info!("quitting with a request in flight");
    }
    Ok(())
}

/// Logs go to `<cache_dir>/airb/airb.log`; stderr belongs to the terminal UI.
fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("airb");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("airb.log"))?;

    let filter = EnvFilter::try_from_env("AIRB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}
