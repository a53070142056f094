mod app;
mod chat;
mod infra;
mod render;
mod state;
mod sync;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use crossterm::{
    ExecutableCommand,
    event::{DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tracing::error;

use app::App;
use chat::TurnEvent;
use infra::api::ApiClient;
use infra::config::{CliArgs, Config};
use infra::logging::init_logging;
use state::AppState;
use sync::{Scheduler, SyncEvent};

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match CliArgs::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}\n{}", e, CliArgs::USAGE);
            std::process::exit(2);
        }
    };
    if cli.help {
        println!("{}", CliArgs::USAGE);
        return Ok(());
    }

    let mut config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    init_logging(&config.store_dir, &config.log_level);

    let state = AppState::new(&config);
    let api = match ApiClient::new(config.server_url.clone(), config.token.take()) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!(error = %e, "cannot build http client");
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    install_panic_hook(config.store_dir.join("errors"));

    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    io::stdout().execute(EnableBracketedPaste)?;
    io::stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    // Create channels
    let (sync_tx, sync_rx) = mpsc::channel::<SyncEvent>();
    let (turn_tx, turn_rx) = mpsc::channel::<TurnEvent>();

    let scheduler = Scheduler::new(api.clone(), sync_tx, config.poll_interval_ms, config.reconnect_delay_ms);
    let mut app = App::new(state, api, scheduler);
    let result = app.run(&mut terminal, sync_rx, turn_tx, turn_rx);

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute(DisableFocusChange)?;
    io::stdout().execute(DisableBracketedPaste)?;
    io::stdout().execute(LeaveAlternateScreen)?;
    result
}

/// Restore the terminal and append the panic to `<error_dir>/panic.log`.
fn install_panic_hook(error_dir: PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(DisableFocusChange);
        let _ = io::stdout().execute(DisableBracketedPaste);
        let _ = io::stdout().execute(LeaveAlternateScreen);

        let _ = std::fs::create_dir_all(&error_dir);
        let ts = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let backtrace = std::backtrace::Backtrace::force_capture();
        let msg = format!("[{}] {}\n\n{}\n\n---\n", ts, info, backtrace);
        let _ = std::fs::OpenOptions::new().create(true).append(true).open(error_dir.join("panic.log")).and_then(
            |mut f| {
                use std::io::Write;
                f.write_all(msg.as_bytes())
            },
        );

        default_hook(info);
    }));
}
