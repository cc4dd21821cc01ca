use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod domain;
mod inputter;
mod launcher;
mod model;
mod ui;

use controller::Controller;
use domain::{GMConfig, GMError};
use model::{Model, Status};
use ui::TableUI;

/// A tui based gene mapping browser that launches coverage plots.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Tab separated gene mapping file
    data: String,

    /// Plot script run for the selected gene; defaults to run.bat on
    /// Windows and ./run.sh everywhere else
    #[arg(long)]
    plot_script: Option<String>,

    /// Write diagnostics to this file (the terminal is owned by the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_file.as_ref()) {
        eprintln!("Could not set up logging: {:?}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Err(e) => {
            ratatui::restore();
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing(log_file: Option<&PathBuf>) -> Result<(), GMError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(ErrorLayer::default())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(ErrorLayer::default())
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::sink))
                .init();
        }
    }
    Ok(())
}

fn expand_path(raw: &str) -> Result<PathBuf, GMError> {
    let expanded = shellexpand::full(raw).map_err(|e| GMError::LoadingFailed(e.to_string()))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn run(cli: Cli) -> Result<(), GMError> {
    let data_path = expand_path(&cli.data)?;
    let plot_script = match cli.plot_script.as_deref() {
        Some(raw) => expand_path(raw)?,
        None => launcher::platform_script(),
    };
    let cfg = GMConfig::default().with_plot_script(plot_script);

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&cfg, size.width as usize, size.height as usize)?;
    model.load_data_file(data_path)?;

    let ui = TableUI::new();
    let controller = Controller::new(&cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message)?;
        }

        // Reconcile a finished plot invocation
        if let Some(message) = model.poll_launch() {
            model.update(message)?;
        }
    }

    Ok(())
}
