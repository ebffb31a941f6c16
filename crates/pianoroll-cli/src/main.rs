mod cli;
mod config;
mod viewer;

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging(cli: &cli::Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &cli::Cli) -> anyhow::Result<()> {
    let mut options = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => pianoroll::PlotOptions::default(),
    };
    cli.apply(&mut options);

    let summary = pianoroll::plot_piano_roll(&cli.input, &options)
        .with_context(|| format!("Failed to plot {}", cli.input.display()))?;
    tracing::info!(
        output = %summary.output.display(),
        width = summary.width,
        height = summary.height,
        "done"
    );

    if cli.show {
        viewer::show(&summary.output)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
