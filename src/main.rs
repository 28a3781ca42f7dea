use clap::Parser;
use statline::{
    app::{lifecycle, logger, App},
    cli::Cli,
    config::Config,
    Result,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logger::init(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("statline: {err}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("statline: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    let app = App::from_sources(config, cli.command)?;
    let stop = lifecycle::create_shutdown_flag()?;
    app.run(stop)
}
