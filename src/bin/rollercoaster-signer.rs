//! Command-line entry point for the signing driver.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;

use rollercoaster::config::Config;
use rollercoaster::signer::SigningDriver;

/// A DNSSEC zone signer that exercises key rollover on a quarterly schedule.
#[derive(Parser)]
#[command(version, author, next_line_help = true)]
struct Cli {
    /// Path to the driver's TOML configuration file.
    #[arg(long, short = 'c', default_value = "rollercoaster.toml")]
    config: Utf8PathBuf,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,

    /// Run a single tick and exit, instead of looping forever.
    #[arg(long)]
    once: bool,

    /// Parse and validate the configuration file, then exit.
    #[arg(long = "check-config")]
    check_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    rollercoaster::log::init(cli.debug);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("rollercoaster-signer could not be configured: {err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check_config {
        return ExitCode::SUCCESS;
    }

    let mut driver = match SigningDriver::new(config) {
        Ok(driver) => driver,
        Err(err) => {
            eprintln!("rollercoaster-signer could not start: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = if cli.once {
        driver.run_once()
    } else {
        driver.run_loop()
    };

    if let Err(err) = result {
        tracing::error!(%err, "signing driver exited");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
