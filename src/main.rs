//! vsession binary entry point.
//!
//! Initialises logging, runs the CLI and maps failures onto the process
//! exit status.

use vsession::auth::{AuthError, ExitStatus};
use vsession::cli::{self, Cli};
use vsession::ui::output;

fn main() {
    let cli = Cli::parse_args();

    let default_level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if let Err(err) = cli::run(cli) {
        output::error(format!("{:#}", err));
        let status = err
            .downcast_ref::<AuthError>()
            .map(AuthError::exit_status)
            .unwrap_or(ExitStatus::InvalidCommand);
        std::process::exit(status.code());
    }
}
