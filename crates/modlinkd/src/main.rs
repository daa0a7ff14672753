use std::process::ExitCode;

use modlink_config::ConfigError;
use modlinkd::LaunchError;

fn main() -> ExitCode {
    match modlinkd::run_server() {
        Ok(_) => ExitCode::SUCCESS,
        Err(LaunchError::Config {
            source: ConfigError::Parse(error),
        }) => error.exit(),
        Err(error) => {
            eprintln!("modlinkd: {error}");
            ExitCode::FAILURE
        }
    }
}
