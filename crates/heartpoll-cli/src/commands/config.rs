use clap::Subcommand;
use heartpoll_core::Config;

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (token masked)
    Show,
    /// Get a config value
    Get {
        /// Config key (e.g. "thresholds.monthly", "schedule.utc_offset")
        key: String,
    },
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            print_json(&config.redacted())?;
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.redacted().get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
